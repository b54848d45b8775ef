//! Weather lookups
//!
//! Current conditions from an OpenWeatherMap-compatible API. The location is
//! discovered by IP geolocation first, with the configured fallback location
//! used when discovery fails.

use std::time::Duration;

use reqwest::Client;

use crate::config::WeatherConfig;
use crate::{Error, Result};

/// Fallback location used when IP geolocation fails
#[derive(Debug, Clone, Default)]
pub struct DefaultLocation {
    /// City name
    pub city: Option<String>,
    /// State or region name
    pub state: Option<String>,
    /// Postal code
    pub zip: Option<String>,
}

/// A resolved place to query weather for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationQuery {
    /// City plus state or region
    CityState {
        /// City name
        city: String,
        /// State or region name
        state: String,
    },
    /// Postal code
    Zip(String),
}

impl LocationQuery {
    /// Query-string fragment selecting this place
    fn to_query(&self) -> String {
        match self {
            Self::CityState { city, state } => format!(
                "q={},{}",
                urlencoding::encode(city),
                urlencoding::encode(state)
            ),
            Self::Zip(zip) => format!("zip={}", urlencoding::encode(zip)),
        }
    }
}

/// Current conditions at the resolved location
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    /// Short condition, lowercased (e.g. "clear", "rain")
    pub condition: String,
    /// Temperature in the configured unit system
    pub temperature: f64,
}

/// IP geolocation response
#[derive(serde::Deserialize)]
struct GeoResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(rename = "regionName", default)]
    region_name: Option<String>,
}

#[derive(serde::Deserialize)]
struct OwmResponse {
    weather: Vec<OwmCondition>,
    main: OwmMain,
}

#[derive(serde::Deserialize)]
struct OwmCondition {
    main: String,
}

#[derive(serde::Deserialize)]
struct OwmMain {
    temp: f64,
}

/// Client for weather and geolocation lookups
#[derive(Debug, Clone)]
pub struct WeatherClient {
    /// HTTP client
    client: Client,
    /// Weather API base URL
    base_url: String,
    /// IP geolocation base URL
    geo_url: String,
    /// API key, required for lookups
    api_key: Option<String>,
    /// Unit system passed through to the API
    units: String,
    /// Location used when geolocation fails
    fallback: DefaultLocation,
}

impl WeatherClient {
    /// Create a new weather client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &WeatherConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            geo_url: config.geo_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            units: config.units.clone(),
            fallback: config.fallback.clone(),
        })
    }

    /// Report current conditions where the machine appears to be
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] when no location can be resolved, the API
    /// key is missing, or the weather service fails.
    pub async fn current(&self) -> Result<WeatherReport> {
        let location = match self.locate().await {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(error = %e, "ip geolocation failed, using configured fallback");
                self.fallback_query()?
            }
        };

        self.lookup(&location).await
    }

    /// Resolve a location from the machine's public IP
    async fn locate(&self) -> Result<LocationQuery> {
        let url = format!("{}/json/", self.geo_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("geolocation unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Dispatch(format!(
                "geolocation error: {}",
                response.status()
            )));
        }

        let geo: GeoResponse = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("bad geolocation response: {e}")))?;

        if geo.status != "success" {
            return Err(Error::Dispatch(format!(
                "geolocation lookup failed: {}",
                geo.status
            )));
        }

        match (geo.city, geo.region_name) {
            (Some(city), Some(state)) if !city.is_empty() => {
                Ok(LocationQuery::CityState { city, state })
            }
            _ => Err(Error::Dispatch(
                "geolocation response missing city".to_string(),
            )),
        }
    }

    /// Location query from the configured fallback, city and state preferred
    fn fallback_query(&self) -> Result<LocationQuery> {
        if let (Some(city), Some(state)) = (&self.fallback.city, &self.fallback.state) {
            return Ok(LocationQuery::CityState {
                city: city.clone(),
                state: state.clone(),
            });
        }

        if let Some(zip) = &self.fallback.zip {
            return Ok(LocationQuery::Zip(zip.clone()));
        }

        Err(Error::Dispatch(
            "geolocation failed and no fallback location is configured".to_string(),
        ))
    }

    /// Fetch current conditions for a resolved location
    async fn lookup(&self, location: &LocationQuery) -> Result<WeatherReport> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Dispatch("weather api key not configured".to_string()))?;

        let url = format!(
            "{}/data/2.5/weather?{}&units={}&appid={}",
            self.base_url,
            location.to_query(),
            self.units,
            urlencoding::encode(api_key),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("weather service unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "weather service error: {status} - {body}"
            )));
        }

        let owm: OwmResponse = response
            .json()
            .await
            .map_err(|e| Error::Dispatch(format!("bad weather response: {e}")))?;

        let condition = owm
            .weather
            .first()
            .map_or_else(|| "unknown".to_string(), |c| c.main.to_lowercase());

        tracing::info!(condition = %condition, temperature = owm.main.temp, "weather retrieved");

        Ok(WeatherReport {
            condition,
            temperature: owm.main.temp,
        })
    }
}
