//! Home Assistant service calls
//!
//! Client for toggling devices through a Home Assistant instance's REST API

use std::time::Duration;

use reqwest::Client;

use crate::config::HomeConfig;
use crate::{Error, Result};

/// A device action recognized in spoken commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeAction {
    /// Switch a device on
    TurnOn,
    /// Switch a device off
    TurnOff,
    /// Flip a device's current state
    Toggle,
}

impl HomeAction {
    /// Home Assistant service name for this action
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Toggle => "toggle",
        }
    }

    /// Past-tense phrasing for spoken confirmations
    #[must_use]
    pub const fn spoken(self) -> &'static str {
        match self {
            Self::TurnOn => "turned on",
            Self::TurnOff => "turned off",
            Self::Toggle => "toggled",
        }
    }
}

/// Maps a spoken device phrase to a Home Assistant entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBinding {
    /// Phrase to look for in the command (e.g. "kitchen lights")
    pub phrase: String,
    /// Entity to act on (e.g. `light.kitchen`)
    pub entity_id: String,
}

/// Client for the Home Assistant REST API
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    /// HTTP client
    client: Client,
    /// Base URL of the Home Assistant instance
    base_url: String,
    /// Long-lived access token
    token: Option<String>,
}

impl HomeAssistantClient {
    /// Create a new Home Assistant client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &HomeConfig, timeout: Duration) -> Result<Self> {
        if config.token.is_none() {
            tracing::warn!("no home assistant token configured, device calls will be rejected");
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Build the authorization header value
    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    /// Invoke a service on an entity
    ///
    /// The service domain is taken from the entity id prefix, so
    /// `light.kitchen` calls `/api/services/light/turn_on`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] if the instance is unreachable or rejects
    /// the call.
    pub async fn call(&self, action: HomeAction, entity_id: &str) -> Result<()> {
        #[derive(serde::Serialize)]
        struct ServiceCall<'a> {
            entity_id: &'a str,
        }

        let domain = entity_id.split('.').next().unwrap_or("homeassistant");
        let url = format!(
            "{}/api/services/{domain}/{}",
            self.base_url,
            action.service()
        );

        let mut req = self.client.post(&url).json(&ServiceCall { entity_id });

        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Dispatch(format!("home assistant unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!(
                "home assistant error: {status} - {body}"
            )));
        }

        tracing::info!(entity_id, service = action.service(), "home assistant service called");
        Ok(())
    }
}
