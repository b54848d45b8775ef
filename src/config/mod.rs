//! Configuration management for Aural
//!
//! Configuration is assembled once at startup (env > file > default), validated,
//! and then passed by reference into constructors. Nothing mutates it afterward,
//! so a running session never observes a settings change mid-cycle.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::home::EntityBinding;
use crate::dispatch::weather::DefaultLocation;
use crate::hotword::HotwordEntry;
use crate::model::{ApiFlavor, ModelEndpoint};
use crate::{Error, Result};

/// Aural configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Canonical hotword matching language (ISO 639-1, e.g. "en")
    pub language: String,

    /// Trigger phrases, in matching order
    pub hotwords: Vec<HotwordEntry>,

    /// Model endpoints, in fallback order
    pub endpoints: Vec<ModelEndpoint>,

    /// Model used when the matched hotword has no explicit routing
    pub default_model: String,

    /// Per-model reply cleanup rules
    pub cleanup: Vec<CleanupRule>,

    /// Spoken once when every endpoint in the chain has failed
    pub unavailable_message: String,

    /// Per-request timeout applied to every external HTTP call
    pub request_timeout: Duration,

    /// Microphone capture limits
    pub capture: CaptureConfig,

    /// Speech-to-text service
    pub stt: SttConfig,

    /// Text-to-speech service
    pub tts: TtsConfig,

    /// Translation service; `None` disables translation entirely
    pub translation: Option<TranslationConfig>,

    /// Home Assistant connection and entity bindings
    pub home: HomeConfig,

    /// Weather lookups
    pub weather: WeatherConfig,

    /// Conversation history behavior
    pub history: HistoryConfig,

    /// Path to data directory (persisted history)
    pub data_dir: PathBuf,
}

/// One reply cleanup rule
///
/// The pattern is kept as source text here; it is compiled (and therefore
/// checked) during validation and again by the model client at startup.
#[derive(Debug, Clone)]
pub struct CleanupRule {
    /// Model the rule applies to
    pub model: String,

    /// Regex removed from that model's replies
    pub pattern: String,
}

/// Microphone capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Hard cap on a single recording, in seconds
    pub max_seconds: u64,
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Base URL of an OpenAI-compatible transcription server
    pub url: String,

    /// STT model (e.g. "whisper-1")
    pub model: String,
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Base URL of an OpenAI-compatible speech server
    pub url: String,

    /// TTS model (e.g. "tts-1")
    pub model: String,

    /// TTS voice identifier (e.g. "alloy")
    pub voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub speed: f64,
}

/// Translation service configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Base URL of a LibreTranslate-compatible server
    pub url: String,
}

/// Home Assistant configuration
#[derive(Debug, Clone)]
pub struct HomeConfig {
    /// Base URL (e.g. `http://localhost:8123`)
    pub url: String,

    /// Long-lived access token (from `HOME_ASSISTANT_TOKEN` env or file)
    pub token: Option<String>,

    /// Spoken-phrase to entity-id bindings, in matching order
    pub entities: Vec<EntityBinding>,
}

/// Weather configuration
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// OpenWeatherMap-compatible API key (from `WEATHER_API_KEY` env or file)
    pub api_key: Option<String>,

    /// Weather API base URL
    pub api_url: String,

    /// IP geolocation base URL
    pub geo_url: String,

    /// Unit system passed to the weather API
    pub units: String,

    /// Fallback location when IP geolocation fails
    pub fallback: DefaultLocation,
}

/// Conversation history configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Include prior exchanges in chat-flavor requests
    pub enabled: bool,

    /// Persist history across runs under the data directory
    pub persist: bool,

    /// Oldest exchanges are dropped past this count
    pub max_exchanges: usize,

    /// System prompt prepended to chat-flavor requests
    pub system_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            hotwords: default_hotwords(),
            endpoints: vec![
                ModelEndpoint {
                    name: "ollama".to_string(),
                    url: "http://localhost:11434".to_string(),
                    api: ApiFlavor::Generate,
                },
                ModelEndpoint {
                    name: "backup".to_string(),
                    url: "http://localhost:8000".to_string(),
                    api: ApiFlavor::Chat,
                },
            ],
            default_model: "llama3.2".to_string(),
            cleanup: vec![CleanupRule {
                model: "deepseek-r1:14b".to_string(),
                pattern: r"(?s)<think>.*?</think>".to_string(),
            }],
            unavailable_message: "Assistant unavailable. Check that your model server is running."
                .to_string(),
            request_timeout: Duration::from_secs(30),
            capture: CaptureConfig { max_seconds: 20 },
            stt: SttConfig {
                url: "http://localhost:9000".to_string(),
                model: "whisper-1".to_string(),
            },
            tts: TtsConfig {
                url: "http://localhost:8880".to_string(),
                model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                speed: 1.0,
            },
            translation: None,
            home: HomeConfig {
                url: "http://localhost:8123".to_string(),
                token: None,
                entities: default_entities(),
            },
            weather: WeatherConfig {
                api_key: None,
                api_url: "https://api.openweathermap.org".to_string(),
                geo_url: "http://ip-api.com".to_string(),
                units: "imperial".to_string(),
                fallback: DefaultLocation {
                    city: None,
                    state: None,
                    zip: None,
                },
            },
            history: HistoryConfig {
                enabled: true,
                persist: false,
                max_exchanges: 20,
                system_prompt: "You are Aural, a voice assistant. Keep replies concise and \
                                conversational; they will be read aloud."
                    .to_string(),
            },
            data_dir: default_data_dir(),
        }
    }
}

/// Default trigger phrases and their model routing
fn default_hotwords() -> Vec<HotwordEntry> {
    vec![
        HotwordEntry {
            phrase: "hey llama".to_string(),
            variants: vec![
                "llama".to_string(),
                "hey lama".to_string(),
                "llama are you there".to_string(),
            ],
            model: None,
        },
        HotwordEntry {
            phrase: "hey dolphin".to_string(),
            variants: vec!["dolphin".to_string()],
            model: Some("dolphin-mistral".to_string()),
        },
        HotwordEntry {
            phrase: "hey deepseek".to_string(),
            variants: vec!["deepseek".to_string(), "deep seek".to_string()],
            model: Some("deepseek-r1:14b".to_string()),
        },
    ]
}

/// Default entity bindings; more specific phrases come first
fn default_entities() -> Vec<EntityBinding> {
    vec![
        EntityBinding {
            phrase: "kitchen lights".to_string(),
            entity_id: "light.kitchen".to_string(),
        },
        EntityBinding {
            phrase: "living room light".to_string(),
            entity_id: "light.living_room".to_string(),
        },
        EntityBinding {
            phrase: "light".to_string(),
            entity_id: "light.living_room".to_string(),
        },
        EntityBinding {
            phrase: "fan".to_string(),
            entity_id: "fan.ceiling_fan".to_string(),
        },
    ]
}

/// Default data directory: `~/.local/share/aural/` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from(".aural"), |d| d.data_dir().join("aural"))
}

impl Config {
    /// Load configuration from the config file, environment, and defaults
    ///
    /// Scalar settings follow env > file > default precedence. List settings
    /// (hotwords, endpoints, cleanup rules, entity bindings) come from the file
    /// as a whole, or from defaults when the file omits them.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed, or
    /// when the merged configuration fails validation. Callers should treat
    /// this as fatal.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(override_path)?;
        let defaults = Self::default();

        let hotwords = match fc.hotword {
            Some(entries) => entries
                .into_iter()
                .map(hotword_from_file)
                .collect::<Result<Vec<_>>>()?,
            None => defaults.hotwords,
        };

        let mut endpoints = match fc.endpoint {
            Some(entries) => entries
                .into_iter()
                .map(endpoint_from_file)
                .collect::<Result<Vec<_>>>()?,
            None => defaults.endpoints,
        };

        // Env override points the first (primary) endpoint somewhere else
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            if let Some(primary) = endpoints.first_mut() {
                primary.url = url;
            }
        }

        let cleanup = match fc.model.cleanup {
            Some(rules) => rules
                .into_iter()
                .map(cleanup_from_file)
                .collect::<Result<Vec<_>>>()?,
            None => defaults.cleanup,
        };

        let entities = match fc.home_assistant.entity {
            Some(bindings) => bindings
                .into_iter()
                .map(entity_from_file)
                .collect::<Result<Vec<_>>>()?,
            None => defaults.home.entities,
        };

        let config = Self {
            language: fc.language.unwrap_or(defaults.language),
            hotwords,
            endpoints,
            default_model: std::env::var("AURAL_DEFAULT_MODEL")
                .ok()
                .or(fc.model.default)
                .unwrap_or(defaults.default_model),
            cleanup,
            unavailable_message: fc
                .unavailable_message
                .unwrap_or(defaults.unavailable_message),
            request_timeout: fc
                .http
                .timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            capture: CaptureConfig {
                max_seconds: fc
                    .capture
                    .max_seconds
                    .unwrap_or(defaults.capture.max_seconds),
            },
            stt: SttConfig {
                url: std::env::var("AURAL_STT_URL")
                    .ok()
                    .or(fc.stt.url)
                    .unwrap_or(defaults.stt.url),
                model: fc.stt.model.unwrap_or(defaults.stt.model),
            },
            tts: TtsConfig {
                url: std::env::var("AURAL_TTS_URL")
                    .ok()
                    .or(fc.tts.url)
                    .unwrap_or(defaults.tts.url),
                model: fc.tts.model.unwrap_or(defaults.tts.model),
                voice: fc.tts.voice.unwrap_or(defaults.tts.voice),
                speed: fc.tts.speed.unwrap_or(defaults.tts.speed),
            },
            translation: fc.translation.map(|t| TranslationConfig {
                url: t
                    .url
                    .unwrap_or_else(|| "http://localhost:5000".to_string()),
            }),
            home: HomeConfig {
                url: fc.home_assistant.url.unwrap_or(defaults.home.url),
                token: std::env::var("HOME_ASSISTANT_TOKEN")
                    .ok()
                    .or(fc.home_assistant.token),
                entities,
            },
            weather: WeatherConfig {
                api_key: std::env::var("WEATHER_API_KEY")
                    .ok()
                    .or(fc.weather.api_key),
                api_url: defaults.weather.api_url,
                geo_url: defaults.weather.geo_url,
                units: fc.weather.units.unwrap_or(defaults.weather.units),
                fallback: DefaultLocation {
                    city: fc.weather.city,
                    state: fc.weather.state,
                    zip: fc.weather.zip,
                },
            },
            history: HistoryConfig {
                enabled: fc.history.enabled.unwrap_or(defaults.history.enabled),
                persist: fc.history.persist.unwrap_or(defaults.history.persist),
                max_exchanges: fc
                    .history
                    .max_exchanges
                    .unwrap_or(defaults.history.max_exchanges),
                system_prompt: fc
                    .history
                    .system_prompt
                    .unwrap_or(defaults.history.system_prompt),
            },
            data_dir: defaults.data_dir,
        };

        config.validate()?;

        if config.history.persist {
            if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
                tracing::warn!(
                    path = %config.data_dir.display(),
                    error = %e,
                    "failed to create data directory"
                );
            }
        }

        Ok(config)
    }

    /// Check invariants that would otherwise surface as confusing runtime failures
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(
                "at least one model endpoint is required".to_string(),
            ));
        }

        for endpoint in &self.endpoints {
            if endpoint.url.trim().is_empty() {
                return Err(Error::Config(format!(
                    "endpoint '{}' has an empty url",
                    endpoint.name
                )));
            }
        }

        if self.hotwords.is_empty() {
            return Err(Error::Config(
                "at least one hotword is required".to_string(),
            ));
        }

        for entry in &self.hotwords {
            if entry.phrase.trim().is_empty() {
                return Err(Error::Config("hotword phrase cannot be empty".to_string()));
            }
        }

        if !(0.25..=4.0).contains(&self.tts.speed) {
            return Err(Error::Config(format!(
                "tts speed {} out of range (0.25 to 4.0)",
                self.tts.speed
            )));
        }

        for rule in &self.cleanup {
            if let Err(e) = regex::Regex::new(&rule.pattern) {
                return Err(Error::Config(format!(
                    "invalid cleanup pattern for model '{}': {e}",
                    rule.model
                )));
            }
        }

        for binding in &self.home.entities {
            if binding.phrase.trim().is_empty() {
                return Err(Error::Config("entity binding phrase cannot be empty".to_string()));
            }
            if !binding.entity_id.contains('.') {
                return Err(Error::Config(format!(
                    "entity id '{}' must look like 'domain.name'",
                    binding.entity_id
                )));
            }
        }

        if self.history.enabled && self.history.max_exchanges == 0 {
            return Err(Error::Config(
                "history.max_exchanges must be at least 1".to_string(),
            ));
        }

        if self.capture.max_seconds == 0 {
            return Err(Error::Config(
                "capture.max_seconds must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn hotword_from_file(entry: file::HotwordFileEntry) -> Result<HotwordEntry> {
    let phrase = entry
        .phrase
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| Error::Config("hotword entry is missing a phrase".to_string()))?;
    Ok(HotwordEntry {
        phrase,
        variants: entry.variants.unwrap_or_default(),
        model: entry.model,
    })
}

fn endpoint_from_file(entry: file::EndpointFileEntry) -> Result<ModelEndpoint> {
    let url = entry
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::Config("endpoint entry is missing a url".to_string()))?;
    let api = match entry.api.as_deref() {
        None | Some("generate") => ApiFlavor::Generate,
        Some("chat") => ApiFlavor::Chat,
        Some(other) => {
            return Err(Error::Config(format!(
                "unknown endpoint api '{other}' (expected \"generate\" or \"chat\")"
            )));
        }
    };
    let name = entry.name.unwrap_or_else(|| url.clone());
    Ok(ModelEndpoint { name, url, api })
}

fn cleanup_from_file(entry: file::CleanupFileEntry) -> Result<CleanupRule> {
    let model = entry
        .model
        .ok_or_else(|| Error::Config("cleanup rule is missing a model".to_string()))?;
    let pattern = entry
        .pattern
        .ok_or_else(|| Error::Config("cleanup rule is missing a pattern".to_string()))?;
    Ok(CleanupRule { model, pattern })
}

fn entity_from_file(entry: file::EntityFileEntry) -> Result<EntityBinding> {
    let phrase = entry
        .phrase
        .ok_or_else(|| Error::Config("entity binding is missing a phrase".to_string()))?;
    let entity_id = entry
        .entity_id
        .ok_or_else(|| Error::Config("entity binding is missing an entity_id".to_string()))?;
    Ok(EntityBinding { phrase, entity_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].api, ApiFlavor::Generate);
        assert_eq!(config.endpoints[1].api, ApiFlavor::Chat);
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let mut config = Config::default();
        config.endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tts_speed_out_of_range_rejected() {
        let mut config = Config::default();
        config.tts.speed = 9.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_cleanup_pattern_rejected() {
        let mut config = Config::default();
        config.cleanup.push(CleanupRule {
            model: "broken".to_string(),
            pattern: "(unclosed".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_entity_id_without_domain_rejected() {
        let mut config = Config::default();
        config.home.entities.push(EntityBinding {
            phrase: "garage".to_string(),
            entity_id: "garage".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_api_flavor_rejected() {
        let entry = file::EndpointFileEntry {
            name: None,
            url: Some("http://localhost:1234".to_string()),
            api: Some("grpc".to_string()),
        };
        assert!(endpoint_from_file(entry).is_err());
    }

    #[test]
    fn test_endpoint_name_defaults_to_url() {
        let entry = file::EndpointFileEntry {
            name: None,
            url: Some("http://localhost:1234".to_string()),
            api: None,
        };
        let endpoint = endpoint_from_file(entry).expect("endpoint should convert");
        assert_eq!(endpoint.name, "http://localhost:1234");
        assert_eq!(endpoint.api, ApiFlavor::Generate);
    }

    #[test]
    fn test_file_overlay_round_trip() {
        let raw = r#"
            language = "en"

            [[hotword]]
            phrase = "hey llama"
            variants = ["llama"]

            [[endpoint]]
            name = "primary"
            url = "http://localhost:11434"
            api = "generate"

            [[endpoint]]
            url = "http://localhost:8000"
            api = "chat"

            [model]
            default = "llama3.2"

            [[model.cleanup]]
            model = "deepseek-r1:14b"
            pattern = "(?s)<think>.*?</think>"

            [weather]
            city = "Portland"
            state = "Oregon"

            [[home_assistant.entity]]
            phrase = "kitchen lights"
            entity_id = "light.kitchen"
        "#;
        let fc: file::AuralConfigFile = toml::from_str(raw).expect("schema should parse");
        assert_eq!(fc.hotword.as_ref().map(Vec::len), Some(1));
        assert_eq!(fc.endpoint.as_ref().map(Vec::len), Some(2));
        assert_eq!(fc.weather.city.as_deref(), Some("Portland"));
        let entities = fc.home_assistant.entity.expect("entities should parse");
        assert_eq!(entities[0].entity_id.as_deref(), Some("light.kitchen"));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "language = [not toml").expect("write");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_override_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nope.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
