//! TOML configuration file loading
//!
//! Supports `~/.config/aural/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//! A file that exists but fails to parse is a fatal configuration error, so a
//! typo never silently reverts the assistant to default behavior.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AuralConfigFile {
    /// Canonical hotword matching language (e.g. "en")
    #[serde(default)]
    pub language: Option<String>,

    /// Spoken message when every model endpoint has failed
    #[serde(default)]
    pub unavailable_message: Option<String>,

    /// Trigger phrases, in matching order (`[[hotword]]`)
    #[serde(default)]
    pub hotword: Option<Vec<HotwordFileEntry>>,

    /// Model endpoints, in fallback order (`[[endpoint]]`)
    #[serde(default)]
    pub endpoint: Option<Vec<EndpointFileEntry>>,

    /// Model selection and reply cleanup
    #[serde(default)]
    pub model: ModelFileConfig,

    /// Microphone capture limits
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Outbound HTTP behavior
    #[serde(default)]
    pub http: HttpFileConfig,

    /// Speech-to-text service
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Text-to-speech service
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Translation service for non-canonical utterances
    #[serde(default)]
    pub translation: Option<TranslationFileConfig>,

    /// Home Assistant connection and entity bindings
    #[serde(default)]
    pub home_assistant: HomeFileConfig,

    /// Weather lookups
    #[serde(default)]
    pub weather: WeatherFileConfig,

    /// Conversation history
    #[serde(default)]
    pub history: HistoryFileConfig,
}

/// One trigger phrase entry
#[derive(Debug, Default, Deserialize)]
pub struct HotwordFileEntry {
    /// Canonical phrase (e.g. "hey llama")
    pub phrase: Option<String>,

    /// Spoken variants that also trigger this entry
    pub variants: Option<Vec<String>>,

    /// Model this phrase routes to (defaults to `model.default`)
    pub model: Option<String>,
}

/// One model endpoint entry
#[derive(Debug, Default, Deserialize)]
pub struct EndpointFileEntry {
    /// Display name used in logs (defaults to the URL)
    pub name: Option<String>,

    /// Base URL (e.g. `http://localhost:11434`)
    pub url: Option<String>,

    /// API flavor: "generate" (Ollama) or "chat" (OpenAI-compatible)
    pub api: Option<String>,
}

/// Model selection configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// Model used when a hotword has no explicit routing
    pub default: Option<String>,

    /// Per-model reply cleanup rules (`[[model.cleanup]]`)
    #[serde(default)]
    pub cleanup: Option<Vec<CleanupFileEntry>>,
}

/// One reply cleanup rule
#[derive(Debug, Default, Deserialize)]
pub struct CleanupFileEntry {
    /// Model the rule applies to
    pub model: Option<String>,

    /// Regex removed from that model's replies (e.g. a reasoning block)
    pub pattern: Option<String>,
}

/// Microphone capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Hard cap on a single recording, in seconds
    pub max_seconds: Option<u64>,
}

/// Outbound HTTP configuration
#[derive(Debug, Default, Deserialize)]
pub struct HttpFileConfig {
    /// Per-request timeout applied to every external call, in seconds
    pub timeout_secs: Option<u64>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Base URL of an OpenAI-compatible transcription server
    pub url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub model: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Base URL of an OpenAI-compatible speech server
    pub url: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub voice: Option<String>,

    /// TTS speed multiplier
    pub speed: Option<f64>,
}

/// Translation service configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranslationFileConfig {
    /// Base URL of a LibreTranslate-compatible server
    pub url: Option<String>,
}

/// Home Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct HomeFileConfig {
    /// Base URL (e.g. `http://localhost:8123`)
    pub url: Option<String>,

    /// Long-lived access token (also `HOME_ASSISTANT_TOKEN`)
    pub token: Option<String>,

    /// Spoken-phrase to entity-id bindings (`[[home_assistant.entity]]`)
    #[serde(default)]
    pub entity: Option<Vec<EntityFileEntry>>,
}

/// One entity binding
#[derive(Debug, Default, Deserialize)]
pub struct EntityFileEntry {
    /// Phrase as spoken (e.g. "kitchen lights")
    pub phrase: Option<String>,

    /// Entity id the phrase controls (e.g. "light.kitchen")
    pub entity_id: Option<String>,
}

/// Weather configuration
#[derive(Debug, Default, Deserialize)]
pub struct WeatherFileConfig {
    /// OpenWeatherMap-compatible API key (also `WEATHER_API_KEY`)
    pub api_key: Option<String>,

    /// Unit system passed to the weather API
    pub units: Option<String>,

    /// Fallback city when IP geolocation fails
    pub city: Option<String>,

    /// Fallback state or region
    pub state: Option<String>,

    /// Fallback postal code (used when no city is set)
    pub zip: Option<String>,
}

/// Conversation history configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    /// Include prior exchanges in chat-flavor requests
    pub enabled: Option<bool>,

    /// Persist history across runs
    pub persist: Option<bool>,

    /// Oldest exchanges are dropped past this count
    pub max_exchanges: Option<usize>,

    /// System prompt prepended to chat-flavor requests
    pub system_prompt: Option<String>,
}

/// Load the TOML config file
///
/// `override_path` takes precedence over the standard path. A missing file at
/// the standard path yields defaults; an explicitly requested file must exist.
///
/// # Errors
///
/// Returns [`Error::Config`] when an explicitly requested file is missing, and
/// [`Error::Io`] or [`Error::Toml`] when a file exists but cannot be read or
/// parsed.
pub fn load_config_file(override_path: Option<&Path>) -> Result<AuralConfigFile> {
    let path = match override_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let Some(p) = config_file_path() else {
                return Ok(AuralConfigFile::default());
            };
            if !p.exists() {
                return Ok(AuralConfigFile::default());
            }
            p
        }
    };

    let content = std::fs::read_to_string(&path)?;
    match toml::from_str(&content) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            Ok(config)
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse config file");
            Err(e.into())
        }
    }
}

/// Return the config file path: `~/.config/aural/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aural").join("config.toml"))
}
