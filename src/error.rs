//! Error types for Aural

use thiserror::Error;

/// Result type alias for Aural operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Aural
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or playback error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone capture error
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Text-to-speech error
    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    /// Translation service error
    #[error("translation error: {0}")]
    Translation(String),

    /// A single model endpoint failed (recoverable within the chain)
    #[error("model endpoint error: {0}")]
    ModelEndpoint(String),

    /// Every endpoint in the fallback chain failed
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Home automation or weather dispatch error
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
