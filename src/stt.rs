//! Speech-to-text over an OpenAI-compatible transcription server

use std::time::Duration;

use async_trait::async_trait;

use crate::config::SttConfig;
use crate::{Error, Result};

/// Response from a `verbose_json` transcription request
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// A transcribed utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Recognized text
    pub text: String,

    /// Detected language when the server reports one ("en", "en-US", or a
    /// full name like "english", depending on the server)
    pub language: Option<String>,
}

/// Converts captured audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcription`] when the service rejects the audio or
    /// cannot be reached.
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript>;
}

/// Client for `/v1/audio/transcriptions` on a Whisper-compatible server
pub struct HttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpTranscriber {
    /// Create a transcription client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &SttConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("transcription server unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription server error");
            return Err(Error::Transcription(format!(
                "transcription server error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("bad transcription response: {e}")))?;

        tracing::info!(
            transcript = %result.text,
            language = result.language.as_deref().unwrap_or("unknown"),
            "transcription complete"
        );

        Ok(Transcript {
            text: result.text,
            language: result.language,
        })
    }
}
