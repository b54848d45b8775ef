//! Text-to-speech over an OpenAI-compatible speech server

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioPlayback;
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synthesizes speech from text
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    voice: String,
    speed: f64,
}

impl SpeechSynthesizer {
    /// Create a synthesis client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &TtsConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] when the speech server rejects the request
    /// or cannot be reached
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let url = format!("{}/v1/audio/speech", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("speech server unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "speech server error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        tracing::debug!(
            text_chars = text.len(),
            audio_bytes = audio.len(),
            "synthesis complete"
        );

        Ok(audio.to_vec())
    }
}

/// Speaks replies to the user
#[async_trait(?Send)]
pub trait Speaker {
    /// Voice the given text
    ///
    /// # Errors
    ///
    /// Returns an error when synthesis or playback fails
    async fn say(&mut self, text: &str) -> Result<()>;
}

/// Synthesizes replies and plays them on the default output device
pub struct VoiceOutput {
    synthesizer: SpeechSynthesizer,
    playback: AudioPlayback,
}

impl VoiceOutput {
    /// Pair a synthesis client with an output device
    #[must_use]
    pub const fn new(synthesizer: SpeechSynthesizer, playback: AudioPlayback) -> Self {
        Self {
            synthesizer,
            playback,
        }
    }
}

#[async_trait(?Send)]
impl Speaker for VoiceOutput {
    async fn say(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let audio = self.synthesizer.synthesize(text).await?;
        self.playback.play_mp3(&audio).await
    }
}

/// Speaker for installs without usable audio output
///
/// Replies still reach the console through the session event stream.
pub struct NoopSpeaker;

#[async_trait(?Send)]
impl Speaker for NoopSpeaker {
    async fn say(&mut self, text: &str) -> Result<()> {
        tracing::debug!(text = %text, "audio output disabled, skipping speech");
        Ok(())
    }
}
