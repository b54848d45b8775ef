//! Interaction input sources
//!
//! A session pulls one interaction's worth of input at a time from an
//! [`InputSource`]: microphone audio bounded by Enter presses, or typed lines
//! when no microphone is available.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::audio::{AudioCapture, samples_to_wav};
use crate::{Error, Result};

/// One captured interaction's input
#[derive(Debug, Clone)]
pub enum CapturedInput {
    /// WAV-encoded microphone audio
    Audio(Vec<u8>),
    /// A typed line standing in for a transcript
    Text(String),
}

/// Source of interaction inputs
#[async_trait(?Send)]
pub trait InputSource {
    /// Wait for the next input
    ///
    /// Returns `None` once the stream is closed and the session should end.
    ///
    /// # Errors
    ///
    /// Returns an error when capture fails; the source may still yield
    /// further inputs afterwards.
    async fn next_input(&mut self) -> Result<Option<CapturedInput>>;
}

/// Microphone input bounded by Enter presses
///
/// Enter starts a recording, Enter stops it. Recordings are capped at
/// `max_duration` so a walked-away-from session cannot buffer audio forever.
pub struct PushToTalk {
    capture: AudioCapture,
    max_duration: Duration,
    lines: Lines<BufReader<Stdin>>,
}

impl PushToTalk {
    /// Create a push-to-talk source over an opened capture device
    #[must_use]
    pub fn new(capture: AudioCapture, max_duration: Duration) -> Self {
        Self {
            capture,
            max_duration,
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait(?Send)]
impl InputSource for PushToTalk {
    async fn next_input(&mut self) -> Result<Option<CapturedInput>> {
        println!("Press Enter to start recording.");
        if self.lines.next_line().await?.is_none() {
            return Ok(None);
        }

        self.capture.begin()?;
        println!("Recording... press Enter to stop.");

        match tokio::time::timeout(self.max_duration, self.lines.next_line()).await {
            Ok(Ok(Some(_))) => {}
            Ok(Ok(None)) => {
                // stdin closed mid-recording
                let _ = self.capture.finish();
                return Ok(None);
            }
            Ok(Err(e)) => {
                let _ = self.capture.finish();
                return Err(e.into());
            }
            Err(_) => {
                tracing::debug!(
                    max_seconds = self.max_duration.as_secs(),
                    "recording cap reached, stopping capture"
                );
            }
        }

        let samples = self.capture.finish();
        if samples.is_empty() {
            return Err(Error::Capture("no audio captured".to_string()));
        }

        let wav = samples_to_wav(&samples, self.capture.sample_rate())?;
        Ok(Some(CapturedInput::Audio(wav)))
    }
}

/// Typed input for machines without a working microphone
pub struct TextPrompt {
    lines: Lines<BufReader<Stdin>>,
}

impl TextPrompt {
    /// Create a text source over stdin
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for TextPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl InputSource for TextPrompt {
    async fn next_input(&mut self) -> Result<Option<CapturedInput>> {
        println!("Type a request and press Enter.");
        loop {
            match self.lines.next_line().await? {
                None => return Ok(None),
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(CapturedInput::Text(line.to_string())));
                }
            }
        }
    }
}
