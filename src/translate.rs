//! Utterance translation for hotword matching
//!
//! Matching happens in one canonical language. When the transcription server
//! detects a different language, the utterance is run through a translator
//! first. Translation is best effort: any failure here degrades to matching
//! the untranslated text, never to a failed cycle.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::TranslationConfig;
use crate::{Error, Result};

/// Translates text into a target language
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into the language given by an ISO 639-1 code
    ///
    /// # Errors
    ///
    /// Returns [`Error::Translation`] when the service fails or is not
    /// configured
    async fn translate(&self, text: &str, target: &str) -> Result<String>;
}

/// Response from a LibreTranslate-compatible server
#[derive(serde::Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint
pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranslator {
    /// Create a translation client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &TranslationConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        #[derive(serde::Serialize)]
        struct TranslateRequest<'a> {
            q: &'a str,
            source: &'a str,
            target: &'a str,
            format: &'a str,
        }

        let request = TranslateRequest {
            q: text,
            source: "auto",
            target,
            format: "text",
        };

        let url = format!("{}/translate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Translation(format!("translation server unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Translation(format!(
                "translation server error {status}: {body}"
            )));
        }

        let result: TranslateResponse = response
            .json()
            .await
            .map_err(|e| Error::Translation(format!("bad translation response: {e}")))?;

        tracing::debug!(target = %target, "translation complete");
        Ok(result.translated_text)
    }
}

/// Translator for deployments with no translation service configured
///
/// Always fails, which the caller treats as "match the text as heard".
pub struct NoTranslation;

#[async_trait]
impl Translator for NoTranslation {
    async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
        Err(Error::Translation(
            "translation service not configured".to_string(),
        ))
    }
}
