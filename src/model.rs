//! Language model client with an ordered fallback chain
//!
//! Endpoints are tried strictly in configuration order, one attempt each, for
//! every query. The first endpoint to produce a reply wins; when the whole
//! chain fails the caller gets a single [`Error::ModelUnavailable`] carrying
//! the last failure.

use std::time::Duration;

use futures::StreamExt;

use crate::config::CleanupRule;
use crate::{Error, Result};

/// Wire protocol spoken by a model endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    /// Ollama's `/api/generate` (streamed NDJSON)
    Generate,

    /// OpenAI-compatible `/v1/chat/completions`
    Chat,
}

/// A model server in the fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEndpoint {
    /// Display name used in logs
    pub name: String,

    /// Base URL (e.g. `http://localhost:11434`)
    pub url: String,

    /// Wire protocol this endpoint speaks
    pub api: ApiFlavor,
}

/// One message in a chat-flavor request
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,

    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Build a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Build a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Build an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A reply from the chain
#[derive(Debug, Clone)]
pub struct ModelReply {
    /// Reply text, after any cleanup rule for the model
    pub text: String,

    /// Name of the endpoint that answered
    pub endpoint: String,
}

/// One line of an Ollama generate stream
#[derive(serde::Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,

    #[serde(default)]
    done: bool,

    #[serde(default)]
    error: Option<String>,
}

/// Queries the endpoint chain
pub struct ModelClient {
    client: reqwest::Client,
    chain: Vec<ModelEndpoint>,
    cleanup: Vec<(String, regex::Regex)>,
}

impl ModelClient {
    /// Create a client over the given chain
    ///
    /// Cleanup patterns are compiled once here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a cleanup pattern does not compile, or
    /// an error when the HTTP client cannot be constructed.
    pub fn new(chain: Vec<ModelEndpoint>, rules: &[CleanupRule], timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        let mut cleanup = Vec::with_capacity(rules.len());
        for rule in rules {
            let pattern = regex::Regex::new(&rule.pattern).map_err(|e| {
                Error::Config(format!(
                    "invalid cleanup pattern for model '{}': {e}",
                    rule.model
                ))
            })?;
            cleanup.push((rule.model.clone(), pattern));
        }

        Ok(Self {
            client,
            chain,
            cleanup,
        })
    }

    /// Endpoints in fallback order
    #[must_use]
    pub fn endpoints(&self) -> &[ModelEndpoint] {
        &self.chain
    }

    /// Send a prompt through the chain and return the first reply
    ///
    /// `history` is included only for chat-flavor endpoints; generate-flavor
    /// endpoints receive the prompt alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelUnavailable`] once every endpoint has failed its
    /// single attempt.
    pub async fn query(
        &self,
        model: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<ModelReply> {
        let mut last_error: Option<Error> = None;

        for (attempt, endpoint) in self.chain.iter().enumerate() {
            if attempt > 0 {
                tracing::info!(endpoint = %endpoint.name, "trying fallback endpoint");
            }

            match self.query_endpoint(endpoint, model, prompt, history).await {
                Ok(text) => {
                    let text = self.clean_reply(model, &text);
                    tracing::info!(
                        endpoint = %endpoint.name,
                        model = %model,
                        chars = text.len(),
                        "model reply received"
                    );
                    return Ok(ModelReply {
                        text,
                        endpoint: endpoint.name.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint.name, error = %e, "model endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::ModelUnavailable(last_error.map_or_else(
            || "no endpoints configured".to_string(),
            |e| format!("all {} endpoints failed, last: {e}", self.chain.len()),
        )))
    }

    async fn query_endpoint(
        &self,
        endpoint: &ModelEndpoint,
        model: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        match endpoint.api {
            ApiFlavor::Generate => self.query_generate(endpoint, model, prompt).await,
            ApiFlavor::Chat => self.query_chat(endpoint, model, prompt, history).await,
        }
    }

    /// Query an Ollama-style endpoint, draining the stream into one string
    async fn query_generate(
        &self,
        endpoint: &ModelEndpoint,
        model: &str,
        prompt: &str,
    ) -> Result<String> {
        #[derive(serde::Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }

        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
        };

        let url = format!("{}/api/generate", endpoint.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ModelEndpoint(format!("{}: {e}", endpoint.name)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ModelEndpoint(format!(
                "{} returned {status}: {body}",
                endpoint.name
            )));
        }

        let mut reply = String::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::ModelEndpoint(format!("{}: stream error: {e}", endpoint.name)))?;
            pending.extend_from_slice(&chunk);

            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if append_stream_line(&line, &mut reply)? {
                    break 'outer;
                }
            }
        }

        // A server that omits the trailing newline still gets its last line in
        if !pending.is_empty() {
            append_stream_line(&pending, &mut reply)?;
        }

        Ok(reply)
    }

    /// Query an OpenAI-compatible chat endpoint
    async fn query_chat(
        &self,
        endpoint: &ModelEndpoint,
        model: &str,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
        }

        #[derive(serde::Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(serde::Deserialize)]
        struct ChatChoice {
            message: ChatMessage,
        }

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(prompt));

        let request = ChatRequest {
            model,
            messages: &messages,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", endpoint.url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ModelEndpoint(format!("{}: {e}", endpoint.name)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ModelEndpoint(format!(
                "{} returned {status}: {body}",
                endpoint.name
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelEndpoint(format!("{}: bad chat response: {e}", endpoint.name)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::ModelEndpoint(format!("{} returned no choices", endpoint.name)))
    }

    /// Apply the cleanup rule for this model, if one exists
    fn clean_reply(&self, model: &str, text: &str) -> String {
        for (rule_model, pattern) in &self.cleanup {
            if rule_model == model {
                return pattern.replace_all(text, "").trim().to_string();
            }
        }
        text.trim().to_string()
    }
}

/// Append one NDJSON stream line's fragment to the reply
///
/// Returns `true` on the final line. Blank lines are skipped; a malformed line
/// or an in-band error object fails the whole endpoint attempt.
fn append_stream_line(line: &[u8], reply: &mut String) -> Result<bool> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(false);
    }

    let chunk: GenerateChunk = serde_json::from_slice(line)
        .map_err(|e| Error::ModelEndpoint(format!("bad stream line: {e}")))?;

    if let Some(message) = chunk.error {
        return Err(Error::ModelEndpoint(message));
    }

    reply.push_str(&chunk.response);
    Ok(chunk.done)
}
