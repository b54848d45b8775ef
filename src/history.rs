//! Conversation history
//!
//! Rolling window of user/assistant exchanges, rendered as chat messages for
//! chat-flavor model endpoints and optionally persisted across restarts.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::ChatMessage;

/// One user turn and the assistant's reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// What the user said
    pub user: String,
    /// What the assistant answered
    pub assistant: String,
    /// When the exchange completed
    pub at: DateTime<Utc>,
}

/// Rolling window of exchanges with a fixed system prompt
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system_prompt: String,
    exchanges: Vec<Exchange>,
    max_exchanges: usize,
}

impl ConversationHistory {
    /// Create an empty history
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, max_exchanges: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            exchanges: Vec::new(),
            max_exchanges,
        }
    }

    /// Load a previously saved window
    ///
    /// A missing file is an empty history, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(
        path: &Path,
        system_prompt: impl Into<String>,
        max_exchanges: usize,
    ) -> Result<Self> {
        let mut history = Self::new(system_prompt, max_exchanges);

        if !path.exists() {
            return Ok(history);
        }

        let content = std::fs::read_to_string(path)?;
        history.exchanges = serde_json::from_str(&content)?;
        history.truncate_window();

        tracing::debug!(path = %path.display(), exchanges = history.exchanges.len(), "history loaded");
        Ok(history)
    }

    /// Record a completed exchange, dropping the oldest past the window
    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.exchanges.push(Exchange {
            user: user.into(),
            assistant: assistant.into(),
            at: Utc::now(),
        });
        self.truncate_window();
    }

    /// Render the window as chat messages, system prompt first
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.exchanges.len() * 2 + 1);
        messages.push(ChatMessage::system(self.system_prompt.clone()));

        for exchange in &self.exchanges {
            messages.push(ChatMessage::user(exchange.user.clone()));
            messages.push(ChatMessage::assistant(exchange.assistant.clone()));
        }

        messages
    }

    /// Forget all exchanges
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    /// Number of retained exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Write the window to disk as JSON
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.exchanges)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), exchanges = self.exchanges.len(), "history saved");
        Ok(())
    }

    fn truncate_window(&mut self) {
        if self.exchanges.len() > self.max_exchanges {
            let excess = self.exchanges.len() - self.max_exchanges;
            self.exchanges.drain(..excess);
        }
    }
}
