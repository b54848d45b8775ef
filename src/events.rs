//! Session event stream
//!
//! Typed events describing each interaction cycle, broadcast to any number of
//! subscribers. Publishing is best-effort so the session never blocks on a
//! slow or absent observer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Channel capacity for session events
const CHANNEL_CAPACITY: usize = 64;

/// Summary of one completed interaction cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResult {
    /// Cycle identifier
    pub cycle: Uuid,
    /// What the assistant heard, normalized
    pub utterance: String,
    /// Matched hotword phrase, if any
    pub hotword: Option<String>,
    /// Label of the classified intent, if any
    pub intent: Option<String>,
    /// Whether a dispatched action succeeded
    pub action_success: Option<bool>,
    /// What the assistant said back, if anything
    pub spoken: Option<String>,
    /// When the cycle started
    pub started_at: DateTime<Utc>,
    /// Cycle duration in milliseconds
    pub duration_ms: u64,
}

/// An event emitted as a session cycle progresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new interaction cycle began
    CycleStarted {
        /// Cycle identifier
        cycle: Uuid,
        /// Start time
        at: DateTime<Utc>,
    },
    /// The session moved to a new phase
    PhaseChanged {
        /// Cycle identifier
        cycle: Uuid,
        /// Phase being left
        from: String,
        /// Phase being entered
        to: String,
    },
    /// Transcription finished
    Heard {
        /// Cycle identifier
        cycle: Uuid,
        /// Normalized utterance text
        text: String,
    },
    /// A hotword matched the utterance
    HotwordMatched {
        /// Cycle identifier
        cycle: Uuid,
        /// Canonical hotword phrase
        phrase: String,
        /// Residual command after the trigger
        command: String,
    },
    /// A model endpoint answered
    ModelReplied {
        /// Cycle identifier
        cycle: Uuid,
        /// Name of the endpoint that answered
        endpoint: String,
        /// Reply length in characters
        chars: usize,
    },
    /// A command was dispatched
    ActionDispatched {
        /// Cycle identifier
        cycle: Uuid,
        /// Intent label
        intent: String,
        /// Whether the action succeeded
        success: bool,
        /// Spoken outcome
        spoken: String,
    },
    /// The reply was spoken aloud
    Spoken {
        /// Cycle identifier
        cycle: Uuid,
        /// Spoken text
        text: String,
    },
    /// The cycle finished
    CycleCompleted {
        /// Cycle summary
        result: InteractionResult,
    },
    /// The cycle failed and the session returned to idle
    CycleFailed {
        /// Cycle identifier
        cycle: Uuid,
        /// Phase the failure occurred in
        phase: String,
        /// Error description
        error: String,
    },
}

/// Broadcast bus for session events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers yet
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: SessionEvent) {
        // Ignore errors if no subscribers
        let _ = self.tx.send(event);
    }
}

/// Render user-facing events to stdout
///
/// Intended to run as its own task for the lifetime of the session. Internal
/// phase bookkeeping stays out of the console; transcripts, replies, and
/// failures are printed.
pub async fn render_console(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "console renderer lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Heard { text, .. } => println!("you: {text}"),
        SessionEvent::Spoken { text, .. } => println!("aural: {text}"),
        SessionEvent::CycleFailed { error, .. } => println!("(error: {error})"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_snake_case_tags() {
        let event = SessionEvent::Heard {
            cycle: Uuid::nil(),
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"heard""#));
    }

    #[test]
    fn test_cycle_completed_round_trip() {
        let event = SessionEvent::CycleCompleted {
            result: InteractionResult {
                cycle: Uuid::new_v4(),
                utterance: "hey llama what time is it".to_string(),
                hotword: Some("hey llama".to_string()),
                intent: None,
                action_success: None,
                spoken: Some("It's noon.".to_string()),
                started_at: Utc::now(),
                duration_ms: 1250,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: SessionEvent = serde_json::from_str(&json).unwrap();
        let SessionEvent::CycleCompleted { result } = parsed else {
            panic!("expected a cycle_completed event");
        };
        assert_eq!(result.hotword.as_deref(), Some("hey llama"));
        assert_eq!(result.duration_ms, 1250);
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SessionEvent::CycleStarted {
            cycle: Uuid::nil(),
            at: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::CycleStarted { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(SessionEvent::Heard {
            cycle: Uuid::nil(),
            text: "nobody listening".to_string(),
        });
    }
}
