//! Interaction session loop
//!
//! Single-threaded state machine driving one interaction at a time: capture,
//! transcribe, match a hotword, answer (by rule or by model), dispatch, speak.
//! Cycle errors are logged, optionally spoken, and never end the session;
//! only configuration problems before the loop starts are fatal.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{
    DispatchOutcome, Dispatcher, HomeAssistantClient, Intent, IntentRules, WeatherClient,
};
use crate::events::{EventBus, InteractionResult, SessionEvent};
use crate::history::ConversationHistory;
use crate::hotword::{HotwordMatch, HotwordSet};
use crate::input::{CapturedInput, InputSource};
use crate::model::ModelClient;
use crate::stt::{Transcriber, Transcript};
use crate::translate::Translator;
use crate::tts::Speaker;
use crate::{Error, Result};

/// Where the session is in its interaction cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user to start an interaction
    Idle,
    /// Recording or reading input
    Capturing,
    /// Converting audio to text
    Transcribing,
    /// Normalizing the utterance and matching hotwords
    Matching,
    /// Waiting on the model chain
    Querying,
    /// Carrying out a classified command
    Dispatching,
    /// Reading the reply aloud
    Speaking,
}

impl Phase {
    /// Phase name for logs and events
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Matching => "matching",
            Self::Querying => "querying",
            Self::Dispatching => "dispatching",
            Self::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The interaction loop and everything it talks to
pub struct SessionLoop {
    hotwords: HotwordSet,
    model: ModelClient,
    dispatcher: Dispatcher,
    history: Option<ConversationHistory>,
    history_path: Option<PathBuf>,
    default_model: String,
    unavailable_message: String,
    events: EventBus,
    phase: Phase,
    cycle: Uuid,
    input: Box<dyn InputSource>,
    transcriber: Box<dyn Transcriber>,
    speaker: Box<dyn Speaker>,
    translator: Box<dyn Translator>,
}

impl SessionLoop {
    /// Assemble a session from configuration and the given seams
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a client cannot be built from the
    /// configuration.
    pub fn from_config(
        config: &Config,
        input: Box<dyn InputSource>,
        transcriber: Box<dyn Transcriber>,
        speaker: Box<dyn Speaker>,
        translator: Box<dyn Translator>,
    ) -> Result<Self> {
        let hotwords = HotwordSet::new(config.hotwords.clone(), config.language.clone());
        let model = ModelClient::new(
            config.endpoints.clone(),
            &config.cleanup,
            config.request_timeout,
        )?;
        let dispatcher = Dispatcher::new(
            IntentRules::new(config.home.entities.clone()),
            HomeAssistantClient::new(&config.home, config.request_timeout)?,
            WeatherClient::new(&config.weather, config.request_timeout)?,
        );

        let history_path = config
            .history
            .persist
            .then(|| config.data_dir.join("history.json"));

        let history = if config.history.enabled {
            let loaded = match &history_path {
                Some(path) => ConversationHistory::load(
                    path,
                    config.history.system_prompt.clone(),
                    config.history.max_exchanges,
                )
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, path = %path.display(), "could not load history, starting fresh");
                    ConversationHistory::new(
                        config.history.system_prompt.clone(),
                        config.history.max_exchanges,
                    )
                }),
                None => ConversationHistory::new(
                    config.history.system_prompt.clone(),
                    config.history.max_exchanges,
                ),
            };
            Some(loaded)
        } else {
            None
        };

        Ok(Self {
            hotwords,
            model,
            dispatcher,
            history,
            history_path,
            default_model: config.default_model.clone(),
            unavailable_message: config.unavailable_message.clone(),
            events: EventBus::new(),
            phase: Phase::Idle,
            cycle: Uuid::nil(),
            input,
            transcriber,
            speaker,
            translator,
        })
    }

    /// Bus carrying this session's events
    #[must_use]
    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Run interaction cycles until input ends or shutdown is requested
    ///
    /// # Errors
    ///
    /// Cycle errors are handled inside the loop; this only leaves room for
    /// fatal failures surfacing at the boundary.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        tracing::info!(
            hotwords = ?self.hotwords.phrases(),
            endpoints = self.model.endpoints().len(),
            "session ready"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                outcome = self.run_cycle() => match outcome {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("input closed, session ending");
                        break;
                    }
                    Err(e) => self.recover(&e).await,
                },
            }
        }

        self.persist_history();
        Ok(())
    }

    /// Run one interaction cycle
    ///
    /// Returns `Ok(false)` when the input source is exhausted.
    async fn run_cycle(&mut self) -> Result<bool> {
        self.set_phase(Phase::Capturing);
        let Some(input) = self.input.next_input().await? else {
            return Ok(false);
        };

        self.cycle = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        self.events.publish(SessionEvent::CycleStarted {
            cycle: self.cycle,
            at: started_at,
        });

        self.set_phase(Phase::Transcribing);
        let transcript = match input {
            CapturedInput::Text(text) => Transcript {
                text,
                language: None,
            },
            CapturedInput::Audio(wav) => self.transcriber.transcribe(&wav).await?,
        };

        self.set_phase(Phase::Matching);
        let utterance = self
            .hotwords
            .normalize(
                &transcript.text,
                transcript.language.as_deref(),
                self.translator.as_ref(),
            )
            .await;
        self.events.publish(SessionEvent::Heard {
            cycle: self.cycle,
            text: utterance.clone(),
        });

        // Anything said without a hotword is not addressed to us
        let Some(matched) = self.hotwords.match_text(&utterance) else {
            tracing::debug!(utterance = %utterance, "no hotword, ignoring utterance");
            self.complete_cycle(InteractionResult {
                cycle: self.cycle,
                utterance,
                hotword: None,
                intent: None,
                action_success: None,
                spoken: None,
                started_at,
                duration_ms: elapsed_ms(started),
            });
            return Ok(true);
        };

        self.events.publish(SessionEvent::HotwordMatched {
            cycle: self.cycle,
            phrase: matched.phrase.clone(),
            command: matched.command.clone(),
        });

        // A bare hotword gets acknowledged; the next cycle hears the request
        if matched.command.is_empty() {
            let spoken = "Yes?".to_string();
            self.speak(&spoken).await?;
            self.complete_cycle(InteractionResult {
                cycle: self.cycle,
                utterance,
                hotword: Some(matched.phrase),
                intent: None,
                action_success: None,
                spoken: Some(spoken),
                started_at,
                duration_ms: elapsed_ms(started),
            });
            return Ok(true);
        }

        // Recognized commands skip the model entirely
        let (spoken, intent, action_success) =
            if let Some(intent) = self.dispatcher.classify(&matched.command) {
                let label = intent.label().to_string();
                let outcome = self.dispatch_intent(intent).await;
                (outcome.spoken, Some(label), Some(outcome.success))
            } else {
                self.query_model(&matched).await?
            };

        self.speak(&spoken).await?;

        self.complete_cycle(InteractionResult {
            cycle: self.cycle,
            utterance,
            hotword: Some(matched.phrase),
            intent,
            action_success,
            spoken: Some(spoken),
            started_at,
            duration_ms: elapsed_ms(started),
        });

        Ok(true)
    }

    /// Ask the model chain, then classify the reply for embedded commands
    async fn query_model(
        &mut self,
        matched: &HotwordMatch,
    ) -> Result<(String, Option<String>, Option<bool>)> {
        self.set_phase(Phase::Querying);

        let model = matched
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let context = self
            .history
            .as_ref()
            .map(ConversationHistory::messages)
            .unwrap_or_default();

        let reply = self.model.query(&model, &matched.command, &context).await?;
        self.events.publish(SessionEvent::ModelReplied {
            cycle: self.cycle,
            endpoint: reply.endpoint.clone(),
            chars: reply.text.chars().count(),
        });

        if let Some(history) = &mut self.history {
            history.record(matched.command.clone(), reply.text.clone());
        }

        if let Some(intent) = self.dispatcher.classify(&reply.text) {
            let label = intent.label().to_string();
            let outcome = self.dispatch_intent(intent).await;
            return Ok((outcome.spoken, Some(label), Some(outcome.success)));
        }

        Ok((reply.text, None, None))
    }

    async fn dispatch_intent(&mut self, intent: Intent) -> DispatchOutcome {
        self.set_phase(Phase::Dispatching);
        let outcome = self.dispatcher.dispatch(&intent).await;
        self.events.publish(SessionEvent::ActionDispatched {
            cycle: self.cycle,
            intent: intent.label().to_string(),
            success: outcome.success,
            spoken: outcome.spoken.clone(),
        });
        outcome
    }

    async fn speak(&mut self, text: &str) -> Result<()> {
        self.set_phase(Phase::Speaking);
        self.speaker.say(text).await?;
        self.events.publish(SessionEvent::Spoken {
            cycle: self.cycle,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Log a cycle failure, tell the user when it helps, return to idle
    async fn recover(&mut self, error: &Error) {
        tracing::error!(phase = %self.phase, error = %error, "interaction cycle failed");
        self.events.publish(SessionEvent::CycleFailed {
            cycle: self.cycle,
            phase: self.phase.as_str().to_string(),
            error: error.to_string(),
        });

        if let Some(message) = self.failure_message(error) {
            if let Err(e) = self.speaker.say(&message).await {
                tracing::warn!(error = %e, "could not speak failure message");
            }
        }

        self.set_phase(Phase::Idle);
    }

    /// Spoken feedback for failures the user can act on
    fn failure_message(&self, error: &Error) -> Option<String> {
        match error {
            Error::Transcription(_) => Some("Sorry, I didn't catch that.".to_string()),
            Error::ModelUnavailable(_) => Some(self.unavailable_message.clone()),
            _ => None,
        }
    }

    fn complete_cycle(&mut self, result: InteractionResult) {
        tracing::info!(
            utterance = %result.utterance,
            hotword = ?result.hotword,
            intent = ?result.intent,
            duration_ms = result.duration_ms,
            "interaction complete"
        );
        self.events.publish(SessionEvent::CycleCompleted { result });
        self.set_phase(Phase::Idle);
    }

    /// Move to a new phase, announcing the transition
    fn set_phase(&mut self, next: Phase) {
        if self.phase == next {
            return;
        }
        let previous = std::mem::replace(&mut self.phase, next);
        tracing::debug!(from = %previous, to = %next, "phase changed");
        self.events.publish(SessionEvent::PhaseChanged {
            cycle: self.cycle,
            from: previous.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    fn persist_history(&self) {
        let (Some(history), Some(path)) = (&self.history, &self.history_path) else {
            return;
        };
        if let Err(e) = history.save(path) {
            tracing::warn!(error = %e, path = %path.display(), "could not save history");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
