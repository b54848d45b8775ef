//! Aural - a voice assistant front-end for self-hosted model servers
//!
//! This library provides the core functionality for the Aural session loop:
//! - Push-to-talk audio capture and MP3 playback
//! - Speech-to-text, text-to-speech, and translation clients
//! - Hotword matching with per-hotword model routing
//! - An ordered model endpoint fallback chain
//! - Deterministic command dispatch (home automation, weather)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Session Loop                       │
//! │  Capture → Transcribe → Match → Query → Dispatch →  │
//! │                      Speak                           │
//! └────┬──────────┬──────────┬──────────┬──────────┬────┘
//!      │          │          │          │          │
//! ┌────▼───┐ ┌────▼───┐ ┌────▼───┐ ┌────▼───┐ ┌────▼───┐
//! │ Whisper│ │ Libre  │ │ Model  │ │  Home  │ │ Kokoro │
//! │  (STT) │ │Translate│ │ chain  │ │Assistant│ │ (TTS) │
//! └────────┘ └────────┘ └────────┘ └────────┘ └────────┘
//! ```

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod history;
pub mod hotword;
pub mod input;
pub mod model;
pub mod session;
pub mod stt;
pub mod translate;
pub mod tts;

pub use config::Config;
pub use dispatch::{
    DispatchOutcome, Dispatcher, EntityBinding, HomeAction, HomeAssistantClient, Intent,
    IntentRules, WeatherClient, WeatherReport,
};
pub use error::{Error, Result};
pub use events::{EventBus, InteractionResult, SessionEvent, render_console};
pub use history::{ConversationHistory, Exchange};
pub use hotword::{HotwordEntry, HotwordMatch, HotwordSet};
pub use input::{CapturedInput, InputSource, PushToTalk, TextPrompt};
pub use model::{ApiFlavor, ChatMessage, ModelClient, ModelEndpoint, ModelReply};
pub use session::{Phase, SessionLoop};
pub use stt::{HttpTranscriber, Transcriber, Transcript};
pub use translate::{HttpTranslator, NoTranslation, Translator};
pub use tts::{NoopSpeaker, Speaker, SpeechSynthesizer, VoiceOutput};
