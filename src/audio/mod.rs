//! Audio capture and playback
//!
//! Handles microphone recording between push-to-talk boundaries and speaker
//! output for synthesized replies. Transcription and synthesis live in the
//! `stt` and `tts` modules; this module only moves samples.

mod capture;
mod playback;

pub use capture::{AudioCapture, SAMPLE_RATE, rms, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE};
