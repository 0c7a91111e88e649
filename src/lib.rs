//! Talkback - chat client with a hands-free voice conversation mode
//!
//! This library provides:
//! - Chat model, persistence and the HTTP chat backend
//! - The voice conversation state machine (listen, finalize, speak, repeat)
//! - Microphone recognition and spoken playback over cloud STT/TTS
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  CLI / ChatApp                      │
//! │   chats  │  text chat  │  voice mode               │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               VoiceController                       │
//! │  buffer  │  timers  │  dispatch  │  playback       │
//! └──────┬─────────────────────────────────────┬────────┘
//!        │                                     │
//! ┌──────▼──────────────┐        ┌─────────────▼───────┐
//! │ RecognitionEngine   │        │  SynthesisEngine    │
//! │ mic + Whisper/DG    │        │ OpenAI/ElevenLabs   │
//! └─────────────────────┘        └─────────────────────┘
//! ```

pub mod app;
pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod speech;
pub mod voice;

pub use app::ChatApp;
pub use config::Config;
pub use error::{Error, Result};
pub use voice::{VoiceController, VoiceHandle, VoiceState};
