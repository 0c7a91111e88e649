//! Hands-free voice conversation
//!
//! Continuous recognition feeds an utterance buffer; a pause in speech
//! finalizes the utterance, which is sent to the chat backend, and the reply
//! is spoken before listening resumes. Listening and speaking never overlap.

mod buffer;
mod controller;
mod dispatch;
mod engine;
mod event;
mod playback;
mod timers;

pub use buffer::UtteranceBuffer;
pub use controller::{VoiceController, VoiceHandle, VoiceState};
pub use dispatch::{DispatchBridge, Utterance};
pub use engine::{
    EventSender, PlaybackRequest, PlaybackSink, RecognitionEngine, RecognitionSink,
    SynthesisEngine, VoiceInfo,
};
pub use event::{TimerKind, VoiceEvent};
pub use playback::{PlaybackController, PlaybackOutcome};
pub use timers::{Timer, TimerPair};
