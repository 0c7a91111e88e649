//! Cloud speech engines
//!
//! Concrete [`RecognitionEngine`](crate::voice::RecognitionEngine) and
//! [`SynthesisEngine`](crate::voice::SynthesisEngine) implementations backed
//! by the local microphone/speakers and hosted STT/TTS APIs.

mod recognizer;
mod stt;
mod synthesizer;
mod tts;

pub use recognizer::MicRecognizer;
pub use stt::SpeechToText;
pub use synthesizer::CloudSynthesizer;
pub use tts::TextToSpeech;
