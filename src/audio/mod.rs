//! Microphone capture and speaker output

mod capture;
mod output;

pub use capture::{AudioCapture, SAMPLE_RATE, SampleBuffer, rms_energy, samples_to_wav};
pub use output::{AudioOutput, DecodedAudio, decode_mp3};
