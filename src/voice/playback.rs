//! Spoken playback of replies
//!
//! Wraps a [`SynthesisEngine`] so that at most one request is in flight and
//! the completion event of each request can be classified as a natural end
//! or the result of [`PlaybackController::cancel`].

use super::engine::{EventSender, PlaybackRequest, PlaybackSink, SynthesisEngine, VoiceInfo};
use crate::config::VoiceConfig;
use crate::Result;

/// How an in-flight request finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Engine reached the end of the text
    Completed,
    /// Engine ended because the request was cancelled
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    request: u64,
    cancelled: bool,
}

/// Owns the synthesis engine and the single in-flight request
pub struct PlaybackController {
    engine: Box<dyn SynthesisEngine>,
    voice: Option<String>,
    rate: f32,
    pitch: f32,
    next_request: u64,
    in_flight: Option<InFlight>,
}

impl PlaybackController {
    /// Create a controller speaking with the voice, rate and pitch from `config`
    #[must_use]
    pub fn new(engine: Box<dyn SynthesisEngine>, config: &VoiceConfig) -> Self {
        let voice = resolve_voice(&engine.voices(), config.voice.as_deref());
        Self {
            engine,
            voice,
            rate: config.rate,
            pitch: config.pitch,
            next_request: 0,
            in_flight: None,
        }
    }

    /// Begin speaking `text`, cancelling any request still in flight
    ///
    /// Returns the request id completion events will carry.
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses the request
    pub fn speak(&mut self, text: &str, tx: &EventSender) -> Result<u64> {
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(request = previous.request, "replacing in-flight playback");
            self.engine.cancel();
        }

        self.next_request += 1;
        let request = self.next_request;

        let playback = PlaybackRequest {
            text: text.to_string(),
            voice: self.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
        };

        self.engine
            .speak(playback, PlaybackSink::new(request, tx.clone()))?;
        self.in_flight = Some(InFlight {
            request,
            cancelled: false,
        });

        tracing::debug!(request, chars = text.len(), "playback started");
        Ok(request)
    }

    /// Stop the in-flight request; its completion event will report
    /// [`PlaybackOutcome::Cancelled`]
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            if !in_flight.cancelled {
                in_flight.cancelled = true;
                self.engine.cancel();
                tracing::debug!(request = in_flight.request, "playback cancelled");
            }
        }
    }

    /// Stop the in-flight request and ignore its completion event entirely
    pub fn abandon(&mut self) {
        if self.in_flight.take().is_some() {
            self.engine.cancel();
        }
    }

    /// Consume a completion event; `None` when it belongs to a request that
    /// is no longer in flight
    pub fn finish(&mut self, request: u64) -> Option<PlaybackOutcome> {
        let in_flight = self.in_flight.filter(|f| f.request == request)?;
        self.in_flight = None;
        Some(if in_flight.cancelled {
            PlaybackOutcome::Cancelled
        } else {
            PlaybackOutcome::Completed
        })
    }

    /// Whether a request is in flight
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Voices offered by the engine
    #[must_use]
    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.engine.voices()
    }

    /// Voice requests are spoken with
    #[must_use]
    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }
}

/// Pick the configured voice when the engine offers it, else the engine default
fn resolve_voice(voices: &[VoiceInfo], wanted: Option<&str>) -> Option<String> {
    if let Some(name) = wanted {
        if let Some(voice) = voices.iter().find(|v| v.name.eq_ignore_ascii_case(name)) {
            return Some(voice.name.clone());
        }
        tracing::warn!(voice = name, "configured voice not offered by engine, using default");
    }
    voices
        .iter()
        .find(|v| v.default)
        .or_else(|| voices.first())
        .map(|v| v.name.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct Calls {
        spoken: Vec<PlaybackRequest>,
        cancels: usize,
    }

    struct RecordingEngine(Arc<Mutex<Calls>>);

    impl SynthesisEngine for RecordingEngine {
        fn speak(&mut self, request: PlaybackRequest, _sink: PlaybackSink) -> Result<()> {
            self.0.lock().unwrap().spoken.push(request);
            Ok(())
        }

        fn cancel(&mut self) {
            self.0.lock().unwrap().cancels += 1;
        }

        fn voices(&self) -> Vec<VoiceInfo> {
            vec![
                VoiceInfo {
                    name: "alloy".to_string(),
                    language: None,
                    default: true,
                },
                VoiceInfo {
                    name: "nova".to_string(),
                    language: None,
                    default: false,
                },
            ]
        }
    }

    fn controller(voice: Option<&str>) -> (PlaybackController, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let config = VoiceConfig {
            voice: voice.map(ToString::to_string),
            rate: 1.25,
            ..VoiceConfig::default()
        };
        (
            PlaybackController::new(Box::new(RecordingEngine(Arc::clone(&calls))), &config),
            calls,
        )
    }

    #[test]
    fn test_speak_applies_voice_settings() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut playback, calls) = controller(Some("NOVA"));

        playback.speak("hi there", &tx).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.spoken[0].text, "hi there");
        assert_eq!(calls.spoken[0].voice.as_deref(), Some("nova"));
        assert!((calls.spoken[0].rate - 1.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_voice_falls_back_to_default() {
        let (playback, _) = controller(Some("robot"));
        assert_eq!(playback.voice(), Some("alloy"));
    }

    #[test]
    fn test_second_speak_cancels_first() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut playback, calls) = controller(None);

        let first = playback.speak("one", &tx).unwrap();
        let second = playback.speak("two", &tx).unwrap();

        assert_eq!(calls.lock().unwrap().cancels, 1);
        assert_eq!(playback.finish(first), None);
        assert_eq!(playback.finish(second), Some(PlaybackOutcome::Completed));
        assert!(!playback.is_active());
    }

    #[test]
    fn test_cancel_marks_outcome() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut playback, calls) = controller(None);

        let request = playback.speak("long reply", &tx).unwrap();
        playback.cancel();
        playback.cancel();

        assert_eq!(calls.lock().unwrap().cancels, 1);
        assert!(playback.is_active());
        assert_eq!(playback.finish(request), Some(PlaybackOutcome::Cancelled));
    }

    #[test]
    fn test_abandon_drops_completion() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut playback, _) = controller(None);

        let request = playback.speak("reply", &tx).unwrap();
        playback.abandon();
        assert_eq!(playback.finish(request), None);
    }
}
