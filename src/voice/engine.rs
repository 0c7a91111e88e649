//! Recognition and synthesis engine contracts
//!
//! Engines are started with a sink tagged by the controller. Everything an
//! engine reports (fragments, end, errors) goes back through that sink, so
//! late events from an earlier run can be told apart from the live one.

use tokio::sync::mpsc;

use super::event::VoiceEvent;
use crate::Result;

/// Channel into the controller loop
pub type EventSender = mpsc::UnboundedSender<VoiceEvent>;

/// Reports recognition events for one run
#[derive(Debug, Clone)]
pub struct RecognitionSink {
    run: u64,
    tx: EventSender,
}

impl RecognitionSink {
    pub(crate) const fn new(run: u64, tx: EventSender) -> Self {
        Self { run, tx }
    }

    /// Run this sink reports for
    #[must_use]
    pub const fn run(&self) -> u64 {
        self.run
    }

    /// Report the full transcript recognized so far in this run
    pub fn fragment(&self, text: impl Into<String>) {
        self.send(VoiceEvent::Fragment {
            run: self.run,
            text: text.into(),
        });
    }

    /// Report that the run ended
    pub fn ended(&self) {
        self.send(VoiceEvent::RecognitionEnded { run: self.run });
    }

    /// Report an engine error
    pub fn failed(&self, error: impl Into<String>) {
        self.send(VoiceEvent::RecognitionFailed {
            run: self.run,
            error: error.into(),
        });
    }

    fn send(&self, event: VoiceEvent) {
        // Controller gone means voice mode is shut down; nothing to report to
        let _ = self.tx.send(event);
    }
}

/// Streaming speech recognizer
pub trait RecognitionEngine: Send {
    /// Whether recognition is available in this environment
    fn is_supported(&self) -> bool;

    /// Begin a recognition run
    ///
    /// The engine emits cumulative transcripts through `sink` and must call
    /// [`RecognitionSink::ended`] once the run is over, including after
    /// [`RecognitionEngine::stop`].
    ///
    /// # Errors
    ///
    /// Returns error if the run cannot be started
    fn start(&mut self, sink: RecognitionSink) -> Result<()>;

    /// Stop the current run; completion is reported asynchronously
    fn stop(&mut self);
}

/// Text plus voice settings for one synthesis
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
}

/// A voice offered by a synthesis engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    pub language: Option<String>,
    pub default: bool,
}

/// Reports completion of one playback request
#[derive(Debug, Clone)]
pub struct PlaybackSink {
    request: u64,
    tx: EventSender,
}

impl PlaybackSink {
    pub(crate) const fn new(request: u64, tx: EventSender) -> Self {
        Self { request, tx }
    }

    /// Request this sink reports for
    #[must_use]
    pub const fn request(&self) -> u64 {
        self.request
    }

    /// Report that playback ended, naturally or because it was cancelled
    pub fn ended(&self) {
        let _ = self.tx.send(VoiceEvent::PlaybackEnded {
            request: self.request,
        });
    }

    /// Report an engine error
    pub fn failed(&self, error: impl Into<String>) {
        let _ = self.tx.send(VoiceEvent::PlaybackFailed {
            request: self.request,
            error: error.into(),
        });
    }
}

/// Speech synthesizer
pub trait SynthesisEngine: Send {
    /// Begin speaking; returns immediately
    ///
    /// The engine must report through `sink` exactly once per request, also
    /// when the request is cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis cannot be started
    fn speak(&mut self, request: PlaybackRequest, sink: PlaybackSink) -> Result<()>;

    /// Stop any in-flight synthesis
    fn cancel(&mut self);

    /// Voices this engine can speak with
    fn voices(&self) -> Vec<VoiceInfo>;
}
