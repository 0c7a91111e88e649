//! Events consumed by the voice controller

/// Kind of timer owned by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Silence after the last fragment
    Pause,
    /// Upper bound on one listening round
    Session,
    /// Delay between the end of playback and listening again
    Resume,
}

/// Everything that can move the voice state machine
///
/// Engine and timer events carry the run, request or generation id they were
/// issued under; the controller discards events whose id is no longer live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// User enabled voice mode
    Start,
    /// User barge-in: cancel whatever is listening or speaking
    ForceStop,
    /// Displayed chat was deleted or switched
    Exit,
    /// Tear down and stop the controller loop
    Shutdown,
    /// Full transcript so far for the current recognition run
    Fragment { run: u64, text: String },
    /// Recognition run ended (stopped or auto-ended by the engine)
    RecognitionEnded { run: u64 },
    /// Recognition run reported an engine error
    RecognitionFailed { run: u64, error: String },
    /// A timer elapsed
    TimerFired { kind: TimerKind, generation: u64 },
    /// Dispatch round trip produced a reply
    DispatchResolved { id: u64, reply: String },
    /// Dispatch round trip failed; the optimistic message was rolled back
    DispatchFailed { id: u64, error: String },
    /// Playback request finished (naturally or because it was cancelled)
    PlaybackEnded { request: u64 },
    /// Playback request reported an engine error
    PlaybackFailed { request: u64, error: String },
}
