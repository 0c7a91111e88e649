//! Voice conversation state machine
//!
//! One task owns the session, its buffer and timers, the recognizer and the
//! playback controller. Everything else talks to it through a
//! [`VoiceHandle`]; engines and timers report back through the same event
//! channel, so transitions happen strictly one event at a time. A stopped
//! recognition run stays live until its end event arrives; replies and new
//! runs wait for it.
//!
//! ```text
//!   Idle ──start──▶ Listening ──pause──▶ Finalizing ──reply──▶ Speaking
//!                     ▲  │                   │                    │
//!                     │  └─session/stop─▶ Idle                    │
//!                     └──────── dispatch failed ◀─┘               │
//!                     └──────────────── playback ended ◀──────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use super::buffer::UtteranceBuffer;
use super::dispatch::{DispatchBridge, Utterance};
use super::engine::{EventSender, RecognitionEngine, RecognitionSink, SynthesisEngine};
use super::event::{TimerKind, VoiceEvent};
use super::playback::{PlaybackController, PlaybackOutcome};
use super::timers::{Timer, TimerPair};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Voice mode state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Voice mode off
    Idle,
    /// Recognizer running, accumulating an utterance
    Listening,
    /// Utterance sent, waiting for the reply
    Finalizing,
    /// Reply being spoken
    Speaking,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Finalizing => "finalizing",
            Self::Speaking => "speaking",
        })
    }
}

/// One continuous voice-mode activation
struct Session {
    started_at: DateTime<Utc>,
    force_stop_requested: bool,
    buffer: UtteranceBuffer,
}

impl Session {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            force_stop_requested: false,
            buffer: UtteranceBuffer::new(),
        }
    }
}

/// Work held back until a stopping recognition run confirms its end
#[derive(Debug)]
enum AfterStop {
    Speak(String),
    Listen,
}

/// Cloneable handle to a running [`VoiceController`]
#[derive(Clone)]
pub struct VoiceHandle {
    tx: EventSender,
    state: watch::Receiver<VoiceState>,
    supported: bool,
}

impl VoiceHandle {
    /// Enter voice mode
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] when no recognizer is available, or an
    /// error if the controller has shut down
    pub fn start(&self) -> Result<()> {
        if !self.supported {
            return Err(Error::Unsupported(
                "speech recognition is not available".to_string(),
            ));
        }
        self.send(VoiceEvent::Start)
    }

    /// Barge in: stop listening or speaking
    ///
    /// Settles asynchronously; the state is not `Idle` until the engine
    /// confirms the stop.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has shut down
    pub fn force_stop(&self) -> Result<()> {
        self.send(VoiceEvent::ForceStop)
    }

    /// Leave voice mode immediately (displayed chat deleted or switched)
    ///
    /// # Errors
    ///
    /// Returns error if the controller has shut down
    pub fn exit(&self) -> Result<()> {
        self.send(VoiceEvent::Exit)
    }

    /// Stop the controller loop
    ///
    /// # Errors
    ///
    /// Returns error if the controller has already shut down
    pub fn shutdown(&self) -> Result<()> {
        self.send(VoiceEvent::Shutdown)
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> VoiceState {
        *self.state.borrow()
    }

    /// Whether voice mode can be started at all
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    /// Receiver notified on every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<VoiceState> {
        self.state.clone()
    }

    /// Wait until the controller reaches `state`
    ///
    /// # Errors
    ///
    /// Returns error if the controller shuts down first
    pub async fn wait_for(&self, state: VoiceState) -> Result<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| Error::Voice("voice controller stopped".to_string()))
    }

    fn send(&self, event: VoiceEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Voice("voice controller stopped".to_string()))
    }
}

/// Drives recognition, dispatch and playback for hands-free conversation
pub struct VoiceController {
    config: VoiceConfig,
    state: VoiceState,
    session: Option<Session>,
    timers: TimerPair,
    resume: Timer,
    recognizer: Box<dyn RecognitionEngine>,
    recognition_run: u64,
    recognizing: bool,
    stopping: Option<u64>,
    deferred: Option<AfterStop>,
    restarts: u32,
    playback: PlaybackController,
    bridge: DispatchBridge,
    next_dispatch: u64,
    dispatch_in_flight: Option<u64>,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<VoiceEvent>,
    state_tx: watch::Sender<VoiceState>,
}

impl VoiceController {
    /// Create a controller and the handle used to drive it
    ///
    /// Run the controller with [`VoiceController::run`] on a tokio task.
    #[must_use]
    pub fn new(
        config: VoiceConfig,
        recognizer: Box<dyn RecognitionEngine>,
        synthesizer: Box<dyn SynthesisEngine>,
        bridge: DispatchBridge,
    ) -> (Self, VoiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(VoiceState::Idle);

        let handle = VoiceHandle {
            tx: tx.clone(),
            state: state_rx,
            supported: recognizer.is_supported(),
        };

        let controller = Self {
            playback: PlaybackController::new(synthesizer, &config),
            timers: TimerPair::new(tx.clone()),
            resume: Timer::new(TimerKind::Resume),
            config,
            state: VoiceState::Idle,
            session: None,
            recognizer,
            recognition_run: 0,
            recognizing: false,
            stopping: None,
            deferred: None,
            restarts: 0,
            bridge,
            next_dispatch: 0,
            dispatch_in_flight: None,
            tx,
            rx,
            state_tx,
        };

        (controller, handle)
    }

    /// Process events until [`VoiceHandle::shutdown`]
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            if event == VoiceEvent::Shutdown {
                self.teardown("shutdown");
                self.publish();
                break;
            }
            self.handle(event);
        }
        tracing::debug!("voice controller stopped");
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> VoiceState {
        self.state
    }

    /// When the current voice session began
    #[must_use]
    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.started_at)
    }

    /// Utterance accumulated so far in the current listening round
    #[must_use]
    pub fn pending_utterance(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.buffer.peek())
    }

    /// Apply one event
    pub fn handle(&mut self, event: VoiceEvent) {
        tracing::trace!(state = %self.state, ?event, "voice event");

        match event {
            VoiceEvent::Start => self.on_start(),
            VoiceEvent::ForceStop => self.on_force_stop(),
            VoiceEvent::Exit => self.on_exit(),
            VoiceEvent::Shutdown => self.teardown("shutdown"),
            VoiceEvent::Fragment { run, text } => self.on_fragment(run, &text),
            VoiceEvent::RecognitionEnded { run } => self.on_recognition_ended(run),
            VoiceEvent::RecognitionFailed { run, error } => {
                if run == self.recognition_run {
                    tracing::warn!(run, error = %error, "recognition engine error");
                    self.on_recognition_ended(run);
                }
            }
            VoiceEvent::TimerFired { kind, generation } => self.on_timer(kind, generation),
            VoiceEvent::DispatchResolved { id, reply } => self.on_dispatch_resolved(id, &reply),
            VoiceEvent::DispatchFailed { id, error } => self.on_dispatch_failed(id, &error),
            VoiceEvent::PlaybackEnded { request } => self.on_playback_done(request, None),
            VoiceEvent::PlaybackFailed { request, error } => {
                self.on_playback_done(request, Some(&error));
            }
        }

        self.publish();
    }

    fn on_start(&mut self) {
        if self.state != VoiceState::Idle {
            tracing::debug!(state = %self.state, "voice mode already active");
            return;
        }
        if !self.recognizer.is_supported() {
            tracing::warn!("speech recognition not supported, voice mode unavailable");
            return;
        }

        self.session = Some(Session::new());
        self.restarts = 0;
        tracing::info!("voice mode started");
        self.start_listening();
    }

    fn on_force_stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("force stop while idle, nothing to do");
            return;
        };
        if session.force_stop_requested {
            return;
        }
        session.force_stop_requested = true;
        tracing::info!(state = %self.state, "force stop requested");

        match self.state {
            VoiceState::Listening => {
                session.buffer.reset_stream();
                self.timers.cancel_all();
                if self.recognizing {
                    // Settles to Idle once the recognizer confirms the stop
                    self.stop_recognition();
                } else {
                    self.teardown("force stop");
                }
            }
            // Settles when the dispatch does
            VoiceState::Finalizing => {}
            VoiceState::Speaking => {
                if self.playback.is_active() {
                    // Settles to Idle on the cancelled playback's end event
                    self.playback.cancel();
                } else {
                    self.teardown("force stop");
                }
            }
            VoiceState::Idle => self.teardown("force stop"),
        }
    }

    fn on_exit(&mut self) {
        if self.state != VoiceState::Idle {
            self.teardown("exit");
        }
    }

    fn on_fragment(&mut self, run: u64, text: &str) {
        if run != self.recognition_run {
            tracing::trace!(run, "stale fragment dropped");
            return;
        }
        if self.state != VoiceState::Listening {
            tracing::error!(state = %self.state, "fragment received outside listening, ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.force_stop_requested || text.is_empty() {
            return;
        }

        session.buffer.append_fragment(text);
        tracing::trace!(pending = session.buffer.peek(), "fragment");

        self.restarts = 0;
        self.timers.schedule_pause(self.config.pause);
        self.timers.schedule_session(self.config.session_limit);
    }

    fn on_timer(&mut self, kind: TimerKind, generation: u64) {
        if kind == TimerKind::Resume {
            if self.resume.accept(generation) {
                self.on_resume_elapsed();
            }
            return;
        }
        if !self.timers.accept(kind, generation) || self.state != VoiceState::Listening {
            return;
        }

        // A session deadline that has already passed wins over a pause
        if kind == TimerKind::Session || self.timers.session_due() {
            tracing::info!("session limit reached, pending utterance discarded");
            self.teardown("session limit");
        } else {
            self.finalize();
        }
    }

    /// Take the pending utterance and dispatch it; blank utterances are
    /// dropped and listening continues
    fn finalize(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let text = session.buffer.take_and_clear();
        let Some(utterance) = Utterance::new(&text) else {
            tracing::debug!("blank utterance discarded");
            if !self.recognizing {
                self.restart_recognition();
            }
            return;
        };

        self.timers.cancel_all();
        self.stop_recognition();
        self.transition(VoiceState::Finalizing);
        self.dispatch(utterance);
    }

    fn dispatch(&mut self, utterance: Utterance) {
        self.next_dispatch += 1;
        let id = self.next_dispatch;
        self.dispatch_in_flight = Some(id);

        let bridge = self.bridge.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match bridge.send(utterance).await {
                Ok(reply) => VoiceEvent::DispatchResolved { id, reply },
                Err(e) => VoiceEvent::DispatchFailed {
                    id,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    fn on_dispatch_resolved(&mut self, id: u64, reply: &str) {
        if !self.settle_dispatch(id) {
            return;
        }
        if self.force_stop_requested() {
            self.teardown("force stop");
            return;
        }
        if reply.trim().is_empty() {
            tracing::debug!("empty reply, nothing to speak");
            self.start_listening();
            return;
        }
        self.speak(reply);
    }

    fn on_dispatch_failed(&mut self, id: u64, error: &str) {
        if !self.settle_dispatch(id) {
            return;
        }
        tracing::warn!(error, "dispatch failed, listening again");
        if self.force_stop_requested() {
            self.teardown("force stop");
        } else {
            self.start_listening();
        }
    }

    /// Clear the in-flight dispatch; false for stale results or when the
    /// machine already left Finalizing
    fn settle_dispatch(&mut self, id: u64) -> bool {
        if self.dispatch_in_flight != Some(id) {
            tracing::debug!(id, "stale dispatch result dropped");
            return false;
        }
        self.dispatch_in_flight = None;
        self.state == VoiceState::Finalizing
    }

    fn speak(&mut self, text: &str) {
        if self.recognizing {
            tracing::error!("recognition still active when starting playback");
            self.stop_recognition();
        }
        if let Some(run) = self.stopping {
            tracing::debug!(run, "reply held until the recognizer has stopped");
            self.deferred = Some(AfterStop::Speak(text.to_string()));
            return;
        }

        match self.playback.speak(text, &self.tx) {
            Ok(_) => self.transition(VoiceState::Speaking),
            Err(e) => {
                tracing::warn!(error = %e, "failed to start playback, listening again");
                self.start_listening();
            }
        }
    }

    fn on_playback_done(&mut self, request: u64, error: Option<&str>) {
        let Some(outcome) = self.playback.finish(request) else {
            tracing::trace!(request, "stale playback event dropped");
            return;
        };
        if let Some(error) = error {
            tracing::warn!(request, error, "synthesis error, treating as end of playback");
        }
        tracing::debug!(request, ?outcome, "playback finished");

        if self.state != VoiceState::Speaking {
            return;
        }
        if outcome == PlaybackOutcome::Cancelled || self.force_stop_requested() {
            self.teardown("force stop");
            return;
        }

        if self.config.resume_delay.is_zero() {
            self.start_listening();
        } else {
            self.resume.arm(self.config.resume_delay, &self.tx);
        }
    }

    fn on_resume_elapsed(&mut self) {
        if self.state == VoiceState::Speaking && !self.force_stop_requested() {
            self.start_listening();
        }
    }

    fn on_recognition_ended(&mut self, run: u64) {
        if self.stopping == Some(run) {
            self.stopping = None;
            self.on_recognition_stopped();
            return;
        }
        if run != self.recognition_run || !self.recognizing {
            return;
        }
        self.recognizing = false;

        if self.state != VoiceState::Listening {
            return;
        }
        if self.force_stop_requested() {
            self.teardown("force stop");
            return;
        }

        // Engine stopped on its own: keep what was said, else listen again
        let has_pending = self
            .session
            .as_ref()
            .is_some_and(|s| !s.buffer.peek().trim().is_empty());
        if has_pending {
            tracing::debug!("recognizer ended with pending utterance, finalizing");
            self.finalize();
        } else {
            self.restart_recognition();
        }
    }

    /// A run we asked to stop has confirmed; release whatever waited on it
    fn on_recognition_stopped(&mut self) {
        if self.state == VoiceState::Listening && self.force_stop_requested() {
            self.teardown("force stop");
            return;
        }
        let Some(next) = self.deferred.take() else {
            return;
        };
        if self.session.is_none() {
            return;
        }
        if self.force_stop_requested() {
            self.teardown("force stop");
            return;
        }
        match next {
            AfterStop::Speak(reply) => self.speak(&reply),
            AfterStop::Listen => self.start_listening(),
        }
    }

    fn restart_recognition(&mut self) {
        if self.restarts >= self.config.max_restarts {
            tracing::warn!(
                restarts = self.restarts,
                "recognizer keeps ending, leaving voice mode"
            );
            self.teardown("recognizer unavailable");
            return;
        }
        self.restarts += 1;
        tracing::debug!(attempt = self.restarts, "restarting recognition");
        self.start_listening();
    }

    /// Start a recognition run and enter Listening; falls back to Idle if
    /// the recognizer refuses to start
    ///
    /// Waits for a previous run that is still stopping, leaving the state as is.
    fn start_listening(&mut self) {
        if let Some(run) = self.stopping {
            tracing::debug!(run, "listening held until the previous run has stopped");
            self.deferred = Some(AfterStop::Listen);
            return;
        }
        if self.playback.is_active() {
            tracing::error!("playback still active when starting recognition");
            self.playback.abandon();
        }
        self.timers.cancel_all();
        self.resume.cancel();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.buffer.reset_stream();

        self.recognition_run += 1;
        let sink = RecognitionSink::new(self.recognition_run, self.tx.clone());
        match self.recognizer.start(sink) {
            Ok(()) => {
                self.recognizing = true;
                self.transition(VoiceState::Listening);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start recognition");
                self.teardown("recognition start failed");
            }
        }
    }

    /// Ask the recognizer to stop; the run counts as live until its end event
    fn stop_recognition(&mut self) {
        if self.recognizing {
            self.recognizer.stop();
            self.recognizing = false;
            self.stopping = Some(self.recognition_run);
        }
    }

    /// Cancel everything and return to Idle immediately
    fn teardown(&mut self, reason: &str) {
        self.timers.cancel_all();
        self.resume.cancel();
        self.stop_recognition();
        self.playback.abandon();
        self.dispatch_in_flight = None;
        self.deferred = None;

        if self.session.take().is_some() {
            tracing::info!(reason, "voice mode ended");
        }
        self.transition(VoiceState::Idle);
    }

    fn force_stop_requested(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.force_stop_requested)
    }

    fn transition(&mut self, to: VoiceState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "voice state");
            self.state = to;
        }
    }

    fn publish(&self) {
        let state = self.state;
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}
