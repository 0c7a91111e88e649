//! Cancelable countdowns owned by the voice controller
//!
//! A timer is a spawned sleep that posts [`VoiceEvent::TimerFired`] into the
//! controller loop. Every arm or cancel bumps the timer's generation, so a
//! fire already queued by a cancelled timer no longer matches and is dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::engine::EventSender;
use super::event::{TimerKind, VoiceEvent};

struct Live {
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// One cancelable countdown
pub struct Timer {
    kind: TimerKind,
    generation: u64,
    live: Option<Live>,
}

impl Timer {
    /// Create an unarmed timer
    #[must_use]
    pub const fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            live: None,
        }
    }

    /// Cancel any live countdown and start a new one
    pub fn arm(&mut self, after: Duration, tx: &EventSender) {
        self.cancel();

        let kind = self.kind;
        let generation = self.generation;
        let deadline = Instant::now() + after;
        let tx = tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(VoiceEvent::TimerFired { kind, generation });
        });

        self.live = Some(Live { handle, deadline });
        tracing::trace!(?kind, generation, ?after, "timer armed");
    }

    /// Cancel the live countdown, if any
    pub fn cancel(&mut self) {
        if let Some(live) = self.live.take() {
            live.handle.abort();
            tracing::trace!(kind = ?self.kind, generation = self.generation, "timer cancelled");
        }
        self.generation += 1;
    }

    /// Whether a countdown is live
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Whether the live countdown's deadline has passed
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.live.as_ref().is_some_and(|live| live.deadline <= now)
    }

    /// Consume a fire event; true only for the live generation
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.live.is_some() && generation == self.generation {
            self.live = None;
            true
        } else {
            false
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            live.handle.abort();
        }
    }
}

/// Pause timer plus session timer
///
/// The pause timer restarts on every call. The session timer is armed once
/// and left alone until it fires or is cancelled.
pub struct TimerPair {
    pause: Timer,
    session: Timer,
    tx: EventSender,
}

impl TimerPair {
    /// Create a pair posting into `tx`
    #[must_use]
    pub const fn new(tx: EventSender) -> Self {
        Self {
            pause: Timer::new(TimerKind::Pause),
            session: Timer::new(TimerKind::Session),
            tx,
        }
    }

    /// Cancel any live pause timer and start a new one
    pub fn schedule_pause(&mut self, after: Duration) {
        self.pause.arm(after, &self.tx);
    }

    /// Start the session timer unless one is already live
    pub fn schedule_session(&mut self, after: Duration) {
        if !self.session.is_live() {
            self.session.arm(after, &self.tx);
        }
    }

    /// Cancel the session timer; the next fragment arms a fresh one
    pub fn cancel_session(&mut self) {
        self.session.cancel();
    }

    /// Cancel both timers; fires already queued become stale
    pub fn cancel_all(&mut self) {
        self.pause.cancel();
        self.session.cancel();
    }

    /// Whether the session deadline has passed, even if its fire is not yet processed
    #[must_use]
    pub fn session_due(&self) -> bool {
        self.session.is_due(Instant::now())
    }

    /// Whether a pause countdown is running
    #[must_use]
    pub const fn pause_live(&self) -> bool {
        self.pause.is_live()
    }

    /// Whether the session countdown is running
    #[must_use]
    pub const fn session_live(&self) -> bool {
        self.session.is_live()
    }

    /// Consume a fire event for one of the pair; true only if it is live
    pub fn accept(&mut self, kind: TimerKind, generation: u64) -> bool {
        match kind {
            TimerKind::Pause => self.pause.accept(generation),
            TimerKind::Session => self.session.accept(generation),
            TimerKind::Resume => false,
        }
    }
}
