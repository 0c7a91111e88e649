//! Pending utterance accumulation
//!
//! Recognizers report the full transcript of the current stream on every
//! update. The buffer keeps whatever part of that transcript has not been
//! dispatched yet.

/// Accumulates cumulative transcripts into a pending utterance
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    pending: String,
    latest: String,
    dispatched_prefix: String,
}

impl UtteranceBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending utterance with the latest cumulative transcript,
    /// minus the prefix already taken earlier in the same stream
    pub fn append_fragment(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        let fresh = fragment
            .strip_prefix(self.dispatched_prefix.as_str())
            .unwrap_or(fragment);

        self.pending = fresh.trim_start().to_string();
        self.latest = fragment.to_string();
    }

    /// Return the pending utterance and clear it
    pub fn take_and_clear(&mut self) -> String {
        self.dispatched_prefix.clone_from(&self.latest);
        std::mem::take(&mut self.pending)
    }

    /// Pending utterance without clearing
    #[must_use]
    pub fn peek(&self) -> &str {
        &self.pending
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forget everything, including the dispatched prefix; call when a new
    /// recognition stream begins
    pub fn reset_stream(&mut self) {
        self.pending.clear();
        self.latest.clear();
        self.dispatched_prefix.clear();
    }
}
