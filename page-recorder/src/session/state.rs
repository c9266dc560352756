//! Session lifecycle states.

use serde::Serialize;

/// Lifecycle of one recording session. No state is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Starting display, page and encoder.
    Initializing,
    /// Recording; stop triggers are armed.
    Running,
    /// Stop requested, waiting for the encoder to exit.
    Stopping,
    /// Everything torn down.
    Terminated,
}

impl SessionState {
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        match (self, target) {
            // A failed startup skips straight to Terminated
            (Initializing, Running | Terminated) => true,
            (Running, Stopping) => true,
            (Stopping, Terminated) => true,
            _ => false,
        }
    }
}

/// What ended a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StopTrigger {
    /// SIGINT or SIGTERM delivered to the recorder.
    Signal,
    /// The page logged the end-of-recording marker.
    PageMarker,
    /// The encoder exited without being asked to.
    EncoderExited,
}
