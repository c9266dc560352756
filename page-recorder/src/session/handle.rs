//! Per-session resources and the single-fire stop routine.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{SessionState, StopTrigger};
use crate::config::OutputTarget;
use crate::display::DisplayHandle;
use crate::encoder::EncoderControl;
use crate::page::PageHandle;
use crate::{Error, Result};

/// Resources of one recording, attached as each one starts.
///
/// Shared between the orchestrator and the stop triggers. Only the
/// orchestrator attaches resources or tears them down; triggers call
/// [`SessionHandle::stop`].
pub struct SessionHandle {
    id: Uuid,
    output: OutputTarget,
    state: Mutex<SessionState>,
    display: OnceLock<DisplayHandle>,
    page: OnceLock<Arc<dyn PageHandle>>,
    encoder: OnceLock<Arc<dyn EncoderControl>>,
    stopped: AtomicBool,
    trigger: OnceLock<StopTrigger>,
    stop_requested: CancellationToken,
    stop_complete: CancellationToken,
}

impl SessionHandle {
    pub fn new(output: OutputTarget) -> Self {
        Self {
            id: Uuid::new_v4(),
            output,
            state: Mutex::new(SessionState::Initializing),
            display: OnceLock::new(),
            page: OnceLock::new(),
            encoder: OnceLock::new(),
            stopped: AtomicBool::new(false),
            trigger: OnceLock::new(),
            stop_requested: CancellationToken::new(),
            stop_complete: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&self, to: SessionState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: state.to_string(),
                to: to.to_string(),
            });
        }
        let from = *state;
        debug!(session_id = %self.id, %from, %to, "Session state changed");
        *state = to;
        Ok(())
    }

    pub fn display(&self) -> Option<&DisplayHandle> {
        self.display.get()
    }

    pub fn page(&self) -> Option<&Arc<dyn PageHandle>> {
        self.page.get()
    }

    pub fn encoder(&self) -> Option<&Arc<dyn EncoderControl>> {
        self.encoder.get()
    }

    pub(crate) fn attach_display(&self, display: DisplayHandle) {
        if self.display.set(display).is_err() {
            warn!(session_id = %self.id, "Display already attached");
        }
    }

    pub(crate) fn attach_page(&self, page: Arc<dyn PageHandle>) {
        if self.page.set(page).is_err() {
            warn!(session_id = %self.id, "Page already attached");
        }
    }

    pub(crate) fn attach_encoder(&self, encoder: Arc<dyn EncoderControl>) {
        if self.encoder.set(encoder).is_err() {
            warn!(session_id = %self.id, "Encoder already attached");
        }
    }

    /// Trigger that claimed the stop routine.
    pub fn trigger(&self) -> Option<StopTrigger> {
        self.trigger.get().copied()
    }

    /// Run the stop routine if nobody has yet.
    ///
    /// The first caller asks the encoder to stop, then closes the page, and
    /// returns `true`. Every other call returns `false` immediately. Neither
    /// waits for the encoder to exit.
    pub async fn stop(&self, trigger: StopTrigger) -> bool {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(session_id = %self.id, %trigger, "Stop already claimed, ignoring");
            return false;
        }

        let _ = self.trigger.set(trigger);
        if let Err(e) = self.transition(SessionState::Stopping) {
            warn!(session_id = %self.id, "{}", e);
        }
        info!(session_id = %self.id, %trigger, "Stopping session");

        if let Some(encoder) = self.encoder() {
            encoder.request_stop();
        }
        self.stop_requested.cancel();

        if let Some(page) = self.page() {
            page.close().await;
        }
        self.stop_complete.cancel();
        true
    }

    /// Resolves once the encoder has been asked to stop.
    pub async fn stop_requested(&self) {
        self.stop_requested.cancelled().await
    }

    /// Resolves once the stop routine has finished closing the page.
    pub async fn stop_completed(&self) {
        self.stop_complete.cancelled().await
    }
}
