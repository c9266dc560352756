//! Session orchestration.
//!
//! A session starts the display, the page and the encoder in that order. Once
//! running, three independent triggers can end it: an OS termination signal,
//! the page's end-of-recording marker and an unexpected encoder exit. All of
//! them funnel into [`SessionHandle::stop`], which runs at most once. Display
//! teardown and the staged upload wait for the encoder's exit, never for the
//! stop request.

mod handle;
mod orchestrator;
mod state;

pub use handle::SessionHandle;
pub use orchestrator::{Orchestrator, RunningSession, SessionReport};
pub use state::{SessionState, StopTrigger};
