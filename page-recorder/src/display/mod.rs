//! Virtual display management.

mod xvfb;

pub use xvfb::XvfbDisplay;

use async_trait::async_trait;

use crate::Result;
use crate::config::{CaptureSettings, DisplaySettings};

/// A running display surface the browser renders into and the encoder grabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayHandle {
    /// X display name, e.g. `:99`.
    pub name: String,
    /// Audio source paired with the display.
    pub audio_sink: String,
    pub width: u32,
    pub height: u32,
}

impl DisplayHandle {
    /// Screen 0 of the display, as used by X11 grabbers.
    pub fn screen(&self) -> String {
        format!("{}.0", self.name)
    }
}

/// Lifecycle of the isolated display surface.
#[async_trait]
pub trait DisplayServer: Send + Sync {
    /// Start a display sized to `capture` and wait until it accepts clients.
    async fn start(
        &self,
        capture: &CaptureSettings,
        settings: &DisplaySettings,
    ) -> Result<DisplayHandle>;

    /// Tear the display down.
    ///
    /// Idempotent and infallible: failures are logged, never returned.
    async fn stop(&self, handle: &DisplayHandle);
}
