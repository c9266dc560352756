//! Page driver: a browser on the virtual display showing the recorded page.

mod chrome;
mod token;
mod url;

pub use chrome::{ChromeDriver, browser_args, console_text, is_end_marker};
pub use token::{RecorderClaims, TokenIssuer, VideoGrant};
pub use url::{resolve_page_url, template_url};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::Result;
use crate::config::SessionConfig;
use crate::display::DisplayHandle;

/// Console marker a page logs to ask for the recording to end.
pub const END_RECORDING_MARKER: &str = "END_RECORDING";

/// Fires once when the page asks for the recording to end.
///
/// Dropped without firing when the page goes away first.
pub type PageStopSignal = oneshot::Receiver<()>;

/// An open page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// URL the page was navigated to.
    fn url(&self) -> &str;

    /// Close the browser. Idempotent.
    async fn close(&self);
}

/// Result of a successful [`PageDriver::open`].
pub struct PageSession {
    pub handle: Arc<dyn PageHandle>,
    /// Advisory end-of-recording request from the page itself.
    pub stop_signal: PageStopSignal,
}

/// Launches a browser bound to a display and loads the configured source.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Launch, navigate, and return once the page's load event has fired.
    async fn open(&self, display: &DisplayHandle, config: &SessionConfig) -> Result<PageSession>;
}
