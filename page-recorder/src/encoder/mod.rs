//! Encoder process manager.

mod args;
mod ffmpeg;

pub use args::build_encoder_args;
pub use ffmpeg::FfmpegEncoder;

use async_trait::async_trait;
use process_utils::ExitInfo;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::Result;
use crate::config::SessionConfig;
use crate::display::DisplayHandle;

/// Resolves once with the encoder's exit status.
///
/// This is the only authoritative signal that encoding has stopped.
pub type EncoderExit = oneshot::Receiver<ExitInfo>;

/// Control surface of a running encoder.
pub trait EncoderControl: Send + Sync {
    /// Ask the encoder to finalize its output and exit.
    ///
    /// Fire-and-forget: the exit is only observable through [`EncoderExit`].
    fn request_stop(&self);

    /// Terminate the encoder without letting it finalize.
    fn force_kill(&self);
}

/// A started encoder.
pub struct EncoderSession {
    pub control: Arc<dyn EncoderControl>,
    pub exit: EncoderExit,
}

/// Starts the encoder against a ready display.
#[async_trait]
pub trait EncoderLauncher: Send + Sync {
    async fn start(&self, display: &DisplayHandle, config: &SessionConfig) -> Result<EncoderSession>;
}
