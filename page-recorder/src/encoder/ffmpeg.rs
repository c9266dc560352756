//! ffmpeg encoder subprocess.

use async_trait::async_trait;
use process_utils::{ExitInfo, tokio_command};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{EncoderControl, EncoderExit, EncoderLauncher, EncoderSession, build_encoder_args};
use crate::config::SessionConfig;
use crate::display::DisplayHandle;
use crate::{Error, Result};

/// Launches ffmpeg with its standard streams inherited from the recorder.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.binaries.ffmpeg.clone())
    }
}

#[async_trait]
impl EncoderLauncher for FfmpegEncoder {
    async fn start(&self, display: &DisplayHandle, config: &SessionConfig) -> Result<EncoderSession> {
        let args = build_encoder_args(config, display);
        let display_name = &display.name;
        info!(
            display = %display_name,
            output = config.output.kind(),
            "Starting encoder"
        );
        debug!("{} {}", self.binary, args.join(" "));

        let child = tokio_command(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::encoder(format!("failed to spawn {}: {e}", self.binary)))?;

        let pid = child.id();
        let kill = CancellationToken::new();
        let exited = CancellationToken::new();
        let exit = spawn_exit_watcher(child, kill.clone(), exited.clone());

        Ok(EncoderSession {
            control: Arc::new(FfmpegControl { pid, kill, exited }),
            exit,
        })
    }
}

struct FfmpegControl {
    pid: Option<u32>,
    kill: CancellationToken,
    exited: CancellationToken,
}

impl EncoderControl for FfmpegControl {
    fn request_stop(&self) {
        if self.exited.is_cancelled() {
            debug!("Encoder already exited, not interrupting");
            return;
        }
        let Some(pid) = self.pid else {
            warn!("Encoder pid unknown, killing instead of interrupting");
            self.kill.cancel();
            return;
        };
        match process_utils::send_interrupt(pid) {
            Ok(()) => info!(pid, "Interrupt sent to encoder"),
            Err(e) => {
                warn!(pid, "Failed to interrupt encoder, killing: {}", e);
                self.kill.cancel();
            }
        }
    }

    fn force_kill(&self) {
        self.kill.cancel();
    }
}

/// Wait for `child` in the background and report how it ended.
///
/// Cancelling `kill` kills the child; its status is still reported. `exited`
/// is cancelled once the child has been reaped.
fn spawn_exit_watcher(
    mut child: Child,
    kill: CancellationToken,
    exited: CancellationToken,
) -> EncoderExit {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill.cancelled() => {
                warn!("Killing encoder");
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill encoder: {}", e);
                }
                child.wait().await
            }
        };

        let exit = match status {
            Ok(status) => ExitInfo::from(status),
            Err(e) => {
                error!("Error waiting for encoder: {}", e);
                ExitInfo::UNKNOWN
            }
        };
        exited.cancel();
        let _ = tx.send(exit);
    });

    rx
}
