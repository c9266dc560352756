//! Xvfb-backed virtual display.

use async_trait::async_trait;
use parking_lot::Mutex;
use process_utils::{ExitInfo, tokio_command};
use rand::RngExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::{DisplayHandle, DisplayServer};
use crate::config::{CaptureSettings, DisplaySettings, SessionConfig};
use crate::{Error, Result};

/// Lowest display number handed out automatically.
const MIN_DISPLAY: u32 = 10;
const MAX_DISPLAY: u32 = 65_000;
const ALLOCATION_ATTEMPTS: usize = 32;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Virtual display backed by an `Xvfb` child process.
pub struct XvfbDisplay {
    binary: String,
    ready_timeout: Duration,
    /// Directory holding the `X<n>` unix sockets.
    socket_dir: PathBuf,
    /// Directory holding the `.X<n>-lock` files.
    lock_dir: PathBuf,
    servers: Mutex<HashMap<String, Child>>,
}

impl XvfbDisplay {
    pub fn new(binary: impl Into<String>, ready_timeout: Duration) -> Self {
        Self::with_paths(binary, ready_timeout, "/tmp/.X11-unix", "/tmp")
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.binaries.xvfb.clone(),
            Duration::from_secs(config.timeouts.display_ready_secs),
        )
    }

    /// Use custom socket and lock directories.
    pub fn with_paths(
        binary: impl Into<String>,
        ready_timeout: Duration,
        socket_dir: impl Into<PathBuf>,
        lock_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            ready_timeout,
            socket_dir: socket_dir.into(),
            lock_dir: lock_dir.into(),
            servers: Mutex::new(HashMap::new()),
        }
    }

    fn socket_path(&self, number: u32) -> PathBuf {
        self.socket_dir.join(format!("X{number}"))
    }

    fn lock_path(&self, number: u32) -> PathBuf {
        self.lock_dir.join(format!(".X{number}-lock"))
    }

    fn in_use(&self, number: u32) -> bool {
        self.lock_path(number).exists() || self.socket_path(number).exists()
    }

    /// Pick the display number to run on.
    fn allocate(&self, settings: &DisplaySettings) -> Result<u32> {
        if let Some(name) = &settings.name {
            let number = parse_display_number(name)
                .ok_or_else(|| Error::display(format!("invalid display name {name:?}")))?;
            if self.in_use(number) {
                return Err(Error::display(format!("display {name} is already in use")));
            }
            return Ok(number);
        }

        let mut rng = rand::rng();
        for _ in 0..ALLOCATION_ATTEMPTS {
            let number = rng.random_range(MIN_DISPLAY..MAX_DISPLAY);
            if !self.in_use(number) {
                return Ok(number);
            }
        }
        Err(Error::display("no free display number found"))
    }

    async fn wait_until_ready(&self, child: &mut Child, socket: &Path, name: &str) -> Result<()> {
        let secs = self.ready_timeout.as_secs();
        let poll = async {
            loop {
                if socket.exists() {
                    return Ok(());
                }
                match child.try_wait() {
                    Ok(Some(status)) => {
                        return Err(Error::display(format!(
                            "{} exited before display {name} was ready ({})",
                            self.binary,
                            ExitInfo::from(status)
                        )));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        return Err(Error::display(format!(
                            "failed to poll {} for display {name}: {e}",
                            self.binary
                        )));
                    }
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(self.ready_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(Error::display(format!(
                "display {name} not ready after {secs}s"
            ))),
        }
    }
}

/// Parse `:<n>` into `n`.
fn parse_display_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(':')?;
    let digits = digits.split('.').next()?;
    digits.parse().ok()
}

#[async_trait]
impl DisplayServer for XvfbDisplay {
    async fn start(
        &self,
        capture: &CaptureSettings,
        settings: &DisplaySettings,
    ) -> Result<DisplayHandle> {
        let number = self.allocate(settings)?;
        let name = format!(":{number}");
        let geometry = format!(
            "{}x{}x{}",
            capture.width, capture.height, capture.color_depth
        );

        info!(display = %name, %geometry, "Launching virtual display");

        let mut child = tokio_command(&self.binary)
            .arg(&name)
            .args(["-screen", "0", &geometry, "-ac", "-nolisten", "tcp"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::display(format!("failed to spawn {}: {e}", self.binary)))?;

        if let Some(stderr) = child.stderr.take() {
            let display_name = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(display = %display_name, "xvfb: {}", line);
                }
            });
        }

        let socket = self.socket_path(number);
        if let Err(e) = self.wait_until_ready(&mut child, &socket, &name).await {
            let _ = child.kill().await;
            return Err(e);
        }

        debug!(display = %name, "Virtual display ready");
        self.servers.lock().insert(name.clone(), child);

        Ok(DisplayHandle {
            name,
            audio_sink: settings.audio_sink.clone(),
            width: capture.width,
            height: capture.height,
        })
    }

    async fn stop(&self, handle: &DisplayHandle) {
        let Some(mut child) = self.servers.lock().remove(&handle.name) else {
            debug!(display = %handle.name, "Virtual display already stopped");
            return;
        };

        info!(display = %handle.name, "Stopping virtual display");

        if let Some(pid) = child.id() {
            if let Err(e) = process_utils::send_interrupt(pid) {
                debug!(display = %handle.name, "Interrupt failed, killing instead: {}", e);
                let _ = child.start_kill();
            }
        }

        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(display = %handle.name, "Virtual display exited with {}", ExitInfo::from(status));
            }
            Ok(Err(e)) => warn!(display = %handle.name, "Failed to wait for virtual display: {}", e),
            Err(_) => {
                warn!(display = %handle.name, "Virtual display ignored interrupt, killing");
                if let Err(e) = child.kill().await {
                    warn!(display = %handle.name, "Failed to kill virtual display: {}", e);
                }
            }
        }
    }
}
