//! Fake collaborators that record what the orchestrator asks of them.
//!
//! Every fake appends to one shared event log so tests can assert on the
//! relative order of start, stop and teardown steps across components.

#![allow(dead_code)]

use async_trait::async_trait;
use page_recorder::config::{
    CaptureSettings, DisplaySettings, OutputTarget, S3Target, SessionConfig, Source,
};
use page_recorder::display::{DisplayHandle, DisplayServer};
use page_recorder::encoder::{EncoderControl, EncoderLauncher, EncoderSession};
use page_recorder::output::{OutputRouter, Uploader};
use page_recorder::page::{PageDriver, PageHandle, PageSession, resolve_page_url};
use page_recorder::session::Orchestrator;
use page_recorder::{Error, Result};
use parking_lot::Mutex;
use process_utils::ExitInfo;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Exit status ffmpeg reports after finalizing on an interrupt.
pub const INTERRUPTED: ExitInfo = ExitInfo {
    code: Some(255),
    signal: None,
};

/// Exit status of a crashed encoder.
pub const CRASHED: ExitInfo = ExitInfo {
    code: Some(1),
    signal: None,
};

fn log(events: &EventLog, event: impl Into<String>) {
    events.lock().push(event.into());
}

pub struct FakeDisplay {
    events: EventLog,
    fail: bool,
}

#[async_trait]
impl DisplayServer for FakeDisplay {
    async fn start(
        &self,
        capture: &CaptureSettings,
        settings: &DisplaySettings,
    ) -> Result<DisplayHandle> {
        log(&self.events, "display.start");
        if self.fail {
            return Err(Error::display("no free display"));
        }
        Ok(DisplayHandle {
            name: ":42".to_string(),
            audio_sink: settings.audio_sink.clone(),
            width: capture.width,
            height: capture.height,
        })
    }

    async fn stop(&self, _handle: &DisplayHandle) {
        log(&self.events, "display.stop");
    }
}

pub struct FakePage {
    events: EventLog,
    url: String,
}

#[async_trait]
impl PageHandle for FakePage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn close(&self) {
        tokio::task::yield_now().await;
        log(&self.events, "page.close");
    }
}

pub struct FakePageDriver {
    events: EventLog,
    fail: bool,
    hang: bool,
    marker: Mutex<Option<oneshot::Sender<()>>>,
    opened_url: Mutex<Option<String>>,
}

impl FakePageDriver {
    /// Make the page log the end-of-recording marker.
    pub fn fire_marker(&self) {
        if let Some(tx) = self.marker.lock().take() {
            let _ = tx.send(());
        }
    }

    pub fn opened_url(&self) -> Option<String> {
        self.opened_url.lock().clone()
    }
}

#[async_trait]
impl PageDriver for FakePageDriver {
    async fn open(&self, _display: &DisplayHandle, config: &SessionConfig) -> Result<PageSession> {
        log(&self.events, "page.open");
        if self.fail {
            return Err(Error::page("navigation failed"));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        let url = resolve_page_url(&config.source)?;
        *self.opened_url.lock() = Some(url.clone());

        let (tx, rx) = oneshot::channel();
        *self.marker.lock() = Some(tx);
        Ok(PageSession {
            handle: Arc::new(FakePage {
                events: self.events.clone(),
                url,
            }),
            stop_signal: rx,
        })
    }
}

pub struct FakeEncoderControl {
    events: EventLog,
    exit_on_stop: bool,
    exit_tx: Mutex<Option<oneshot::Sender<ExitInfo>>>,
}

impl FakeEncoderControl {
    fn exit(&self, info: ExitInfo) {
        if let Some(tx) = self.exit_tx.lock().take() {
            log(&self.events, "encoder.exit");
            let _ = tx.send(info);
        }
    }
}

impl EncoderControl for FakeEncoderControl {
    fn request_stop(&self) {
        log(&self.events, "encoder.stop_requested");
        if self.exit_on_stop {
            self.exit(INTERRUPTED);
        }
    }

    fn force_kill(&self) {
        log(&self.events, "encoder.kill");
        self.exit(ExitInfo {
            code: None,
            signal: Some(9),
        });
    }
}

pub struct FakeEncoder {
    events: EventLog,
    fail: bool,
    exit_on_stop: bool,
    control: Mutex<Option<Arc<FakeEncoderControl>>>,
}

impl FakeEncoder {
    /// Make the running encoder exit with `info`.
    pub fn exit(&self, info: ExitInfo) {
        if let Some(control) = self.control.lock().clone() {
            control.exit(info);
        }
    }
}

#[async_trait]
impl EncoderLauncher for FakeEncoder {
    async fn start(&self, _display: &DisplayHandle, _config: &SessionConfig) -> Result<EncoderSession> {
        log(&self.events, "encoder.start");
        if self.fail {
            return Err(Error::encoder("failed to spawn ffmpeg"));
        }
        let (tx, rx) = oneshot::channel();
        let control = Arc::new(FakeEncoderControl {
            events: self.events.clone(),
            exit_on_stop: self.exit_on_stop,
            exit_tx: Mutex::new(Some(tx)),
        });
        *self.control.lock() = Some(control.clone());
        Ok(EncoderSession { control, exit: rx })
    }
}

pub struct FakeUploader {
    events: EventLog,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, local: &Path, target: &S3Target) -> Result<String> {
        log(
            &self.events,
            format!("upload {} {}/{}", local.display(), target.bucket, target.key),
        );
        Ok(format!("s3://{}/{}", target.bucket, target.key))
    }
}

/// One set of fakes sharing an event log.
pub struct Harness {
    pub events: EventLog,
    pub display: Arc<FakeDisplay>,
    pub page: Arc<FakePageDriver>,
    pub encoder: Arc<FakeEncoder>,
    pub uploader: Arc<FakeUploader>,
}

#[derive(Default, Clone, Copy)]
pub struct Faults {
    pub display: bool,
    pub page: bool,
    pub encoder: bool,
    /// Page load never completes.
    pub page_hangs: bool,
    /// Encoder keeps running after the stop request until told to exit.
    pub manual_exit: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        Self {
            display: Arc::new(FakeDisplay {
                events: events.clone(),
                fail: faults.display,
            }),
            page: Arc::new(FakePageDriver {
                events: events.clone(),
                fail: faults.page,
                hang: faults.page_hangs,
                marker: Mutex::new(None),
                opened_url: Mutex::new(None),
            }),
            encoder: Arc::new(FakeEncoder {
                events: events.clone(),
                fail: faults.encoder,
                exit_on_stop: !faults.manual_exit,
                control: Mutex::new(None),
            }),
            uploader: Arc::new(FakeUploader {
                events: events.clone(),
            }),
            events,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.display.clone(),
            self.page.clone(),
            self.encoder.clone(),
            OutputRouter::new(self.uploader.clone()),
        )
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Index of the first occurrence of `event`.
    pub fn index(&self, event: &str) -> usize {
        let events = self.events();
        events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("{event} not in {events:?}"))
    }

    /// The stop and teardown steps, in order.
    pub fn teardown(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e.as_str(),
                    "encoder.stop_requested" | "page.close" | "display.stop"
                )
            })
            .collect()
    }
}

pub fn config(output: OutputTarget) -> SessionConfig {
    SessionConfig {
        capture: CaptureSettings::default(),
        source: Source::DirectUrl("https://x/room".to_string()),
        output,
        encode: Default::default(),
        display: DisplaySettings::default(),
        binaries: Default::default(),
        timeouts: Default::default(),
    }
}

pub fn s3_output(bucket: &str, key: &str) -> OutputTarget {
    OutputTarget::StagedUpload(S3Target {
        bucket: bucket.to_string(),
        key: key.to_string(),
        credentials: None,
        region: None,
        endpoint: None,
    })
}
