//! Starts a session, arbitrates its stop triggers and tears it down.

use process_utils::ExitInfo;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{SessionHandle, SessionState, StopTrigger};
use crate::config::{Environment, SessionConfig, resolve};
use crate::display::DisplayServer;
use crate::encoder::{EncoderExit, EncoderLauncher};
use crate::output::{OutputRouter, UploadOutcome};
use crate::page::{PageDriver, PageStopSignal};
use crate::{Error, Result};

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub trigger: StopTrigger,
    pub exit: ExitInfo,
    /// Set for staged uploads only.
    pub upload: Option<UploadOutcome>,
}

/// Composes the display, page, encoder and output router into one session.
pub struct Orchestrator {
    display: Arc<dyn DisplayServer>,
    page: Arc<dyn PageDriver>,
    encoder: Arc<dyn EncoderLauncher>,
    router: OutputRouter,
}

impl Orchestrator {
    pub fn new(
        display: Arc<dyn DisplayServer>,
        page: Arc<dyn PageDriver>,
        encoder: Arc<dyn EncoderLauncher>,
        router: OutputRouter,
    ) -> Self {
        Self {
            display,
            page,
            encoder,
            router,
        }
    }

    /// Resolve the configuration from `env`, then record until stopped.
    ///
    /// A configuration error returns before any collaborator is touched.
    pub async fn record<F>(
        &self,
        env: &(dyn Environment + Sync),
        shutdown: F,
    ) -> Result<SessionReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = resolve(env).inspect_err(|e| {
            error!("Session terminated before start: {}", e);
        })?;
        self.run(&config, shutdown).await
    }

    /// Record one session: start, wait for a stop trigger, tear down.
    ///
    /// A termination signal that arrives while the session is still starting
    /// aborts the startup and tears down whatever already started.
    pub async fn run<F>(&self, config: &SessionConfig, shutdown: F) -> Result<SessionReport>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = Box::pin(shutdown);
        let handle = self.new_handle(config);

        let started = tokio::select! {
            biased;
            started = self.start_resources(&handle, config) => started,
            _ = &mut shutdown => {
                warn!(session_id = %handle.id(), "Termination signal received during startup");
                Err(Error::interrupted("termination signal received during startup"))
            }
        };

        let session = self.finish_start(handle, config, started).await?;
        Ok(session.wait(shutdown).await)
    }

    /// Start display, page and encoder in that order.
    ///
    /// On failure whatever already started is torn down in reverse order and
    /// the startup error is returned.
    pub async fn start(&self, config: &SessionConfig) -> Result<RunningSession<'_>> {
        let handle = self.new_handle(config);
        let started = self.start_resources(&handle, config).await;
        self.finish_start(handle, config, started).await
    }

    fn new_handle(&self, config: &SessionConfig) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::new(config.output.clone()));
        info!(
            session_id = %handle.id(),
            output = config.output.kind(),
            "Starting session"
        );
        handle
    }

    async fn finish_start(
        &self,
        handle: Arc<SessionHandle>,
        config: &SessionConfig,
        started: Result<(PageStopSignal, EncoderExit)>,
    ) -> Result<RunningSession<'_>> {
        match started {
            Ok((page_stop, encoder_exit)) => {
                handle.transition(SessionState::Running)?;
                info!(session_id = %handle.id(), "Recording");
                Ok(RunningSession {
                    orchestrator: self,
                    handle,
                    page_stop,
                    encoder_exit,
                    encoder_stop_timeout: config.timeouts.encoder_stop_secs.map(Duration::from_secs),
                })
            }
            Err(e) => {
                error!(session_id = %handle.id(), "Startup failed: {}", e);
                self.abort_startup(&handle).await;
                if let Err(e) = handle.transition(SessionState::Terminated) {
                    warn!(session_id = %handle.id(), "{}", e);
                }
                Err(e)
            }
        }
    }

    async fn start_resources(
        &self,
        handle: &SessionHandle,
        config: &SessionConfig,
    ) -> Result<(PageStopSignal, EncoderExit)> {
        let display = self.display.start(&config.capture, &config.display).await?;
        handle.attach_display(display.clone());

        let page = self.page.open(&display, config).await?;
        handle.attach_page(page.handle);

        let encoder = self.encoder.start(&display, config).await?;
        handle.attach_encoder(encoder.control);

        Ok((page.stop_signal, encoder.exit))
    }

    /// Best-effort teardown of a partially started session.
    async fn abort_startup(&self, handle: &SessionHandle) {
        if let Some(page) = handle.page() {
            page.close().await;
        }
        if let Some(display) = handle.display() {
            self.display.stop(display).await;
        }
    }
}

/// A session in the `Running` state.
pub struct RunningSession<'a> {
    orchestrator: &'a Orchestrator,
    handle: Arc<SessionHandle>,
    page_stop: PageStopSignal,
    encoder_exit: EncoderExit,
    encoder_stop_timeout: Option<Duration>,
}

impl RunningSession<'_> {
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Arm the stop triggers and drive the session to `Terminated`.
    ///
    /// `shutdown` resolves on an OS termination request. The display is torn
    /// down and the staged upload runs only after the encoder has exited.
    pub async fn wait<F>(self, shutdown: F) -> SessionReport
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let RunningSession {
            orchestrator,
            handle,
            page_stop,
            mut encoder_exit,
            encoder_stop_timeout,
        } = self;

        let triggers = arm_triggers(&handle, shutdown, page_stop);

        let exit = match encoder_stop_timeout {
            None => exit_info(&mut encoder_exit).await,
            Some(limit) => {
                tokio::select! {
                    exit = exit_info(&mut encoder_exit) => exit,
                    _ = async {
                        handle.stop_requested().await;
                        tokio::time::sleep(limit).await;
                    } => {
                        warn!(
                            session_id = %handle.id(),
                            "Encoder still running {}s after stop request, killing",
                            limit.as_secs()
                        );
                        if let Some(encoder) = handle.encoder() {
                            encoder.force_kill();
                        }
                        exit_info(&mut encoder_exit).await
                    }
                }
            }
        };

        if handle.stop(StopTrigger::EncoderExited).await {
            warn!(session_id = %handle.id(), %exit, "Encoder exited unexpectedly");
        } else {
            info!(session_id = %handle.id(), %exit, "Encoder exited");
        }

        // The page must be closed before the display goes away.
        handle.stop_completed().await;
        for task in triggers {
            task.abort();
        }

        if let Some(display) = handle.display() {
            orchestrator.display.stop(display).await;
        }
        let upload = orchestrator
            .router
            .on_encoder_exit(handle.output(), &exit)
            .await;

        if let Err(e) = handle.transition(SessionState::Terminated) {
            warn!(session_id = %handle.id(), "{}", e);
        }

        let trigger = handle.trigger().unwrap_or(StopTrigger::EncoderExited);
        info!(session_id = %handle.id(), %trigger, "Session terminated");

        SessionReport {
            session_id: handle.id(),
            trigger,
            exit,
            upload,
        }
    }
}

/// Spawn the OS-signal and page-marker triggers.
fn arm_triggers<F>(
    handle: &Arc<SessionHandle>,
    shutdown: F,
    page_stop: PageStopSignal,
) -> [JoinHandle<()>; 2]
where
    F: Future<Output = ()> + Send + 'static,
{
    let signal = {
        let handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            info!(session_id = %handle.id(), "Termination signal received");
            handle.stop(StopTrigger::Signal).await;
        })
    };

    let page = {
        let handle = handle.clone();
        tokio::spawn(async move {
            // A dropped sender means the page went away without asking.
            if page_stop.await.is_ok() {
                handle.stop(StopTrigger::PageMarker).await;
            }
        })
    };

    [signal, page]
}

async fn exit_info(exit: &mut EncoderExit) -> ExitInfo {
    match exit.await {
        Ok(info) => info,
        Err(_) => {
            error!("{}", Error::encoder("exit watcher dropped without a status"));
            ExitInfo::UNKNOWN
        }
    }
}
