use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use page_recorder::config::{self, ProcessEnvironment, SessionConfig};
use page_recorder::display::{DisplayHandle, XvfbDisplay};
use page_recorder::encoder::{FfmpegEncoder, build_encoder_args};
use page_recorder::logging::{self, LOG_RETENTION_DAYS, LogOptions};
use page_recorder::output::{OutputRouter, S3Uploader};
use page_recorder::page::ChromeDriver;
use page_recorder::panic_hook;
use page_recorder::session::Orchestrator;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Record the audio and video of a web page.
///
/// The session is configured through the environment: `RECORDER_CONFIG`
/// holds a JSON override, or `RECORDER_URL` / `RECORDER_WS_URL` with room
/// credentials name what to record.
#[derive(Debug, Parser)]
#[command(name = "page-recorder", version, about)]
struct Args {
    /// Log filter directive, e.g. `debug` or `page_recorder=debug,chromiumoxide=info`.
    #[arg(long, env = "RECORDER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Also write daily log files to this directory.
    #[arg(long, env = "RECORDER_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log JSON lines instead of text.
    #[arg(long)]
    log_json: bool,

    /// Print the resolved configuration and encoder arguments, then exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = match init(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init(args: &Args) -> anyhow::Result<Option<WorkerGuard>> {
    let guard = logging::init_logging(&LogOptions {
        level: args.log_level.clone(),
        dir: args.log_dir.clone(),
        json: args.log_json,
    })
    .context("failed to initialize logging")?;
    panic_hook::install(args.log_dir.clone());
    Ok(guard)
}

async fn run(args: Args) -> page_recorder::Result<()> {
    if let Some(dir) = &args.log_dir {
        if let Err(e) = logging::cleanup_old_logs(dir, LOG_RETENTION_DAYS).await {
            warn!(error = %e, "Failed to cleanup old logs");
        }
    }

    let config = config::resolve(&ProcessEnvironment)?;

    if args.dry_run {
        return print_plan(&config);
    }

    let orchestrator = Orchestrator::new(
        Arc::new(XvfbDisplay::from_config(&config)),
        Arc::new(ChromeDriver::from_config(&config)),
        Arc::new(FfmpegEncoder::from_config(&config)),
        OutputRouter::new(Arc::new(S3Uploader::new())),
    );

    let report = orchestrator.run(&config, shutdown_signal()).await?;
    info!(
        session_id = %report.session_id,
        trigger = %report.trigger,
        exit = %report.exit,
        uploaded = report.upload.as_ref().map(|u| u.is_uploaded()),
        "Recording finished"
    );
    Ok(())
}

/// Print what a session would run without starting anything.
fn print_plan(config: &SessionConfig) -> page_recorder::Result<()> {
    // The real display number is only known once the display is allocated.
    let display = DisplayHandle {
        name: config
            .display
            .name
            .clone()
            .unwrap_or_else(|| ":<display>".to_string()),
        audio_sink: config.display.audio_sink.clone(),
        width: config.capture.width,
        height: config.capture.height,
    };
    let plan = serde_json::json!({
        "config": config,
        "encoderArgs": build_encoder_args(config, &display),
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
///
/// Handlers are installed immediately, so a signal that arrives while the
/// session is still starting aborts the startup.
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        let (mut interrupt, mut terminate) = match (interrupt, terminate) {
            (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
                return std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT, shutting down..."),
            _ = terminate.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
