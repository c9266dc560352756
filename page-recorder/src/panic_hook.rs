use chrono::{DateTime, Local};
use std::{
    backtrace::Backtrace,
    fmt,
    fs::OpenOptions,
    io::Write,
    panic::{PanicHookInfo, take_hook},
    path::{Path, PathBuf},
    thread,
};

use crate::logging::LOG_FILE_PREFIX;

/// Installs a global panic hook that reports panics through `tracing`.
///
/// In abort builds the record is also appended to the daily log file in
/// `log_dir`, since the non-blocking writer never gets to flush.
pub fn install(log_dir: Option<PathBuf>) {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = PanicRecord::capture(info);
            tracing::error!(
                target: "page_recorder::panic",
                thread = %record.thread,
                location = %record.location,
                "{}",
                record.payload
            );

            if cfg!(panic = "abort") {
                if let Some(dir) = &log_dir {
                    let _ = record.append_to(dir);
                }
            }
        }));

        previous_hook(info);
    }));
}

/// One panic, captured at the point it happened.
struct PanicRecord {
    at: DateTime<Local>,
    thread: String,
    location: String,
    payload: String,
    backtrace: String,
}

impl PanicRecord {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let payload = info
            .payload()
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| info.to_string());

        Self {
            at: Local::now(),
            thread: thread::current().name().unwrap_or("<unnamed>").to_string(),
            location: info
                .location()
                .map_or_else(|| "<unknown>".to_string(), |l| l.to_string()),
            payload,
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    /// Daily log file the record belongs to, matching the rolling appender.
    fn log_file(&self, log_dir: &Path) -> PathBuf {
        log_dir.join(format!("{LOG_FILE_PREFIX}.{}", self.at.format("%Y-%m-%d")))
    }

    fn append_to(&self, log_dir: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file(log_dir))?;
        writeln!(file, "{self}")?;
        file.flush()
    }
}

impl fmt::Display for PanicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} PANIC thread={} location={} payload={}",
            self.at.format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            self.thread,
            self.location,
            self.payload
        )?;
        if !self.backtrace.is_empty() {
            write!(f, "\nBacktrace:\n{}", self.backtrace)?;
        }
        Ok(())
    }
}
