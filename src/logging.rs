//! Logging setup.
//!
//! Sinks are attached once per process and the caller keeps the returned
//! [`LogGuard`] alive for as long as file output should be flushed.

use crate::config::LoggingConfig;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Handle to the installed log sinks.
///
/// Dropping it flushes and closes the file writer.
#[derive(Default)]
pub struct LogGuard {
    file: Option<PathBuf>,
    _worker: Option<WorkerGuard>,
}

impl LogGuard {
    /// Path of the log file, if file logging is active
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// Install the console layer plus a file layer at `log_dir/config.file`.
///
/// File logging is skipped (with a warning on stderr) when the directory is
/// not writable, so a bad log path never takes the run down.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> LogGuard {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},statement_trainer=debug", config.level))
    });

    let mut guard = LogGuard::default();

    let file_layer = match preflight_log_dir(log_dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::never(log_dir, &config.file);
            let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);
            guard._worker = Some(worker);
            guard.file = Some(log_dir.join(&config.file));

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false) // No color codes in file
                .with_target(true);

            Some(if config.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                log_dir.display(),
                e
            );
            None
        }
    };

    // Console layer
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard
}

/// Minimal logging for the interactive tools
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Check that `log_dir` exists (creating it if needed) and accepts writes.
pub fn preflight_log_dir(log_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let test_path = log_dir.join(".statement_trainer_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)?;
    let _ = std::fs::remove_file(&test_path);
    Ok(())
}
