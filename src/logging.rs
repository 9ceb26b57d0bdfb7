//! `tracing` setup: a quiet console layer on stderr and an optional detailed file layer.

use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// None silences the console.
    pub console_level: Option<Level>,
    pub file_level: Level,
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: Some(Level::WARN),
            file_level: Level::INFO,
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Levels for the `--quiet` / `--verbose` flags.
    pub fn from_flags(quiet: bool, verbose: bool, log_file: Option<PathBuf>) -> Self {
        let console_level = match (quiet, verbose) {
            (true, _) => Some(Level::ERROR),
            (false, true) => Some(Level::DEBUG),
            (false, false) => Some(Level::WARN),
        };
        Self {
            console_level,
            file_level: if verbose { Level::DEBUG } else { Level::INFO },
            log_file,
        }
    }
}

/// Keeps the file writer alive; pending lines are flushed when dropped.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Dependencies log at warn; our own crate at the requested level.
fn filter_for(level: Level) -> EnvFilter {
    let ours = level.to_string().to_lowercase();
    EnvFilter::new(format!("warn,modsupdater={}", ours))
}

/// `modsupdater-YYYY-MM-DD-HH-MM-SS.log` in `dir`.
pub fn log_file_path(dir: &Path, now: chrono::NaiveDateTime) -> PathBuf {
    dir.join(format!("modsupdater-{}.log", now.format("%Y-%m-%d-%H-%M-%S")))
}

/// Install the global subscriber. A subscriber that is already installed (tests, embedding)
/// is left alone.
pub fn init_logging(config: &LogConfig) -> std::io::Result<LogGuard> {
    let console_layer = config.console_level.map(|level| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .with_filter(filter_for(level))
    });

    let (file_layer, file_guard) = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(filter_for(config.file_level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
