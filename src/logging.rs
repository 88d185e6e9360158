use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::config::LoggingConfig;

/// Parse a configured level name, falling back to `Warn` for anything
/// unrecognized.
pub fn level_filter(level: &str) -> LevelFilter {
    LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Warn)
}

/// Expand `~` and `$VARS` in the configured log file path. Empty means none.
fn log_file_path(config: &LoggingConfig) -> Option<PathBuf> {
    let raw = config.file.trim();
    if raw.is_empty() {
        return None;
    }
    match shellexpand::full(raw) {
        Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
        Err(_) => Some(PathBuf::from(shellexpand::tilde(raw).as_ref())),
    }
}

/// Install the global logger: stderr always, plus an append-mode log file
/// when one is configured.
/// Failures are ignored, and calling this twice keeps the first logger.
pub fn init(config: &LoggingConfig) {
    let level = level_filter(&config.level);
    if level == LevelFilter::Off {
        return;
    }
    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Debug)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    if let Some(path) = log_file_path(config) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            loggers.push(WriteLogger::new(level, log_config, file));
        }
    }

    let _ = CombinedLogger::init(loggers);
}
