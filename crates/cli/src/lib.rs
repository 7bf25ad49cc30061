use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::LevelFilter;

pub mod commands;

/// Directory name of embedded frameworks inside an `.app` bundle.
pub const BUNDLE_FRAMEWORKS_DIR: &str = "Frameworks";

/// Canonicalize the path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        // Try to canonicalize; if it fails (e.g., path does not exist),
        // join it with the current dir to get an absolute path.
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// `<binary dir>/Frameworks` when it exists, matching the `.app` bundle layout.
pub fn default_frameworks_dir(binary: &Path) -> Option<PathBuf> {
    let dir = binary.parent()?.join(BUNDLE_FRAMEWORKS_DIR);
    dir.is_dir().then_some(dir)
}

/// Map a `--log-level` value to a filter; unknown values fall back to `warn`.
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

/// Initialise `env_logger` on stderr without timestamps.
pub fn init_logging(level: &str) {
    // A second init (e.g. from tests) is harmless; keep the first logger.
    let _ = env_logger::Builder::new()
        .filter_level(parse_log_level(level))
        .format_timestamp(None)
        .try_init();
}

/// Human-readable byte count using decimal units (as Finder reports sizes).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
