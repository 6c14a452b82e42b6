//! Environment Configuration Loader
//!
//! Settings for the executor and the chain orchestrator are read from
//! environment variables. An environment file can pre-populate them:
//!
//! ```rust,no_run
//! use tc_core::config::load_environment;
//!
//! load_environment();
//! let strategy = tc_core::config::get_config("TC_CHAIN_DEFAULT_STRATEGY", "sequential");
//! ```
//!
//! Variables already present in the process environment always win.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Variable naming a custom environment file
pub const ENV_FILE_VAR: &str = "TC_ENV_FILE";

/// Paths checked in order when no custom file is given
pub const ENV_FILE_PATHS: &[&str] = &["/etc/tc/environment", "/etc/tc.env", ".env"];

/// Outcome of loading one environment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub path: String,
    pub loaded: usize,
    pub skipped: usize,
}

/// Load the first environment file found.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    let custom = get_config_opt(ENV_FILE_VAR);
    let candidates = custom
        .iter()
        .map(String::as_str)
        .chain(ENV_FILE_PATHS.iter().copied());

    for path in candidates {
        match load_env_file(Path::new(path)) {
            Ok(Some(summary)) => return Some(summary.path),
            Ok(None) => continue,
            Err(e) => warn!("Failed to read environment file {}: {}", path, e),
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Apply one environment file without overriding existing variables.
///
/// `Ok(None)` means the file does not exist.
pub fn load_env_file(path: &Path) -> crate::Result<Option<LoadSummary>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let mut summary = LoadSummary {
        path: path.display().to_string(),
        loaded: 0,
        skipped: 0,
    };

    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var_os(&key).is_some() {
            summary.skipped += 1;
            debug!("Skipped (already set): {}", key);
            continue;
        }
        debug!("Loaded: {}={}", key, mask_secret(&key, &value));
        std::env::set_var(&key, &value);
        summary.loaded += 1;
    }

    info!(
        "Loaded {} environment variables from {} ({} skipped - already set)",
        summary.loaded, summary.path, summary.skipped
    );
    Ok(Some(summary))
}

fn mask_secret<'a>(key: &str, value: &'a str) -> &'a str {
    let upper = key.to_ascii_uppercase();
    if ["KEY", "TOKEN", "SECRET", "PASSWORD"]
        .iter()
        .any(|marker| upper.contains(marker))
    {
        "***"
    } else {
        value
    }
}

/// Parse a `KEY=VALUE` line. Comments, blank lines and lines without a key
/// yield `None`; one layer of matching quotes is stripped from the value.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional, non-empty configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
