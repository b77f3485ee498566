//! Platform-specific discovery of the external client's config file.
//!
//! Discovery probes a fixed ordered list of conventional locations and
//! returns the first that exists, falling back to the platform default
//! when none do. This is pure probing, not state; it is safe to repeat.

use std::env;
use std::path::PathBuf;

/// Environment override for the config file location (highest priority).
pub const HOST_CONFIG_ENV: &str = "TOOLBRIDGE_HOST_CONFIG";

/// File name used by the external client on every platform.
const CONFIG_FILE_NAME: &str = "claude_desktop_config.json";

/// Ordered candidate locations for the external client's config file.
///
/// The env override comes first, then platform-conventional directories.
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(overridden) = env::var(HOST_CONFIG_ENV) {
        if !overridden.is_empty() {
            candidates.push(PathBuf::from(overridden));
        }
    }

    #[cfg(target_os = "macos")]
    if let Some(home) = dirs::home_dir() {
        candidates.push(
            home.join("Library")
                .join("Application Support")
                .join("Claude")
                .join(CONFIG_FILE_NAME),
        );
    }

    #[cfg(target_os = "windows")]
    if let Some(roaming) = dirs::config_dir() {
        candidates.push(roaming.join("Claude").join(CONFIG_FILE_NAME));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    if let Some(config) = dirs::config_dir() {
        candidates.push(config.join("Claude").join(CONFIG_FILE_NAME));
    }

    candidates
}

/// Resolve the config file path.
///
/// Returns the first existing candidate; when none exist yet, returns the
/// last candidate (the platform default) so a later write creates it there.
/// Returns `None` only when no home/config directory can be determined and
/// no override is set.
pub fn discover_host_config_path() -> Option<PathBuf> {
    let candidates = candidate_paths();

    for candidate in &candidates {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "found host config file");
            return Some(candidate.clone());
        }
    }

    candidates.into_iter().next_back()
}
