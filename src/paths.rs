//! Path resolution for opsbot
//!
//! Follows the XDG Base Directory Specification with env var overrides.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OPSBOT_CONFIG` | Config file | `~/.config/opsbot/opsbot.toml` |

use std::path::PathBuf;

/// Get the XDG config directory for opsbot
///
/// Priority: `XDG_CONFIG_HOME` > `~/.config`
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("opsbot");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/opsbot");
    }

    // Last resort: current directory
    PathBuf::from(".")
}

/// Get the config file path
///
/// Priority: `OPSBOT_CONFIG` env var > `config_dir()/opsbot.toml`
pub fn config_path() -> PathBuf {
    std::env::var("OPSBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("opsbot.toml"))
}
