use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct SessionManagerConfig {
    /// Reserved compositor account whose session backs `global_session`.
    /// That session exists independent of any interactively active user.
    #[serde(default = "default_global_username")]
    pub global_username: String,
    /// Bound on waiting for a session's setting worker to stop during
    /// teardown. Exceeding it detaches the worker instead of blocking.
    #[serde(default = "default_worker_shutdown_ms")]
    pub worker_shutdown_ms: u64,
    /// Atom interned on each Xwayland instance once it is ready, used to
    /// tag windows that draw without a server-side titlebar.
    #[serde(default = "default_no_titlebar_atom")]
    pub no_titlebar_atom: String,
}

impl SessionManagerConfig {
    /// Load from the config file, falling back to defaults when absent.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    pub fn worker_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_shutdown_ms)
    }
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            global_username: default_global_username(),
            worker_shutdown_ms: default_worker_shutdown_ms(),
            no_titlebar_atom: default_no_titlebar_atom(),
        }
    }
}

fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("seatmux")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("seatmux")
    } else {
        PathBuf::from("/etc/seatmux")
    }
}

fn default_global_username() -> String {
    "dde".to_string()
}

fn default_worker_shutdown_ms() -> u64 {
    25_000
}

fn default_no_titlebar_atom() -> String {
    "_DEEPIN_NO_TITLEBAR".to_string()
}
