//! Client configuration, read from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const APP_DIR: &str = "dashboard-browser";
pub const CONFIG_FILE: &str = "dashboard.toml";
const PREFERENCES_FILE: &str = "preferences.json";

/// Error while loading the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Base URL every relative widget URL is resolved against.
    pub server: String,
    /// Dashboard page scanned for widgets.
    pub page: String,
    /// Preference blob location; the platform config dir when unset.
    pub storage: Option<PathBuf>,
    pub tail_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub history_max: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8080".into(),
            page: "/apps/dashboard/browser.html".into(),
            storage: None,
            tail_interval_secs: 10,
            request_timeout_secs: 15,
            history_max: 200,
        }
    }
}

/// `~/.config/dashboard-browser` on Linux, the platform equivalent elsewhere.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_DIR)))
}

impl DashboardConfig {
    /// Load `path`, or the default location when `None`. A missing file
    /// yields the defaults; a file that does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir().join(CONFIG_FILE));
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError {
            message: format!("Could not read {}: {}", path.display(), e),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError {
            message: format!("Failed to parse config: {}", e),
        })
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage
            .clone()
            .unwrap_or_else(|| config_dir().join(PREFERENCES_FILE))
    }

    pub fn tail_interval(&self) -> Duration {
        Duration::from_secs(self.tail_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL of the dashboard page.
    pub fn page_url(&self) -> Result<url::Url, ConfigError> {
        let base = url::Url::parse(&self.server).map_err(|e| ConfigError {
            message: format!("Invalid server {}: {}", self.server, e),
        })?;
        base.join(&self.page).map_err(|e| ConfigError {
            message: format!("Invalid page {}: {}", self.page, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = DashboardConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.tail_interval(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "server = \"https://cms.example\"\nhistory_max = 50\n").unwrap();
        let cfg = DashboardConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.server, "https://cms.example");
        assert_eq!(cfg.history_max, 50);
        assert_eq!(cfg.request_timeout_secs, 15);
    }

    #[test]
    fn garbage_is_an_error() {
        let err = DashboardConfig::from_toml("server = [").unwrap_err();
        assert!(err.message.starts_with("Failed to parse config"));
    }

    #[test]
    fn page_url_joins_server() {
        let cfg = DashboardConfig {
            server: "https://cms.example:4502".into(),
            page: "/apps/dashboard/browser.html".into(),
            ..Default::default()
        };
        assert_eq!(
            cfg.page_url().unwrap().as_str(),
            "https://cms.example:4502/apps/dashboard/browser.html"
        );
    }

    #[test]
    fn explicit_storage_wins() {
        let cfg = DashboardConfig {
            storage: Some(PathBuf::from("/tmp/prefs.json")),
            ..Default::default()
        };
        assert_eq!(cfg.storage_path(), PathBuf::from("/tmp/prefs.json"));
    }
}
