//! Configuration loading and root folder resolution
//!
//! Missing or unreadable TOML files are never fatal: the service logs a
//! warning and starts with compiled defaults.

use crate::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "QM_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "quartermaster.db";

/// Service configuration as read from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database (overridden by CLI and env)
    pub root_folder: Option<PathBuf>,
    /// Address the HTTP command surface binds to
    pub bind_addr: String,
    /// Default tracing filter level when RUST_LOG is not set
    pub log_level: String,
    pub publisher: PublisherConfig,
    pub dashboard: DashboardConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_addr: "127.0.0.1:5790".to_string(),
            log_level: "info".to_string(),
            publisher: PublisherConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Chat gateway used to publish dashboard renderings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublisherConfig {
    /// Base URL of the gateway; `None` logs renderings instead of sending them
    pub gateway_url: Option<String>,
    /// Deadline for a single publish/edit call
    pub timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            timeout_ms: 3000,
        }
    }
}

/// Dashboard refresh and reply timing
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Quiet period after the first mutation event before a refresh pass
    pub refresh_debounce_ms: u64,
    /// How long a command may run before the caller gets a follow-up ticket
    pub ack_deadline_ms: u64,
    /// EventBus channel capacity
    pub event_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_debounce_ms: 250,
            ack_deadline_ms: 2500,
            event_capacity: 256,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration, falling back to defaults when the file is absent or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring invalid config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Config file {} not readable ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Path of the database file for a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// User config file location (`<config_dir>/quartermaster/config.toml`), if it exists
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("quartermaster").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    let system_config = PathBuf::from("/etc/quartermaster/config.toml");
    if cfg!(target_os = "linux") && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("quartermaster"))
        .unwrap_or_else(|| PathBuf::from("./quartermaster_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.publisher.timeout_ms, 3000);
        assert_eq!(config.dashboard.ack_deadline_ms, 2500);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:8080"

            [publisher]
            gateway_url = "http://gateway.local"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.publisher.gateway_url.as_deref(), Some("http://gateway.local"));
        assert_eq!(config.publisher.timeout_ms, 3000);
        assert_eq!(config.dashboard, DashboardConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("bind_addr = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_argument_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..TomlConfig::default()
        };
        let resolved = resolve_root_folder(
            Some(Path::new("/from/cli")),
            "QM_TEST_UNSET_VARIABLE",
            &config,
        );
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_toml_used_when_no_cli_or_env() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..TomlConfig::default()
        };
        let resolved = resolve_root_folder(None, "QM_TEST_UNSET_VARIABLE", &config);
        assert_eq!(resolved, PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_database_path_inside_root() {
        let path = database_path(Path::new("/srv/qm"));
        assert_eq!(path, PathBuf::from("/srv/qm/quartermaster.db"));
    }
}
