//! Configuration loading for Encore.
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/encore/config.toml` (system)
//! 2. `~/.config/encore/config.toml` (user)
//! 3. `./encore.toml` (local override, or the `--config` path)
//! 4. Environment variables (`ENCORE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/share/encore"
//!
//! [sync]
//! enabled = true
//! base_url = "https://sessions.example.com"
//! user = "late-night-dj"
//!
//! [telemetry]
//! log_level = "info"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Filesystem paths for Encore state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for the record library.
    /// Default: ~/.local/share/encore
    #[serde(default = "PathsConfig::default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    fn default_state_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/encore"))
            .unwrap_or_else(|| PathBuf::from(".local/share/encore"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
        }
    }
}

/// Remote sync settings. Disabled by default; captures are always stored
/// locally regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the remote session store.
    #[serde(default)]
    pub base_url: String,

    /// User name to register records under.
    /// Default: encore
    #[serde(default = "SyncConfig::default_user")]
    pub user: String,
}

impl SyncConfig {
    fn default_user() -> String {
        "encore".to_string()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            user: Self::default_user(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete Encore configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncoreConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EncoreConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, optionally with a CLI-provided file that replaces
    /// the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = EncoreConfig::default();

        for path in discover_config_files(config_path) {
            let file_config = load_from_file(&path)?;
            config = merge_configs(config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Where record collections live.
    pub fn collections_dir(&self) -> PathBuf {
        self.paths.state_dir.join("collections")
    }

    /// Where audio blobs live.
    pub fn blobs_dir(&self) -> PathBuf {
        self.paths.state_dir.join("blobs")
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Encore Configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "state_dir = \"{}\"\n",
            self.paths.state_dir.display()
        ));

        output.push_str("\n[sync]\n");
        output.push_str(&format!("enabled = {}\n", self.sync.enabled));
        output.push_str(&format!("base_url = \"{}\"\n", self.sync.base_url));
        output.push_str(&format!("user = \"{}\"\n", self.sync.user));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

/// Discover config files in standard locations, in load order.
/// Only returns files that exist.
fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/encore/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("encore/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("encore.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

fn load_from_file(path: &Path) -> Result<EncoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<EncoreConfig, ConfigError> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mut config = EncoreConfig::default();

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("state_dir").and_then(|v| v.as_str()) {
            config.paths.state_dir = expand_path(v);
        }
    }

    if let Some(sync) = table.get("sync").and_then(|v| v.as_table()) {
        if let Some(v) = sync.get("enabled").and_then(|v| v.as_bool()) {
            config.sync.enabled = v;
        }
        if let Some(v) = sync.get("base_url").and_then(|v| v.as_str()) {
            config.sync.base_url = v.to_string();
        }
        if let Some(v) = sync.get("user").and_then(|v| v.as_str()) {
            config.sync.user = v.to_string();
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence where it differs from
/// the defaults.
fn merge_configs(base: EncoreConfig, overlay: EncoreConfig) -> EncoreConfig {
    let defaults = EncoreConfig::default();

    EncoreConfig {
        paths: PathsConfig {
            state_dir: if overlay.paths.state_dir != defaults.paths.state_dir {
                overlay.paths.state_dir
            } else {
                base.paths.state_dir
            },
        },
        sync: SyncConfig {
            enabled: if overlay.sync.enabled != defaults.sync.enabled {
                overlay.sync.enabled
            } else {
                base.sync.enabled
            },
            base_url: if overlay.sync.base_url != defaults.sync.base_url {
                overlay.sync.base_url
            } else {
                base.sync.base_url
            },
            user: if overlay.sync.user != defaults.sync.user {
                overlay.sync.user
            } else {
                base.sync.user
            },
        },
        telemetry: TelemetryConfig {
            log_level: if overlay.telemetry.log_level != defaults.telemetry.log_level {
                overlay.telemetry.log_level
            } else {
                base.telemetry.log_level
            },
        },
    }
}

/// Apply environment variable overrides to config.
fn apply_env_overrides(config: &mut EncoreConfig) {
    if let Ok(v) = env::var("ENCORE_STATE_DIR") {
        config.paths.state_dir = expand_path(&v);
    }

    // A sync URL in the environment implies sync is wanted
    if let Ok(v) = env::var("ENCORE_SYNC_URL") {
        config.sync.base_url = v;
        config.sync.enabled = true;
    }
    if let Ok(v) = env::var("ENCORE_SYNC_USER") {
        config.sync.user = v;
    }

    if let Ok(v) = env::var("ENCORE_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

/// Expand ~ in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncoreConfig::default();
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.user, "encore");
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config
            .collections_dir()
            .ends_with("encore/collections"));
        assert!(config.blobs_dir().ends_with("encore/blobs"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
[paths]
state_dir = "/custom/state"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.paths.state_dir, PathBuf::from("/custom/state"));
        // Other values should be defaults
        assert!(!config.sync.enabled);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
[paths]
state_dir = "/data/encore"

[sync]
enabled = true
base_url = "https://sessions.example.com"
user = "booth"

[telemetry]
log_level = "debug"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.paths.state_dir, PathBuf::from("/data/encore"));
        assert!(config.sync.enabled);
        assert_eq!(config.sync.base_url, "https://sessions.example.com");
        assert_eq!(config.sync.user, "booth");
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_toml("not [valid toml", Path::new("bad.toml")).is_err());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let base = parse_toml(
            r#"
[sync]
enabled = true
base_url = "https://first.example.com"
"#,
            Path::new("base.toml"),
        )
        .unwrap();

        let overlay = parse_toml(
            r#"
[sync]
base_url = "https://second.example.com"

[telemetry]
log_level = "warn"
"#,
            Path::new("overlay.toml"),
        )
        .unwrap();

        let merged = merge_configs(base, overlay);
        assert!(merged.sync.enabled, "base value survives");
        assert_eq!(merged.sync.base_url, "https://second.example.com");
        assert_eq!(merged.sync.user, "encore", "untouched field keeps its default");
        assert_eq!(merged.telemetry.log_level, "warn");
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/captures");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("captures"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_to_toml() {
        let config = EncoreConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[sync]"));
        assert!(toml.contains("log_level = \"info\""));
    }
}
