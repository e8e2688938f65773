//! TOML Configuration File Support
//!
//! Centralized configuration loading for the shell, supporting a TOML file at
//! `~/.config/surf-shell/shell.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [transport]
//! request_timeout_ms = 30000
//!
//! [views]
//! view_partition = "persist:horizon"
//! overlay_partition = "persist:surf-app-session"
//! sandbox = true
//! overlay_border_radius = 18
//! capture_quality = "low"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::config::TransportConfig;
use crate::view::CaptureQuality;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// View Settings
// =============================================================================

/// How the registry builds surfaces
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSettings {
    /// Storage partition of plain views
    pub view_partition: String,
    /// Storage partition of overlays
    pub overlay_partition: String,
    /// Run renderers sandboxed
    pub sandbox: bool,
    /// Corner radius of overlays
    pub overlay_border_radius: u32,
    /// Capture quality when an action does not name one
    pub capture_quality: CaptureQuality,
    /// Default preload script
    pub preload: Option<String>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            view_partition: "persist:horizon".to_string(),
            overlay_partition: "persist:surf-app-session".to_string(),
            sandbox: true,
            overlay_border_radius: 18,
            capture_quality: CaptureQuality::Low,
            preload: None,
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,
}

/// Views section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsToml {
    /// Storage partition of plain views
    pub view_partition: Option<String>,

    /// Storage partition of overlays
    pub overlay_partition: Option<String>,

    /// Run renderers sandboxed
    pub sandbox: Option<bool>,

    /// Corner radius of overlays
    pub overlay_border_radius: Option<u32>,

    /// Default capture quality
    pub capture_quality: Option<CaptureQuality>,

    /// Default preload script
    pub preload: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellToml {
    /// Transport configuration section
    pub transport: TransportToml,

    /// Views configuration section
    pub views: ViewsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the shell
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Transport configuration
    pub transport: TransportConfig,

    /// View construction settings
    pub views: ViewSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            views: ViewSettings::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ShellConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the shell cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.views.view_partition.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "view_partition must not be empty".into(),
            ));
        }
        if self.views.overlay_partition.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "overlay_partition must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/surf-shell/shell.toml` or
/// `~/.config/surf-shell/shell.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("surf-shell").join("shell.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ShellConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or if the resulting configuration fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ShellConfig, ConfigError> {
    let mut config = ShellConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ShellToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ShellConfig, toml: &ShellToml) {
    if let Some(timeout) = toml.transport.request_timeout_ms {
        config.transport.request_timeout_ms = timeout;
    }

    let views = &toml.views;
    if let Some(ref partition) = views.view_partition {
        config.views.view_partition.clone_from(partition);
    }
    if let Some(ref partition) = views.overlay_partition {
        config.views.overlay_partition.clone_from(partition);
    }
    if let Some(sandbox) = views.sandbox {
        config.views.sandbox = sandbox;
    }
    if let Some(radius) = views.overlay_border_radius {
        config.views.overlay_border_radius = radius;
    }
    if let Some(quality) = views.capture_quality {
        config.views.capture_quality = quality;
    }
    if views.preload.is_some() {
        config.views.preload.clone_from(&views.preload);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ShellConfig) {
    if let Ok(timeout) = std::env::var("SHELL_REQUEST_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.transport.request_timeout_ms = ms;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(partition) = std::env::var("SHELL_VIEW_PARTITION") {
        config.views.view_partition = partition;
        config.source = ConfigSource::Env;
    }
    if let Ok(partition) = std::env::var("SHELL_OVERLAY_PARTITION") {
        config.views.overlay_partition = partition;
        config.source = ConfigSource::Env;
    }
    if let Ok(sandbox) = std::env::var("SHELL_SANDBOX") {
        config.views.sandbox = sandbox != "0" && sandbox.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Request timeout override (milliseconds)
    pub request_timeout_ms: Option<u64>,

    /// Plain view partition override
    pub view_partition: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = Some(ms);
        self
    }

    /// Set view partition override
    #[must_use]
    pub fn with_view_partition(mut self, partition: String) -> Self {
        self.view_partition = Some(partition);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ShellConfig) {
        if self.request_timeout_ms.is_some() || self.view_partition.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.transport.request_timeout_ms = ms;
        }
        if let Some(ref partition) = self.view_partition {
            config.views.view_partition.clone_from(partition);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn clear_config_env_vars() {
        std::env::remove_var("SHELL_REQUEST_TIMEOUT_MS");
        std::env::remove_var("SHELL_VIEW_PARTITION");
        std::env::remove_var("SHELL_OVERLAY_PARTITION");
        std::env::remove_var("SHELL_SANDBOX");
    }

    #[test]
    fn test_default_config() {
        let config = ShellConfig::default();

        assert_eq!(config.transport.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.views.view_partition, "persist:horizon");
        assert_eq!(config.views.overlay_partition, "persist:surf-app-session");
        assert!(config.views.sandbox);
        assert_eq!(config.views.overlay_border_radius, 18);
        assert_eq!(config.views.capture_quality, CaptureQuality::Low);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("surf-shell/shell.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let toml_content = r#"
[transport]
request_timeout_ms = 5000

[views]
view_partition = "persist:work"
sandbox = false
overlay_border_radius = 12
capture_quality = "high"
"#;

        let parsed: ShellToml = toml::from_str(toml_content).unwrap();
        let mut config = ShellConfig::default();
        apply_toml_config(&mut config, &parsed);

        assert_eq!(config.transport.request_timeout_ms, 5000);
        assert_eq!(config.views.view_partition, "persist:work");
        assert!(!config.views.sandbox);
        assert_eq!(config.views.overlay_border_radius, 12);
        assert_eq!(config.views.capture_quality, CaptureQuality::High);
        assert_eq!(config.views.overlay_partition, "persist:surf-app-session");
    }

    #[test]
    fn test_parse_empty_toml() {
        let parsed: ShellToml = toml::from_str("").unwrap();
        let mut config = ShellConfig::default();
        apply_toml_config(&mut config, &parsed);

        assert_eq!(config.transport, TransportConfig::default());
        assert_eq!(config.views, ViewSettings::default());
    }

    #[test]
    fn test_missing_file_graceful() {
        let path = PathBuf::from("/nonexistent/path/shell.toml");
        let config = load_config_from_path(Some(path)).unwrap();

        assert!(config.config_file_path.is_none());
        assert!(
            config.source() == ConfigSource::Default || config.source() == ConfigSource::Env,
            "Expected Default or Env source, got: {:?}",
            config.source()
        );
    }

    #[test]
    fn test_file_is_loaded() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[views]\noverlay_border_radius = 24\n").unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.views.overlay_border_radius, 24);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_malformed_toml_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[views\nsandbox = \"maybe\"\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[transport]\nrequest_timeout_ms = 0\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));

        // An env override from a parallel test may replace the file value.
        if std::env::var("SHELL_REQUEST_TIMEOUT_MS").is_err() {
            assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        }
    }

    #[test]
    fn test_env_overrides_file() {
        clear_config_env_vars();

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[views]\noverlay_partition = \"persist:file\"\n")
            .unwrap();

        std::env::set_var("SHELL_OVERLAY_PARTITION", "persist:env");
        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        clear_config_env_vars();

        let partition = config.views.overlay_partition.as_str();
        assert!(
            partition == "persist:env" || partition == "persist:file",
            "Expected env or file partition, got: {partition}"
        );
        assert!(
            config.source() == ConfigSource::Env || config.source() == ConfigSource::File,
            "Expected Env or File source, got: {:?}",
            config.source()
        );
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = ShellConfig::default();
        config.transport.request_timeout_ms = 1234;
        config.set_source(ConfigSource::Env);

        ConfigOverrides::new()
            .with_request_timeout_ms(50)
            .with_view_partition("persist:cli".into())
            .apply(&mut config);

        assert_eq!(config.transport.request_timeout_ms, 50);
        assert_eq!(config.views.view_partition, "persist:cli");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_no_change() {
        let mut config = ShellConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
