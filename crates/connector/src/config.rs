//! Configuration management for the fsconnector server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/fsconnector/config.toml`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Credential;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be greater than 0")]
    InvalidPort,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("auth.username must not be empty; run `fsconnector init` first")]
    MissingUsername,

    #[error("auth.username must not contain ':', got {0}")]
    InvalidUsername(String),

    #[error("auth.password must not be empty")]
    MissingPassword,

    #[error("max_body_bytes must be greater than 0")]
    InvalidBodyLimit,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the fsconnector server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener and logging settings.
    pub server: ServerConfig,

    /// The exposed directory tree.
    pub sandbox: SandboxConfig,

    /// The shared credential.
    pub auth: AuthConfig,
}

/// Listener and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_address: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Base URL used in the capability document, e.g. when behind a proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    /// Value of `Access-Control-Allow-Origin`.
    pub allowed_origin: String,

    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
}

/// The exposed directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root of the sandbox. Relative paths resolve against the working directory.
    pub root: PathBuf,

    /// Extra paths that are never listed or served, relative to the root or absolute.
    pub blacklist: Vec<PathBuf>,
}

/// The shared credential.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_dir: None,
            public_url: None,
            allowed_origin: "*".to_string(),
            max_body_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            blacklist: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// The credential clients must present.
    pub fn credential(&self) -> Credential {
        Credential::basic(&self.username, &self.password)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fsconnector")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FSCONNECTOR_PORT: Override the listening port
    /// - FSCONNECTOR_ROOT: Override the sandbox root
    /// - FSCONNECTOR_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FSCONNECTOR_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    tracing::info!(port, "Overriding port from environment");
                    self.server.port = port;
                }
                Err(_) if port.is_empty() => {}
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid FSCONNECTOR_PORT"),
            }
        }

        if let Ok(root) = std::env::var("FSCONNECTOR_ROOT") {
            if !root.is_empty() {
                tracing::info!(root = %root, "Overriding sandbox root from environment");
                self.sandbox.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("FSCONNECTOR_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!(level = %level, "Overriding log_level from environment");
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        if self.auth.username.is_empty() {
            return Err(ConfigError::MissingUsername);
        }
        // Basic auth splits on the first colon.
        if self.auth.username.contains(':') {
            return Err(ConfigError::InvalidUsername(self.auth.username.clone()));
        }
        if self.auth.password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::InvalidBodyLimit);
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = ?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist. The file is written
    /// to a temporary sibling first and renamed into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let contents = self.to_toml()?;
        let temp_path = temp_path_for(path);
        let written = write_private(&temp_path, contents.as_bytes()).and_then(|_| {
            fs::rename(&temp_path, path).with_context(|| {
                format!("Failed to move config file into place: {}", path.display())
            })
        });
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written?;

        tracing::debug!(path = ?path, "Configuration saved");
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Copy of this configuration that is safe to print.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if !masked.auth.password.is_empty() {
            masked.auth.password = "****".to_string();
        }
        masked
    }
}

/// Unique hidden sibling of `path` to stage a save in.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Write `bytes` to a file that must not exist yet and is owner-only from
/// the moment it is created.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create config file: {}", path.display()))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.username = "alice".to_string();
        config.auth.password = "s3cret".to_string();
        config
    }

    fn clear_env() {
        std::env::remove_var("FSCONNECTOR_PORT");
        std::env::remove_var("FSCONNECTOR_ROOT");
        std::env::remove_var("FSCONNECTOR_LOG_LEVEL");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_level, "info");
        assert!(config.server.log_dir.is_none());
        assert!(config.server.public_url.is_none());
        assert_eq!(config.server.allowed_origin, "*");
        assert_eq!(config.server.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.sandbox.root, PathBuf::from("."));
        assert!(config.sandbox.blacklist.is_empty());
        assert!(config.auth.username.is_empty());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
port = 8080

[auth]
username = "alice"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.auth.username, "alice");
        assert!(config.auth.password.is_empty());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[server]
bind_address = "0.0.0.0"
port = 9000
log_level = "debug"
log_dir = "/var/log/fsc"
public_url = "https://files.example.com"
allowed_origin = "https://app.example.com"
max_body_bytes = 1024

[sandbox]
root = "/srv/share"
blacklist = ["private", "/srv/share/.git"]

[auth]
username = "alice"
password = "s3cret"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.log_dir, Some(PathBuf::from("/var/log/fsc")));
        assert_eq!(
            config.server.public_url.as_deref(),
            Some("https://files.example.com")
        );
        assert_eq!(config.server.max_body_bytes, 1024);
        assert_eq!(config.sandbox.root, PathBuf::from("/srv/share"));
        assert_eq!(config.sandbox.blacklist.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nport = 1");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
port = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = valid_config();
        config.server.public_url = Some("http://proxy:8080".to_string());
        config.sandbox.blacklist = vec![PathBuf::from("secret")];

        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = valid_config();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(config, loaded);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        valid_config().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_ignores_planted_temp_symlink() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let victim = temp_dir.path().join("victim");
        fs::write(&victim, "untouched").unwrap();
        let path = temp_dir.path().join("config.toml");
        symlink(&victim, path.with_extension("toml.tmp")).unwrap();

        valid_config().save(&path).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "untouched");
        assert!(!fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
        assert_eq!(Config::load(&path).unwrap(), valid_config());
    }

    #[test]
    fn test_temp_path_is_unique_hidden_sibling() {
        let path = Path::new("/etc/fsconnector/config.toml");
        let first = temp_path_for(path);
        let second = temp_path_for(path);

        assert_ne!(first, second);
        assert_eq!(first.parent(), path.parent());
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".config.toml."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "this is not toml [").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("fsconnector/config.toml"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[server]
port = 4000
something_else = true
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_masked_hides_password() {
        let masked = valid_config().masked();
        assert_eq!(masked.auth.password, "****");
        assert_eq!(masked.auth.username, "alice");
        assert!(!masked.to_toml().unwrap().contains("s3cret"));
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let debug = format!("{:?}", valid_config().auth);
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_credential_from_auth() {
        let credential = valid_config().auth.credential();
        assert_eq!(credential.header_value(), "Basic YWxpY2U6czNjcmV0");
    }

    #[test]
    #[serial]
    fn test_env_override_port() {
        clear_env();
        std::env::set_var("FSCONNECTOR_PORT", "4321");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 4321);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        clear_env();
        std::env::set_var("FSCONNECTOR_PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 3000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_root_and_log_level() {
        clear_env();
        std::env::set_var("FSCONNECTOR_ROOT", "/srv/share");
        std::env::set_var("FSCONNECTOR_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.sandbox.root, PathBuf::from("/srv/share"));
        assert_eq!(config.server.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("FSCONNECTOR_ROOT", "");
        std::env::set_var("FSCONNECTOR_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_default_config_needs_credentials() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingUsername)
        );
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = valid_config();
        config.server.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = valid_config();
        config.server.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.server.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_username_with_colon() {
        let mut config = valid_config();
        config.auth.username = "a:b".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUsername("a:b".to_string()))
        );
    }

    #[test]
    fn test_validate_empty_password() {
        let mut config = valid_config();
        config.auth.password.clear();
        assert_eq!(config.validate(), Err(ConfigError::MissingPassword));
    }

    #[test]
    fn test_validate_body_limit_zero() {
        let mut config = valid_config();
        config.server.max_body_bytes = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBodyLimit));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::InvalidLogLevel("x".to_string()).to_string(),
            "log_level must be one of: trace, debug, info, warn, error; got x"
        );
    }
}
