//! TOML configuration file for the server.
//!
//! The file is optional and flat.  Every key may be omitted, in which case the
//! built-in default applies:
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 5008
//! backlog = 32
//! max_clients = 32
//! read_buffer_size = 1024
//! read_timeout_secs = 30        # omit to wait forever
//! pid_file = "/var/run/portgate.pid"
//! log_level = "info"
//! ```
//!
//! `main.rs` layers command-line flags and `PORTGATE_*` environment variables
//! on top of the loaded [`FileConfig`] before converting it into a validated
//! [`ServerConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use portgate_core::protocol::{
    DEFAULT_BACKLOG, DEFAULT_MAX_CLIENTS, DEFAULT_PID_FILE, DEFAULT_PORT, READ_BUFFER_SIZE,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{InvalidConfig, ServerConfig};

/// Error type for loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parsed but cannot be used.
    #[error(transparent)]
    Invalid(#[from] InvalidConfig),
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// On-disk configuration.  Mirrors [`ServerConfig`] in file-friendly types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// IP address to bind to.  `"0.0.0.0"` binds all IPv4 interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.  0 lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Kernel accept-queue length.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Maximum number of connections served at once.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Bytes read from each client.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Seconds a worker waits for the client's message.  Absent means forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Single-instance lock file.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}
fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}
fn default_read_buffer_size() -> usize {
    READ_BUFFER_SIZE
}
fn default_pid_file() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            max_clients: default_max_clients(),
            read_buffer_size: default_read_buffer_size(),
            read_timeout_secs: None,
            pid_file: default_pid_file(),
            log_level: default_log_level(),
        }
    }
}

impl FileConfig {
    /// Converts to a [`ServerConfig`] and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`] if the bind address is not an IP address or
    /// any value is out of range.
    pub fn into_server_config(self) -> Result<ServerConfig, InvalidConfig> {
        let ip: IpAddr = self.bind_address.trim().parse().map_err(|_| {
            InvalidConfig::new(
                "bind_address",
                format!("`{}` is not an IP address", self.bind_address),
            )
        })?;

        let config = ServerConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            backlog: self.backlog,
            max_clients: self.max_clients,
            read_buffer_size: self.read_buffer_size,
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            pid_file: self.pid_file,
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads a [`FileConfig`] from `path`.
///
/// A missing file is an error: the path was given explicitly.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed or has unknown keys.
pub fn load_config(path: impl AsRef<Path>) -> Result<FileConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Loads `path` and converts it straight into a validated [`ServerConfig`].
///
/// # Errors
///
/// Any [`ConfigError`].
pub fn load_server_config(path: impl AsRef<Path>) -> Result<ServerConfig, ConfigError> {
    Ok(load_config(path)?.into_server_config()?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_default_matches_server_config_default() {
        // Arrange / Act
        let cfg = FileConfig::default().into_server_config().unwrap();

        // Assert
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg: FileConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, FileConfig::default());
        assert_eq!(cfg.log_level, "info");
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_partial_file_overrides_only_given_keys() {
        // Arrange
        let toml_str = r#"
port = 6000
max_clients = 4
read_timeout_secs = 15
"#;

        // Act
        let cfg = toml::from_str::<FileConfig>(toml_str)
            .expect("deserialize partial")
            .into_server_config()
            .unwrap();

        // Assert
        assert_eq!(cfg.bind_addr.port(), 6000);
        assert_eq!(cfg.max_clients, 4);
        assert_eq!(cfg.read_timeout, Some(Duration::from_secs(15)));
        assert_eq!(cfg.backlog, DEFAULT_BACKLOG);
    }

    #[test]
    fn test_ipv6_bind_address_is_accepted() {
        let file = FileConfig {
            bind_address: "::1".to_string(),
            port: 7000,
            ..FileConfig::default()
        };
        let cfg = file.into_server_config().unwrap();
        assert_eq!(cfg.bind_addr, "[::1]:7000".parse().unwrap());
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let result: Result<FileConfig, _> = toml::from_str("max_client = 3");
        assert!(result.is_err(), "misspelt keys must not be silently ignored");
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_hostname_bind_address_is_rejected() {
        let file = FileConfig {
            bind_address: "localhost".to_string(),
            ..FileConfig::default()
        };
        let err = file.into_server_config().unwrap_err();
        assert_eq!(err.field, "bind_address");
    }

    #[test]
    fn test_zero_max_clients_is_rejected() {
        let file = FileConfig {
            max_clients: 0,
            ..FileConfig::default()
        };
        let err = file.into_server_config().unwrap_err();
        assert_eq!(err.field, "max_clients");
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let file = FileConfig {
            read_timeout_secs: Some(0),
            ..FileConfig::default()
        };
        let err = file.into_server_config().unwrap_err();
        assert_eq!(err.field, "read_timeout_secs");
    }

    // ── Loading from disk ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_reads_file() {
        // Arrange
        let file = write_config("bind_address = \"127.0.0.1\"\nport = 0\nlog_level = \"debug\"\n");

        // Act
        let cfg = load_config(file.path()).unwrap();

        // Assert
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let file = write_config("[[[ not valid toml");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_server_config_surfaces_invalid_values() {
        let file = write_config("backlog = 0\n");
        let err = load_server_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref e) if e.field == "backlog"));
    }
}
