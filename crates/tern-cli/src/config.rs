//! Configuration system for the tern CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// tern configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Detection configuration
    #[serde(default)]
    pub detection: DetectionSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the primary socket binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSection {
    /// Detection server, used when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Give up after this many seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How often the secondary socket queue is drained
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_listen_addr() -> String {
    "0.0.0.0:0".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_update_interval_ms() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            server: None,
            timeout_secs: default_timeout_secs(),
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DetectionSection {
    /// Overall detection timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Period between queue drains
    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("tern/config.toml")
    }

    /// Load config from `path` if it exists, defaults otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse listen address as `SocketAddr`
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_listen_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.listen_addr.parse()?)
    }

    /// Parse the configured detection server, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_server(&self) -> anyhow::Result<Option<SocketAddr>> {
        self.detection
            .server
            .as_deref()
            .map(parse_server_addr)
            .transpose()
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_listen_addr()?;
        self.parse_server()?;

        if self.detection.timeout_secs == 0 {
            anyhow::bail!("Detection timeout must be at least 1 second");
        }

        if self.detection.update_interval_ms == 0 || self.detection.update_interval_ms > 10_000 {
            anyhow::bail!("Update interval must be between 1 and 10000 ms");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}

/// Parse a detection server address (`ip:port`)
///
/// # Errors
///
/// Returns an error for anything but an IP socket address with a non-zero
/// port.
pub fn parse_server_addr(server: &str) -> anyhow::Result<SocketAddr> {
    let addr: SocketAddr = server
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid server address '{}' (expected ip:port)", server))?;
    if addr.port() == 0 {
        anyhow::bail!("Server '{}' has invalid port: 0", server);
    }
    Ok(addr)
}
