//! Configuration loading and validation for the federation monitor

use federation::types::{DEFAULT_FEDERATION_PORT, DiscoveryConfig, Retention, SweepConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matrix: MatrixSettings,

    #[serde(default)]
    pub sweep: SweepSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.matrix.validate()?;
        self.sweep.validate()?;
        self.discovery.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

/// Homeserver account used to enumerate groups and members
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MatrixSettings {
    #[validate(custom = "validate_homeserver")]
    pub homeserver: String,

    #[validate(custom = "validate_user_id")]
    pub username: String,

    #[validate(length(min = 1))]
    pub password: String,

    /// Room that is never swept
    pub control_room: Option<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub request_timeout: Duration,
}

/// Sweep scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SweepSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_sweep_interval")]
    pub interval: Duration,

    #[validate(range(min = 1, max = 10000))]
    pub max_concurrent_checks: usize,

    pub retention: Retention,
}

/// Address discovery and probe settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiscoverySettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub well_known_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub dns_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub probe_timeout: Duration,

    #[validate(range(min = 1))]
    pub default_port: u16,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for MatrixSettings {
    fn default() -> Self {
        Self {
            homeserver: String::new(),
            username: String::new(),
            password: String::new(),
            control_room: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrent_checks: 64,
            retention: Retention::Retain,
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            well_known_timeout: Duration::from_secs(5),
            dns_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
            default_port: DEFAULT_FEDERATION_PORT,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6000".to_string(),
        }
    }
}

// Custom validators

fn validate_homeserver(url: &str) -> Result<(), ValidationError> {
    let trimmed = url.trim();
    if !trimmed.starts_with("https://") && !trimmed.starts_with("http://") {
        return Err(ValidationError::new("homeserver_invalid_scheme"));
    }
    Ok(())
}

fn validate_user_id(user: &str) -> Result<(), ValidationError> {
    crate::matrix::parse_user_id(user)
        .map(|_| ())
        .map_err(|_| ValidationError::new("username_invalid_format"))
}

fn validate_sweep_interval(interval: &Duration) -> Result<(), ValidationError> {
    let secs = interval.as_secs();
    if !(1..=86_400).contains(&secs) {
        return Err(ValidationError::new("sweep_interval_out_of_range"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(100..=120_000).contains(&millis) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<std::net::SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `path`, or from the default search paths
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::find_config_file) {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => Err(ConfigError::FileNotFound),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/federation-monitor/config.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./config.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/federation-monitor/config.yaml"))
    }

    /// Convert to the scheduler's configuration
    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: self.sweep.interval,
            max_concurrent_checks: self.sweep.max_concurrent_checks,
            control_group: self.matrix.control_room.clone(),
            retention: self.sweep.retention,
        }
    }

    /// Convert to the resolver and probe configuration
    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            well_known_timeout: self.discovery.well_known_timeout,
            dns_timeout: self.discovery.dns_timeout,
            probe_timeout: self.discovery.probe_timeout,
            default_port: self.discovery.default_port,
        }
    }
}
