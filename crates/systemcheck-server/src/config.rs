//! Configuration loading and validation for systemcheck server

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use systemcheck::SystemConfig;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

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
    pub http: HttpSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub defaults: DefaultSettings,

    #[serde(default)]
    pub systems: Vec<SystemSettings>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.http.validate()?;
        self.defaults.validate()?;

        let mut names = HashSet::new();
        for system in &self.systems {
            system.validate()?;
            if !names.insert(system.name.as_str()) {
                let mut errors = ValidationErrors::new();
                let mut err = ValidationError::new("duplicate_system_name");
                err.add_param("name".into(), &system.name);
                errors.add("systems", err);
                return Err(errors);
            }
        }
        Ok(())
    }
}

/// Status/metrics HTTP endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    #[validate(length(min = 1), custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

/// Defaults applied to systems that do not override them
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DefaultSettings {
    #[serde(with = "humantime_serde")]
    pub threshold_window: Duration,

    #[validate(range(min = 1, max = 10000))]
    pub buffer_size: usize,

    #[serde(with = "humantime_serde")]
    pub escalation_penalty: Duration,
}

/// One monitored system
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SystemSettings {
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[serde(default, with = "humantime_serde")]
    pub threshold_window: Option<Duration>,

    #[validate(range(min = 1, max = 10000))]
    pub buffer_size: Option<usize>,

    #[serde(default, with = "humantime_serde")]
    pub escalation_penalty: Option<Duration>,

    #[validate(custom = "validate_probe")]
    pub probe: ProbeSettings,
}

/// Built-in probe definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeSettings {
    /// TCP connect to `host:port`
    Tcp {
        address: String,
        #[serde(with = "humantime_serde", default = "default_probe_timeout")]
        timeout: Duration,
    },

    /// HTTP request with expected status codes
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default)]
        expected_codes: Vec<u16>,
        /// Response body must contain this text, e.g. `"status":"green"`
        #[serde(default)]
        body_contains: Option<String>,
        #[serde(with = "humantime_serde", default = "default_probe_timeout")]
        timeout: Duration,
    },

    /// Hostname resolution, optionally to expected addresses
    Dns {
        query: String,
        #[serde(default)]
        expected_ips: Vec<std::net::IpAddr>,
        #[serde(with = "humantime_serde", default = "default_probe_timeout")]
        timeout: Duration,
    },
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_http_method() -> String {
    "GET".to_string()
}

// Default implementations

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9890".to_string(),
        }
    }
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            threshold_window: systemcheck::types::DEFAULT_THRESHOLD_WINDOW,
            buffer_size: systemcheck::types::DEFAULT_BUFFER_SIZE,
            escalation_penalty: systemcheck::types::DEFAULT_ESCALATION_PENALTY,
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    match addr.trim().rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ValidationError::new("listen_addr_invalid_format")),
    }
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() {
        return Err(ValidationError::new("interval_must_be_positive"));
    }
    Ok(())
}

fn validate_probe(probe: &ProbeSettings) -> Result<(), ValidationError> {
    match probe {
        ProbeSettings::Tcp { address, timeout } => {
            if address.trim().rsplit_once(':').is_none() {
                return Err(ValidationError::new("tcp_address_missing_port"));
            }
            validate_timeout(timeout)
        }
        ProbeSettings::Http {
            url,
            method,
            expected_codes,
            timeout,
            ..
        } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::new("http_url_invalid_scheme"));
            }
            if reqwest::Method::from_bytes(method.to_uppercase().as_bytes()).is_err() {
                return Err(ValidationError::new("http_method_invalid"));
            }
            if expected_codes.iter().any(|code| !(100..=599).contains(code)) {
                return Err(ValidationError::new("http_status_code_out_of_range"));
            }
            validate_timeout(timeout)
        }
        ProbeSettings::Dns { query, timeout, .. } => {
            if query.trim().is_empty() {
                return Err(ValidationError::new("dns_query_empty"));
            }
            validate_timeout(timeout)
        }
    }
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/systemcheck/systemcheck-server.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./systemcheck-server.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/systemcheck/systemcheck-server.yaml"))
    }
}

impl SystemSettings {
    /// Resolve the registry configuration, filling gaps from `defaults`.
    pub fn to_system_config(&self, defaults: &DefaultSettings) -> SystemConfig {
        SystemConfig::new(self.interval)
            .with_threshold_window(self.threshold_window.unwrap_or(defaults.threshold_window))
            .with_buffer_size(self.buffer_size.unwrap_or(defaults.buffer_size))
            .with_escalation_penalty(self.escalation_penalty.unwrap_or(defaults.escalation_penalty))
    }
}
