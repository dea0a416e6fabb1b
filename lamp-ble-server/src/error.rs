use std::path::PathBuf;

use uuid::Uuid;

/// Problems with the persisted device record or the server configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("device record not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to access device files: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed device record {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("{field} must be at most {max} bytes and must not contain ',' or line breaks")]
    InvalidField { field: &'static str, max: usize },
    #[error("network interface not found: {0}")]
    InterfaceNotFound(String),
    #[error("could not determine home directory, set LAMP_HOME")]
    NoHome,
    #[error("invalid configuration file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Error reported by the platform BLE stack
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for BackendError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

/// Invalid service definition or refused registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("no services to register")]
    NoServices,
    #[error("service {0} has no characteristics")]
    EmptyService(Uuid),
    #[error("characteristic {uuid}: value length {len} outside [{min}, {max}]")]
    InvalidLength {
        uuid: Uuid,
        len: usize,
        min: usize,
        max: usize,
    },
    #[error("failed to register services: {0}")]
    Backend(#[from] BackendError),
}

/// Failure to put provisioned WiFi settings into effect
#[derive(Debug, thiserror::Error)]
pub enum WifiError {
    #[error("no SSID has been provisioned")]
    NoSsid,
    #[error("failed to write wpa_supplicant configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("wpa_cli did not accept the new configuration: {0:?}")]
    Refused(String),
}
