//! Server configuration - stored in LAMP_HOME

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::record::Persistence;
use crate::wifi::WifiApplier;

/// Name of the device record file inside LAMP_HOME
pub const RECORD_FILE: &str = "device.info";

/// Name of the configuration file inside LAMP_HOME
pub const CONFIG_FILE: &str = "rpi-ble-srv.json";

/// Get LAMP_HOME, falling back to the user's home directory
pub fn lamp_home() -> Result<PathBuf, ConfigError> {
    match std::env::var_os("LAMP_HOME") {
        Some(home) => Ok(PathBuf::from(home)),
        None => dirs::home_dir().ok_or(ConfigError::NoHome),
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Local name put in the advertising payload
    pub advertised_name: String,
    /// Wireless interface the device MAC is read from on first run
    pub interface: String,
    /// When record changes hit the disk
    pub persistence: Persistence,
    /// wpa_supplicant.conf to rewrite with provisioned WiFi settings.
    /// Unset leaves the system's WiFi alone.
    pub wpa_supplicant: Option<PathBuf>,
    /// Regulatory country written into wpa_supplicant.conf
    pub wifi_country: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            advertised_name: lamp_proto::ble::ADVERTISED_NAME.to_string(),
            interface: "wlan0".to_string(),
            persistence: Persistence::WriteThrough,
            wpa_supplicant: None,
            wifi_country: "US".to_string(),
        }
    }
}

impl ServerConfig {
    /// How provisioned WiFi settings get applied, if they do
    pub fn wifi_applier(&self) -> Option<WifiApplier> {
        let conf_path = self.wpa_supplicant.as_ref()?;
        let mut wifi = WifiApplier::new(conf_path, &self.interface);
        wifi.country = self.wifi_country.clone();
        Some(wifi)
    }

    /// Load the configuration, writing the defaults if the file is missing
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str(&data).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let data = serde_json::to_string_pretty(&config).map_err(|source| {
                ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            fs::write(path, data)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lamp-config-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn defaults_are_written_on_first_load() {
        let dir = scratch("defaults");
        let path = dir.join(CONFIG_FILE);

        let config = ServerConfig::load_or_create(&path).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(path.exists());
        assert_eq!(ServerConfig::load_or_create(&path).unwrap(), config);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = scratch("partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, r#"{ "persistence": "deferred" }"#).unwrap();

        let config = ServerConfig::load_or_create(&path).unwrap();
        assert_eq!(config.persistence, Persistence::Deferred);
        assert_eq!(config.advertised_name, "LampSrv");
        assert_eq!(config.interface, "wlan0");
        assert_eq!(config.wifi_applier(), None);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn wifi_applier_follows_the_config() {
        let dir = scratch("wifi");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{ "interface": "wlan1", "wpa_supplicant": "/tmp/wpa.conf", "wifi_country": "GB" }"#,
        )
        .unwrap();

        let wifi = ServerConfig::load_or_create(&path).unwrap().wifi_applier().unwrap();
        assert_eq!(wifi.conf_path, PathBuf::from("/tmp/wpa.conf"));
        assert_eq!(wifi.interface, "wlan1");
        assert_eq!(wifi.country, "GB");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn broken_json_is_an_error() {
        let dir = scratch("broken");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            ServerConfig::load_or_create(&path),
            Err(ConfigError::Json { .. })
        ));

        fs::remove_dir_all(dir).unwrap();
    }
}
