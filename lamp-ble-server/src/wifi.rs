//! Applying provisioned WiFi settings
//!
//! After a central has written a new SSID or password the lamp rewrites its
//! `wpa_supplicant.conf` and asks `wpa_cli` to reload it. This only happens
//! when a configuration path is set; otherwise the values just live in the
//! device record.

use std::path::{Path, PathBuf};

use crate::error::WifiError;

/// Where the lamp's WiFi settings go and how to reload them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiApplier {
    pub conf_path: PathBuf,
    pub interface: String,
    pub country: String,
    pub wpa_cli: PathBuf,
}

impl WifiApplier {
    pub fn new(conf_path: impl Into<PathBuf>, interface: &str) -> Self {
        Self {
            conf_path: conf_path.into(),
            interface: interface.to_string(),
            country: "US".to_string(),
            wpa_cli: PathBuf::from("/sbin/wpa_cli"),
        }
    }

    /// Write the configuration for `ssid` and reload the interface
    pub async fn apply(&self, ssid: &str, password: &str) -> Result<(), WifiError> {
        if ssid.is_empty() {
            return Err(WifiError::NoSsid);
        }
        write_conf(&self.conf_path, &render_wpa_supplicant(&self.country, ssid, password)).await?;
        tracing::info!(path = %self.conf_path.display(), %ssid, "wrote wpa_supplicant configuration");
        self.reconfigure().await
    }

    async fn reconfigure(&self) -> Result<(), WifiError> {
        let output = tokio::process::Command::new(&self.wpa_cli)
            .args(["-i", &self.interface, "reconfigure"])
            .output()
            .await
            .map_err(|source| WifiError::Spawn {
                program: self.wpa_cli.clone(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || stdout.trim() != "OK" {
            return Err(WifiError::Refused(stdout.trim().to_string()));
        }
        tracing::info!(interface = %self.interface, "wpa_supplicant reconfigured");
        Ok(())
    }
}

/// Configuration for a single network; an empty password means an open one
pub fn render_wpa_supplicant(country: &str, ssid: &str, password: &str) -> String {
    let key = if password.is_empty() {
        "    key_mgmt=NONE\n".to_string()
    } else {
        format!("    psk=\"{password}\"\n")
    };
    format!(
        "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n\
         update_config=1\n\
         country={country}\n\
         \n\
         network={{\n    ssid=\"{ssid}\"\n{key}}}\n"
    )
}

async fn write_conf(path: &Path, contents: &str) -> Result<(), WifiError> {
    let tmp = path.with_extension("conf.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
