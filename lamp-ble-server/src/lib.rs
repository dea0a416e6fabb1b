//! Lamp BLE server
//!
//! Runs on the lamp itself and exposes two GATT services:
//! - device info: name (read/write) and WiFi MAC address (read-only)
//! - device network: WiFi SSID and password (read/write)
//!
//! Values are backed by a [`DeviceRecord`] on disk. The platform stack sits
//! behind [`PeripheralBackend`]; the BlueZ implementation is in [`bluez`].
//! Provisioned WiFi settings can optionally be applied with [`WifiApplier`].

#[cfg(target_os = "linux")]
pub mod bluez;
pub mod config;
pub mod error;
pub mod event_log;
pub mod peripheral;
pub mod record;
pub mod registry;
pub mod wifi;

pub use config::{ServerConfig, lamp_home};
pub use error::{BackendError, ConfigError, RegistrationError, WifiError};
pub use event_log::ConnectionEventLog;
pub use peripheral::{
    AdvertisingData, ControllerState, PeripheralBackend, PeripheralController, PeripheralEvent,
};
pub use record::{DeviceRecord, Persistence};
pub use registry::{
    CharacteristicDescriptor, ServiceDescriptor, build_info_service, build_network_service,
    build_services,
};
pub use wifi::WifiApplier;
