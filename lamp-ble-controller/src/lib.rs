//! Lamp BLE Controller
//!
//! Central side of lamp setup: find a lamp by its advertised name, resolve
//! its info and network services, then read and write them.
//!
//! # Example
//!
//! ```ignore
//! use lamp_ble_controller::{
//!     btle, CentralScanner, CentralServiceResolver, DEFAULT_SEARCH_TIMEOUT, SearchOutcome,
//! };
//!
//! let mut source = btle::AdapterScanSource::new(btle::default_adapter().await?);
//! let scanner = CentralScanner::new();
//! let outcome = scanner.start_search(&mut source, "LampSrv", DEFAULT_SEARCH_TIMEOUT).await?;
//! if let SearchOutcome::DeviceFound(found) = outcome {
//!     let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//!     let resolver = CentralServiceResolver::new(btle::BtlePeripheral::new(found.handle), tx);
//!     resolver.connect().await?;
//!     println!("{}", resolver.read_device_mac().await?);
//! }
//! ```

pub mod btle;
pub mod error;
pub mod resolver;
pub mod scanner;

pub use error::{ConnectionError, DiscoveryError, Error, ProtocolError};
pub use resolver::{
    CentralServiceResolver, GattPeripheral, Resolution, ResolvedCharacteristic, ResolverEvent,
    ResolverState, ServicePhase,
};
pub use scanner::{
    CentralScanner, DEFAULT_SEARCH_TIMEOUT, DiscoveredPeripheral, ScanError, ScanEvent,
    ScanSource, SearchOutcome,
};
