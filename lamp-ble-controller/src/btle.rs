//! btleplug implementations of the scanner and resolver seams

use std::pin::Pin;

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{ConnectionError, DiscoveryError, ProtocolError};
use crate::resolver::GattPeripheral;
use crate::scanner::{DiscoveredPeripheral, ScanError, ScanEvent, ScanSource};

impl From<btleplug::Error> for DiscoveryError {
    fn from(e: btleplug::Error) -> Self {
        DiscoveryError::Platform(e.to_string())
    }
}

impl From<btleplug::Error> for ProtocolError {
    fn from(e: btleplug::Error) -> Self {
        ProtocolError::Platform(e.to_string())
    }
}

impl From<btleplug::Error> for ConnectionError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::TimedOut(_) => ConnectionError::Timeout,
            btleplug::Error::NotConnected => ConnectionError::Disconnected,
            e => ConnectionError::Platform(e.to_string()),
        }
    }
}

/// Get the default Bluetooth adapter
pub async fn default_adapter() -> Result<Adapter, DiscoveryError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(DiscoveryError::NoAdapter)
}

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Scan events from a btleplug adapter
pub struct AdapterScanSource {
    adapter: Adapter,
    events: Option<EventStream>,
}

impl AdapterScanSource {
    pub fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            events: None,
        }
    }

    async fn describe(
        &self,
        id: &PeripheralId,
    ) -> Result<Option<DiscoveredPeripheral<Peripheral>>, btleplug::Error> {
        let peripheral = self.adapter.peripheral(id).await?;
        let Some(props) = peripheral.properties().await? else {
            return Ok(None);
        };
        Ok(Some(DiscoveredPeripheral {
            id: peripheral.address().to_string(),
            advertised_name: props.local_name,
            // btleplug only reports low energy devices
            is_low_energy: true,
            handle: peripheral,
        }))
    }
}

impl ScanSource for AdapterScanSource {
    type Peripheral = Peripheral;

    async fn start_scan(&mut self) -> Result<(), DiscoveryError> {
        self.events = Some(self.adapter.events().await?);
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), DiscoveryError> {
        self.events = None;
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ScanEvent<Peripheral>> {
        loop {
            let event = self.events.as_mut()?.next().await;
            match event {
                None => {
                    self.events = None;
                    return Some(ScanEvent::Finished);
                }
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    match self.describe(&id).await {
                        Ok(Some(peripheral)) => return Some(ScanEvent::Discovered(peripheral)),
                        Ok(None) => continue,
                        Err(e) => return Some(ScanEvent::Error(ScanError::Io(e.to_string()))),
                    }
                }
                Some(CentralEvent::StateUpdate(CentralState::PoweredOff)) => {
                    self.events = None;
                    return Some(ScanEvent::Error(ScanError::PoweredOff));
                }
                Some(_) => continue,
            }
        }
    }
}

/// A lamp reached through btleplug
///
/// Services are discovered once and shared by every lookup.
pub struct BtlePeripheral {
    peripheral: Peripheral,
    discovered: OnceCell<()>,
}

impl BtlePeripheral {
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            discovered: OnceCell::new(),
        }
    }

    async fn discover(&self) -> Result<(), btleplug::Error> {
        self.discovered
            .get_or_try_init(|| self.peripheral.discover_services())
            .await
            .map(|_| ())
    }

    fn find(&self, uuid: Uuid) -> Result<Characteristic, ProtocolError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| ProtocolError::Platform(format!("characteristic {uuid} not found")))
    }
}

impl GattPeripheral for BtlePeripheral {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_service(&self, service: Uuid) -> Result<Option<Vec<Uuid>>, DiscoveryError> {
        self.discover().await?;
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics.iter().map(|c| c.uuid).collect()))
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, ProtocolError> {
        let characteristic = self.find(characteristic)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write_without_response(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), ProtocolError> {
        let characteristic = self.find(characteristic)?;
        self.peripheral
            .write(&characteristic, value, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }
}
