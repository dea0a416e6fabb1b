//! BlueZ peripheral backend (Linux)
//!
//! Services are served as one GATT application; dropping the application
//! and advertisement handles unregisters them. BlueZ gives no connect or
//! disconnect callback for a local GATT server, so connection changes are
//! found by polling the adapter's device list.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluer::adv::{Advertisement, AdvertisementHandle};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicReadRequest,
    CharacteristicWrite, CharacteristicWriteMethod, CharacteristicWriteRequest, ReqError, Service,
};
use bluer::{Adapter, Session};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::BackendError;
use crate::peripheral::{AdvertisingData, PeripheralBackend, PeripheralEvent};
use crate::record::storable_text;
use crate::registry::{CharacteristicDescriptor, ServiceDescriptor};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

impl From<bluer::Error> for BackendError {
    fn from(e: bluer::Error) -> Self {
        BackendError(e.to_string())
    }
}

pub struct BluezBackend {
    adapter: Adapter,
    events: mpsc::Sender<PeripheralEvent>,
    app: Option<ApplicationHandle>,
    adv: Option<AdvertisementHandle>,
    monitor: JoinHandle<()>,
}

impl BluezBackend {
    /// Open the default adapter, power it on and start watching connections
    pub async fn new(events: mpsc::Sender<PeripheralEvent>) -> Result<Self, BackendError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        if !adapter.is_powered().await? {
            tracing::info!(adapter = adapter.name(), "powering on adapter");
            adapter.set_powered(true).await?;
        }
        tracing::info!(adapter = adapter.name(), address = %adapter.address().await?, "using adapter");

        let monitor = tokio::spawn(watch_connections(adapter.clone(), events.clone()));
        Ok(Self {
            adapter,
            events,
            app: None,
            adv: None,
            monitor,
        })
    }
}

impl Drop for BluezBackend {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

impl PeripheralBackend for BluezBackend {
    async fn register_services(
        &mut self,
        services: &[ServiceDescriptor],
        session: u64,
    ) -> Result<(), BackendError> {
        let services = services
            .iter()
            .map(|service| Service {
                uuid: service.uuid,
                primary: true,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| characteristic(c, session, self.events.clone()))
                    .collect(),
                ..Default::default()
            })
            .collect();

        let app = Application {
            services,
            ..Default::default()
        };
        self.app = Some(self.adapter.serve_gatt_application(app).await?);
        tracing::debug!(session, "GATT application registered");
        Ok(())
    }

    async fn unregister_services(&mut self) {
        if self.app.take().is_some() {
            tracing::debug!("GATT application unregistered");
        }
    }

    async fn start_advertising(&mut self, data: &AdvertisingData) -> Result<(), BackendError> {
        let adv = Advertisement {
            advertisement_type: bluer::adv::Type::Peripheral,
            service_uuids: data.service_uuids.iter().copied().collect(),
            discoverable: Some(true),
            local_name: Some(data.local_name.clone()),
            ..Default::default()
        };
        self.adv = Some(self.adapter.advertise(adv).await?);
        Ok(())
    }

    async fn stop_advertising(&mut self) {
        if self.adv.take().is_some() {
            tracing::debug!("advertisement removed");
        }
    }
}

fn characteristic(
    descriptor: &CharacteristicDescriptor,
    session: u64,
    events: mpsc::Sender<PeripheralEvent>,
) -> Characteristic {
    let value = Arc::new(Mutex::new(descriptor.initial_value.clone()));

    let read = {
        let value = value.clone();
        CharacteristicRead {
            read: true,
            fun: Box::new(move |_req: CharacteristicReadRequest| {
                let value = value.clone();
                Box::pin(async move {
                    let value = value.lock().map_err(|_| ReqError::Failed)?;
                    Ok(value.clone())
                })
            }),
            ..Default::default()
        }
    };

    let write = descriptor.access.is_writable().then(|| {
        let uuid = descriptor.uuid;
        let (min, max) = (descriptor.min_length, descriptor.max_length);
        CharacteristicWrite {
            write: true,
            write_without_response: true,
            method: CharacteristicWriteMethod::Fun(Box::new(
                move |data: Vec<u8>, _req: CharacteristicWriteRequest| {
                    let value = value.clone();
                    let events = events.clone();
                    Box::pin(async move {
                        check_write(uuid, &data, min, max)?;
                        *value.lock().map_err(|_| ReqError::Failed)? = data.clone();
                        events
                            .send(PeripheralEvent::CharacteristicWritten {
                                session,
                                uuid,
                                value: data,
                            })
                            .await
                            .map_err(|_| ReqError::Failed)
                    })
                },
            )),
            ..Default::default()
        }
    });

    Characteristic {
        uuid: descriptor.uuid,
        read: Some(read),
        write,
        ..Default::default()
    }
}

/// Refuse writes the record would reject, so the read cache never serves
/// a value that isn't stored
fn check_write(uuid: Uuid, data: &[u8], min: usize, max: usize) -> Result<(), ReqError> {
    if data.len() < min || data.len() > max {
        tracing::warn!(%uuid, len = data.len(), max, "write has invalid length");
        return Err(ReqError::InvalidValueLength);
    }
    if storable_text(data).is_none() {
        tracing::warn!(%uuid, "write is not a storable text value");
        return Err(ReqError::Failed);
    }
    Ok(())
}

async fn any_connected(adapter: &Adapter) -> bluer::Result<bool> {
    for address in adapter.device_addresses().await? {
        let Ok(device) = adapter.device(address) else {
            continue;
        };
        if device.is_connected().await.unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn watch_connections(adapter: Adapter, events: mpsc::Sender<PeripheralEvent>) {
    let mut connected = false;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let now = match any_connected(&adapter).await {
            Ok(now) => now,
            Err(e) => {
                tracing::error!(error = %e, "failed to query connected devices");
                continue;
            }
        };
        if now == connected {
            continue;
        }
        connected = now;

        let event = if connected {
            PeripheralEvent::ClientConnected
        } else {
            PeripheralEvent::ClientDisconnected
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamp_proto::ble::DEVICE_NAME_UUID;

    #[test]
    fn unstorable_writes_are_refused() {
        let ok = |data: &[u8]| check_write(DEVICE_NAME_UUID, data, 0, 64).is_ok();
        assert!(ok(b"Desk"));
        assert!(ok(b""));
        assert!(!ok(b"a,b"));
        assert!(!ok(b"line\nbreak"));
        assert!(!ok(b"\xff"));
        assert!(matches!(
            check_write(DEVICE_NAME_UUID, &[b'x'; 65], 0, 64),
            Err(ReqError::InvalidValueLength)
        ));
    }
}
