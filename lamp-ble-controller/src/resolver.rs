//! Resolving the services of a connected lamp
//!
//! After connecting, the info and network services are discovered side by
//! side, each bounded by its own timeout. A service that is missing, times
//! out or has an invalid characteristic is reported on its own and doesn't
//! stop the other one. [`ResolverEvent::Ready`] is sent by whichever flow
//! completes last, and only if every service completed.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use lamp_proto::ble::{CharacteristicRole, ServiceKind};
use lamp_proto::mac_from_bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ConnectionError, DiscoveryError, ProtocolError};

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected peripheral as the resolver needs it
#[allow(async_fn_in_trait)]
pub trait GattPeripheral {
    async fn connect(&self) -> Result<(), ConnectionError>;

    async fn disconnect(&self) -> Result<(), ConnectionError>;

    /// Characteristic UUIDs of `service`, `None` if the device doesn't have it
    async fn discover_service(&self, service: Uuid) -> Result<Option<Vec<Uuid>>, DiscoveryError>;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, ProtocolError>;

    async fn write_without_response(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), ProtocolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Connecting,
    ServiceDiscovery,
    CharacteristicValidation,
    Ready,
    PartialFailure,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    DiscoveryRequired,
    Discovering,
    Discovered,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverEvent {
    ServiceDiscovered(ServiceKind),
    ServiceMissing(ServiceKind),
    CharacteristicError(CharacteristicRole),
    Ready,
}

impl ResolverEvent {
    fn log(&self) {
        match self {
            ResolverEvent::ServiceDiscovered(kind) => tracing::info!(service = %kind, "service discovered"),
            ResolverEvent::ServiceMissing(kind) => tracing::warn!(service = %kind, "service not found"),
            ResolverEvent::CharacteristicError(role) => {
                tracing::warn!(characteristic = %role, "characteristic is invalid")
            }
            ResolverEvent::Ready => tracing::info!("all services ready"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready,
    PartialFailure {
        missing_services: Vec<ServiceKind>,
        invalid_characteristics: Vec<CharacteristicRole>,
    },
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCharacteristic {
    pub uuid: Uuid,
    pub role: CharacteristicRole,
    pub is_valid: bool,
    pub value: Vec<u8>,
}

#[derive(Debug)]
struct Progress {
    state: ResolverState,
    phases: BTreeMap<ServiceKind, ServicePhase>,
    completed: usize,
    characteristics: BTreeMap<CharacteristicRole, ResolvedCharacteristic>,
}

pub struct CentralServiceResolver<P> {
    peripheral: P,
    events: mpsc::UnboundedSender<ResolverEvent>,
    discovery_timeout: Duration,
    progress: Mutex<Progress>,
}

impl<P: GattPeripheral> CentralServiceResolver<P> {
    pub fn new(peripheral: P, events: mpsc::UnboundedSender<ResolverEvent>) -> Self {
        Self {
            peripheral,
            events,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            progress: Mutex::new(Progress {
                state: ResolverState::Idle,
                phases: BTreeMap::new(),
                completed: 0,
                characteristics: BTreeMap::new(),
            }),
        }
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ResolverState {
        self.progress().state
    }

    pub fn service_phase(&self, kind: ServiceKind) -> ServicePhase {
        self.progress()
            .phases
            .get(&kind)
            .copied()
            .unwrap_or(ServicePhase::DiscoveryRequired)
    }

    pub fn characteristic(&self, role: CharacteristicRole) -> Option<ResolvedCharacteristic> {
        self.progress().characteristics.get(&role).cloned()
    }

    fn set_state(&self, state: ResolverState) {
        self.progress().state = state;
    }

    fn set_phase(&self, kind: ServiceKind, phase: ServicePhase) {
        self.progress().phases.insert(kind, phase);
    }

    fn emit(&self, event: ResolverEvent) {
        event.log();
        // the receiver may be gone, the resolver keeps working without it
        let _ = self.events.send(event);
    }

    /// Connect and resolve every lamp service
    pub async fn connect(&self) -> Result<Resolution, ConnectionError> {
        {
            let mut progress = self.progress();
            progress.state = ResolverState::Connecting;
            progress.completed = 0;
            progress.characteristics.clear();
            progress.phases = ServiceKind::ALL
                .into_iter()
                .map(|kind| (kind, ServicePhase::DiscoveryRequired))
                .collect();
        }

        if let Err(e) = self.peripheral.connect().await {
            self.set_state(ResolverState::Disconnected);
            return Err(e);
        }
        tracing::debug!("connected, discovering services");

        self.set_state(ResolverState::ServiceDiscovery);
        futures::future::join_all(ServiceKind::ALL.map(|kind| self.resolve_service(kind))).await;

        Ok(self.finish())
    }

    async fn resolve_service(&self, kind: ServiceKind) {
        self.set_phase(kind, ServicePhase::Discovering);

        let discovered =
            tokio::time::timeout(self.discovery_timeout, self.peripheral.discover_service(kind.uuid()))
                .await;
        let uuids = match discovered {
            Ok(Ok(Some(uuids))) => uuids,
            Ok(Ok(None)) => return self.service_missing(kind),
            Ok(Err(e)) => {
                tracing::warn!(service = %kind, error = %e, "service discovery failed");
                return self.service_missing(kind);
            }
            Err(_) => {
                tracing::warn!(service = %kind, "service discovery timed out");
                return self.service_missing(kind);
            }
        };

        self.set_phase(kind, ServicePhase::Discovered);
        self.emit(ResolverEvent::ServiceDiscovered(kind));
        {
            let mut progress = self.progress();
            if progress.state == ResolverState::ServiceDiscovery {
                progress.state = ResolverState::CharacteristicValidation;
            }
        }

        let mut complete = true;
        for role in kind.characteristics() {
            let resolved = self.validate_characteristic(*role, &uuids).await;
            let is_valid = resolved.is_valid;
            self.progress().characteristics.insert(*role, resolved);
            if !is_valid {
                self.emit(ResolverEvent::CharacteristicError(*role));
                complete = false;
            }
        }
        if !complete {
            return;
        }

        let all_done = {
            let mut progress = self.progress();
            progress.completed += 1;
            progress.completed == ServiceKind::ALL.len()
        };
        if all_done {
            self.emit(ResolverEvent::Ready);
        }
    }

    fn service_missing(&self, kind: ServiceKind) {
        self.set_phase(kind, ServicePhase::Missing);
        self.emit(ResolverEvent::ServiceMissing(kind));
    }

    async fn validate_characteristic(
        &self,
        role: CharacteristicRole,
        uuids: &[Uuid],
    ) -> ResolvedCharacteristic {
        let mut resolved = ResolvedCharacteristic {
            uuid: role.uuid(),
            role,
            is_valid: false,
            value: Vec::new(),
        };
        if !uuids.contains(&role.uuid()) {
            return resolved;
        }

        match self.peripheral.read(role.uuid()).await {
            Ok(value) => {
                let (min, max) = role.length_bounds();
                resolved.is_valid = min <= value.len() && value.len() <= max;
                if !resolved.is_valid {
                    tracing::warn!(characteristic = %role, len = value.len(), "unexpected value length");
                }
                resolved.value = value;
            }
            Err(e) => tracing::warn!(characteristic = %role, error = %e, "initial read failed"),
        }
        resolved
    }

    fn finish(&self) -> Resolution {
        let mut progress = self.progress();
        if progress.completed == ServiceKind::ALL.len() {
            progress.state = ResolverState::Ready;
            return Resolution::Ready;
        }

        progress.state = ResolverState::PartialFailure;
        let missing_services = progress
            .phases
            .iter()
            .filter(|(_, phase)| **phase == ServicePhase::Missing)
            .map(|(kind, _)| *kind)
            .collect();
        let invalid_characteristics = progress
            .characteristics
            .values()
            .filter(|c| !c.is_valid)
            .map(|c| c.role)
            .collect();
        Resolution::PartialFailure {
            missing_services,
            invalid_characteristics,
        }
    }

    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.set_state(ResolverState::Disconnected);
        self.peripheral.disconnect().await
    }

    fn ensure_valid(&self, role: CharacteristicRole) -> Result<Uuid, ProtocolError> {
        match self.progress().characteristics.get(&role) {
            Some(c) if c.is_valid => Ok(c.uuid),
            _ => Err(ProtocolError::NotReady(role)),
        }
    }

    /// Last value read or written, without touching the device
    pub fn cached(&self, role: CharacteristicRole) -> Option<Vec<u8>> {
        self.progress()
            .characteristics
            .get(&role)
            .filter(|c| c.is_valid)
            .map(|c| c.value.clone())
    }

    /// Read the current value from the device
    pub async fn read(&self, role: CharacteristicRole) -> Result<Vec<u8>, ProtocolError> {
        let uuid = self.ensure_valid(role)?;
        let value = self.peripheral.read(uuid).await?;
        if let Some(c) = self.progress().characteristics.get_mut(&role) {
            c.value = value.clone();
        }
        Ok(value)
    }

    /// Write a value. Read-only and oversize values never reach the device.
    pub async fn write(&self, role: CharacteristicRole, value: &[u8]) -> Result<(), ProtocolError> {
        if !role.access().is_writable() {
            return Err(ProtocolError::ReadOnly(role));
        }
        let max = role.max_length();
        if value.len() > max {
            return Err(ProtocolError::ValueTooLong {
                role,
                len: value.len(),
                max,
            });
        }
        let uuid = self.ensure_valid(role)?;

        self.peripheral.write_without_response(uuid, value).await?;
        if let Some(c) = self.progress().characteristics.get_mut(&role) {
            c.value = value.to_vec();
        }
        Ok(())
    }

    async fn read_text(&self, role: CharacteristicRole) -> Result<String, ProtocolError> {
        let value = self.read(role).await?;
        String::from_utf8(value).map_err(|_| ProtocolError::InvalidUtf8(role))
    }

    /// MAC address as `xx:xx:xx:xx:xx:xx`
    pub async fn read_device_mac(&self) -> Result<String, ProtocolError> {
        let value = self.read(CharacteristicRole::DeviceMac).await?;
        Ok(mac_from_bytes(&value)?)
    }

    pub async fn read_device_name(&self) -> Result<String, ProtocolError> {
        self.read_text(CharacteristicRole::DeviceName).await
    }

    pub async fn read_network_ssid(&self) -> Result<String, ProtocolError> {
        self.read_text(CharacteristicRole::NetworkSsid).await
    }

    pub async fn read_network_password(&self) -> Result<String, ProtocolError> {
        self.read_text(CharacteristicRole::NetworkPassword).await
    }

    pub async fn set_device_name(&self, name: &str) -> Result<(), ProtocolError> {
        self.write(CharacteristicRole::DeviceName, name.as_bytes()).await
    }

    /// Write both network values, checking both lengths first
    pub async fn set_network(&self, ssid: &str, password: &str) -> Result<(), ProtocolError> {
        for (role, value) in [
            (CharacteristicRole::NetworkSsid, ssid),
            (CharacteristicRole::NetworkPassword, password),
        ] {
            if value.len() > role.max_length() {
                return Err(ProtocolError::ValueTooLong {
                    role,
                    len: value.len(),
                    max: role.max_length(),
                });
            }
        }
        self.write(CharacteristicRole::NetworkSsid, ssid.as_bytes()).await?;
        self.write(CharacteristicRole::NetworkPassword, password.as_bytes())
            .await
    }
}
