//! Peripheral controller
//!
//! Owns the GATT services and the advertisement. Lifecycle:
//!
//! ```text
//! Idle -> Advertising -> Connected -> Disconnected -> Advertising ...
//!            \-> AdvertisingFailed
//! ```
//!
//! Only one central is served at a time: advertising stops on connect and
//! the services are torn down and registered again, with values reloaded
//! from the record, once it disconnects. Every registration gets a new
//! session id, and writes carrying an older session id are dropped.
//!
//! When the platform refuses a registration the controller sits in
//! `AdvertisingFailed` and [`PeripheralController::run`] retries with a
//! growing delay until advertising is back.

use std::time::Duration;

use lamp_proto::ble::CharacteristicRole;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{BackendError, RegistrationError};
use crate::record::{DeviceRecord, Persistence};
use crate::registry::ServiceDescriptor;
use crate::wifi::WifiApplier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Advertising,
    Connected,
    Disconnected,
    AdvertisingFailed,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControllerState::Idle => "idle",
            ControllerState::Advertising => "advertising",
            ControllerState::Connected => "connected",
            ControllerState::Disconnected => "disconnected",
            ControllerState::AdvertisingFailed => "advertising failed",
        };
        f.write_str(s)
    }
}

/// Something the platform stack observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    ClientConnected,
    ClientDisconnected,
    CharacteristicWritten {
        session: u64,
        uuid: Uuid,
        value: Vec<u8>,
    },
}

/// What goes into the advertising payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingData {
    pub local_name: String,
    pub service_uuids: Vec<Uuid>,
}

/// Platform BLE stack as seen by the controller
///
/// Implementations report connections and writes by sending
/// [`PeripheralEvent`]s to the channel the controller runs on. Writes must
/// be tagged with the session id passed to `register_services`.
#[allow(async_fn_in_trait)]
pub trait PeripheralBackend {
    async fn register_services(
        &mut self,
        services: &[ServiceDescriptor],
        session: u64,
    ) -> Result<(), BackendError>;

    async fn unregister_services(&mut self);

    async fn start_advertising(&mut self, data: &AdvertisingData) -> Result<(), BackendError>;

    async fn stop_advertising(&mut self);
}

/// First delay before advertising is retried
pub const RETRY_MIN: Duration = Duration::from_secs(1);

/// Longest delay between retries
pub const RETRY_MAX: Duration = Duration::from_secs(30);

pub type StateObserver = Box<dyn Fn(ControllerState) + Send + Sync>;

pub struct PeripheralController<B> {
    backend: B,
    record: DeviceRecord,
    services: Vec<ServiceDescriptor>,
    advertising: Option<AdvertisingData>,
    state: ControllerState,
    session: u64,
    observers: Vec<StateObserver>,
    wifi: Option<WifiApplier>,
    wifi_changed: bool,
}

impl<B: PeripheralBackend> PeripheralController<B> {
    pub fn new(backend: B, record: DeviceRecord) -> Self {
        Self {
            backend,
            record,
            services: Vec::new(),
            advertising: None,
            state: ControllerState::Idle,
            session: 0,
            observers: Vec::new(),
            wifi: None,
            wifi_changed: false,
        }
    }

    /// Apply new WiFi settings with `wifi` once the central that wrote
    /// them disconnects
    pub fn with_wifi(mut self, wifi: WifiApplier) -> Self {
        self.wifi = Some(wifi);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    /// Id of the current service registration
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a callback run on every state change
    pub fn on_state_changed(&mut self, observer: impl Fn(ControllerState) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = %self.state, to = %state, "peripheral state");
        self.state = state;
        for observer in &self.observers {
            observer(state);
        }
    }

    /// Register `services` and start advertising under `advertised_name`.
    ///
    /// Nothing reaches the platform unless every descriptor is valid. On
    /// failure the controller is left in `AdvertisingFailed`. A refused
    /// registration is retried by [`Self::run`]; invalid descriptors need
    /// another call to `start`.
    pub async fn start(
        &mut self,
        services: Vec<ServiceDescriptor>,
        advertised_name: &str,
    ) -> Result<(), RegistrationError> {
        if matches!(self.state, ControllerState::Advertising | ControllerState::Connected) {
            self.teardown().await;
        }

        if let Err(e) = validate_all(&services) {
            tracing::error!(error = %e, "refusing to register services");
            self.advertising = None;
            self.services.clear();
            self.set_state(ControllerState::AdvertisingFailed);
            return Err(e);
        }

        self.advertising = Some(AdvertisingData {
            local_name: advertised_name.to_string(),
            service_uuids: services.iter().map(|s| s.uuid).collect(),
        });
        self.services = services;

        if let Err(e) = self.advertise().await {
            tracing::error!(error = %e, "failed to start advertising");
            self.set_state(ControllerState::AdvertisingFailed);
            return Err(e.into());
        }
        Ok(())
    }

    async fn advertise(&mut self) -> Result<(), BackendError> {
        let Some(data) = self.advertising.clone() else {
            return Err(BackendError::from("nothing to advertise"));
        };

        self.session += 1;
        self.backend
            .register_services(&self.services, self.session)
            .await?;
        if let Err(e) = self.backend.start_advertising(&data).await {
            self.backend.unregister_services().await;
            return Err(e);
        }

        tracing::info!(name = %data.local_name, session = self.session, "advertising");
        self.set_state(ControllerState::Advertising);
        Ok(())
    }

    async fn teardown(&mut self) {
        self.backend.stop_advertising().await;
        self.backend.unregister_services().await;
    }

    /// React to one platform event
    pub async fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::ClientConnected => self.client_connected().await,
            PeripheralEvent::ClientDisconnected => self.client_disconnected().await,
            PeripheralEvent::CharacteristicWritten {
                session,
                uuid,
                value,
            } => self.characteristic_written(session, uuid, value),
        }
    }

    async fn client_connected(&mut self) {
        if self.state != ControllerState::Advertising {
            tracing::debug!(state = %self.state, "ignoring connect");
            return;
        }
        self.backend.stop_advertising().await;
        self.set_state(ControllerState::Connected);
    }

    async fn client_disconnected(&mut self) {
        if self.state != ControllerState::Connected {
            tracing::debug!(state = %self.state, "ignoring disconnect");
            return;
        }
        self.set_state(ControllerState::Disconnected);

        if self.record.persistence() == Persistence::Deferred {
            if let Err(e) = self.record.flush() {
                tracing::error!(error = %e, "failed to save device record");
            }
        }

        self.apply_wifi().await;

        self.backend.unregister_services().await;
        for service in &mut self.services {
            service.refresh(&self.record);
        }
        if let Err(e) = self.advertise().await {
            tracing::error!(error = %e, "failed to restart advertising");
            self.set_state(ControllerState::AdvertisingFailed);
        }
    }

    fn characteristic_written(&mut self, session: u64, uuid: Uuid, value: Vec<u8>) {
        if session != self.session {
            tracing::debug!(session, current = self.session, %uuid, "dropping stale write");
            return;
        }

        let Some(role) = CharacteristicRole::from_uuid(&uuid) else {
            tracing::warn!(%uuid, "write to unknown characteristic");
            return;
        };
        if !role.access().is_writable() {
            tracing::warn!(%role, "write to read-only characteristic");
            return;
        }

        let value = match String::from_utf8(value) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(%role, "write is not valid UTF-8");
                return;
            }
        };

        match self.record.apply_write(role, &value) {
            Ok(()) => {
                tracing::info!(%role, "updated");
                if matches!(role, CharacteristicRole::NetworkSsid | CharacteristicRole::NetworkPassword) {
                    self.wifi_changed = true;
                }
            }
            Err(e) => tracing::warn!(%role, error = %e, "rejected write"),
        }
    }

    async fn apply_wifi(&mut self) {
        if !std::mem::take(&mut self.wifi_changed) {
            return;
        }
        let Some(wifi) = &self.wifi else {
            return;
        };
        let (ssid, password) = (self.record.network_ssid(), self.record.network_password());
        if let Err(e) = wifi.apply(ssid, password).await {
            tracing::error!(error = %e, "failed to apply WiFi settings");
        }
    }

    /// Whether a failed registration can be tried again. Invalid
    /// descriptors can't; they need a new call to `start`.
    pub fn can_retry(&self) -> bool {
        self.state == ControllerState::AdvertisingFailed && self.advertising.is_some()
    }

    /// Register the services again, with values reloaded from the record,
    /// and restart advertising
    pub async fn retry_advertising(&mut self) -> Result<(), BackendError> {
        if !self.can_retry() {
            return Ok(());
        }
        for service in &mut self.services {
            service.refresh(&self.record);
        }
        if let Err(e) = self.advertise().await {
            tracing::warn!(error = %e, "advertising retry failed");
            return Err(e);
        }
        Ok(())
    }

    /// Handle events until the channel closes, retrying a failed
    /// registration in between
    pub async fn run(&mut self, mut events: mpsc::Receiver<PeripheralEvent>) {
        let mut delay = RETRY_MIN;
        loop {
            let retry = self.can_retry();
            if !retry {
                delay = RETRY_MIN;
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return,
                },
                _ = tokio::time::sleep(delay), if retry => {
                    if self.retry_advertising().await.is_err() {
                        delay = (delay * 2).min(RETRY_MAX);
                    }
                }
            }
        }
    }

    /// Stop advertising, drop the services and save pending changes
    pub async fn shutdown(&mut self) {
        self.teardown().await;
        if let Err(e) = self.record.flush() {
            tracing::error!(error = %e, "failed to save device record");
        }
        self.set_state(ControllerState::Idle);
    }
}

fn validate_all(services: &[ServiceDescriptor]) -> Result<(), RegistrationError> {
    if services.is_empty() {
        return Err(RegistrationError::NoServices);
    }
    services.iter().try_for_each(|s| s.validate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::build_services;
    use lamp_proto::MacAddress;
    use lamp_proto::ble::{
        ADVERTISED_NAME, DEVICE_MAC_UUID, DEVICE_NAME_UUID, INFO_SERVICE_UUID,
        NETWORK_SERVICE_UUID, NETWORK_SSID_UUID,
    };
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Register { session: u64, names: Vec<Vec<u8>> },
        Unregister,
        StartAdvertising(AdvertisingData),
        StopAdvertising,
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
        refuse_registers: u32,
    }

    impl PeripheralBackend for RecordingBackend {
        async fn register_services(
            &mut self,
            services: &[ServiceDescriptor],
            session: u64,
        ) -> Result<(), BackendError> {
            if self.refuse_registers > 0 {
                self.refuse_registers -= 1;
                return Err(BackendError::from("adapter is off"));
            }
            let names = services
                .iter()
                .filter_map(|s| s.characteristic(&DEVICE_NAME_UUID))
                .map(|c| c.initial_value.clone())
                .collect();
            self.calls.push(Call::Register { session, names });
            Ok(())
        }

        async fn unregister_services(&mut self) {
            self.calls.push(Call::Unregister);
        }

        async fn start_advertising(&mut self, data: &AdvertisingData) -> Result<(), BackendError> {
            self.calls.push(Call::StartAdvertising(data.clone()));
            Ok(())
        }

        async fn stop_advertising(&mut self) {
            self.calls.push(Call::StopAdvertising);
        }
    }

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("lamp-peripheral-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn controller(dir: &std::path::Path, persistence: Persistence) -> PeripheralController<RecordingBackend> {
        let record = DeviceRecord::new(
            dir.join("device.info"),
            MacAddress::new([0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a]),
            persistence,
        );
        PeripheralController::new(RecordingBackend::default(), record)
    }

    fn advertising() -> AdvertisingData {
        AdvertisingData {
            local_name: ADVERTISED_NAME.to_string(),
            service_uuids: vec![INFO_SERVICE_UUID, NETWORK_SERVICE_UUID],
        }
    }

    async fn started(dir: &std::path::Path, persistence: Persistence) -> PeripheralController<RecordingBackend> {
        let mut c = controller(dir, persistence);
        let services = build_services(c.record());
        c.start(services, ADVERTISED_NAME).await.unwrap();
        c
    }

    #[tokio::test]
    async fn start_registers_then_advertises() {
        let dir = scratch("start");
        let c = started(&dir, Persistence::WriteThrough).await;

        assert_eq!(c.state(), ControllerState::Advertising);
        assert_eq!(
            c.backend().calls,
            vec![
                Call::Register { session: 1, names: vec![b"UNNAMED".to_vec()] },
                Call::StartAdvertising(advertising()),
            ]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn invalid_descriptor_registers_nothing() {
        let dir = scratch("invalid");
        let mut c = controller(&dir, Persistence::WriteThrough);
        let mut services = build_services(c.record());
        services[1].characteristics[0].min_length = 65;

        let err = c.start(services, ADVERTISED_NAME).await.unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidLength { uuid, .. } if uuid == NETWORK_SSID_UUID));
        assert_eq!(c.state(), ControllerState::AdvertisingFailed);
        assert!(c.backend().calls.is_empty());

        // corrected descriptors may be retried
        let services = build_services(c.record());
        c.start(services, ADVERTISED_NAME).await.unwrap();
        assert_eq!(c.state(), ControllerState::Advertising);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn refused_registration_fails_advertising() {
        let dir = scratch("refused");
        let mut c = controller(&dir, Persistence::WriteThrough);
        c.backend.refuse_registers = 1;
        let services = build_services(c.record());

        let err = c.start(services, ADVERTISED_NAME).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Backend(_)));
        assert_eq!(c.state(), ControllerState::AdvertisingFailed);
        assert!(c.can_retry());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn invalid_descriptors_are_not_retried() {
        let dir = scratch("no-retry");
        let mut c = started(&dir, Persistence::WriteThrough).await;
        let mut services = build_services(c.record());
        services[0].characteristics[0].max_length = 0;

        assert!(c.start(services, ADVERTISED_NAME).await.is_err());
        assert_eq!(c.state(), ControllerState::AdvertisingFailed);
        assert!(!c.can_retry());

        c.backend.calls.clear();
        c.retry_advertising().await.unwrap();
        assert!(c.backend().calls.is_empty());
        assert_eq!(c.state(), ControllerState::AdvertisingFailed);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn failed_readvertise_recovers_on_retry() {
        let dir = scratch("readvertise-retry");
        let mut c = started(&dir, Persistence::WriteThrough).await;
        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: DEVICE_NAME_UUID,
            value: b"Porch".to_vec(),
        })
        .await;

        c.backend.refuse_registers = 1;
        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        assert_eq!(c.state(), ControllerState::AdvertisingFailed);

        c.backend.calls.clear();
        c.retry_advertising().await.unwrap();
        assert_eq!(c.state(), ControllerState::Advertising);
        assert_eq!(
            c.backend().calls,
            vec![
                Call::Register { session: 3, names: vec![b"Porch".to_vec()] },
                Call::StartAdvertising(advertising()),
            ]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_until_advertising() {
        let dir = scratch("run-retry");
        let mut c = controller(&dir, Persistence::WriteThrough);
        c.backend.refuse_registers = 2;
        let services = build_services(c.record());
        assert!(c.start(services, ADVERTISED_NAME).await.is_err());

        let (tx, rx) = mpsc::channel(1);
        let ran = tokio::time::timeout(RETRY_MIN * 10, c.run(rx)).await;
        assert!(ran.is_err());
        drop(tx);

        assert_eq!(c.state(), ControllerState::Advertising);
        assert_eq!(
            c.backend().calls,
            vec![
                Call::Register { session: 3, names: vec![b"UNNAMED".to_vec()] },
                Call::StartAdvertising(advertising()),
            ]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn readvertises_after_each_disconnect() {
        let dir = scratch("cycle");
        let mut c = started(&dir, Persistence::WriteThrough).await;

        for round in 0..2u64 {
            c.backend.calls.clear();
            c.handle_event(PeripheralEvent::ClientConnected).await;
            assert_eq!(c.state(), ControllerState::Connected);
            c.handle_event(PeripheralEvent::ClientDisconnected).await;
            assert_eq!(c.state(), ControllerState::Advertising);
            assert_eq!(
                c.backend().calls,
                vec![
                    Call::StopAdvertising,
                    Call::Unregister,
                    Call::Register { session: round + 2, names: vec![b"UNNAMED".to_vec()] },
                    Call::StartAdvertising(advertising()),
                ]
            );
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn writes_update_the_record_and_next_registration() {
        let dir = scratch("write");
        let mut c = started(&dir, Persistence::WriteThrough).await;

        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: DEVICE_NAME_UUID,
            value: b"Desk".to_vec(),
        })
        .await;
        assert_eq!(c.record().name(), "Desk");
        let on_disk = std::fs::read_to_string(dir.join("device.info")).unwrap();
        assert!(on_disk.starts_with("Desk,b8:27:eb:01:02:0a,"));

        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        assert_eq!(
            c.backend().calls.last(),
            Some(&Call::StartAdvertising(advertising()))
        );
        assert!(c.backend().calls.contains(&Call::Register { session: 2, names: vec![b"Desk".to_vec()] }));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn stale_and_invalid_writes_are_dropped() {
        let dir = scratch("stale");
        let mut c = started(&dir, Persistence::WriteThrough).await;
        let first = c.session();

        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        assert_ne!(c.session(), first);

        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: first,
            uuid: DEVICE_NAME_UUID,
            value: b"Old".to_vec(),
        })
        .await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: DEVICE_MAC_UUID,
            value: vec![0; 6],
        })
        .await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: DEVICE_NAME_UUID,
            value: b"a,b".to_vec(),
        })
        .await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: Uuid::nil(),
            value: b"x".to_vec(),
        })
        .await;

        assert_eq!(c.record().name(), "UNNAMED");
        assert_eq!(c.record().mac().octets(), [0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn deferred_writes_land_on_disconnect() {
        let dir = scratch("deferred");
        let mut c = started(&dir, Persistence::Deferred).await;

        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: NETWORK_SSID_UUID,
            value: b"home".to_vec(),
        })
        .await;
        assert!(!dir.join("device.info").exists());

        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        let on_disk = std::fs::read_to_string(dir.join("device.info")).unwrap();
        assert_eq!(on_disk, "UNNAMED,b8:27:eb:01:02:0a,home,\n");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn wifi_settings_are_applied_on_disconnect() {
        let dir = scratch("wifi");
        let conf = dir.join("wpa_supplicant.conf");
        let mut wifi = WifiApplier::new(&conf, "wlan0");
        wifi.wpa_cli = std::path::PathBuf::from("false");
        let mut c = controller(&dir, Persistence::Deferred).with_wifi(wifi);
        let services = build_services(c.record());
        c.start(services, ADVERTISED_NAME).await.unwrap();

        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: DEVICE_NAME_UUID,
            value: b"Desk".to_vec(),
        })
        .await;
        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        assert!(!conf.exists());

        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::CharacteristicWritten {
            session: c.session(),
            uuid: NETWORK_SSID_UUID,
            value: b"home".to_vec(),
        })
        .await;
        assert!(!conf.exists());
        c.handle_event(PeripheralEvent::ClientDisconnected).await;

        // the reload fails here, which must not stop advertising
        let written = std::fs::read_to_string(&conf).unwrap();
        assert!(written.contains("ssid=\"home\"\n    key_mgmt=NONE"));
        assert_eq!(c.state(), ControllerState::Advertising);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn observers_see_each_transition() {
        let dir = scratch("observers");
        let mut c = controller(&dir, Persistence::WriteThrough);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        c.on_state_changed(move |state| sink.lock().unwrap().push(state));

        let services = build_services(c.record());
        c.start(services, ADVERTISED_NAME).await.unwrap();
        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::ClientConnected).await;
        c.handle_event(PeripheralEvent::ClientDisconnected).await;
        c.shutdown().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ControllerState::Advertising,
                ControllerState::Connected,
                ControllerState::Disconnected,
                ControllerState::Advertising,
                ControllerState::Idle,
            ]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn run_drains_the_channel() {
        let dir = scratch("run");
        let mut c = started(&dir, Persistence::WriteThrough).await;
        let (tx, rx) = mpsc::channel(4);
        tx.send(PeripheralEvent::ClientConnected).await.unwrap();
        tx.send(PeripheralEvent::CharacteristicWritten {
            session: 1,
            uuid: DEVICE_NAME_UUID,
            value: b"Hall".to_vec(),
        })
        .await
        .unwrap();
        drop(tx);

        c.run(rx).await;
        assert_eq!(c.state(), ControllerState::Connected);
        assert_eq!(c.record().name(), "Hall");
        std::fs::remove_dir_all(dir).unwrap();
    }
}
