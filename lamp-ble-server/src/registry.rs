//! GATT services built from the device record

use lamp_proto::ble::{Access, CharacteristicRole, ServiceKind};
use uuid::Uuid;

use crate::error::RegistrationError;
use crate::record::DeviceRecord;

/// A characteristic to expose, with its starting value and length bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub initial_value: Vec<u8>,
    pub min_length: usize,
    pub max_length: usize,
    pub access: Access,
}

impl CharacteristicDescriptor {
    pub fn for_role(role: CharacteristicRole, value: Vec<u8>) -> Self {
        let (min_length, max_length) = role.length_bounds();
        Self {
            uuid: role.uuid(),
            initial_value: value,
            min_length,
            max_length,
            access: role.access(),
        }
    }

    pub fn role(&self) -> Option<CharacteristicRole> {
        CharacteristicRole::from_uuid(&self.uuid)
    }

    /// Whether a value of this length may be stored
    pub fn accepts_length(&self, len: usize) -> bool {
        self.min_length <= len && len <= self.max_length
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        let len = self.initial_value.len();
        if self.min_length > self.max_length || !self.accepts_length(len) {
            return Err(RegistrationError::InvalidLength {
                uuid: self.uuid,
                len,
                min: self.min_length,
                max: self.max_length,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.characteristics.is_empty() {
            return Err(RegistrationError::EmptyService(self.uuid));
        }
        self.characteristics.iter().try_for_each(|c| c.validate())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }

    /// Reload every known characteristic's value from the record
    pub fn refresh(&mut self, record: &DeviceRecord) {
        for characteristic in &mut self.characteristics {
            if let Some(role) = characteristic.role() {
                characteristic.initial_value = record.value_for(role);
            }
        }
    }
}

fn build_service(kind: ServiceKind, record: &DeviceRecord) -> ServiceDescriptor {
    ServiceDescriptor {
        uuid: kind.uuid(),
        characteristics: kind
            .characteristics()
            .iter()
            .map(|role| CharacteristicDescriptor::for_role(*role, record.value_for(*role)))
            .collect(),
    }
}

/// Device name (read/write) and MAC (read-only, 6 raw bytes)
pub fn build_info_service(record: &DeviceRecord) -> ServiceDescriptor {
    build_service(ServiceKind::Info, record)
}

/// WiFi SSID and password, both read/write
pub fn build_network_service(record: &DeviceRecord) -> ServiceDescriptor {
    build_service(ServiceKind::Network, record)
}

pub fn build_services(record: &DeviceRecord) -> Vec<ServiceDescriptor> {
    vec![build_info_service(record), build_network_service(record)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Persistence;
    use lamp_proto::MacAddress;
    use lamp_proto::ble::{
        DEVICE_MAC_UUID, DEVICE_NAME_UUID, INFO_SERVICE_UUID, NETWORK_PASSWORD_UUID,
        NETWORK_SERVICE_UUID, NETWORK_SSID_UUID,
    };

    fn record() -> DeviceRecord {
        DeviceRecord::new(
            "/tmp/lamp-registry-unused",
            MacAddress::new([0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a]),
            Persistence::Deferred,
        )
    }

    #[test]
    fn info_service_layout() {
        let service = build_info_service(&record());
        assert_eq!(service.uuid, INFO_SERVICE_UUID);
        assert!(service.is_valid());

        let name = service.characteristic(&DEVICE_NAME_UUID).unwrap();
        assert_eq!(name.initial_value, b"UNNAMED".to_vec());
        assert_eq!((name.min_length, name.max_length), (0, 64));
        assert_eq!(name.access, Access::ReadWrite);

        let mac = service.characteristic(&DEVICE_MAC_UUID).unwrap();
        assert_eq!(mac.initial_value, vec![0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a]);
        assert_eq!((mac.min_length, mac.max_length), (6, 6));
        assert_eq!(mac.access, Access::ReadOnly);
    }

    #[test]
    fn network_service_layout() {
        let service = build_network_service(&record());
        assert_eq!(service.uuid, NETWORK_SERVICE_UUID);
        assert!(service.is_valid());
        for uuid in [NETWORK_SSID_UUID, NETWORK_PASSWORD_UUID] {
            let c = service.characteristic(&uuid).unwrap();
            assert!(c.initial_value.is_empty());
            assert_eq!(c.access, Access::ReadWrite);
            assert_eq!(c.max_length, 64);
        }
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        let mut service = build_info_service(&record());
        service.characteristics[0].min_length = 10;
        service.characteristics[0].max_length = 2;
        assert!(!service.characteristics[0].is_valid());
        assert!(matches!(
            service.validate(),
            Err(RegistrationError::InvalidLength { min: 10, max: 2, .. })
        ));
    }

    #[test]
    fn initial_value_must_fit() {
        let mut service = build_info_service(&record());
        service.characteristics[0].initial_value = vec![b'x'; 65];
        assert!(!service.is_valid());
    }

    #[test]
    fn empty_services_are_invalid() {
        let service = ServiceDescriptor {
            uuid: INFO_SERVICE_UUID,
            characteristics: Vec::new(),
        };
        assert_eq!(
            service.validate(),
            Err(RegistrationError::EmptyService(INFO_SERVICE_UUID))
        );
    }

    #[test]
    fn refresh_pulls_new_values() {
        let mut record = record();
        let mut service = build_info_service(&record);
        record.set_name("Kitchen").unwrap();
        service.refresh(&record);
        assert_eq!(
            service.characteristic(&DEVICE_NAME_UUID).unwrap().initial_value,
            b"Kitchen".to_vec()
        );
    }
}
