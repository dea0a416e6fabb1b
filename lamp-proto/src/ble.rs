//! BLE GATT layout shared by the lamp peripheral and its clients
//!
//! Every UUID is derived from one base, `0000XXXX-dead-fade-cafe-204080160320`,
//! with the 16-bit `XXXX` slot numbering services in the high byte and their
//! characteristics in the low byte. Server and client both use these
//! constants, so they cannot drift apart.

use uuid::Uuid;

/// Local name the peripheral advertises under
pub const ADVERTISED_NAME: &str = "LampSrv";

/// Maximum length of the variable-length UTF-8 characteristics
pub const MAX_TEXT_LEN: usize = 64;

/// Length of the raw MAC characteristic
pub const MAC_LEN: usize = 6;

const BASE_UUID: u128 = 0x00000000_dead_fade_cafe_204080160320;

/// Build a UUID from the lamp base and a 16-bit slot
pub const fn lamp_uuid(slot: u16) -> Uuid {
    Uuid::from_u128(BASE_UUID | ((slot as u128) << 96))
}

/// Device Info service: name + MAC
pub const INFO_SERVICE_UUID: Uuid = lamp_uuid(0x0100);
/// Device name characteristic (read/write)
pub const DEVICE_NAME_UUID: Uuid = lamp_uuid(0x0101);
/// Device MAC characteristic (read)
pub const DEVICE_MAC_UUID: Uuid = lamp_uuid(0x0102);

/// Device Network service: WiFi credentials
pub const NETWORK_SERVICE_UUID: Uuid = lamp_uuid(0x0200);
/// WiFi SSID characteristic (read/write)
pub const NETWORK_SSID_UUID: Uuid = lamp_uuid(0x0201);
/// WiFi password characteristic (read/write)
pub const NETWORK_PASSWORD_UUID: Uuid = lamp_uuid(0x0202);

/// Access properties of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

/// The GATT services a lamp exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Info,
    Network,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Info, ServiceKind::Network];

    pub fn uuid(&self) -> Uuid {
        match self {
            ServiceKind::Info => INFO_SERVICE_UUID,
            ServiceKind::Network => NETWORK_SERVICE_UUID,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.uuid() == *uuid)
    }

    /// Characteristics that must be present for the service to be usable
    pub fn characteristics(&self) -> &'static [CharacteristicRole] {
        match self {
            ServiceKind::Info => &[CharacteristicRole::DeviceName, CharacteristicRole::DeviceMac],
            ServiceKind::Network => &[
                CharacteristicRole::NetworkSsid,
                CharacteristicRole::NetworkPassword,
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Info => "device info",
            ServiceKind::Network => "device network",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Known characteristic roles, mapped both ways to their UUIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicRole {
    DeviceName,
    DeviceMac,
    NetworkSsid,
    NetworkPassword,
}

impl CharacteristicRole {
    pub const ALL: [CharacteristicRole; 4] = [
        CharacteristicRole::DeviceName,
        CharacteristicRole::DeviceMac,
        CharacteristicRole::NetworkSsid,
        CharacteristicRole::NetworkPassword,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            CharacteristicRole::DeviceName => DEVICE_NAME_UUID,
            CharacteristicRole::DeviceMac => DEVICE_MAC_UUID,
            CharacteristicRole::NetworkSsid => NETWORK_SSID_UUID,
            CharacteristicRole::NetworkPassword => NETWORK_PASSWORD_UUID,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == *uuid)
    }

    pub fn service(&self) -> ServiceKind {
        match self {
            CharacteristicRole::DeviceName | CharacteristicRole::DeviceMac => ServiceKind::Info,
            CharacteristicRole::NetworkSsid | CharacteristicRole::NetworkPassword => {
                ServiceKind::Network
            }
        }
    }

    pub fn access(&self) -> Access {
        match self {
            CharacteristicRole::DeviceMac => Access::ReadOnly,
            _ => Access::ReadWrite,
        }
    }

    /// Inclusive `(min, max)` value length in bytes
    pub fn length_bounds(&self) -> (usize, usize) {
        match self {
            CharacteristicRole::DeviceMac => (MAC_LEN, MAC_LEN),
            _ => (0, MAX_TEXT_LEN),
        }
    }

    pub fn max_length(&self) -> usize {
        self.length_bounds().1
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacteristicRole::DeviceName => "device name",
            CharacteristicRole::DeviceMac => "device MAC",
            CharacteristicRole::NetworkSsid => "network SSID",
            CharacteristicRole::NetworkPassword => "network password",
        }
    }
}

impl std::fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
