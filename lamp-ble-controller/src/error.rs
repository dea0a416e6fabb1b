use lamp_proto::MacParseError;
use lamp_proto::ble::{CharacteristicRole, ServiceKind};

/// Finding a lamp and its services
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("lamp device not found")]
    DeviceNotFound,
    #[error("{0} service not found")]
    ServiceMissing(ServiceKind),
    #[error("{0} characteristic is invalid")]
    CharacteristicMissing(CharacteristicRole),
    #[error("Bluetooth adapter is powered off")]
    PoweredOff,
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Bluetooth error: {0}")]
    Platform(String),
}

/// Reading or writing a characteristic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{0} is read-only")]
    ReadOnly(CharacteristicRole),
    #[error("{role} value is {len} bytes, at most {max} allowed")]
    ValueTooLong {
        role: CharacteristicRole,
        len: usize,
        max: usize,
    },
    #[error("{0} is not ready")]
    NotReady(CharacteristicRole),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(CharacteristicRole),
    #[error(transparent)]
    InvalidMac(#[from] MacParseError),
    #[error("Bluetooth error: {0}")]
    Platform(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("timed out connecting to device")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
    #[error("Bluetooth error: {0}")]
    Platform(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
