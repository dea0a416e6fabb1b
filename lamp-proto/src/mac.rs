//! MAC address codec
//!
//! The canonical text form is six lowercase hex octets joined by `:`
//! (`b8:27:eb:01:02:0a`). Parsing is strict about the layout but accepts
//! uppercase digits; rendering is always lowercase.

use std::fmt;
use std::str::FromStr;

use crate::ble::MAC_LEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacParseError {
    #[error("MAC address must be 17 characters, got {0}")]
    Length(usize),
    #[error("MAC address must have 6 octets separated by ':'")]
    Layout,
    #[error("invalid hex octet {0:?} in MAC address")]
    Octet(String),
    #[error("MAC address must be 6 bytes, got {0}")]
    ByteCount(usize),
}

/// A 6-octet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; MAC_LEN]);

impl MacAddress {
    pub const fn new(bytes: [u8; MAC_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MacParseError> {
        let bytes: [u8; MAC_LEN] = bytes
            .try_into()
            .map_err(|_| MacParseError::ByteCount(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 * MAC_LEN - 1 {
            return Err(MacParseError::Length(s.len()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != MAC_LEN {
            return Err(MacParseError::Layout);
        }

        let mut bytes = [0u8; MAC_LEN];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            let decoded = data_encoding::HEXLOWER_PERMISSIVE
                .decode(part.as_bytes())
                .map_err(|_| MacParseError::Octet(part.to_string()))?;
            match decoded.as_slice() {
                [b] if part.len() == 2 => *byte = *b,
                _ => return Err(MacParseError::Octet(part.to_string())),
            }
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self
            .0
            .iter()
            .map(|b| data_encoding::HEXLOWER.encode(&[*b]))
            .collect();
        f.write_str(&octets.join(":"))
    }
}

/// Parse a canonical MAC string into its raw bytes
pub fn mac_to_bytes(mac: &str) -> Result<[u8; MAC_LEN], MacParseError> {
    mac.parse::<MacAddress>().map(|m| m.octets())
}

/// Render exactly 6 raw bytes as a canonical MAC string
pub fn mac_from_bytes(bytes: &[u8]) -> Result<String, MacParseError> {
    MacAddress::from_slice(bytes).map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_survive_a_string_trip() {
        let samples: [[u8; 6]; 4] = [
            [0, 0, 0, 0, 0, 0],
            [0xff; 6],
            [0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a],
            [0x80, 0x7f, 0x10, 0x09, 0xa0, 0xfe],
        ];
        for bytes in samples {
            let text = mac_from_bytes(&bytes).unwrap();
            assert_eq!(text.len(), 17);
            assert_eq!(mac_to_bytes(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn canonical_strings_survive_a_byte_trip() {
        let mac = "b8:27:eb:01:02:0a";
        assert_eq!(mac_from_bytes(&mac_to_bytes(mac).unwrap()).unwrap(), mac);
    }

    #[test]
    fn low_bytes_are_zero_padded() {
        assert_eq!(
            mac_from_bytes(&[1, 2, 3, 4, 5, 6]).unwrap(),
            "01:02:03:04:05:06"
        );
    }

    #[test]
    fn uppercase_is_accepted_but_rendered_lowercase() {
        let mac: MacAddress = "B8:27:EB:AA:BB:CC".parse().unwrap();
        assert_eq!(mac.to_string(), "b8:27:eb:aa:bb:cc");
    }

    #[test]
    fn malformed_strings_are_rejected() {
        assert_eq!(mac_to_bytes("b8:27:eb:01:02"), Err(MacParseError::Length(14)));
        assert_eq!(mac_to_bytes("b8:27:eb:01:02:0a:"), Err(MacParseError::Length(18)));
        assert_eq!(mac_to_bytes("b8-27-eb-01-02-0a"), Err(MacParseError::Layout));
        assert!(matches!(
            mac_to_bytes("b8:27:eb:01:02:zz"),
            Err(MacParseError::Octet(_))
        ));
        assert!(matches!(
            mac_to_bytes("b8:27:eb:0102:0a:"),
            Err(MacParseError::Octet(_))
        ));
    }

    #[test]
    fn wrong_byte_counts_are_rejected() {
        assert_eq!(mac_from_bytes(&[1, 2, 3]), Err(MacParseError::ByteCount(3)));
        assert_eq!(mac_from_bytes(&[0; 7]), Err(MacParseError::ByteCount(7)));
    }
}
