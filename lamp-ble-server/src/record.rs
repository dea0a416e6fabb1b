//! Persisted device record
//!
//! The record lives in a single-line text file:
//!
//! ```text
//! <name>,<mac>,<network_ssid>,<network_password>
//! ```
//!
//! Fields can't contain commas or line breaks, so the format needs no
//! escaping. The MAC is the canonical lowercase form read from the
//! wireless interface the first time the record is created.

use std::fs;
use std::path::{Path, PathBuf};

use lamp_proto::MacAddress;
use lamp_proto::ble::{CharacteristicRole, MAX_TEXT_LEN};

use crate::error::ConfigError;

/// Name given to a lamp that hasn't been configured yet
pub const DEFAULT_NAME: &str = "UNNAMED";

/// Where `/sys/class/net/<iface>/address` lives
pub const SYSFS_NET: &str = "/sys/class/net";

/// When record changes hit the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persistence {
    /// Every accepted write is saved before it is acknowledged
    #[default]
    WriteThrough,
    /// Writes are collected and saved when the central disconnects
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    name: String,
    mac: MacAddress,
    network_ssid: String,
    network_password: String,
    path: PathBuf,
    persistence: Persistence,
    dirty: bool,
}

impl DeviceRecord {
    /// A fresh record with the default name and no network configured
    pub fn new(path: impl Into<PathBuf>, mac: MacAddress, persistence: Persistence) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            mac,
            network_ssid: String::new(),
            network_password: String::new(),
            path: path.into(),
            persistence,
            dirty: false,
        }
    }

    /// Read a record from disk
    pub fn load(path: &Path, persistence: Persistence) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: format!("not UTF-8: {e}"),
        })?;
        Self::parse(&contents, path, persistence)
    }

    fn parse(contents: &str, path: &Path, persistence: Persistence) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let line = contents.lines().next().unwrap_or_default();
        let fields: Vec<&str> = line.split(',').collect();
        let [name, mac, ssid, password] = fields.as_slice() else {
            return Err(malformed(format!("expected 4 fields, found {}", fields.len())));
        };

        let mac: MacAddress = mac.parse().map_err(|e| malformed(format!("{e}")))?;
        for (field, value) in [("name", name), ("network SSID", ssid), ("network password", password)] {
            if value.len() > MAX_TEXT_LEN {
                return Err(malformed(format!("{field} longer than {MAX_TEXT_LEN} bytes")));
            }
        }

        Ok(Self {
            name: name.to_string(),
            mac,
            network_ssid: ssid.to_string(),
            network_password: password.to_string(),
            path: path.to_path_buf(),
            persistence,
            dirty: false,
        })
    }

    /// Load the record, or create and save a fresh one.
    ///
    /// A record that can't be parsed is replaced, keeping the device usable
    /// after a corrupted write. Returns `true` when a new record was made.
    pub fn load_or_create(
        path: &Path,
        interface: &str,
        persistence: Persistence,
    ) -> Result<(Self, bool), ConfigError> {
        Self::load_or_create_with(path, persistence, || derive_mac_from_interface(interface))
    }

    pub fn load_or_create_with<F>(
        path: &Path,
        persistence: Persistence,
        derive_mac: F,
    ) -> Result<(Self, bool), ConfigError>
    where
        F: FnOnce() -> Result<MacAddress, ConfigError>,
    {
        match Self::load(path, persistence) {
            Ok(record) => return Ok((record, false)),
            Err(ConfigError::NotFound(_)) => {
                tracing::info!(path = %path.display(), "no device record, creating one");
            }
            Err(e @ ConfigError::Parse { .. }) => {
                tracing::warn!(error = %e, "replacing unreadable device record");
            }
            Err(e) => return Err(e),
        }

        let mut record = Self::new(path, derive_mac()?, persistence);
        record.save()?;
        Ok((record, true))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn network_ssid(&self) -> &str {
        &self.network_ssid
    }

    pub fn network_password(&self) -> &str {
        &self.network_password
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Changes not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), ConfigError> {
        validate_field("name", name)?;
        self.name = name.to_string();
        self.changed()
    }

    pub fn set_network_ssid(&mut self, ssid: &str) -> Result<(), ConfigError> {
        validate_field("network SSID", ssid)?;
        self.network_ssid = ssid.to_string();
        self.changed()
    }

    pub fn set_network_password(&mut self, password: &str) -> Result<(), ConfigError> {
        validate_field("network password", password)?;
        self.network_password = password.to_string();
        self.changed()
    }

    /// Store a value written by a central. The MAC is read-only.
    pub fn apply_write(&mut self, role: CharacteristicRole, value: &str) -> Result<(), ConfigError> {
        match role {
            CharacteristicRole::DeviceName => self.set_name(value),
            CharacteristicRole::NetworkSsid => self.set_network_ssid(value),
            CharacteristicRole::NetworkPassword => self.set_network_password(value),
            CharacteristicRole::DeviceMac => Err(ConfigError::InvalidField {
                field: "MAC address",
                max: 0,
            }),
        }
    }

    /// Current value for a characteristic, as served over GATT
    pub fn value_for(&self, role: CharacteristicRole) -> Vec<u8> {
        match role {
            CharacteristicRole::DeviceName => self.name.as_bytes().to_vec(),
            CharacteristicRole::DeviceMac => self.mac.as_bytes().to_vec(),
            CharacteristicRole::NetworkSsid => self.network_ssid.as_bytes().to_vec(),
            CharacteristicRole::NetworkPassword => self.network_password.as_bytes().to_vec(),
        }
    }

    fn changed(&mut self) -> Result<(), ConfigError> {
        self.dirty = true;
        match self.persistence {
            Persistence::WriteThrough => self.save(),
            Persistence::Deferred => Ok(()),
        }
    }

    /// Render the single record line
    pub fn to_line(&self) -> Result<String, ConfigError> {
        validate_field("name", &self.name)?;
        validate_field("network SSID", &self.network_ssid)?;
        validate_field("network password", &self.network_password)?;
        Ok(format!(
            "{},{},{},{}\n",
            self.name, self.mac, self.network_ssid, self.network_password
        ))
    }

    /// Write the record, replacing the old file in one rename
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let line = self.to_line()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "device.info".to_string());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));
        fs::write(&tmp, line)?;
        fs::rename(&tmp, &self.path)?;

        self.dirty = false;
        tracing::debug!(path = %self.path.display(), "device record saved");
        Ok(())
    }

    /// Save only if there are pending changes
    pub fn flush(&mut self) -> Result<(), ConfigError> {
        if self.dirty {
            self.save()
        } else {
            Ok(())
        }
    }
}

/// Whether `value` fits a record field: at most 64 bytes, no `,` and no
/// line breaks
pub fn is_storable(value: &str) -> bool {
    value.len() <= MAX_TEXT_LEN && !value.contains([',', '\n', '\r'])
}

/// Decode a GATT write into a storable field value
pub fn storable_text(value: &[u8]) -> Option<&str> {
    std::str::from_utf8(value).ok().filter(|text| is_storable(text))
}

fn validate_field(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if !is_storable(value) {
        return Err(ConfigError::InvalidField {
            field,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

/// Hardware address of a network interface, e.g. `wlan0`
pub fn derive_mac_from_interface(interface: &str) -> Result<MacAddress, ConfigError> {
    derive_mac_from_sysfs(Path::new(SYSFS_NET), interface)
}

/// Read `<root>/<interface>/address`
pub fn derive_mac_from_sysfs(root: &Path, interface: &str) -> Result<MacAddress, ConfigError> {
    let address = root.join(interface).join("address");
    let contents = fs::read_to_string(&address)
        .map_err(|_| ConfigError::InterfaceNotFound(interface.to_string()))?;
    contents.trim().parse().map_err(|e| ConfigError::Parse {
        path: address,
        reason: format!("{e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddress = MacAddress::new([0xb8, 0x27, 0xeb, 0x01, 0x02, 0x0a]);

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lamp-record-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn first_run_creates_a_default_record() {
        let dir = scratch("first-run");
        let path = dir.join("device.info");

        let (record, created) =
            DeviceRecord::load_or_create_with(&path, Persistence::WriteThrough, || Ok(MAC)).unwrap();
        assert!(created);
        assert_eq!(record.name(), "UNNAMED");
        assert_eq!(record.network_ssid(), "");
        assert_eq!(fs::read_to_string(&path).unwrap(), "UNNAMED,b8:27:eb:01:02:0a,,\n");

        let (again, created) = DeviceRecord::load_or_create_with(&path, Persistence::WriteThrough, || {
            panic!("MAC must not be derived twice")
        })
        .unwrap();
        assert!(!created);
        assert_eq!(again, record);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn write_through_saves_each_change() {
        let dir = scratch("write-through");
        let path = dir.join("device.info");
        let mut record = DeviceRecord::new(&path, MAC, Persistence::WriteThrough);

        record.set_name("Desk Lamp").unwrap();
        record.set_network_ssid("home").unwrap();
        record.set_network_password("hunter22").unwrap();
        assert!(!record.is_dirty());

        let loaded = DeviceRecord::load(&path, Persistence::WriteThrough).unwrap();
        assert_eq!(loaded.name(), "Desk Lamp");
        assert_eq!(loaded.mac(), MAC);
        assert_eq!(loaded.network_ssid(), "home");
        assert_eq!(loaded.network_password(), "hunter22");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn deferred_changes_wait_for_flush() {
        let dir = scratch("deferred");
        let path = dir.join("device.info");
        let mut record = DeviceRecord::new(&path, MAC, Persistence::Deferred);

        record.set_name("Bedside").unwrap();
        assert!(record.is_dirty());
        assert!(!path.exists());

        record.flush().unwrap();
        assert!(!record.is_dirty());
        let loaded = DeviceRecord::load(&path, Persistence::Deferred).unwrap();
        assert_eq!(loaded.name(), "Bedside");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn invalid_values_leave_the_record_untouched() {
        let dir = scratch("invalid");
        let path = dir.join("device.info");
        let mut record = DeviceRecord::new(&path, MAC, Persistence::WriteThrough);

        assert!(matches!(
            record.set_name("a,b"),
            Err(ConfigError::InvalidField { field: "name", .. })
        ));
        assert!(record.set_network_ssid("line\nbreak").is_err());
        assert!(record.set_network_password(&"x".repeat(65)).is_err());
        record.set_network_password(&"x".repeat(64)).unwrap();

        assert_eq!(record.name(), "UNNAMED");
        assert_eq!(record.network_ssid(), "");
        assert!(record.apply_write(CharacteristicRole::DeviceMac, "00:00:00:00:00:00").is_err());
        assert_eq!(record.mac(), MAC);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn corrupt_records_are_replaced() {
        let dir = scratch("corrupt");
        let path = dir.join("device.info");
        fs::write(&path, "only,three,fields\n").unwrap();

        assert!(matches!(
            DeviceRecord::load(&path, Persistence::WriteThrough),
            Err(ConfigError::Parse { .. })
        ));

        let (record, created) =
            DeviceRecord::load_or_create_with(&path, Persistence::WriteThrough, || Ok(MAC)).unwrap();
        assert!(created);
        assert_eq!(record.name(), DEFAULT_NAME);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn non_utf8_records_are_replaced() {
        let dir = scratch("non-utf8");
        let path = dir.join("device.info");
        fs::write(&path, b"lamp\xff,b8:27:eb:01:02:0a,,\n").unwrap();

        assert!(matches!(
            DeviceRecord::load(&path, Persistence::WriteThrough),
            Err(ConfigError::Parse { .. })
        ));

        let (record, created) =
            DeviceRecord::load_or_create_with(&path, Persistence::WriteThrough, || Ok(MAC)).unwrap();
        assert!(created);
        assert_eq!(record.name(), DEFAULT_NAME);
        assert_eq!(fs::read_to_string(&path).unwrap(), "UNNAMED,b8:27:eb:01:02:0a,,\n");

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn storable_text_matches_the_setters() {
        assert_eq!(storable_text(b"Desk"), Some("Desk"));
        assert_eq!(storable_text(b""), Some(""));
        assert_eq!(storable_text(b"a,b"), None);
        assert_eq!(storable_text(b"two\nlines"), None);
        assert_eq!(storable_text(b"cr\r"), None);
        assert_eq!(storable_text(b"\xff\xfe"), None);
        assert_eq!(storable_text(&[b'x'; 65]), None);

        let mut record = DeviceRecord::new("/tmp/unused", MAC, Persistence::Deferred);
        for value in ["Desk", "a,b", "two\nlines"] {
            assert_eq!(
                storable_text(value.as_bytes()).is_some(),
                record.set_name(value).is_ok()
            );
        }
    }

    #[test]
    fn bad_mac_in_record_is_a_parse_error() {
        let dir = scratch("bad-mac");
        let path = dir.join("device.info");
        fs::write(&path, "lamp,not-a-mac,ssid,pw\n").unwrap();

        assert!(matches!(
            DeviceRecord::load(&path, Persistence::WriteThrough),
            Err(ConfigError::Parse { .. })
        ));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = scratch("missing");
        assert!(matches!(
            DeviceRecord::load(&dir.join("device.info"), Persistence::WriteThrough),
            Err(ConfigError::NotFound(_))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn mac_comes_from_sysfs() {
        let root = scratch("sysfs");
        fs::create_dir_all(root.join("wlan0")).unwrap();
        fs::write(root.join("wlan0").join("address"), "B8:27:EB:01:02:0A\n").unwrap();

        assert_eq!(derive_mac_from_sysfs(&root, "wlan0").unwrap(), MAC);
        assert!(matches!(
            derive_mac_from_sysfs(&root, "wlan9"),
            Err(ConfigError::InterfaceNotFound(iface)) if iface == "wlan9"
        ));

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn gatt_values_follow_the_record() {
        let record = DeviceRecord::new("/tmp/unused", MAC, Persistence::Deferred);
        assert_eq!(record.value_for(CharacteristicRole::DeviceMac), MAC.octets().to_vec());
        assert_eq!(record.value_for(CharacteristicRole::DeviceName), b"UNNAMED".to_vec());
        assert!(record.value_for(CharacteristicRole::NetworkSsid).is_empty());
    }
}
