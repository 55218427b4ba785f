//! Inventory loading.
//!
//! The inventory is a JSON document with a top-level `devices` list. Each
//! record must carry `name`, `type` and `connection_type`; everything else
//! is optional or device specific. Loading is all-or-nothing: a single bad
//! record rejects the whole file.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::connection::ConnectionKind;
use crate::error::{InventoryError, Result};

const REQUIRED: [&str; 3] = ["name", "type", "connection_type"];

/// `conn_cmd` is either a command line or an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConnCmd {
    Line(String),
    Argv(Vec<String>),
}

impl ConnCmd {
    pub fn argv(&self) -> Vec<String> {
        match self {
            ConnCmd::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            ConnCmd::Argv(argv) => argv.clone(),
        }
    }
}

/// One device record.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub name: String,

    #[serde(rename = "type")]
    pub device_type: String,

    pub connection_type: String,

    #[serde(default)]
    pub ipaddr: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub conn_cmd: Option<ConnCmd>,

    /// Comma-separated option tokens.
    #[serde(default)]
    pub options: String,

    /// Registered shell name (default "bash").
    #[serde(default)]
    pub shell: Option<String>,

    /// Per-character send delay in milliseconds.
    #[serde(default)]
    pub char_delay_ms: Option<u64>,

    #[serde(default)]
    pub mac: Option<String>,

    /// Interface facing the device under test.
    #[serde(default)]
    pub iface_dut: Option<String>,

    /// Device-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl DeviceRecord {
    /// A record with only the mandatory fields.
    pub fn new(
        name: impl Into<String>,
        device_type: impl Into<String>,
        connection_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            device_type: device_type.into(),
            connection_type: connection_type.into(),
            ipaddr: None,
            port: None,
            username: None,
            password: None,
            conn_cmd: None,
            options: String::new(),
            shell: None,
            char_delay_ms: None,
            mac: None,
            iface_dut: None,
            extra: Map::new(),
        }
    }

    pub fn connection_kind(&self) -> Result<ConnectionKind> {
        ConnectionKind::from_str(&self.connection_type).map_err(|_| {
            InventoryError::UnknownConnectionType {
                name: self.name.clone(),
                connection_type: self.connection_type.clone(),
            }
            .into()
        })
    }

    pub fn char_delay(&self) -> Option<Duration> {
        self.char_delay_ms.map(Duration::from_millis)
    }

    /// String field from the device-specific part of the record.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key)?.as_str()
    }
}

/// All device records for one run, in file order.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    devices: Vec<DeviceRecord>,
}

impl Inventory {
    /// Read and validate an inventory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate an inventory document.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text).map_err(InventoryError::from)?;
        let records = doc
            .get("devices")
            .and_then(Value::as_array)
            .ok_or(InventoryError::MissingField {
                index: 0,
                field: "devices",
            })?;

        let mut devices = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        for (index, raw) in records.iter().enumerate() {
            for field in REQUIRED {
                if !raw.get(field).is_some_and(Value::is_string) {
                    return Err(InventoryError::MissingField { index, field }.into());
                }
            }
            let record: DeviceRecord =
                serde_json::from_value(raw.clone()).map_err(InventoryError::from)?;
            record.connection_kind()?;
            if !seen.insert(record.name.clone()) {
                return Err(InventoryError::DuplicateName { name: record.name }.into());
            }
            devices.push(record);
        }
        Ok(Self { devices })
    }

    pub fn from_records(devices: Vec<DeviceRecord>) -> Self {
        Self { devices }
    }

    pub fn get(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Check that `board` names a device of this inventory.
    pub fn check_board(&self, board: &str) -> Result<()> {
        match self.get(board) {
            Some(_) => Ok(()),
            None => Err(InventoryError::UnknownBoard {
                name: board.to_string(),
            }
            .into()),
        }
    }
}
