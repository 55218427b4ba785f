//! Global registry mapping inventory `type` strings to device constructors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use indexmap::IndexMap;
use log::{debug, info};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::device::{Device, DeviceSettings};
use crate::devices;
use crate::error::{Error, InventoryError, Result};
use crate::inventory::DeviceRecord;

/// Builds a device from its record. No console may be opened here.
pub type DeviceConstructor = fn(DeviceRecord, &DeviceSettings) -> Result<Box<dyn Device>>;

static REGISTRY: Lazy<RwLock<DeviceRegistry>> = Lazy::new(|| RwLock::new(DeviceRegistry::with_builtin()));

/// Overlay file layout.
#[derive(Debug, Deserialize)]
struct Overlay {
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// Registry of device types.
#[derive(Default)]
pub struct DeviceRegistry {
    classes: IndexMap<String, DeviceConstructor>,
    aliases: HashMap<String, String>,
}

impl DeviceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the generic `bf_*` devices.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        devices::register_builtin(&mut registry);
        registry
    }

    /// Get the global registry.
    pub fn global() -> &'static RwLock<DeviceRegistry> {
        &REGISTRY
    }

    pub(crate) fn insert(&mut self, type_name: &str, constructor: DeviceConstructor) {
        self.classes.insert(type_name.to_string(), constructor);
    }

    /// Register a device type.
    pub fn register(&mut self, type_name: &str, constructor: DeviceConstructor) -> Result<()> {
        if self.contains(type_name) {
            return Err(Error::Boardfarm(format!(
                "device type '{type_name}' is already registered"
            )));
        }
        self.insert(type_name, constructor);
        Ok(())
    }

    /// Make `alias` instantiate the same class as `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> Result<()> {
        if self.classes.contains_key(alias) {
            return Err(Error::Boardfarm(format!(
                "alias '{alias}' would shadow a registered device type"
            )));
        }
        let Some(resolved) = self.resolve(target).map(str::to_string) else {
            return Err(Error::Boardfarm(format!(
                "alias '{alias}' points at unknown device type '{target}'"
            )));
        };
        debug!("device type alias {} -> {}", alias, resolved);
        self.aliases.insert(alias.to_string(), resolved);
        Ok(())
    }

    /// Class name behind `type_name`, following aliases.
    pub fn resolve<'a>(&'a self, type_name: &'a str) -> Option<&'a str> {
        if self.classes.contains_key(type_name) {
            return Some(type_name);
        }
        self.aliases.get(type_name).map(String::as_str)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_some()
    }

    /// Registered class names, in registration order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Build the device for `record`.
    pub fn instantiate(&self, record: DeviceRecord, settings: &DeviceSettings) -> Result<Box<dyn Device>> {
        let constructor = self
            .resolve(&record.device_type)
            .and_then(|class| self.classes.get(class))
            .copied();
        match constructor {
            Some(constructor) => constructor(record, settings),
            None => Err(InventoryError::UnknownType {
                name: record.name,
                device_type: record.device_type,
            }
            .into()),
        }
    }

    /// Load alias overlays. Each path is a JSON file or a directory of
    /// JSON files. Returns the number of aliases added.
    pub fn load_overlay(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let mut added = 0;
        for path in paths {
            for file in overlay_files(path)? {
                added += self.load_overlay_file(&file)?;
            }
        }
        if added > 0 {
            info!("loaded {} device type alias(es) from overlays", added);
        }
        Ok(added)
    }

    fn load_overlay_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let overlay: Overlay = serde_json::from_str(&text).map_err(InventoryError::from)?;
        let mut aliases: Vec<_> = overlay.aliases.into_iter().collect();
        aliases.sort();
        for (alias, target) in &aliases {
            self.alias(alias, target)?;
        }
        Ok(aliases.len())
    }
}

fn overlay_files(path: &Path) -> Result<Vec<PathBuf>> {
    let read_error = |source| InventoryError::Read {
        path: path.to_path_buf(),
        source,
    };
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path).map_err(read_error)? {
        let file = entry.map_err(read_error)?.path();
        if file.extension().is_some_and(|ext| ext == "json") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lan_record(device_type: &str) -> DeviceRecord {
        let mut record = DeviceRecord::new("lan", device_type, "ssh");
        record.ipaddr = Some("10.0.0.2".into());
        record
    }

    #[test]
    fn test_builtin_types() {
        let registry = DeviceRegistry::with_builtin();
        let types: Vec<_> = registry.types().collect();
        assert_eq!(types, ["bf_lan", "bf_wan", "bf_tftp", "bf_dhcp", "bf_cpe"]);
        assert!(DeviceRegistry::global().read().unwrap().contains("bf_cpe"));
    }

    #[test]
    fn test_instantiate_and_unknown_type() {
        let registry = DeviceRegistry::with_builtin();
        let device = registry.instantiate(lan_record("bf_lan"), &DeviceSettings::default()).unwrap();
        assert_eq!(device.name(), "lan");
        assert!(device.console_roles().is_empty());

        let err = registry
            .instantiate(lan_record("acme_lan"), &DeviceSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Inventory(InventoryError::UnknownType { .. })));
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = DeviceRegistry::with_builtin();
        assert!(registry.register("bf_lan", devices::bf_lan::create).is_err());
        registry.register("acme_lan", devices::bf_lan::create).unwrap();
        assert!(registry.contains("acme_lan"));
    }

    #[test]
    fn test_overlay_aliases() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lab.json"),
            r#"{"aliases": {"lab_lan": "bf_lan", "lab_cpe": "bf_cpe"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = DeviceRegistry::with_builtin();
        assert_eq!(registry.load_overlay(&[dir.path().to_path_buf()]).unwrap(), 2);
        assert_eq!(registry.resolve("lab_lan"), Some("bf_lan"));

        let device = registry.instantiate(lan_record("lab_lan"), &DeviceSettings::default()).unwrap();
        assert_eq!(device.device_type(), "lab_lan");
    }

    #[test]
    fn test_overlay_rejects_unknown_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"{"aliases": {"x": "nope"}}"#).unwrap();
        let mut registry = DeviceRegistry::with_builtin();
        assert!(registry.load_overlay(&[file]).is_err());
    }
}
