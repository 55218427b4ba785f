//! Device manager: owns every live device and answers template lookups.

use indexmap::IndexMap;
use log::debug;

use crate::device::Device;
use crate::error::{Error, ManagerError, Result};
use crate::templates::{Cpe, Lan, Provisioner, Template, Tftp, Wan};

/// Live devices in inventory order, indexed by template.
#[derive(Default)]
pub struct DeviceManager {
    devices: IndexMap<String, Box<dyn Device>>,
    index: IndexMap<Template, Vec<String>>,
}

fn dyn_mut(device: &mut Box<dyn Device>) -> &mut dyn Device {
    device.as_mut()
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. Names must be unique.
    pub fn register(&mut self, device: Box<dyn Device>) -> Result<()> {
        let name = device.name().to_string();
        if self.devices.contains_key(&name) {
            return Err(ManagerError::AlreadyRegistered { name }.into());
        }
        debug!(
            "registered {} ({}) as {:?}",
            name,
            device.device_type(),
            device.templates()
        );
        self.devices.insert(name, device);
        self.rebuild_index();
        Ok(())
    }

    /// Remove a device, keeping the order of the others.
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Device>> {
        let device = self.devices.shift_remove(name)?;
        self.rebuild_index();
        Some(device)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (name, device) in &self.devices {
            for template in device.templates() {
                self.index.entry(*template).or_default().push(name.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device names in inventory order.
    pub fn names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Names of the devices satisfying `template`, in inventory order.
    pub fn names_by_type(&self, template: Template) -> &[String] {
        self.index.get(&template).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn get_device_by_name(&mut self, name: &str) -> Result<&mut dyn Device> {
        self.devices.get_mut(name).map(dyn_mut).ok_or_else(|| {
            ManagerError::UnknownDevice {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// The single device satisfying `template`, or `None`.
    ///
    /// More than one match is an error: callers asking for "the" LAN must
    /// not silently get an arbitrary one.
    pub fn get_device_by_type(&mut self, template: Template) -> Result<Option<&mut dyn Device>> {
        match self.index.get(&template).map(Vec::as_slice).unwrap_or_default() {
            [] => Ok(None),
            [name] => Ok(self.devices.get_mut(name).map(dyn_mut)),
            _ => Err(ManagerError::MultipleDevices {
                template: template.to_string(),
            }
            .into()),
        }
    }

    /// Every device satisfying `template`, keyed by name, in inventory order.
    pub fn get_devices_by_type(&mut self, template: Template) -> IndexMap<String, &mut dyn Device> {
        self.devices
            .iter_mut()
            .filter(|(_, device)| device.satisfies(template))
            .map(|(name, device)| (name.clone(), dyn_mut(device)))
            .collect()
    }

    /// Every device, in inventory order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut dyn Device> {
        self.devices.values_mut().map(dyn_mut)
    }

    fn require(&mut self, template: Template) -> Result<&mut dyn Device> {
        self.get_device_by_type(template)?.ok_or_else(|| {
            ManagerError::NoDevice {
                template: template.to_string(),
            }
            .into()
        })
    }

    fn missing_surface(template: Template) -> Error {
        Error::Boardfarm(format!(
            "device declares {template} but does not expose its interface"
        ))
    }

    pub fn cpe(&mut self) -> Result<&mut dyn Cpe> {
        self.require(Template::Cpe)?
            .as_cpe()
            .ok_or_else(|| Self::missing_surface(Template::Cpe))
    }

    pub fn lan(&mut self) -> Result<&mut dyn Lan> {
        self.require(Template::Lan)?
            .as_lan()
            .ok_or_else(|| Self::missing_surface(Template::Lan))
    }

    pub fn wan(&mut self) -> Result<&mut dyn Wan> {
        self.require(Template::Wan)?
            .as_wan()
            .ok_or_else(|| Self::missing_surface(Template::Wan))
    }

    pub fn provisioner(&mut self) -> Result<&mut dyn Provisioner> {
        self.require(Template::Provisioner)?
            .as_provisioner()
            .ok_or_else(|| Self::missing_surface(Template::Provisioner))
    }

    pub fn tftp(&mut self) -> Result<&mut dyn Tftp> {
        self.require(Template::Tftp)?
            .as_tftp()
            .ok_or_else(|| Self::missing_surface(Template::Tftp))
    }
}
