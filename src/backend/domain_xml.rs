use std::io::{Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::backend::device::Device;
use crate::backend::hypervisor::Hypervisor;
use crate::backend::types::{coerce_value, AttrValue};
use crate::backend::xml_tree::Element;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropKind {
    Int,
    Text,
}

/// A scalar domain property: the element path below `<domain>` and, when the
/// value lives in an attribute rather than the element text, its name.
struct Property {
    name: &'static str,
    path: &'static [&'static str],
    attr: Option<&'static str>,
    kind: PropKind,
}

const fn prop(
    name: &'static str,
    path: &'static [&'static str],
    attr: Option<&'static str>,
    kind: PropKind,
) -> Property {
    Property {
        name,
        path,
        attr,
        kind,
    }
}

const PROPERTIES: &[Property] = &[
    prop("hypervisor_type", &[], Some("type"), PropKind::Text),
    prop("vm_name", &["name"], None, PropKind::Text),
    prop("uuid", &["uuid"], None, PropKind::Text),
    prop("title", &["title"], None, PropKind::Text),
    prop("description", &["description"], None, PropKind::Text),
    prop("vcpu", &["vcpu"], None, PropKind::Int),
    prop("current_vcpu", &["vcpu"], Some("current"), PropKind::Int),
    prop("placement", &["vcpu"], Some("placement"), PropKind::Text),
    prop("cpuset", &["vcpu"], Some("cpuset"), PropKind::Text),
    prop("max_mem", &["memory"], None, PropKind::Int),
    prop("max_mem_unit", &["memory"], Some("unit"), PropKind::Text),
    prop("current_mem", &["currentMemory"], None, PropKind::Int),
    prop("current_mem_unit", &["currentMemory"], Some("unit"), PropKind::Text),
    prop("max_mem_rt", &["maxMemory"], None, PropKind::Int),
    prop("max_mem_rt_slots", &["maxMemory"], Some("slots"), PropKind::Int),
    prop("max_mem_rt_unit", &["maxMemory"], Some("unit"), PropKind::Text),
    prop("iothreads", &["iothreads"], None, PropKind::Int),
    prop("on_poweroff", &["on_poweroff"], None, PropKind::Text),
    prop("on_reboot", &["on_reboot"], None, PropKind::Text),
    prop("on_crash", &["on_crash"], None, PropKind::Text),
];

fn property(name: &str) -> Result<&'static Property, AppError> {
    PROPERTIES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| AppError::UnknownAttribute(name.to_string()))
}

/// Result of looking up the n-th device of a given type.
#[derive(Debug)]
pub enum DeviceLookup {
    /// `devices[position]` is the requested device; `devices` is the full
    /// device list of the domain, ready to be handed back to
    /// [`VmXml::set_devices`] after editing.
    Found {
        position: usize,
        devices: Vec<Device>,
    },
    NotFound,
}

/// In-memory copy of a domain definition, backed by a scratch file that
/// [`VmXml::write`] refreshes and [`VmXml::sync`] defines from.
pub struct VmXml {
    tree: Element,
    backing: NamedTempFile,
}

impl VmXml {
    pub fn from_xml(xml: &str) -> Result<Self, AppError> {
        let tree = Element::parse(xml)?;
        if tree.name != "domain" {
            return Err(AppError::Xml(format!(
                "expected a <domain> document, got <{}>",
                tree.name
            )));
        }
        let mut vmxml = VmXml {
            tree,
            backing: NamedTempFile::new()?,
        };
        vmxml.write()?;
        Ok(vmxml)
    }

    pub fn new_from_dumpxml(
        hv: &dyn Hypervisor,
        vm_name: &str,
        options: &str,
    ) -> Result<Self, AppError> {
        let xml = hv.dumpxml(vm_name, options)?;
        Self::from_xml(&xml)
    }

    pub fn new_from_inactive_dumpxml(hv: &dyn Hypervisor, vm_name: &str) -> Result<Self, AppError> {
        Self::new_from_dumpxml(hv, vm_name, "--inactive")
    }

    pub fn tree(&self) -> &Element {
        &self.tree
    }

    pub fn to_xml_string(&self) -> String {
        self.tree.to_xml_string()
    }

    pub fn path(&self) -> &Path {
        self.backing.path()
    }

    pub fn vm_name(&self) -> Result<String, AppError> {
        match self.get_attr("vm_name")? {
            Some(name) => Ok(name.to_string()),
            None => Err(AppError::Xml("domain has no <name>".to_string())),
        }
    }

    pub fn get_attr(&self, name: &str) -> Result<Option<AttrValue>, AppError> {
        let prop = property(name)?;

        let mut element = &self.tree;
        for segment in prop.path {
            match element.child(segment) {
                Some(child) => element = child,
                None => return Ok(None),
            }
        }

        let raw = match prop.attr {
            Some(attr) => match element.attribute(attr) {
                Some(v) => v.to_string(),
                None => return Ok(None),
            },
            None => element.text().trim().to_string(),
        };

        match prop.kind {
            PropKind::Text => Ok(Some(AttrValue::Str(raw))),
            PropKind::Int if raw.is_empty() => Ok(None),
            PropKind::Int => raw.parse::<i64>().map(|n| Some(AttrValue::Int(n))).map_err(|_| {
                AppError::Xml(format!("attribute {name} holds non-integer value '{raw}'"))
            }),
        }
    }

    /// Assign one scalar property, creating its element if missing.
    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> Result<(), AppError> {
        let prop = property(name)?;

        let raw = match (prop.kind, value) {
            (PropKind::Int, AttrValue::Str(s)) => {
                return Err(AppError::InvalidValue(format!(
                    "attribute {name} expects an integer, got '{s}'"
                )))
            }
            (_, value) => value.to_string(),
        };

        let mut element = &mut self.tree;
        for segment in prop.path {
            element = element.child_or_insert(segment);
        }
        match prop.attr {
            Some(attr) => element.set_attribute(attr, raw),
            None => element.set_text(raw),
        }
        Ok(())
    }

    /// Convenience wrapper around [`VmXml::set_attr`] for raw string input.
    pub fn set_attr_str(&mut self, name: &str, value: &str) -> Result<(), AppError> {
        self.set_attr(name, coerce_value(value))
    }

    pub fn devices(&self) -> Vec<Device> {
        self.tree
            .child("devices")
            .map(|devices| devices.elements().cloned().map(Device::from_element).collect())
            .unwrap_or_default()
    }

    /// Replace every child of `<devices>` with `devices`, in order.
    pub fn set_devices(&mut self, devices: Vec<Device>) {
        let container = self.tree.child_or_insert("devices");
        container.retain_elements(|_| false);
        for device in devices {
            container.push_element(device.into_element());
        }
    }

    pub fn add_device(&mut self, device: Device) {
        self.tree
            .child_or_insert("devices")
            .push_element(device.into_element());
    }

    /// Remove every device whose element name is `tag`. Returns how many went.
    pub fn remove_all_device_by_type(&mut self, tag: &str) -> usize {
        let Some(container) = self.tree.child_mut("devices") else {
            return 0;
        };
        let before = container.elements().count();
        container.retain_elements(|e| e.name != tag);
        before - container.elements().count()
    }

    /// The `index`-th device whose element name is `tag`. Negative indexes
    /// count from the end, so `-1` is the last device of that type.
    pub fn get_device(&self, tag: &str, index: isize) -> DeviceLookup {
        let devices = self.devices();
        let matching: Vec<usize> = devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.tag() == tag)
            .map(|(pos, _)| pos)
            .collect();

        let slot = if index >= 0 {
            Some(index.unsigned_abs())
        } else {
            matching.len().checked_sub(index.unsigned_abs())
        };
        let position = slot.and_then(|i| matching.get(i).copied());

        match position {
            Some(position) => DeviceLookup::Found { position, devices },
            None => DeviceLookup::NotFound,
        }
    }

    /// Serialise the tree into the backing file.
    pub fn write(&mut self) -> Result<(), AppError> {
        let xml = self.tree.to_xml_string();
        let file = self.backing.as_file_mut();
        file.set_len(0)?;
        file.rewind()?;
        file.write_all(xml.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Redefine the domain from the backing file.
    ///
    /// The current inactive definition is kept as a backup. A running domain is
    /// destroyed and then undefined (with `undefine_options`, e.g. `--nvram`),
    /// so the domain is left shut off with the new definition. When the new
    /// definition is rejected the backup is defined again and the define error
    /// is returned.
    pub fn sync(&self, hv: &dyn Hypervisor, undefine_options: &str) -> Result<(), AppError> {
        let name = self.vm_name()?;

        let backup = match hv.dumpxml(&name, "--inactive --security-info") {
            Ok(xml) => Some(xml),
            Err(e) => {
                log::debug!("No existing definition of '{name}' to back up: {e}");
                None
            }
        };
        if backup.is_some() {
            if hv.domstate(&name)?.is_active() {
                log::info!("Destroying running VM '{name}' before redefining it");
                hv.destroy(&name)?;
            }
            hv.undefine(&name, undefine_options)?;
        }

        log::info!("Defining VM '{name}' from {}", self.path().display());
        let err = match hv.define(self.path()) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let Some(backup) = backup else {
            return Err(err);
        };
        log::warn!("Define of '{name}' failed ({err}), restoring previous definition");
        let restore = VmXml::from_xml(&backup)?;
        if let Err(restore_err) = hv.define(restore.path()) {
            log::error!("Restoring definition of '{name}' failed: {restore_err}");
            return Err(AppError::Libvirt(format!(
                "{err}; restoring the previous definition also failed: {restore_err}"
            )));
        }
        Err(err)
    }
}
