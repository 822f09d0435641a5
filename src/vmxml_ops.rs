//! Convenience operations for test code that needs to tweak a guest's
//! definition: set scalar attributes, assert on the dumped XML, and
//! remove, update or create devices.

use regex::Regex;

use crate::backend::device::Device;
use crate::backend::domain_xml::{DeviceLookup, VmXml};
use crate::backend::hypervisor::{Hypervisor, Vm};
use crate::backend::types::{coerce_value, AttrMap, DeviceKind};
use crate::error::AppError;

/// Apply `vm_attrs` to `vmxml`, then write and sync it.
///
/// Digit-only values are assigned as integers. Unknown attribute names are
/// rejected by [`VmXml::set_attr`].
pub fn set_vm_attrs<'a>(
    hv: &dyn Hypervisor,
    vmxml: &'a mut VmXml,
    vm_attrs: &AttrMap,
) -> Result<&'a mut VmXml, AppError> {
    for (attr, value) in vm_attrs {
        log::debug!("Set {attr} = {value}");
        vmxml.set_attr(attr, coerce_value(value))?;
    }
    vmxml.write()?;
    vmxml.sync(hv, "")?;
    Ok(vmxml)
}

/// Check that `pattern` is found in the dumpxml of `vm_name`, or that it is
/// not found when `status_error` is set.
///
/// `option` is passed through to dumpxml (e.g. `--inactive`). A mismatch is
/// reported as [`AppError::TestFail`].
pub fn check_guest_xml(
    hv: &dyn Hypervisor,
    vm_name: &str,
    pattern: &str,
    option: &str,
    status_error: bool,
) -> Result<(), AppError> {
    let re = Regex::new(pattern)?;
    let dumpxml = hv.dumpxml(vm_name, option)?;
    let found = re.is_match(dumpxml.trim());

    let msg = format!(
        "The pattern '{pattern}' is {}found in the vm dumpxml",
        if found { "" } else { "not " }
    );
    if found ^ status_error {
        log::debug!("{msg}");
        Ok(())
    } else {
        Err(AppError::TestFail(msg))
    }
}

/// Remove all devices of `device_type` from the guest definition.
///
/// A guest that was running beforehand is started again afterwards.
pub fn remove_vm_devices_by_type(vm: &Vm<'_>, device_type: &str) -> Result<(), AppError> {
    let vm_was_running = vm.is_alive()?;

    let mut vmxml = VmXml::new_from_dumpxml(vm.hypervisor(), vm.name(), "")?;
    let removed = vmxml.remove_all_device_by_type(device_type);
    log::debug!("Removed {removed} {device_type} device(s) from '{}'", vm.name());
    vmxml.write()?;
    vmxml.sync(vm.hypervisor(), "")?;

    if vm_was_running {
        vm.start()?;
    }
    Ok(())
}

/// Build a new device of `dev_type` with `dev_dict` applied.
pub fn create_vm_device_by_type(dev_type: &str, dev_dict: &AttrMap) -> Result<Device, AppError> {
    let kind: DeviceKind = dev_type.parse()?;
    let mut device = Device::new(kind);
    device.setup_attrs(dev_dict)?;
    Ok(device)
}

/// Look up the `index`-th device of `dev_type` in `vmxml` (negative from the end).
pub fn get_vm_device(vmxml: &VmXml, dev_type: &str, index: isize) -> DeviceLookup {
    vmxml.get_device(dev_type, index)
}

/// Append `device` to the guest definition, then write and sync it.
pub fn add_vm_device(hv: &dyn Hypervisor, vmxml: &mut VmXml, device: Device) -> Result<(), AppError> {
    log::debug!("Adding {} device to '{}'", device.tag(), vmxml.vm_name()?);
    vmxml.add_device(device);
    vmxml.write()?;
    vmxml.sync(hv, "")
}

/// Update the `index`-th device of `dev_type` with `dev_dict`, or create and
/// append a new device when there is no such device. Returns the resulting
/// device in both cases.
pub fn modify_vm_device(
    hv: &dyn Hypervisor,
    vmxml: &mut VmXml,
    dev_type: &str,
    dev_dict: Option<&AttrMap>,
    index: isize,
) -> Result<Device, AppError> {
    let empty = AttrMap::new();
    let dev_dict = dev_dict.unwrap_or(&empty);

    match get_vm_device(vmxml, dev_type, index) {
        DeviceLookup::Found {
            position,
            mut devices,
        } => {
            devices[position].setup_attrs(dev_dict)?;
            let device = devices[position].clone();

            vmxml.set_devices(devices);
            vmxml.write()?;
            vmxml.sync(hv, "")?;
            Ok(device)
        }
        DeviceLookup::NotFound => {
            log::debug!("No {dev_type} device at index {index}, creating one");
            let device = create_vm_device_by_type(dev_type, dev_dict)?;
            add_vm_device(hv, vmxml, device.clone())?;
            Ok(device)
        }
    }
}
