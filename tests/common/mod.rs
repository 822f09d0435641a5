#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use vmxml_utils::backend::xml_tree::Element;
use vmxml_utils::{AppError, Hypervisor, VmState};

pub const GUEST_XML: &str = r#"<domain type="kvm">
  <name>avocado-vt-vm1</name>
  <uuid>5f5c1f7e-4a0b-4bfb-9c52-7f2f1a6bfa11</uuid>
  <memory unit="KiB">1048576</memory>
  <currentMemory unit="KiB">1048576</currentMemory>
  <vcpu placement="static">4</vcpu>
  <devices>
    <emulator>/usr/libexec/qemu-kvm</emulator>
    <disk type="file" device="disk">
      <driver name="qemu" type="qcow2"/>
      <source file="/var/lib/libvirt/images/jeos.qcow2"/>
      <target dev="vda" bus="virtio"/>
    </disk>
    <disk type="file" device="cdrom">
      <target dev="sda" bus="sata"/>
      <readonly/>
    </disk>
    <controller type="usb" index="0" model="qemu-xhci"/>
    <interface type="network">
      <source network="default"/>
      <model type="virtio"/>
    </interface>
    <serial type="pty"><target port="0"/></serial>
  </devices>
</domain>"#;

struct Domain {
    /// Configuration used by the next boot; `None` once undefined.
    persistent: Option<String>,
    /// Configuration of the running guest; `None` while shut off.
    live: Option<String>,
    state: VmState,
}

impl Domain {
    fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// In-memory stand-in for libvirtd with virsh-like semantics.
///
/// A running guest keeps the XML it was started with: defining a new
/// configuration only changes what `dumpxml --inactive` returns until the
/// guest is destroyed and started again. Undefining a running guest makes it
/// transient, starting an active guest fails.
#[derive(Default)]
pub struct FakeHypervisor {
    domains: RefCell<HashMap<String, Domain>>,
    calls: RefCell<Vec<String>>,
    failing_defines: Cell<u32>,
}

impl FakeHypervisor {
    pub fn with_guest(xml: &str, state: VmState) -> Self {
        let hv = FakeHypervisor::default();
        let name = domain_name(xml).unwrap();
        let live = state.is_active().then(|| xml.to_string());
        hv.domains.borrow_mut().insert(
            name,
            Domain {
                persistent: Some(xml.to_string()),
                live,
                state,
            },
        );
        hv
    }

    /// The persistent (inactive) definition.
    pub fn xml(&self, name: &str) -> String {
        self.domains.borrow()[name].persistent.clone().unwrap()
    }

    /// The XML of the running guest.
    pub fn live_xml(&self, name: &str) -> String {
        self.domains.borrow()[name].live.clone().unwrap()
    }

    pub fn state(&self, name: &str) -> VmState {
        self.domains.borrow()[name].state
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Make the next `count` define calls fail.
    pub fn fail_defines(&self, count: u32) {
        self.failing_defines.set(count);
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn no_domain(name: &str) -> AppError {
        AppError::Libvirt(format!("failed to get domain '{name}'"))
    }
}

fn domain_name(xml: &str) -> Result<String, AppError> {
    let tree = Element::parse(xml)?;
    tree.child("name")
        .map(|n| n.text())
        .ok_or_else(|| AppError::Xml("missing <name>".to_string()))
}

impl Hypervisor for FakeHypervisor {
    fn dumpxml(&self, name: &str, extra: &str) -> Result<String, AppError> {
        self.record(format!("dumpxml {name} {extra}").trim_end().to_string());
        let domains = self.domains.borrow();
        let domain = domains.get(name).ok_or_else(|| Self::no_domain(name))?;
        let inactive = extra.split_whitespace().any(|opt| opt == "--inactive");
        let xml = if inactive {
            domain.persistent.as_ref().or(domain.live.as_ref())
        } else {
            domain.live.as_ref().or(domain.persistent.as_ref())
        };
        xml.cloned().ok_or_else(|| Self::no_domain(name))
    }

    fn define(&self, xml_path: &Path) -> Result<(), AppError> {
        let xml = std::fs::read_to_string(xml_path)?;
        let name = domain_name(&xml)?;
        self.record(format!("define {name}"));

        if self.failing_defines.get() > 0 {
            self.failing_defines.set(self.failing_defines.get() - 1);
            return Err(AppError::Libvirt("XML error: unsupported configuration".to_string()));
        }

        self.domains
            .borrow_mut()
            .entry(name)
            .or_insert(Domain {
                persistent: None,
                live: None,
                state: VmState::Shutoff,
            })
            .persistent = Some(xml);
        Ok(())
    }

    fn undefine(&self, name: &str, options: &str) -> Result<(), AppError> {
        self.record(format!("undefine {name} {options}").trim_end().to_string());
        let mut domains = self.domains.borrow_mut();
        let domain = domains.get_mut(name).ok_or_else(|| Self::no_domain(name))?;
        if domain.is_active() {
            domain.persistent = None;
        } else {
            domains.remove(name);
        }
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), AppError> {
        self.record(format!("start {name}"));
        let mut domains = self.domains.borrow_mut();
        let domain = domains.get_mut(name).ok_or_else(|| Self::no_domain(name))?;
        if domain.is_active() {
            return Err(AppError::Libvirt(
                "Requested operation is not valid: domain is already active".to_string(),
            ));
        }
        let Some(ref persistent) = domain.persistent else {
            return Err(Self::no_domain(name));
        };
        domain.live = Some(persistent.clone());
        domain.state = VmState::Running;
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<(), AppError> {
        self.record(format!("destroy {name}"));
        let mut domains = self.domains.borrow_mut();
        let domain = domains.get_mut(name).ok_or_else(|| Self::no_domain(name))?;
        if !domain.is_active() {
            return Err(AppError::Libvirt(
                "Requested operation is not valid: domain is not running".to_string(),
            ));
        }
        domain.live = None;
        domain.state = VmState::Shutoff;
        if domain.persistent.is_none() {
            domains.remove(name);
        }
        Ok(())
    }

    fn domstate(&self, name: &str) -> Result<VmState, AppError> {
        self.domains
            .borrow()
            .get(name)
            .map(|d| d.state)
            .ok_or_else(|| Self::no_domain(name))
    }
}

pub fn attrs(pairs: &[(&str, &str)]) -> vmxml_utils::AttrMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
