use std::path::Path;

use crate::backend::types::VmState;
use crate::error::AppError;

/// The subset of libvirt domain management the XML helpers rely on.
///
/// Every call blocks until the underlying command or binding call returns.
pub trait Hypervisor {
    /// Current XML of `name`; `extra` holds additional dumpxml options such
    /// as `--inactive`.
    fn dumpxml(&self, name: &str, extra: &str) -> Result<String, AppError>;

    /// Define (or redefine) a persistent domain from an XML file.
    fn define(&self, xml_path: &Path) -> Result<(), AppError>;

    fn undefine(&self, name: &str, options: &str) -> Result<(), AppError>;

    fn start(&self, name: &str) -> Result<(), AppError>;

    /// Forcefully stop a running domain.
    fn destroy(&self, name: &str) -> Result<(), AppError>;

    fn domstate(&self, name: &str) -> Result<VmState, AppError>;
}

/// Handle on a named domain.
pub struct Vm<'h> {
    name: String,
    hypervisor: &'h dyn Hypervisor,
}

impl<'h> Vm<'h> {
    pub fn new(name: impl Into<String>, hypervisor: &'h dyn Hypervisor) -> Self {
        Vm {
            name: name.into(),
            hypervisor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hypervisor(&self) -> &'h dyn Hypervisor {
        self.hypervisor
    }

    pub fn state(&self) -> Result<VmState, AppError> {
        self.hypervisor.domstate(&self.name)
    }

    pub fn is_alive(&self) -> Result<bool, AppError> {
        Ok(self.state()?.is_active())
    }

    /// Start the domain. Starting a domain that is already alive is a no-op.
    pub fn start(&self) -> Result<(), AppError> {
        if self.is_alive()? {
            log::debug!("VM '{}' is already running", self.name);
            return Ok(());
        }
        log::info!("Starting VM '{}'", self.name);
        self.hypervisor.start(&self.name)
    }
}
