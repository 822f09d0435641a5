pub mod backend;
pub mod config;
pub mod error;
pub mod vmxml_ops;

pub use backend::device::Device;
pub use backend::domain_xml::{DeviceLookup, VmXml};
pub use backend::hypervisor::{Hypervisor, Vm};
pub use backend::types::{AttrMap, AttrValue, DeviceKind, VmState};
pub use error::AppError;
