#[cfg(feature = "native")]
pub mod connection;
pub mod device;
pub mod domain_xml;
pub mod hypervisor;
pub mod types;
pub mod virsh;
pub mod xml_tree;
