use std::path::Path;
use std::sync::{Mutex, OnceLock};

use virt::connect::Connect;
use virt::domain::Domain;

use crate::backend::hypervisor::Hypervisor;
use crate::backend::types::VmState;
use crate::error::AppError;

// ---------------------------------------------------------------------------
// Connection cache
//
// A test run issues many short dumpxml/define calls against the same daemon.
// One connection per URI is kept open and every caller gets a virConnectRef
// clone of it. A dead connection is replaced on the next call.
// ---------------------------------------------------------------------------

struct ConnCache {
    uri: Option<String>,
    conn: Connect,
}

static CONN_CACHE: OnceLock<Mutex<Option<ConnCache>>> = OnceLock::new();

fn conn_cache() -> &'static Mutex<Option<ConnCache>> {
    CONN_CACHE.get_or_init(|| Mutex::new(None))
}

/// Return a ref-counted clone of the cached connection for `uri`, opening a
/// new one if none exists or the cached one is no longer alive.
pub fn get_conn(uri: Option<&str>) -> Result<Connect, AppError> {
    let mut guard = conn_cache().lock().unwrap_or_else(|e| e.into_inner());

    let cached = guard
        .as_ref()
        .filter(|c| c.uri.as_deref() == uri && c.conn.is_alive().unwrap_or(false))
        .map(|c| c.conn.clone());
    if let Some(conn) = cached {
        return Ok(conn);
    }

    log::debug!("Opening libvirt connection to {}", uri.unwrap_or("default URI"));
    let conn = Connect::open(uri)?;
    *guard = Some(ConnCache {
        uri: uri.map(str::to_string),
        conn: conn.clone(),
    });
    Ok(conn)
}

fn xml_flags(extra: &str) -> Result<u32, AppError> {
    let mut flags = 0;
    for opt in extra.split_whitespace() {
        flags |= match opt {
            "--inactive" => virt::sys::VIR_DOMAIN_XML_INACTIVE,
            "--security-info" => virt::sys::VIR_DOMAIN_XML_SECURE,
            "--update-cpu" => virt::sys::VIR_DOMAIN_XML_UPDATE_CPU,
            "--migratable" => virt::sys::VIR_DOMAIN_XML_MIGRATABLE,
            other => {
                return Err(AppError::InvalidValue(format!(
                    "unsupported dumpxml option '{other}'"
                )))
            }
        };
    }
    Ok(flags)
}

fn undefine_flags(options: &str) -> Result<u32, AppError> {
    let mut flags = 0;
    for opt in options.split_whitespace() {
        flags |= match opt {
            "--nvram" => virt::sys::VIR_DOMAIN_UNDEFINE_NVRAM,
            "--managed-save" => virt::sys::VIR_DOMAIN_UNDEFINE_MANAGED_SAVE,
            "--snapshots-metadata" => virt::sys::VIR_DOMAIN_UNDEFINE_SNAPSHOTS_METADATA,
            "--checkpoints-metadata" => virt::sys::VIR_DOMAIN_UNDEFINE_CHECKPOINTS_METADATA,
            other => {
                return Err(AppError::InvalidValue(format!(
                    "unsupported undefine option '{other}'"
                )))
            }
        };
    }
    Ok(flags)
}

/// [`Hypervisor`] talking to libvirtd through the C bindings.
#[derive(Debug, Clone, Default)]
pub struct LibvirtConnection {
    uri: Option<String>,
}

impl LibvirtConnection {
    pub fn new(uri: Option<String>) -> Self {
        LibvirtConnection { uri }
    }

    fn with_domain<F, R>(&self, name: &str, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&Domain) -> Result<R, AppError>,
    {
        let conn = get_conn(self.uri.as_deref())?;
        let domain = Domain::lookup_by_name(&conn, name)?;
        f(&domain)
    }
}

impl Hypervisor for LibvirtConnection {
    fn dumpxml(&self, name: &str, extra: &str) -> Result<String, AppError> {
        let flags = xml_flags(extra)?;
        self.with_domain(name, |domain| Ok(domain.get_xml_desc(flags)?))
    }

    fn define(&self, xml_path: &Path) -> Result<(), AppError> {
        let xml = std::fs::read_to_string(xml_path)?;
        let conn = get_conn(self.uri.as_deref())?;
        Domain::define_xml(&conn, &xml)?;
        Ok(())
    }

    fn undefine(&self, name: &str, options: &str) -> Result<(), AppError> {
        let flags = undefine_flags(options)?;
        self.with_domain(name, |domain| {
            domain.undefine_flags(flags)?;
            Ok(())
        })
    }

    fn start(&self, name: &str) -> Result<(), AppError> {
        self.with_domain(name, |domain| {
            domain.create()?;
            Ok(())
        })
    }

    fn destroy(&self, name: &str) -> Result<(), AppError> {
        self.with_domain(name, |domain| {
            domain.destroy()?;
            Ok(())
        })
    }

    fn domstate(&self, name: &str) -> Result<VmState, AppError> {
        self.with_domain(name, |domain| {
            let info = domain.get_info()?;
            Ok(VmState::from_libvirt(info.state as u32))
        })
    }
}
