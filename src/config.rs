use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::hypervisor::Hypervisor;
use crate::backend::virsh::Virsh;
use crate::error::AppError;

pub const ENV_URI: &str = "LIBVIRT_DEFAULT_URI";
pub const ENV_VIRSH: &str = "VMXML_VIRSH";
pub const ENV_BACKEND: &str = "VMXML_BACKEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Virsh,
    Native,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Virsh => "virsh",
            BackendKind::Native => "native",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "virsh" => Ok(BackendKind::Virsh),
            "native" => Ok(BackendKind::Native),
            other => Err(AppError::InvalidValue(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub uri: Option<String>,
    pub virsh: PathBuf,
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            uri: None,
            virsh: PathBuf::from("virsh"),
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Config::default();
        if let Some(uri) = get(ENV_URI) {
            config.uri = Some(uri);
        }
        if let Some(virsh) = get(ENV_VIRSH) {
            config.virsh = PathBuf::from(virsh);
        }
        if let Some(backend) = get(ENV_BACKEND) {
            config.backend = backend.trim().parse()?;
        }
        Ok(config)
    }

    pub fn open_hypervisor(&self) -> Result<Box<dyn Hypervisor>, AppError> {
        log::debug!(
            "Using {} backend, uri {}",
            self.backend,
            self.uri.as_deref().unwrap_or("(default)")
        );
        match self.backend {
            BackendKind::Virsh => Ok(Box::new(Virsh::new(self.virsh.clone(), self.uri.clone()))),
            #[cfg(feature = "native")]
            BackendKind::Native => Ok(Box::new(
                crate::backend::connection::LibvirtConnection::new(self.uri.clone()),
            )),
            #[cfg(not(feature = "native"))]
            BackendKind::Native => Err(AppError::InvalidValue(
                "the native backend requires building with the `native` feature".to_string(),
            )),
        }
    }
}
