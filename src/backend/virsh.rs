use std::path::{Path, PathBuf};
use std::process::Command;

use crate::backend::hypervisor::Hypervisor;
use crate::backend::types::VmState;
use crate::error::AppError;

/// [`Hypervisor`] backed by the `virsh` command line tool.
#[derive(Debug, Clone)]
pub struct Virsh {
    binary: PathBuf,
    uri: Option<String>,
}

impl Virsh {
    pub fn new(binary: impl Into<PathBuf>, uri: Option<String>) -> Self {
        Virsh {
            binary: binary.into(),
            uri,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn command_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(ref uri) = self.uri {
            full.push("-c");
            full.push(uri.as_str());
        }
        full.extend_from_slice(args);
        full
    }

    fn run(&self, args: &[&str]) -> Result<String, AppError> {
        let subcommand = args.first().copied().unwrap_or_default();
        let args = self.command_args(args);
        log::debug!("Running: {} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary).args(&args).output()?;

        if !output.status.success() {
            return Err(AppError::Libvirt(format!(
                "virsh {subcommand} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for Virsh {
    fn default() -> Self {
        Virsh::new("virsh", None)
    }
}

impl Hypervisor for Virsh {
    fn dumpxml(&self, name: &str, extra: &str) -> Result<String, AppError> {
        let mut args = vec!["dumpxml", name];
        args.extend(extra.split_whitespace());
        self.run(&args)
    }

    fn define(&self, xml_path: &Path) -> Result<(), AppError> {
        let path = xml_path.to_string_lossy();
        self.run(&["define", path.as_ref()])?;
        Ok(())
    }

    fn undefine(&self, name: &str, options: &str) -> Result<(), AppError> {
        let mut args = vec!["undefine", name];
        args.extend(options.split_whitespace());
        self.run(&args)?;
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), AppError> {
        self.run(&["start", name])?;
        Ok(())
    }

    fn destroy(&self, name: &str) -> Result<(), AppError> {
        self.run(&["destroy", name])?;
        Ok(())
    }

    fn domstate(&self, name: &str) -> Result<VmState, AppError> {
        let out = self.run(&["domstate", name])?;
        Ok(VmState::from_domstate(&out))
    }
}
