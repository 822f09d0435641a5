use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use vmxml_utils::config::{BackendKind, Config};
use vmxml_utils::vmxml_ops;
use vmxml_utils::{AttrMap, Vm, VmXml};

#[derive(Parser)]
#[command(name = "vmxml")]
#[command(about = "Inspect and modify libvirt guest definitions", long_about = None)]
struct Cli {
    /// Hypervisor connection URI (defaults to LIBVIRT_DEFAULT_URI)
    #[arg(short = 'c', long = "connect", global = true)]
    uri: Option<String>,

    /// Path to the virsh binary
    #[arg(long, global = true)]
    virsh: Option<PathBuf>,

    /// Backend used to talk to libvirt: virsh or native
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the guest XML
    Dumpxml {
        vm: String,
        /// Extra dumpxml options, e.g. "--inactive"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        option: String,
    },
    /// Set scalar attributes (vcpu, max_mem, title, ...) and redefine the guest
    SetAttrs {
        vm: String,
        #[arg(required = true, value_parser = parse_key_val)]
        attrs: Vec<(String, String)>,
    },
    /// Fail unless PATTERN is found in the guest XML (or absent with --expect-absent)
    CheckXml {
        vm: String,
        pattern: String,
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        option: String,
        #[arg(long)]
        expect_absent: bool,
    },
    /// Remove every device of TYPE, restarting the guest if it was running
    RemoveDevices {
        vm: String,
        #[arg(value_name = "TYPE")]
        device_type: String,
    },
    /// Update the INDEX-th device of TYPE, or create it when missing
    ModifyDevice {
        vm: String,
        #[arg(value_name = "TYPE")]
        device_type: String,
        /// Zero based; negative values count from the last device of TYPE
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        index: isize,
        #[arg(value_parser = parse_key_val)]
        attrs: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("reading environment")?;
    if cli.uri.is_some() {
        config.uri = cli.uri.clone();
    }
    if let Some(virsh) = cli.virsh.clone() {
        config.virsh = virsh;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let hv = config.open_hypervisor()?;

    match cli.command {
        Commands::Dumpxml { vm, option } => {
            print!("{}", hv.dumpxml(&vm, &option)?);
        }
        Commands::SetAttrs { vm, attrs } => {
            let attrs: AttrMap = attrs.into_iter().collect();
            let mut vmxml = VmXml::new_from_inactive_dumpxml(hv.as_ref(), &vm)?;
            vmxml_ops::set_vm_attrs(hv.as_ref(), &mut vmxml, &attrs)?;
        }
        Commands::CheckXml {
            vm,
            pattern,
            option,
            expect_absent,
        } => {
            vmxml_ops::check_guest_xml(hv.as_ref(), &vm, &pattern, &option, expect_absent)?;
            println!("OK");
        }
        Commands::RemoveDevices { vm, device_type } => {
            let vm = Vm::new(vm, hv.as_ref());
            vmxml_ops::remove_vm_devices_by_type(&vm, &device_type)?;
        }
        Commands::ModifyDevice {
            vm,
            device_type,
            index,
            attrs,
        } => {
            let attrs: AttrMap = attrs.into_iter().collect();
            let mut vmxml = VmXml::new_from_inactive_dumpxml(hv.as_ref(), &vm)?;
            let device =
                vmxml_ops::modify_vm_device(hv.as_ref(), &mut vmxml, &device_type, Some(&attrs), index)?;
            println!("{}", device.element().to_xml_string());
        }
    }
    Ok(())
}
