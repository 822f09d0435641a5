use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Attribute name to raw string value, as supplied by callers.
pub type AttrMap = BTreeMap<String, String>;

// --- Attribute values ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(n) => write!(f, "{n}"),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

/// Digit-only strings become integers, everything else is kept verbatim.
pub fn coerce_value(value: &str) -> AttrValue {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return AttrValue::Int(n);
        }
    }
    AttrValue::Str(value.to_string())
}

// --- Device Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Disk,
    Controller,
    Interface,
    Channel,
    Serial,
    Vsock,
    Watchdog,
    Rng,
    Hostdev,
}

impl DeviceKind {
    pub const ALL: &'static [DeviceKind] = &[
        DeviceKind::Disk,
        DeviceKind::Controller,
        DeviceKind::Interface,
        DeviceKind::Channel,
        DeviceKind::Serial,
        DeviceKind::Vsock,
        DeviceKind::Watchdog,
        DeviceKind::Rng,
        DeviceKind::Hostdev,
    ];

    /// Element name of the device inside `<devices>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Disk => "disk",
            DeviceKind::Controller => "controller",
            DeviceKind::Interface => "interface",
            DeviceKind::Channel => "channel",
            DeviceKind::Serial => "serial",
            DeviceKind::Vsock => "vsock",
            DeviceKind::Watchdog => "watchdog",
            DeviceKind::Rng => "rng",
            DeviceKind::Hostdev => "hostdev",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| AppError::UnknownDeviceType(s.to_string()))
    }
}

// --- VM State ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Paused,
    Shutoff,
    Crashed,
    PmSuspended,
    Other,
}

impl VmState {
    pub fn from_libvirt(state: u32) -> Self {
        match state {
            1 => VmState::Running,
            3 => VmState::Paused,
            5 => VmState::Shutoff,
            6 => VmState::Crashed,
            7 => VmState::PmSuspended,
            _ => VmState::Other,
        }
    }

    /// Parse the human-readable form printed by `virsh domstate`.
    pub fn from_domstate(state: &str) -> Self {
        match state.trim() {
            "running" => VmState::Running,
            "paused" => VmState::Paused,
            "shut off" => VmState::Shutoff,
            "crashed" => VmState::Crashed,
            "pmsuspended" => VmState::PmSuspended,
            _ => VmState::Other,
        }
    }

    /// A domain is alive unless it is shut off or crashed.
    pub fn is_active(&self) -> bool {
        !matches!(self, VmState::Shutoff | VmState::Crashed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VmState::Running => "Running",
            VmState::Paused => "Paused",
            VmState::Shutoff => "Shutoff",
            VmState::Crashed => "Crashed",
            VmState::PmSuspended => "Suspended",
            VmState::Other => "Unknown",
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_strings_become_integers() {
        assert_eq!(coerce_value("4"), AttrValue::Int(4));
        assert_eq!(coerce_value("0042"), AttrValue::Int(42));
        assert_eq!(coerce_value("1048576"), AttrValue::Int(1048576));
    }

    #[test]
    fn other_strings_are_kept_verbatim() {
        assert_eq!(coerce_value(""), AttrValue::Str(String::new()));
        assert_eq!(coerce_value("-1"), AttrValue::Str("-1".to_string()));
        assert_eq!(coerce_value("4.0"), AttrValue::Str("4.0".to_string()));
        assert_eq!(coerce_value("KiB"), AttrValue::Str("KiB".to_string()));
        assert_eq!(coerce_value(" 4"), AttrValue::Str(" 4".to_string()));
        // Too large for i64, so not coerced.
        let huge = "99999999999999999999999";
        assert_eq!(coerce_value(huge), AttrValue::Str(huge.to_string()));
    }

    #[test]
    fn device_kind_tags() {
        for kind in DeviceKind::ALL {
            assert_eq!(DeviceKind::from_tag(kind.as_str()), Some(*kind));
        }
        assert_eq!(DeviceKind::from_tag("graphics"), None);
        assert!(matches!(
            "sound".parse::<DeviceKind>(),
            Err(AppError::UnknownDeviceType(tag)) if tag == "sound"
        ));
    }

    #[test]
    fn domstate_text_is_parsed() {
        assert_eq!(VmState::from_domstate("running\n"), VmState::Running);
        assert_eq!(VmState::from_domstate("shut off"), VmState::Shutoff);
        assert_eq!(VmState::from_domstate("in shutdown"), VmState::Other);
        assert!(VmState::Paused.is_active());
        assert!(VmState::Other.is_active());
        assert!(!VmState::Shutoff.is_active());
        assert!(!VmState::Crashed.is_active());
    }
}
