use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Libvirt(String),
    Xml(String),
    Io(std::io::Error),
    Pattern(String),
    TestFail(String),
    UnknownDeviceType(String),
    UnknownAttribute(String),
    InvalidValue(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Libvirt(msg) => write!(f, "Libvirt error: {msg}"),
            AppError::Xml(msg) => write!(f, "XML error: {msg}"),
            AppError::Io(err) => write!(f, "IO error: {err}"),
            AppError::Pattern(msg) => write!(f, "Invalid pattern: {msg}"),
            AppError::TestFail(msg) => write!(f, "Test failed: {msg}"),
            AppError::UnknownDeviceType(tag) => write!(f, "Unknown device type: {tag}"),
            AppError::UnknownAttribute(name) => {
                write!(f, "VM configuration has no attribute '{name}'")
            }
            AppError::InvalidValue(msg) => write!(f, "Invalid value: {msg}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(feature = "native")]
impl From<virt::error::Error> for AppError {
    fn from(err: virt::error::Error) -> Self {
        AppError::Libvirt(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<quick_xml::Error> for AppError {
    fn from(err: quick_xml::Error) -> Self {
        AppError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for AppError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        AppError::Xml(err.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Pattern(err.to_string())
    }
}
