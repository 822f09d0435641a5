use std::collections::BTreeMap;

use crate::backend::types::{AttrMap, DeviceKind};
use crate::backend::xml_tree::Element;
use crate::error::AppError;

/// Key segment that addresses element text instead of an attribute.
pub const TEXT_KEY: &str = "#text";

/// One entry of a domain's `<devices>` element.
///
/// Attributes are addressed with `/`-separated keys: the last segment names an
/// XML attribute (or [`TEXT_KEY`]) and the segments before it name child
/// elements, e.g. `target/dev` or `backend/#text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    element: Element,
}

impl Device {
    /// An empty device of the given kind, e.g. `<disk/>`.
    pub fn new(kind: DeviceKind) -> Self {
        Device {
            element: Element::new(kind.as_str()),
        }
    }

    pub fn from_element(element: Element) -> Self {
        Device { element }
    }

    pub fn tag(&self) -> &str {
        &self.element.name
    }

    pub fn kind(&self) -> Option<DeviceKind> {
        DeviceKind::from_tag(self.tag())
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn into_element(self) -> Element {
        self.element
    }

    pub fn setup_attrs(&mut self, attrs: &AttrMap) -> Result<(), AppError> {
        for (key, value) in attrs {
            log::debug!("Set {} device {} = {}", self.tag(), key, value);
            self.set_attr(key, value)?;
        }
        Ok(())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        if key.split('/').any(str::is_empty) {
            return Err(AppError::InvalidValue(format!(
                "malformed device attribute key '{key}'"
            )));
        }
        let (parents, last): (Vec<&str>, &str) = match key.rsplit_once('/') {
            Some((parents, last)) => (parents.split('/').collect(), last),
            None => (Vec::new(), key),
        };

        let mut target = &mut self.element;
        for segment in &parents {
            target = target.child_or_insert(segment);
        }

        match last {
            TEXT_KEY => target.set_text(value),
            "type_name" if parents.is_empty() => target.set_attribute("type", value),
            name => target.set_attribute(name, value),
        }
        Ok(())
    }

    /// Flatten the device back into the key form accepted by [`Device::setup_attrs`].
    pub fn attrs(&self) -> AttrMap {
        let mut out = BTreeMap::new();
        collect_attrs(&self.element, "", &mut out);
        out
    }
}

fn collect_attrs(element: &Element, prefix: &str, out: &mut AttrMap) {
    for (key, val) in element.attributes() {
        out.insert(format!("{prefix}{key}"), val.clone());
    }

    if !element.has_child_elements() {
        let text = element.text();
        if !text.trim().is_empty() {
            out.insert(format!("{prefix}{TEXT_KEY}"), text);
        }
    }

    let mut seen: Vec<&str> = Vec::new();
    for child in element.elements() {
        if seen.contains(&child.name.as_str()) {
            continue;
        }
        seen.push(&child.name);
        collect_attrs(child, &format!("{prefix}{}/", child.name), out);
    }
}
