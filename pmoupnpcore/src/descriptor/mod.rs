//! # Documents de description
//!
//! Écriture et lecture, avec `xmltree`, des deux documents UPnP :
//!
//! - la description du périphérique (`<root><device>…`), voir [`device`] ;
//! - la description de service ou SCPD (`<scpd>…`), voir [`service`].
//!
//! Les URL écrites pour les périphériques locaux sont relatives (chemins du
//! [`Namespace`](crate::namespace::Namespace)) ; à la lecture elles sont
//! résolues contre `URLBase` s'il est présent, sinon contre l'URL du
//! document.

pub mod device;
mod errors;
pub mod service;

pub use device::{
    DeviceDescription, ServiceDescription, build_device_description, build_remote_device,
    parse_device_description,
};
pub use errors::DescriptorError;
pub use service::{build_scpd, parse_scpd};

use xmltree::{Element, EmitterConfig, XMLNode};

pub(crate) fn text_element(name: &str, text: impl ToString) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

pub(crate) fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
}

pub(crate) fn spec_version() -> Element {
    let mut version = Element::new("specVersion");
    version.children.push(XMLNode::Element(text_element("major", 1)));
    version.children.push(XMLNode::Element(text_element("minor", 0)));
    version
}

pub(crate) fn write_document(root: &Element) -> Result<String, DescriptorError> {
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    let mut buf = Vec::new();
    root.write_with_config(&mut buf, config)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
