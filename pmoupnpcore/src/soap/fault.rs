//! SOAP Faults UPnP

use xmltree::{Element, XMLNode};

use crate::{
    actions::{ActionError, ErrorCode},
    message::headers::CONTROL_NAMESPACE,
    soap::builder::build_soap_envelope_with_body,
};

/// Faute SOAP lue dans une réponse d'action.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    pub fault_code: String,
    pub fault_string: String,
    /// `(errorCode, errorDescription)` du `<UPnPError>`, s'il est présent
    pub upnp_error: Option<(u32, String)>,
}

impl SoapFault {
    /// L'erreur d'action portée par la faute.
    ///
    /// Sans `<UPnPError>` exploitable, l'erreur est `ACTION_FAILED`.
    pub fn to_action_error(&self) -> ActionError {
        match &self.upnp_error {
            Some((code, desc)) => {
                let code = ErrorCode::from_code(*code);
                let desc = if desc.is_empty() {
                    code.description().to_string()
                } else {
                    desc.clone()
                };
                ActionError::new(code, desc)
            }
            None => ActionError::action_failed(format!(
                "SOAP fault without UPnP error: {} {}",
                self.fault_code, self.fault_string
            )),
        }
    }
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

/// Construit un SOAP Fault XML
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error: Option<(u32, &str)>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");
    fault
        .children
        .push(XMLNode::Element(text_element("faultcode", fault_code)));
    fault
        .children
        .push(XMLNode::Element(text_element("faultstring", fault_string)));

    if let Some((code, desc)) = upnp_error {
        let mut upnp = Element::new("UPnPError");
        upnp.attributes
            .insert("xmlns".to_string(), CONTROL_NAMESPACE.to_string());
        upnp.children.push(XMLNode::Element(text_element(
            "errorCode",
            &code.to_string(),
        )));
        upnp.children
            .push(XMLNode::Element(text_element("errorDescription", desc)));

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp));
        fault.children.push(XMLNode::Element(detail));
    }

    build_soap_envelope_with_body(fault)
}

/// Faute standard UDA pour une erreur d'action : `s:Client` / `UPnPError`.
pub fn build_soap_fault_for(error: &ActionError) -> Result<String, xmltree::Error> {
    build_soap_fault(
        "s:Client",
        "UPnPError",
        Some((error.code.code(), &error.description)),
    )
}
