use xmltree::{Element, XMLNode};

use crate::soap::{SOAP_ENCODING_NS, SOAP_ENVELOPE_NS};

pub(crate) fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING_NS.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn action_element(name: &str, service_urn: &str, args: &[(String, String)]) -> Element {
    let mut elem = Element::new(&format!("u:{}", name));
    elem.attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (arg, value) in args {
        let mut child = Element::new(arg);
        if !value.is_empty() {
            child.children.push(XMLNode::Text(value.clone()));
        }
        elem.children.push(XMLNode::Element(child));
    }
    elem
}

/// Construit la requête SOAP d'une action.
///
/// `args` doit être dans l'ordre de déclaration des arguments d'entrée.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(String, String)],
) -> Result<String, xmltree::Error> {
    build_soap_envelope_with_body(action_element(action, service_urn, args))
}

/// Construit la réponse SOAP `<u:{action}Response>`.
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(String, String)],
) -> Result<String, xmltree::Error> {
    build_soap_envelope_with_body(action_element(
        &format!("{}Response", action),
        service_urn,
        values,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_response() {
        let values = vec![
            ("Track".to_string(), "5".to_string()),
            ("TrackDuration".to_string(), "00:03:45".to_string()),
        ];

        let xml = build_soap_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetPositionInfo",
            &values,
        )
        .unwrap();

        assert!(xml.contains("GetPositionInfoResponse"));
        assert!(xml.contains("<Track>5</Track>"));
        let track = xml.find("<Track>").unwrap();
        let duration = xml.find("<TrackDuration>").unwrap();
        assert!(track < duration);
    }

    #[test]
    fn test_request_escapes_values() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[("CurrentURI".to_string(), "http://h/a?x=1&y=<2>".to_string())],
        )
        .unwrap();
        assert!(xml.contains("x=1&amp;y=&lt;2&gt;"));
        assert!(xml.contains("xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\""));
    }
}
