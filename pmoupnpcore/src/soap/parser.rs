//! Lecture des enveloppes SOAP

use std::io::BufReader;

use xmltree::Element;

use crate::soap::SoapFault;

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,

    #[error("Expected <{expected}> in SOAP Body, found <{found}>")]
    UnexpectedElement { expected: String, found: String },

    #[error("No Fault found in SOAP Body")]
    NoFault,
}

/// Enveloppe SOAP lue : seul le corps est conservé.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub body: Element,
}

impl SoapEnvelope {
    /// Premier élément enfant du corps
    pub fn first_body_element(&self) -> Option<&Element> {
        self.body.children.iter().find_map(|n| n.as_element())
    }
}

/// Action (ou réponse d'action) extraite d'un corps SOAP.
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom local de l'élément, par exemple `Play` ou `PlayResponse`
    pub name: String,

    /// Namespace de l'élément, normalement le type de service
    pub namespace: Option<String>,

    /// Arguments dans l'ordre du document
    pub args: Vec<(String, String)>,
}

impl SoapAction {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if root.name != "Envelope" {
        return Err(SoapParseError::MissingEnvelope);
    }

    let body = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name == "Body"))
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope { body: body.clone() })
}

/// Parse une action SOAP (requête ou réponse) à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let action_elem = envelope.first_body_element().ok_or(SoapParseError::NoAction)?;

    let args = action_elem
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .map(|e| {
            (
                e.name.clone(),
                e.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )
        })
        .collect();

    Ok(SoapAction {
        name: action_elem.name.clone(),
        namespace: action_elem.namespace.clone(),
        args,
    })
}

/// Parse le `<s:Fault>` d'une réponse d'erreur
pub fn parse_soap_fault(xml: &[u8]) -> Result<SoapFault, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let fault = envelope
        .first_body_element()
        .filter(|e| e.name == "Fault")
        .ok_or(SoapParseError::NoFault)?;

    let text_of = |elem: Option<&Element>| {
        elem.and_then(|e| e.get_text())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    };

    let upnp_error = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError"))
        .and_then(|e| {
            let code = text_of(e.get_child("errorCode")).parse::<u32>().ok()?;
            Some((code, text_of(e.get_child("errorDescription"))))
        });

    Ok(SoapFault {
        fault_code: text_of(fault.get_child("faultcode")),
        fault_string: text_of(fault.get_child("faultstring")),
        upnp_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::build_soap_fault;

    #[test]
    fn test_parse_simple_action() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <Speed>1</Speed>
      <InstanceID>0</InstanceID>
    </u:Play>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Play");
        assert_eq!(
            action.namespace.as_deref(),
            Some("urn:schemas-upnp-org:service:AVTransport:1")
        );
        assert_eq!(action.arg("InstanceID"), Some("0"));
        assert_eq!(action.args[0].0, "Speed");
    }

    #[test]
    fn test_parse_action_no_args() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><u:Stop xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/></s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Stop");
        assert!(action.args.is_empty());
    }

    #[test]
    fn test_missing_body_and_garbage() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        assert!(matches!(
            parse_soap_action(xml.as_bytes()),
            Err(SoapParseError::MissingBody)
        ));
        assert!(parse_soap_action(b"not xml").is_err());
    }

    #[test]
    fn test_fault_roundtrip() {
        let xml = build_soap_fault("s:Client", "UPnPError", Some((718, "Conflict"))).unwrap();
        let fault = parse_soap_fault(xml.as_bytes()).unwrap();
        assert_eq!(fault.upnp_error, Some((718, "Conflict".to_string())));
        assert_eq!(fault.to_action_error().code.code(), 718);
    }
}
