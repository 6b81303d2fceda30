//! # Codec SOAP des actions UPnP
//!
//! Construction et lecture des enveloppes SOAP échangées lors d'une
//! invocation d'action : requête `<u:Action>`, réponse `<u:ActionResponse>`
//! et faute `<s:Fault>` portant un `<UPnPError>`.
//!
//! Les arguments sont manipulés sous forme de listes ordonnées
//! `(nom, texte)` : l'ordre d'écriture est celui de la déclaration de
//! l'action, l'ordre de lecture est indifférent.
//!
//! ```
//! use pmoupnpcore::soap::{build_soap_request, parse_soap_action};
//!
//! let xml = build_soap_request(
//!     "urn:schemas-upnp-org:service:AVTransport:1",
//!     "Play",
//!     &[("InstanceID".to_string(), "0".to_string()), ("Speed".to_string(), "1".to_string())],
//! ).unwrap();
//!
//! let action = parse_soap_action(xml.as_bytes()).unwrap();
//! assert_eq!(action.name, "Play");
//! assert_eq!(action.arg("Speed"), Some("1"));
//! ```

mod builder;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use fault::{SoapFault, build_soap_fault, build_soap_fault_for};
pub use parser::{
    SoapAction, SoapEnvelope, SoapParseError, parse_soap_action, parse_soap_envelope,
    parse_soap_fault,
};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
