//! # Modèle de messages
//!
//! Représentations typées des messages UPnP, sans entrée/sortie :
//! en-têtes, requêtes et réponses HTTP, messages de contrôle SOAP,
//! messages GENA et datagrammes SSDP.

pub mod action;
pub mod gena;
pub mod headers;
pub mod ssdp;
pub mod stream;

pub use headers::{HeaderType, SoapActionHeader, TimeoutHeader, UpnpHeaders};
pub use stream::{StreamRequestMessage, StreamResponseMessage, UpnpMethod};
