//! Requêtes et réponses HTTP indépendantes du transport.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::message::headers::{HeaderType, UpnpHeaders};

pub const CONTENT_TYPE_XML: &str = "text/xml; charset=\"utf-8\"";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpnpMethod {
    Get,
    Post,
    Subscribe,
    Unsubscribe,
    Notify,
    MSearch,
    Other(String),
}

impl UpnpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            UpnpMethod::Get => "GET",
            UpnpMethod::Post => "POST",
            UpnpMethod::Subscribe => "SUBSCRIBE",
            UpnpMethod::Unsubscribe => "UNSUBSCRIBE",
            UpnpMethod::Notify => "NOTIFY",
            UpnpMethod::MSearch => "M-SEARCH",
            UpnpMethod::Other(m) => m,
        }
    }
}

impl fmt::Display for UpnpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpnpMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GET" => UpnpMethod::Get,
            "POST" => UpnpMethod::Post,
            "SUBSCRIBE" => UpnpMethod::Subscribe,
            "UNSUBSCRIBE" => UpnpMethod::Unsubscribe,
            "NOTIFY" => UpnpMethod::Notify,
            "M-SEARCH" => UpnpMethod::MSearch,
            other => UpnpMethod::Other(other.to_string()),
        })
    }
}

/// Requête HTTP entrante ou sortante.
///
/// `uri` est un chemin (avec requête éventuelle) pour une requête reçue,
/// une URL absolue pour une requête à émettre.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequestMessage {
    pub method: UpnpMethod,
    pub uri: String,
    pub headers: UpnpHeaders,
    pub body: Option<String>,
    /// Adresse de l'émetteur, pour une requête reçue
    pub remote_addr: Option<std::net::SocketAddr>,
}

impl StreamRequestMessage {
    pub fn new(method: UpnpMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: UpnpHeaders::new(),
            body: None,
            remote_addr: None,
        }
    }

    pub fn with_header(mut self, header: HeaderType, value: impl Into<String>) -> Self {
        self.headers.set_header(header, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: String) -> Self {
        self.headers.set_header(HeaderType::ContentType, content_type);
        self.body = Some(body);
        self
    }

    pub fn header(&self, header: HeaderType) -> Option<&str> {
        self.headers.first_header(header)
    }

    /// Chemin sans la requête
    pub fn path(&self) -> &str {
        let without_scheme = match self.uri.find("://") {
            Some(idx) => {
                let rest = &self.uri[idx + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => self.uri.as_str(),
        };
        without_scheme.split('?').next().unwrap_or(without_scheme)
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, q)| q)
    }

    pub fn url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.uri)
    }

    pub fn body_str(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.trim().is_empty())
    }
}

/// Réponse HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResponseMessage {
    pub status: u16,
    pub headers: UpnpHeaders,
    pub body: Option<String>,
}

impl StreamResponseMessage {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: UpnpHeaders::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_header(mut self, header: HeaderType, value: impl Into<String>) -> Self {
        self.headers.set_header(header, value);
        self
    }

    pub fn with_body(mut self, content_type: &str, body: String) -> Self {
        self.headers.set_header(HeaderType::ContentType, content_type);
        self.body = Some(body);
        self
    }

    pub fn header(&self, header: HeaderType) -> Option<&str> {
        self.headers.first_header(header)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_failed(&self) -> bool {
        !self.is_success()
    }

    pub fn body_str(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    pub fn has_body(&self) -> bool {
        self.body.as_deref().is_some_and(|b| !b.trim().is_empty())
    }

    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            412 => "Precondition Failed",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "",
        }
    }
}
