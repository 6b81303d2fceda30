//! Datagrammes SSDP (NOTIFY, M-SEARCH et réponses de recherche).

use std::net::{Ipv4Addr, SocketAddr};

use url::Url;

use crate::message::headers::{HeaderType, UpnpHeaders, UsnHeader, parse_max_age};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité par défaut des annonces (en secondes)
pub const DEFAULT_MAX_AGE: u32 = 1800;

pub const NTS_ALIVE: &str = "ssdp:alive";
pub const NTS_BYEBYE: &str = "ssdp:byebye";
pub const ST_ALL: &str = "ssdp:all";
pub const ROOT_DEVICE: &str = "upnp:rootdevice";

/// Datagramme brut : ligne de départ et en-têtes.
#[derive(Debug, Clone, PartialEq)]
pub struct DatagramMessage {
    pub start_line: String,
    pub headers: UpnpHeaders,
    pub from: SocketAddr,
}

impl DatagramMessage {
    pub fn parse(data: &[u8], from: SocketAddr) -> Option<Self> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.lines();
        let start_line = lines.next()?.trim().to_string();
        if start_line.is_empty() {
            return None;
        }
        Some(Self {
            start_line,
            headers: UpnpHeaders::parse_lines(lines),
            from,
        })
    }

    fn method(&self) -> String {
        self.start_line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    pub fn is_notify(&self) -> bool {
        self.method() == "NOTIFY"
    }

    pub fn is_search(&self) -> bool {
        self.method() == "M-SEARCH"
    }

    pub fn is_response(&self) -> bool {
        self.method().starts_with("HTTP/")
    }

    /// Code de statut d'une réponse
    pub fn status(&self) -> Option<u16> {
        if !self.is_response() {
            return None;
        }
        self.start_line.split_whitespace().nth(1)?.parse().ok()
    }

    pub fn header(&self, header: HeaderType) -> Option<&str> {
        self.headers.first_header(header)
    }
}

/// Message SSDP typé.
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpMessage {
    Alive {
        nt: String,
        usn: UsnHeader,
        location: Url,
        max_age: u32,
        server: Option<String>,
    },
    ByeBye {
        nt: String,
        usn: UsnHeader,
    },
    Search {
        st: String,
        mx: u32,
    },
    SearchResponse {
        st: String,
        usn: UsnHeader,
        location: Url,
        max_age: u32,
        server: Option<String>,
    },
}

impl SsdpMessage {
    /// Interprète un datagramme ; `None` si un en-tête requis manque.
    pub fn from_datagram(dg: &DatagramMessage) -> Option<Self> {
        let usn = || dg.headers.first_header_as::<UsnHeader>(HeaderType::Usn);
        let location = || dg.header(HeaderType::Location).and_then(|l| Url::parse(l.trim()).ok());
        let max_age = || {
            dg.header(HeaderType::CacheControl)
                .and_then(parse_max_age)
                .unwrap_or(DEFAULT_MAX_AGE)
        };
        let server = || dg.header(HeaderType::Server).map(str::to_string);

        if dg.is_notify() {
            let nts = dg.header(HeaderType::Nts)?.to_ascii_lowercase();
            let nt = dg.header(HeaderType::Nt)?.to_string();
            match nts.as_str() {
                NTS_ALIVE => Some(SsdpMessage::Alive {
                    nt,
                    usn: usn()?,
                    location: location()?,
                    max_age: max_age(),
                    server: server(),
                }),
                NTS_BYEBYE => Some(SsdpMessage::ByeBye { nt, usn: usn()? }),
                _ => None,
            }
        } else if dg.is_search() {
            let man = dg.header(HeaderType::Man)?;
            if man.trim().trim_matches('"') != "ssdp:discover" {
                return None;
            }
            Some(SsdpMessage::Search {
                st: dg.header(HeaderType::St)?.to_string(),
                mx: dg.headers.first_header_as(HeaderType::Mx).unwrap_or(1),
            })
        } else if dg.status() == Some(200) {
            Some(SsdpMessage::SearchResponse {
                st: dg.header(HeaderType::St)?.to_string(),
                usn: usn()?,
                location: location()?,
                max_age: max_age(),
                server: server(),
            })
        } else {
            None
        }
    }

    /// Texte du datagramme à émettre.
    pub fn to_datagram(&self) -> String {
        let host = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT);
        match self {
            SsdpMessage::Alive {
                nt,
                usn,
                location,
                max_age,
                server,
            } => format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {}\r\n\
                 CACHE-CONTROL: max-age={}\r\n\
                 LOCATION: {}\r\n\
                 NT: {}\r\n\
                 NTS: {}\r\n\
                 SERVER: {}\r\n\
                 USN: {}\r\n\
                 \r\n",
                host,
                max_age,
                location,
                nt,
                NTS_ALIVE,
                server.as_deref().unwrap_or_default(),
                usn
            ),
            SsdpMessage::ByeBye { nt, usn } => format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {}\r\n\
                 NT: {}\r\n\
                 NTS: {}\r\n\
                 USN: {}\r\n\
                 \r\n",
                host, nt, NTS_BYEBYE, usn
            ),
            SsdpMessage::Search { st, mx } => format!(
                "M-SEARCH * HTTP/1.1\r\n\
                 HOST: {}\r\n\
                 MAN: \"ssdp:discover\"\r\n\
                 MX: {}\r\n\
                 ST: {}\r\n\
                 \r\n",
                host,
                (*mx).max(1),
                st
            ),
            SsdpMessage::SearchResponse {
                st,
                usn,
                location,
                max_age,
                server,
            } => format!(
                "HTTP/1.1 200 OK\r\n\
                 CACHE-CONTROL: max-age={}\r\n\
                 DATE: {}\r\n\
                 EXT:\r\n\
                 LOCATION: {}\r\n\
                 SERVER: {}\r\n\
                 ST: {}\r\n\
                 USN: {}\r\n\
                 \r\n",
                max_age,
                chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT"),
                location,
                server.as_deref().unwrap_or_default(),
                st,
                usn
            ),
        }
    }

    pub fn usn(&self) -> Option<&UsnHeader> {
        match self {
            SsdpMessage::Alive { usn, .. }
            | SsdpMessage::ByeBye { usn, .. }
            | SsdpMessage::SearchResponse { usn, .. } => Some(usn),
            SsdpMessage::Search { .. } => None,
        }
    }
}
