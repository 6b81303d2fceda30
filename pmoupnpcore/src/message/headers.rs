//! En-têtes HTTP/SSDP typés.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::{
    actions::QUERY_STATE_VARIABLE,
    types::ServiceType,
    variable_types::InvalidValueError,
};

/// Namespace « magique » de `QueryStateVariable` dans l'en-tête SOAPACTION
pub const CONTROL_NAMESPACE: &str = "urn:schemas-upnp-org:control-1-0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderType {
    Host,
    Location,
    CacheControl,
    Server,
    UserAgent,
    Usn,
    Nt,
    Nts,
    St,
    Man,
    Mx,
    Ext,
    Date,
    ContentType,
    ContentLength,
    SoapAction,
    Callback,
    Sid,
    Seq,
    Timeout,
}

impl HeaderType {
    pub fn name(&self) -> &'static str {
        match self {
            HeaderType::Host => "HOST",
            HeaderType::Location => "LOCATION",
            HeaderType::CacheControl => "CACHE-CONTROL",
            HeaderType::Server => "SERVER",
            HeaderType::UserAgent => "USER-AGENT",
            HeaderType::Usn => "USN",
            HeaderType::Nt => "NT",
            HeaderType::Nts => "NTS",
            HeaderType::St => "ST",
            HeaderType::Man => "MAN",
            HeaderType::Mx => "MX",
            HeaderType::Ext => "EXT",
            HeaderType::Date => "DATE",
            HeaderType::ContentType => "CONTENT-TYPE",
            HeaderType::ContentLength => "CONTENT-LENGTH",
            HeaderType::SoapAction => "SOAPACTION",
            HeaderType::Callback => "CALLBACK",
            HeaderType::Sid => "SID",
            HeaderType::Seq => "SEQ",
            HeaderType::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for HeaderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Collection d'en-têtes ordonnée et multi-valuée.
///
/// L'ordre d'insertion est conservé, les noms sont comparés sans tenir
/// compte de la casse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpnpHeaders {
    entries: Vec<(String, String)>,
}

impl UpnpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute une valeur sans retirer les précédentes
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remplace toutes les valeurs de `name`
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    pub fn set_header(&mut self, header: HeaderType, value: impl Into<String>) {
        self.set(header.name(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn first_header(&self, header: HeaderType) -> Option<&str> {
        self.get_first(header.name())
    }

    /// Première valeur de l'en-tête, parsée dans le type demandé.
    ///
    /// Une valeur absente ou non parsable donne `None`.
    pub fn first_header_as<T: FromStr>(&self, header: HeaderType) -> Option<T> {
        self.first_header(header).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, header: HeaderType) -> bool {
        self.first_header(header).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse des lignes `Nom: valeur` jusqu'à la première ligne vide.
    pub fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        let mut headers = UpnpHeaders::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if !name.is_empty() {
                    headers.add(name.to_ascii_uppercase(), value.trim());
                }
            }
        }
        headers
    }
}

/// En-tête `SOAPACTION: "<serviceType>#<action>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapActionHeader {
    /// `None` pour le namespace de contrôle de `QueryStateVariable`
    pub service_type: Option<ServiceType>,
    pub action_name: String,
}

impl SoapActionHeader {
    pub fn new(service_type: ServiceType, action_name: &str) -> Self {
        Self {
            service_type: Some(service_type),
            action_name: action_name.to_string(),
        }
    }

    pub fn query_state_variable() -> Self {
        Self {
            service_type: None,
            action_name: QUERY_STATE_VARIABLE.to_string(),
        }
    }

    pub fn is_query_state_variable(&self) -> bool {
        self.service_type.is_none() && self.action_name == QUERY_STATE_VARIABLE
    }
}

impl fmt::Display for SoapActionHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.service_type {
            Some(st) => write!(f, "\"{}#{}\"", st, self.action_name),
            None => write!(f, "\"{}#{}\"", CONTROL_NAMESPACE, self.action_name),
        }
    }
}

impl FromStr for SoapActionHeader {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unquoted = s.trim().trim_matches('"');
        let (urn, action) = unquoted
            .split_once('#')
            .filter(|(_, a)| !a.is_empty())
            .ok_or_else(|| InvalidValueError::identifier(s, "expected \"<serviceType>#<action>\""))?;
        if urn == CONTROL_NAMESPACE {
            return Ok(Self {
                service_type: None,
                action_name: action.to_string(),
            });
        }
        Ok(Self {
            service_type: Some(urn.parse()?),
            action_name: action.to_string(),
        })
    }
}

/// Durée d'abonnement `TIMEOUT: Second-<n>` ou `Second-infinite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutHeader {
    Seconds(u32),
    Infinite,
}

impl TimeoutHeader {
    pub fn seconds(&self) -> Option<u32> {
        match self {
            TimeoutHeader::Seconds(s) => Some(*s),
            TimeoutHeader::Infinite => None,
        }
    }
}

impl fmt::Display for TimeoutHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimeoutHeader::Seconds(s) => write!(f, "Second-{}", s),
            TimeoutHeader::Infinite => f.write_str("Second-infinite"),
        }
    }
}

impl FromStr for TimeoutHeader {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.strip_prefix("second-") {
            Some("infinite") => Ok(TimeoutHeader::Infinite),
            Some(n) => n
                .parse()
                .map(TimeoutHeader::Seconds)
                .map_err(|_| InvalidValueError::identifier(s, "invalid TIMEOUT seconds")),
            None => Err(InvalidValueError::identifier(s, "expected Second-<n>")),
        }
    }
}

/// En-tête `CALLBACK: <url1><url2>...`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackHeader(pub Vec<Url>);

impl fmt::Display for CallbackHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for url in &self.0 {
            write!(f, "<{}>", url)?;
        }
        Ok(())
    }
}

impl FromStr for CallbackHeader {
    type Err = InvalidValueError;

    /// Seules les URLs `http` sont retenues, comme l'exige GENA.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let urls: Vec<Url> = s
            .split('<')
            .filter_map(|part| part.split_once('>').map(|(url, _)| url.trim()))
            .filter_map(|url| Url::parse(url).ok())
            .filter(|url| url.scheme() == "http")
            .collect();
        if urls.is_empty() {
            return Err(InvalidValueError::identifier(s, "no valid http callback URL"));
        }
        Ok(CallbackHeader(urls))
    }
}

/// En-tête `USN: uuid:<udn>[::<type>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsnHeader {
    pub udn: crate::types::Udn,
    pub suffix: Option<String>,
}

impl fmt::Display for UsnHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.suffix {
            Some(suffix) => write!(f, "{}::{}", self.udn, suffix),
            None => write!(f, "{}", self.udn),
        }
    }
}

impl FromStr for UsnHeader {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (udn, suffix) = match s.trim().split_once("::") {
            Some((udn, suffix)) => (udn, Some(suffix.to_string())),
            None => (s.trim(), None),
        };
        Ok(UsnHeader {
            udn: udn.parse()?,
            suffix,
        })
    }
}

/// Extrait `max-age=<n>` d'un `CACHE-CONTROL`.
pub fn parse_max_age(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after = lower[idx + "max-age".len()..]
        .trim_start()
        .trim_start_matches('=')
        .trim_start();
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive_and_ordered() {
        let mut h = UpnpHeaders::new();
        h.add("Content-Type", "text/xml");
        h.add("X-Thing", "a");
        h.add("x-thing", "b");
        assert_eq!(h.first_header(HeaderType::ContentType), Some("text/xml"));
        assert_eq!(h.get_all("X-THING").collect::<Vec<_>>(), vec!["a", "b"]);
        h.set("X-Thing", "c");
        assert_eq!(h.get_all("x-thing").collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_soap_action_header() {
        let h: SoapActionHeader = "\"urn:schemas-upnp-org:service:AVTransport:1#Play\""
            .parse()
            .unwrap();
        assert_eq!(h.action_name, "Play");
        assert_eq!(h.service_type.as_ref().unwrap().version(), 1);
        assert_eq!(h.to_string(), "\"urn:schemas-upnp-org:service:AVTransport:1#Play\"");

        let q: SoapActionHeader = "\"urn:schemas-upnp-org:control-1-0#QueryStateVariable\""
            .parse()
            .unwrap();
        assert!(q.is_query_state_variable());
        assert!("\"nohash\"".parse::<SoapActionHeader>().is_err());
    }

    #[test]
    fn test_timeout_header() {
        assert_eq!(
            "Second-1800".parse::<TimeoutHeader>().unwrap(),
            TimeoutHeader::Seconds(1800)
        );
        assert_eq!(
            "second-infinite".parse::<TimeoutHeader>().unwrap(),
            TimeoutHeader::Infinite
        );
        assert!("1800".parse::<TimeoutHeader>().is_err());
    }

    #[test]
    fn test_callback_header() {
        let cb: CallbackHeader = "<http://10.0.0.2:4000/cb/1><ftp://nope>".parse().unwrap();
        assert_eq!(cb.0.len(), 1);
        assert_eq!(cb.to_string(), "<http://10.0.0.2:4000/cb/1>");
        assert!("http://no-brackets".parse::<CallbackHeader>().is_err());
    }

    #[test]
    fn test_usn_and_max_age() {
        let usn: UsnHeader = "uuid:abc::upnp:rootdevice".parse().unwrap();
        assert_eq!(usn.suffix.as_deref(), Some("upnp:rootdevice"));
        assert_eq!(parse_max_age("no-cache, max-age = 1800"), Some(1800));
        assert_eq!(parse_max_age("no-cache"), None);
    }
}
