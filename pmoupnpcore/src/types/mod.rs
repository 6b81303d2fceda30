//! Types d'identité UPnP : UDN, types de périphériques et de services,
//! identifiants de service et d'abonnement.
//!
//! L'égalité suit les règles de l'UDA : l'UDN est insensible à la casse,
//! et un type versionné « implémente » toute version inférieure ou égale.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use uuid::Uuid;

use crate::variable_types::InvalidValueError;

/// Namespace UDA des types de périphériques et de services
pub const UDA_TYPE_NAMESPACE: &str = "schemas-upnp-org";

/// Namespace UDA des identifiants de service
pub const UDA_ID_NAMESPACE: &str = "upnp-org";

/// Unique Device Name, clé primaire d'un périphérique.
///
/// Stocké sans le préfixe `uuid:` ; affiché avec.
#[derive(Debug, Clone, Eq)]
pub struct Udn(String);

impl Udn {
    pub fn new(identifier: &str) -> Result<Self, InvalidValueError> {
        let id = strip_prefix_ci(identifier.trim(), "uuid:");
        if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(InvalidValueError::identifier(identifier, "invalid UDN"));
        }
        Ok(Udn(id.to_string()))
    }

    pub fn random() -> Self {
        Udn(Uuid::new_v4().to_string())
    }

    /// Identifiant sans le préfixe `uuid:`
    pub fn identifier(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Udn {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Udn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for Udn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "uuid:{}", self.0)
    }
}

impl FromStr for Udn {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Udn::new(s)
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> &'a str {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &s[prefix.len()..],
        _ => s,
    }
}

/// Découpe `urn:<namespace>:<kind>:<name>[:<version>]`.
fn split_urn<'a>(s: &'a str, kind: &str, versioned: bool) -> Option<(&'a str, &'a str, Option<u32>)> {
    let rest = s.trim().strip_prefix("urn:")?;
    let mut parts = rest.split(':');
    let namespace = parts.next().filter(|ns| !ns.is_empty())?;
    if parts.next()? != kind {
        return None;
    }
    let name = parts.next().filter(|n| !n.is_empty())?;
    let version = if versioned {
        Some(parts.next()?.trim().parse::<u32>().ok().filter(|v| *v > 0)?)
    } else {
        None
    };
    if parts.next().is_some() {
        return None;
    }
    Some((namespace, name, version))
}

macro_rules! versioned_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            namespace: String,
            type_name: String,
            version: u32,
        }

        impl $name {
            pub fn new(namespace: &str, type_name: &str, version: u32) -> Self {
                Self {
                    namespace: namespace.to_string(),
                    type_name: type_name.to_string(),
                    version,
                }
            }

            /// Type défini par le forum UPnP (`schemas-upnp-org`)
            pub fn uda(type_name: &str, version: u32) -> Self {
                Self::new(UDA_TYPE_NAMESPACE, type_name, version)
            }

            pub fn namespace(&self) -> &str {
                &self.namespace
            }

            pub fn type_name(&self) -> &str {
                &self.type_name
            }

            pub fn version(&self) -> u32 {
                self.version
            }

            /// Vrai si `self` satisfait une demande portant sur `requested` :
            /// même namespace et même nom, version au moins égale.
            pub fn implements_version(&self, requested: &$name) -> bool {
                self.namespace == requested.namespace
                    && self.type_name == requested.type_name
                    && self.version >= requested.version
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    f,
                    "urn:{}:{}:{}:{}",
                    self.namespace, $kind, self.type_name, self.version
                )
            }
        }

        impl FromStr for $name {
            type Err = InvalidValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match split_urn(s, $kind, true) {
                    Some((ns, name, Some(version))) => Ok(Self::new(ns, name, version)),
                    _ => Err(InvalidValueError::identifier(
                        s,
                        concat!("expected urn:<namespace>:", $kind, ":<type>:<version>"),
                    )),
                }
            }
        }
    };
}

versioned_type!(
    /// Type de périphérique, par exemple `urn:schemas-upnp-org:device:MediaRenderer:1`
    DeviceType,
    "device"
);

versioned_type!(
    /// Type de service, par exemple `urn:schemas-upnp-org:service:RenderingControl:2`
    ServiceType,
    "service"
);

/// Identifiant de service, unique au sein d'un périphérique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    namespace: String,
    id: String,
}

impl ServiceId {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        }
    }

    pub fn uda(id: &str) -> Self {
        Self::new(UDA_ID_NAMESPACE, id)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "urn:{}:serviceId:{}", self.namespace, self.id)
    }
}

impl FromStr for ServiceId {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split_urn(s, "serviceId", false)
            .map(|(ns, id, _)| ServiceId::new(ns, id))
            .ok_or_else(|| {
                InvalidValueError::identifier(s, "expected urn:<namespace>:serviceId:<id>")
            })
    }
}

/// Référence globale d'un service : `<udn>/<serviceId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceReference {
    pub udn: Udn,
    pub service_id: ServiceId,
}

impl ServiceReference {
    pub fn new(udn: Udn, service_id: ServiceId) -> Self {
        Self { udn, service_id }
    }
}

impl fmt::Display for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.udn, self.service_id)
    }
}

impl FromStr for ServiceReference {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (udn, sid) = s
            .split_once('/')
            .ok_or_else(|| InvalidValueError::identifier(s, "expected <udn>/<serviceId>"))?;
        Ok(ServiceReference::new(udn.parse()?, sid.parse()?))
    }
}

/// Identifiant d'abonnement GENA (en-tête `SID`).
#[derive(Debug, Clone, Eq)]
pub struct Sid(String);

impl Sid {
    pub fn new(value: &str) -> Result<Self, InvalidValueError> {
        let v = value.trim();
        if v.is_empty() {
            return Err(InvalidValueError::identifier(value, "empty SID"));
        }
        Ok(Sid(v.to_string()))
    }

    pub fn generate() -> Self {
        Sid(format!("uuid:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Sid {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Hash for Sid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sid {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sid::new(s)
    }
}
