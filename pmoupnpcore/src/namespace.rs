//! Plan d'URL des ressources locales.
//!
//! ```text
//! {base}/dev/{udn}/desc.xml                     description du périphérique
//! {base}/dev/{udn}/svc/{ns}/{id}/desc.xml       SCPD
//! {base}/dev/{udn}/svc/{ns}/{id}/action         contrôle SOAP
//! {base}/dev/{udn}/svc/{ns}/{id}/event          abonnements GENA
//! {base}/cb/{callback}                          NOTIFY des abonnements sortants
//! ```

use url::Url;

use crate::types::{ServiceId, ServiceReference, Udn};

const DEVICE_SEGMENT: &str = "dev";
const SERVICE_SEGMENT: &str = "svc";
const CALLBACK_SEGMENT: &str = "cb";
const DESCRIPTOR_FILE: &str = "desc.xml";
const CONTROL_SUFFIX: &str = "action";
const EVENT_SUFFIX: &str = "event";

/// Ressource désignée par un chemin local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceTarget {
    DeviceDescriptor(Udn),
    ServiceDescriptor(ServiceReference),
    Control(ServiceReference),
    Event(ServiceReference),
    Callback(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespace {
    base_path: String,
}

impl Namespace {
    /// `base_path` est normalisé sans `/` final ; une chaîne vide place les
    /// ressources à la racine.
    pub fn new(base_path: &str) -> Self {
        let trimmed = base_path.trim().trim_end_matches('/');
        let base_path = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { base_path }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn device_path(&self, udn: &Udn) -> String {
        format!("{}/{}/{}", self.base_path, DEVICE_SEGMENT, udn.identifier())
    }

    fn service_path(&self, udn: &Udn, service_id: &ServiceId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.device_path(udn),
            SERVICE_SEGMENT,
            service_id.namespace(),
            service_id.id()
        )
    }

    pub fn device_descriptor_path(&self, udn: &Udn) -> String {
        format!("{}/{}", self.device_path(udn), DESCRIPTOR_FILE)
    }

    pub fn service_descriptor_path(&self, udn: &Udn, service_id: &ServiceId) -> String {
        format!("{}/{}", self.service_path(udn, service_id), DESCRIPTOR_FILE)
    }

    pub fn control_path(&self, udn: &Udn, service_id: &ServiceId) -> String {
        format!("{}/{}", self.service_path(udn, service_id), CONTROL_SUFFIX)
    }

    pub fn event_path(&self, udn: &Udn, service_id: &ServiceId) -> String {
        format!("{}/{}", self.service_path(udn, service_id), EVENT_SUFFIX)
    }

    pub fn callback_path(&self, callback_id: &str) -> String {
        format!("{}/{}/{}", self.base_path, CALLBACK_SEGMENT, callback_id)
    }

    /// URL absolue d'un chemin local
    pub fn url(&self, base_url: &Url, path: &str) -> Option<Url> {
        base_url.join(path).ok()
    }

    /// Retrouve la ressource désignée par un chemin de requête.
    pub fn resolve(&self, path: &str) -> Option<NamespaceTarget> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            [CALLBACK_SEGMENT, id] if !id.is_empty() => Some(NamespaceTarget::Callback(id.to_string())),
            [DEVICE_SEGMENT, udn, DESCRIPTOR_FILE] => {
                Some(NamespaceTarget::DeviceDescriptor(Udn::new(udn).ok()?))
            }
            [DEVICE_SEGMENT, udn, SERVICE_SEGMENT, ns, id, last] => {
                let reference = ServiceReference::new(Udn::new(udn).ok()?, ServiceId::new(ns, id));
                match *last {
                    DESCRIPTOR_FILE => Some(NamespaceTarget::ServiceDescriptor(reference)),
                    CONTROL_SUFFIX => Some(NamespaceTarget::Control(reference)),
                    EVENT_SUFFIX => Some(NamespaceTarget::Event(reference)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
