//! Ressources HTTP adressables : descriptions, contrôle, événements et
//! URL de rappel des abonnements sortants.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::{devices::LocalDevice, gena::RemoteGenaSubscription, services::LocalService};

/// Travail différé retourné par la maintenance, exécuté hors du verrou
/// du registre.
pub type DeferredTask = BoxFuture<'static, ()>;

#[derive(Clone)]
pub enum ResourceKind {
    DeviceDescriptor(Arc<LocalDevice>),
    ServiceDescriptor(Arc<LocalService>),
    Control(Arc<LocalService>),
    Event(Arc<LocalService>),
    Callback(Arc<RemoteGenaSubscription>),
}

impl ResourceKind {
    fn label(&self) -> &'static str {
        match self {
            ResourceKind::DeviceDescriptor(_) => "device-descriptor",
            ResourceKind::ServiceDescriptor(_) => "service-descriptor",
            ResourceKind::Control(_) => "control",
            ResourceKind::Event(_) => "event",
            ResourceKind::Callback(_) => "callback",
        }
    }
}

/// Objet du modèle exposé sous un chemin HTTP.
///
/// L'égalité porte sur le chemin et la requête, pas sur l'objet.
#[derive(Clone)]
pub struct Resource {
    path: String,
    query: Option<String>,
    kind: ResourceKind,
}

impl Resource {
    pub fn new(path: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            path: path.into(),
            query: None,
            kind,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Vrai si la ressource répond à `path` (et `query` si elle en porte une)
    pub fn matches(&self, path: &str, query: Option<&str>) -> bool {
        self.path == path && (self.query.is_none() || self.query.as_deref() == query)
    }

    /// Maintenance propre à la ressource.
    pub fn maintain(&self, now: Instant) -> Vec<DeferredTask> {
        match &self.kind {
            ResourceKind::Event(service) => service.publisher().maintain(now),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.query == other.query
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.query.hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("query", &self.query)
            .field("kind", &self.kind.label())
            .finish()
    }
}
