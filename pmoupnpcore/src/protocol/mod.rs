//! # Protocoles
//!
//! Le [`ProtocolFactory`] choisit, pour chaque message entrant, le
//! protocole qui le traite :
//!
//! | message                         | protocole                      |
//! |---------------------------------|--------------------------------|
//! | `GET` d'une description         | description locale             |
//! | `POST` sur une URL de contrôle  | action SOAP                    |
//! | `SUBSCRIBE`/`UNSUBSCRIBE`       | abonnement GENA entrant        |
//! | `NOTIFY` sur une URL de rappel  | événement d'un abonnement      |
//! | datagramme `NOTIFY`             | annonce (alive/byebye)         |
//! | datagramme `M-SEARCH`           | réponse de recherche           |
//! | datagramme `HTTP/1.1 200`       | résultat de recherche          |
//!
//! Un message sans protocole produit une [`ProtocolCreationError`].
//!
//! Les protocoles sortants (action, abonnement, récupération des
//! descriptions, annonces) sont dans [`sending`] et [`discovery`].

pub mod discovery;
mod errors;
mod receiving;
pub mod sending;

pub use errors::ProtocolCreationError;
pub use receiving::{ReceivingDatagram, ReceivingStream};

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::{
    config_ext::UpnpSettings,
    message::{
        HeaderType, StreamRequestMessage, StreamResponseMessage, UpnpMethod,
        ssdp::{DatagramMessage, SsdpMessage},
    },
    namespace::NamespaceTarget,
    registry::{Registry, ResourceKind},
    transport::{DatagramHandler, DatagramSender, StreamClient, StreamHandler, StreamOutcome},
    types::Udn,
};

/// Dépendances partagées par tous les protocoles.
pub struct ProtocolContext {
    registry: Arc<Registry>,
    client: Arc<dyn StreamClient>,
    datagrams: Arc<dyn DatagramSender>,
    settings: UpnpSettings,
    base_url: Url,
    server_header: String,
    /// Récupérations de descriptions en cours, par UDN annoncé
    pending_retrievals: Mutex<HashSet<Udn>>,
}

impl ProtocolContext {
    pub fn new(
        registry: Arc<Registry>,
        client: Arc<dyn StreamClient>,
        datagrams: Arc<dyn DatagramSender>,
        settings: UpnpSettings,
        base_url: Url,
    ) -> Self {
        let server_header = settings.server_header();
        Self {
            registry,
            client,
            datagrams,
            settings,
            base_url,
            server_header,
            pending_retrievals: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn StreamClient> {
        &self.client
    }

    pub fn datagrams(&self) -> &Arc<dyn DatagramSender> {
        &self.datagrams
    }

    pub fn settings(&self) -> &UpnpSettings {
        &self.settings
    }

    /// URL de base annoncée (`http://<ip>:<port>/`)
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn server_header(&self) -> &str {
        &self.server_header
    }

    pub fn user_agent(&self) -> &str {
        &self.server_header
    }

    /// URL absolue d'un chemin local
    pub fn local_url(&self, path: &str) -> Option<Url> {
        self.registry.namespace().url(&self.base_url, path)
    }

    /// Réserve la récupération d'un UDN ; `false` si elle est déjà en cours.
    pub(crate) fn begin_retrieval(&self, udn: &Udn) -> bool {
        self.pending_retrievals.lock().insert(udn.clone())
    }

    pub(crate) fn end_retrieval(&self, udn: &Udn) {
        self.pending_retrievals.lock().remove(udn);
    }
}

/// Sélection des protocoles des messages entrants.
#[derive(Clone)]
pub struct ProtocolFactory {
    context: Arc<ProtocolContext>,
}

impl ProtocolFactory {
    pub fn new(context: Arc<ProtocolContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<ProtocolContext> {
        &self.context
    }

    /// Protocole d'une requête HTTP entrante, par méthode et ressource
    /// ciblée.
    pub fn create_receiving_stream(
        &self,
        request: &StreamRequestMessage,
    ) -> Result<ReceivingStream, ProtocolCreationError> {
        let unroutable = |status: u16| ProtocolCreationError::UnroutableStream {
            method: request.method.to_string(),
            path: request.path().to_string(),
            status,
        };

        let registry = self.context.registry();
        let Some(resource) = registry.resource(request.path(), request.query()) else {
            match registry.namespace().resolve(request.path()) {
                Some(NamespaceTarget::Callback(id)) => {
                    debug!(callback = %id, "NOTIFY for an unknown or ended subscription");
                    // UDA : un SID inconnu est une précondition manquée
                    if request.method == UpnpMethod::Notify {
                        return Err(unroutable(412));
                    }
                }
                Some(target) => debug!(?target, "Request for an unregistered resource"),
                None => {}
            }
            return Err(unroutable(404));
        };

        match (resource.kind(), &request.method) {
            (ResourceKind::DeviceDescriptor(device), UpnpMethod::Get) => {
                Ok(ReceivingStream::DeviceDescriptor(device.clone()))
            }
            (ResourceKind::ServiceDescriptor(service), UpnpMethod::Get) => {
                Ok(ReceivingStream::ServiceDescriptor(service.clone()))
            }
            (ResourceKind::Control(service), UpnpMethod::Post) => Ok(ReceivingStream::Action(service.clone())),
            (ResourceKind::Event(service), UpnpMethod::Subscribe) => {
                Ok(ReceivingStream::Subscribe(service.clone()))
            }
            (ResourceKind::Event(service), UpnpMethod::Unsubscribe) => {
                Ok(ReceivingStream::Unsubscribe(service.clone()))
            }
            (ResourceKind::Callback(subscription), UpnpMethod::Notify) => {
                Ok(ReceivingStream::Event(subscription.clone()))
            }
            _ => Err(unroutable(405)),
        }
    }

    /// Protocole d'un datagramme SSDP.
    pub fn create_receiving_datagram(
        &self,
        datagram: &DatagramMessage,
    ) -> Result<ReceivingDatagram, ProtocolCreationError> {
        let unroutable = || ProtocolCreationError::UnroutableDatagram {
            start_line: datagram.start_line.clone(),
            from: datagram.from,
        };
        match SsdpMessage::from_datagram(datagram).ok_or_else(unroutable)? {
            SsdpMessage::Alive {
                usn,
                location,
                max_age,
                ..
            }
            | SsdpMessage::SearchResponse {
                usn,
                location,
                max_age,
                ..
            } => Ok(ReceivingDatagram::Advertisement {
                udn: usn.udn,
                location,
                max_age,
            }),
            SsdpMessage::ByeBye { usn, .. } => Ok(ReceivingDatagram::ByeBye(usn.udn)),
            SsdpMessage::Search { st, mx } => Ok(ReceivingDatagram::Search {
                st,
                mx,
                from: datagram.from,
            }),
        }
    }
}

#[async_trait]
impl StreamHandler for ProtocolFactory {
    async fn handle_stream(&self, request: StreamRequestMessage) -> StreamOutcome {
        match self.create_receiving_stream(&request) {
            Ok(protocol) => protocol.run(&self.context, request).await,
            Err(e) => {
                debug!("{}", e);
                StreamOutcome::new(
                    StreamResponseMessage::new(e.status())
                        .with_header(HeaderType::Server, self.context.server_header()),
                )
            }
        }
    }
}

#[async_trait]
impl DatagramHandler for ProtocolFactory {
    async fn handle_datagram(&self, datagram: DatagramMessage) {
        match self.create_receiving_datagram(&datagram) {
            Ok(protocol) => protocol.run(&self.context).await,
            Err(e) => debug!("{}", e),
        }
    }
}
