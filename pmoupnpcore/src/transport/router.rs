use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    config_ext::UpnpSettings,
    transport::{
        DatagramHandler, DatagramSender, RouterError, StreamHandler, WorkerPool,
        multicast::{self, DisabledDatagramSender, UdpDatagramSender},
        server::{self, HttpServer},
    },
};

/// Sockets réservés, serveurs pas encore démarrés.
///
/// La séparation permet de connaître le port HTTP réel (et donc l'URL
/// de base annoncée) avant de construire les handlers.
pub struct BoundRouter {
    listener: TcpListener,
    multicast: Option<Arc<UdpSocket>>,
    unicast: Option<Arc<UdpSocket>>,
    local_addr: SocketAddr,
}

impl BoundRouter {
    /// Adresse effective du serveur HTTP
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Émetteur de datagrammes partagé par la découverte.
    pub fn datagram_sender(&self) -> Arc<dyn DatagramSender> {
        match &self.unicast {
            Some(socket) => Arc::new(UdpDatagramSender::new(socket.clone())),
            None => Arc::new(DisabledDatagramSender),
        }
    }

    /// Démarre le serveur HTTP et les boucles de réception SSDP.
    pub fn start(
        self,
        streams: Arc<dyn StreamHandler>,
        datagrams: Arc<dyn DatagramHandler>,
        pool: WorkerPool,
    ) -> Result<Router, RouterError> {
        let http = HttpServer::start(self.listener, streams, pool.clone())?;

        let mut receivers = Vec::new();
        for socket in [self.multicast, self.unicast].into_iter().flatten() {
            receivers.push(multicast::spawn_receiver(socket, datagrams.clone(), pool.clone()));
        }

        info!(
            address = %http.local_addr(),
            ssdp_receivers = receivers.len(),
            "✅ UPnP router started"
        );
        Ok(Router {
            http: Some(http),
            receivers,
            pool,
        })
    }
}

/// Couche réseau en fonctionnement.
pub struct Router {
    http: Option<HttpServer>,
    receivers: Vec<JoinHandle<()>>,
    pool: WorkerPool,
}

impl Router {
    /// Réserve le port HTTP et, si SSDP est actif, les sockets UDP.
    pub async fn bind(settings: &UpnpSettings) -> Result<BoundRouter, RouterError> {
        let address = SocketAddr::new(settings.bind_address, settings.http_port);
        let listener = server::bind(address).await?;
        let local_addr = listener.local_addr().map_err(|source| RouterError::HttpBind {
            address: address.to_string(),
            source,
        })?;

        let (multicast, unicast) = if settings.ssdp_enabled {
            let unicast = Arc::new(multicast::open_unicast_socket()?);
            let multicast = match multicast::open_ssdp_socket() {
                Ok(socket) => Some(Arc::new(socket)),
                Err(e) => {
                    // port 1900 occupé : on reste control point seul
                    warn!("⚠️ SSDP listener unavailable, announcements only: {}", e);
                    None
                }
            };
            (multicast, Some(unicast))
        } else {
            info!("SSDP disabled by configuration");
            (None, None)
        };

        Ok(BoundRouter {
            listener,
            multicast,
            unicast,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().map(HttpServer::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.http.is_some()
    }

    /// Arrête la réception SSDP puis le serveur HTTP.
    pub async fn shutdown(&mut self) -> Result<(), RouterError> {
        let http = self.http.take().ok_or(RouterError::NotRunning)?;
        for receiver in self.receivers.drain(..) {
            receiver.abort();
        }
        http.stop().await;
        self.pool.close();
        info!("👋 UPnP router stopped");
        Ok(())
    }
}
