//! # Service UPnP
//!
//! Racine de composition de la pile : elle assemble la configuration, le
//! registre, la fabrique de protocoles, le point de contrôle et la couche
//! réseau, puis lance les tâches de fond (maintenance du registre,
//! annonces périodiques).
//!
//! ```rust,no_run
//! use pmoconfig::Config;
//! use pmoupnpcore::UpnpService;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load_config("")?;
//! let mut upnp = UpnpService::start(&config).await?;
//!
//! for device in upnp.registry().remote_devices() {
//!     println!("{}", device.details().friendly_name);
//! }
//!
//! upnp.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use pmoconfig::Config;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config_ext::{UpnpConfigExt, UpnpSettings},
    control_point::ControlPoint,
    devices::LocalDevice,
    message::ssdp::ST_ALL,
    namespace::Namespace,
    protocol::{ProtocolContext, ProtocolFactory, discovery},
    registry::{RegistrationError, Registry, spawn_maintenance},
    transport::{ReqwestStreamClient, Router, RouterError, StreamClient, WorkerPool, multicast},
    types::Udn,
};

/// Pile UPnP démarrée.
pub struct UpnpService {
    context: Arc<ProtocolContext>,
    control_point: ControlPoint,
    router: Router,
    tasks: Vec<JoinHandle<()>>,
}

impl UpnpService {
    /// Démarre la pile avec les réglages `upnp.*` de la configuration.
    pub async fn start(config: &Config) -> Result<Self, RouterError> {
        Self::start_with(config.upnp_settings()).await
    }

    pub async fn start_with(settings: UpnpSettings) -> Result<Self, RouterError> {
        let bound = Router::bind(&settings).await?;
        let base_url = advertised_base_url(settings.bind_address, bound.local_addr())?;

        let client: Arc<dyn StreamClient> = Arc::new(ReqwestStreamClient::new(settings.http_timeout)?);
        let registry = Arc::new(Registry::new(Namespace::new(&settings.namespace_base)));
        let context = Arc::new(ProtocolContext::new(
            registry.clone(),
            client,
            bound.datagram_sender(),
            settings.clone(),
            base_url.clone(),
        ));

        let factory = Arc::new(ProtocolFactory::new(context.clone()));
        let router = bound.start(factory.clone(), factory, WorkerPool::new(settings.pool_size))?;

        let mut tasks = vec![spawn_maintenance(registry, settings.maintenance_interval)];
        if settings.ssdp_enabled {
            tasks.push(spawn_announcer(context.clone(), settings.announce_interval));
        }

        let control_point = ControlPoint::new(context.clone());
        if settings.ssdp_enabled {
            control_point.search(ST_ALL).await;
        }

        info!(base_url = %base_url, "✅ UPnP service started");
        Ok(Self {
            context,
            control_point,
            router,
            tasks,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.context.registry()
    }

    pub fn control_point(&self) -> &ControlPoint {
        &self.control_point
    }

    pub fn settings(&self) -> &UpnpSettings {
        self.context.settings()
    }

    /// URL de base des ressources locales
    pub fn base_url(&self) -> &Url {
        self.context.base_url()
    }

    /// Enregistre un périphérique local et l'annonce.
    ///
    /// Les publieurs d'événements de ses services reçoivent le client HTTP
    /// de la pile.
    pub async fn add_local_device(&self, device: Arc<LocalDevice>) -> Result<(), RegistrationError> {
        let max_failures = self.context.settings().max_delivery_failures;
        for service in device.all_services() {
            service.publisher().attach(self.context.client().clone(), max_failures);
        }
        self.registry().add_local_device(device.clone())?;
        discovery::announce_alive(&self.context, &device).await;
        Ok(())
    }

    /// Retire un périphérique local racine après un `ssdp:byebye`.
    pub async fn remove_local_device(&self, udn: &Udn) -> Option<Arc<LocalDevice>> {
        let device = self.registry().remove_local_device(udn)?;
        discovery::announce_byebye(&self.context, &device).await;
        Some(device)
    }

    /// Arrête la pile.
    ///
    /// Les périphériques locaux disent au revoir, les abonnements sortants
    /// sont résiliés, les abonnés entrants retirés, puis les tâches de fond
    /// et la couche réseau s'arrêtent.
    pub async fn shutdown(&mut self) -> Result<(), RouterError> {
        if !self.router.is_running() {
            return Err(RouterError::NotRunning);
        }
        info!("🛑 Shutting down UPnP service");

        for device in self.registry().local_devices() {
            discovery::announce_byebye(&self.context, &device).await;
        }
        self.control_point.unsubscribe_all().await;
        self.control_point.stop_renewals();
        self.registry().shutdown();

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.router.shutdown().await
    }
}

/// URL de base annoncée.
///
/// Une écoute sur toutes les interfaces annonce la première adresse IPv4
/// non-loopback de la machine.
fn advertised_base_url(bind_address: IpAddr, local_addr: SocketAddr) -> Result<Url, RouterError> {
    let ip = if bind_address.is_unspecified() {
        match multicast::local_ipv4_addresses() {
            Ok(addresses) if !addresses.is_empty() => IpAddr::V4(addresses[0]),
            Ok(_) => {
                warn!("⚠️ No non-loopback interface, advertising 127.0.0.1");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }
            Err(e) => return Err(e),
        }
    } else {
        bind_address
    };
    let address = SocketAddr::new(ip, local_addr.port());
    Url::parse(&format!("http://{}/", address)).map_err(|e| RouterError::NoInterface(e.to_string()))
}

/// Réannonce périodiquement les périphériques locaux.
///
/// La première annonce est faite à l'enregistrement ; le premier tick
/// immédiat est sauté.
fn spawn_announcer(context: Arc<ProtocolContext>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let devices = context.registry().local_devices();
            if devices.is_empty() {
                continue;
            }
            debug!(count = devices.len(), "📡 Periodic announcement");
            for device in devices {
                discovery::announce_alive(&context, &device).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_uses_bound_address() {
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8200);
        let url = advertised_base_url(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), local).unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.10:8200/");
    }

    #[tokio::test]
    async fn test_start_and_shutdown_without_ssdp() {
        let settings = UpnpSettings {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ssdp_enabled: false,
            ..UpnpSettings::default()
        };
        let mut upnp = UpnpService::start_with(settings).await.unwrap();
        assert_eq!(upnp.base_url().host_str(), Some("127.0.0.1"));
        assert!(upnp.registry().local_devices().is_empty());

        upnp.shutdown().await.unwrap();
        assert!(matches!(upnp.shutdown().await, Err(RouterError::NotRunning)));
    }
}
