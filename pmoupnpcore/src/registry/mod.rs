//! # Registre des périphériques
//!
//! Le [`Registry`] tient :
//!
//! - les périphériques locaux enregistrés, et les [`Resource`] HTTP qui les
//!   exposent (descriptions, contrôle, événements) ;
//! - les périphériques distants découverts, chacun avec ses
//!   [`ExpirationDetails`] ;
//! - les abonnements GENA sortants, indexés par identifiant de rappel.
//!
//! Toutes les mutations passent par un unique verrou en écriture. Les
//! observateurs ([`RegistryListener`]) sont notifiés une fois le verrou
//! relâché.
//!
//! La maintenance ([`Registry::maintain`]) n'est pas déclenchée par les
//! mutations : [`spawn_maintenance`] l'exécute à intervalle fixe.

mod errors;
mod listener;
mod maintainer;
mod resource;

pub use errors::RegistrationError;
pub use listener::RegistryListener;
pub use maintainer::spawn_maintenance;
pub use resource::{DeferredTask, Resource, ResourceKind};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    devices::{DeviceHandle, DeviceInfo, LocalDevice, RemoteDevice},
    gena::{EndReason, RemoteGenaSubscription},
    namespace::Namespace,
    services::{DeviceService, ServiceHandle},
    types::{DeviceType, ServiceReference, ServiceType, Udn},
};

/// Durée de validité d'une entrée et date de son dernier rafraîchissement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpirationDetails {
    max_age: Option<Duration>,
    last_refresh: Instant,
}

impl ExpirationDetails {
    /// `None` : l'entrée n'expire jamais
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            max_age,
            last_refresh: Instant::now(),
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn last_refresh(&self) -> Instant {
        self.last_refresh
    }

    pub fn refresh(&mut self, max_age: Option<Duration>) {
        self.max_age = max_age;
        self.last_refresh = Instant::now();
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self.max_age {
            Some(max_age) => now > self.last_refresh + max_age,
            None => false,
        }
    }
}

/// Issue d'un [`Registry::add_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// UDN déjà connu : seule l'expiration a été rafraîchie
    Updated,
}

struct RemoteEntry {
    device: Arc<RemoteDevice>,
    expiration: ExpirationDetails,
}

#[derive(Default)]
struct RegistryInner {
    local_devices: HashMap<Udn, Arc<LocalDevice>>,
    remote_devices: HashMap<Udn, RemoteEntry>,
    resources: HashMap<String, Resource>,
    outgoing: HashMap<String, Arc<RemoteGenaSubscription>>,
}

impl RegistryInner {
    fn knows_udn(&self, udn: &Udn) -> Option<bool> {
        if self.local_devices.values().any(|d| d.find_device(udn).is_some()) {
            return Some(true);
        }
        if self.remote_devices.values().any(|e| e.device.find_device(udn).is_some()) {
            return Some(false);
        }
        None
    }

    /// Retire les abonnements sortants portant sur l'arbre `device`
    fn take_subscriptions_of(&mut self, device: &Arc<RemoteDevice>) -> Vec<Arc<RemoteGenaSubscription>> {
        let udns: HashSet<Udn> = device.all_devices().iter().map(|d| d.udn().clone()).collect();
        let ids: Vec<String> = self
            .outgoing
            .iter()
            .filter(|(_, s)| s.service().device_udn().is_some_and(|u| udns.contains(u)))
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sub) = self.outgoing.remove(&id) {
                self.resources.retain(|_, r| !matches!(r.kind(), ResourceKind::Callback(s) if Arc::ptr_eq(s, &sub)));
                removed.push(sub);
            }
        }
        removed
    }
}

/// Registre des périphériques locaux et distants.
pub struct Registry {
    namespace: Namespace,
    inner: RwLock<RegistryInner>,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Registry")
            .field("namespace", &self.namespace)
            .field("local_devices", &inner.local_devices.len())
            .field("remote_devices", &inner.remote_devices.len())
            .field("resources", &inner.resources.len())
            .field("outgoing_subscriptions", &inner.outgoing.len())
            .finish()
    }
}

impl Registry {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            inner: RwLock::new(RegistryInner::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    // ----- observateurs -----

    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn RegistryListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify(&self, f: impl Fn(&dyn RegistryListener)) {
        let listeners: Vec<_> = self.listeners.read().clone();
        for listener in listeners {
            f(listener.as_ref());
        }
    }

    // ----- périphériques distants -----

    /// Ajoute un périphérique découvert.
    ///
    /// Un UDN déjà connu est un rafraîchissement : l'entrée existante est
    /// conservée, son expiration est remise à zéro et seuls les observateurs
    /// `remote_device_updated` sont notifiés.
    pub fn add_device(
        &self,
        device: Arc<RemoteDevice>,
        max_age: Option<Duration>,
    ) -> Result<Registration, RegistrationError> {
        let (outcome, current) = {
            let mut inner = self.inner.write();
            if let Some(entry) = inner.remote_devices.get_mut(device.udn()) {
                entry.expiration.refresh(max_age);
                (Registration::Updated, entry.device.clone())
            } else {
                for d in device.all_devices() {
                    match inner.knows_udn(d.udn()) {
                        Some(true) => return Err(RegistrationError::LocalDeviceConflict(d.udn().clone())),
                        Some(false) => return Err(RegistrationError::DeviceAlreadyRegistered(d.udn().clone())),
                        None => {}
                    }
                }
                inner.remote_devices.insert(
                    device.udn().clone(),
                    RemoteEntry {
                        device: device.clone(),
                        expiration: ExpirationDetails::new(max_age),
                    },
                );
                (Registration::Added, device)
            }
        };

        match outcome {
            Registration::Added => {
                info!(
                    udn = %current.udn(),
                    name = %current.details().friendly_name,
                    "✅ Remote device added"
                );
                self.notify(|l| l.remote_device_added(self, &current));
            }
            Registration::Updated => {
                debug!(udn = %current.udn(), "♻️ Remote device refreshed");
                self.notify(|l| l.remote_device_updated(self, &current));
            }
        }
        Ok(outcome)
    }

    /// Rafraîchit un périphérique connu ; `false` s'il est inconnu.
    pub fn refresh_device(&self, udn: &Udn, max_age: Option<Duration>) -> bool {
        let refreshed = {
            let mut inner = self.inner.write();
            inner.remote_devices.get_mut(udn).map(|entry| {
                entry.expiration.refresh(max_age);
                entry.device.clone()
            })
        };
        match refreshed {
            Some(device) => {
                debug!(udn = %udn, "♻️ Remote device refreshed");
                self.notify(|l| l.remote_device_updated(self, &device));
                true
            }
            None => false,
        }
    }

    /// Retire un périphérique distant racine.
    ///
    /// Ses abonnements sortants encore actifs sont terminés avec
    /// [`EndReason::DeviceRemoved`].
    pub fn remove_device(&self, udn: &Udn) -> Option<Arc<RemoteDevice>> {
        let (device, subscriptions) = {
            let mut inner = self.inner.write();
            let entry = inner.remote_devices.remove(udn)?;
            let subs = inner.take_subscriptions_of(&entry.device);
            (entry.device, subs)
        };
        self.finish_removal(&device, subscriptions);
        Some(device)
    }

    fn finish_removal(&self, device: &Arc<RemoteDevice>, subscriptions: Vec<Arc<RemoteGenaSubscription>>) {
        for sub in subscriptions {
            warn!(
                udn = %device.udn(),
                sid = ?sub.sid(),
                "❌ Device removed with an active subscription"
            );
            sub.end(EndReason::DeviceRemoved);
        }
        info!(udn = %device.udn(), "👋 Remote device removed");
        self.notify(|l| l.remote_device_removed(self, device));
    }

    pub fn remote_device(&self, udn: &Udn) -> Option<Arc<RemoteDevice>> {
        self.inner
            .read()
            .remote_devices
            .values()
            .find_map(|e| e.device.find_device(udn))
    }

    /// Périphériques distants racine
    pub fn remote_devices(&self) -> Vec<Arc<RemoteDevice>> {
        self.inner
            .read()
            .remote_devices
            .values()
            .map(|e| e.device.clone())
            .collect()
    }

    pub fn expiration(&self, udn: &Udn) -> Option<ExpirationDetails> {
        self.inner.read().remote_devices.get(udn).map(|e| e.expiration)
    }

    // ----- périphériques locaux -----

    /// Enregistre un périphérique local racine et publie ses ressources.
    pub fn add_local_device(&self, device: Arc<LocalDevice>) -> Result<(), RegistrationError> {
        {
            let mut inner = self.inner.write();
            for d in device.all_devices() {
                match inner.knows_udn(d.udn()) {
                    Some(true) => return Err(RegistrationError::DeviceAlreadyRegistered(d.udn().clone())),
                    Some(false) => return Err(RegistrationError::LocalDeviceConflict(d.udn().clone())),
                    None => {}
                }
            }

            let resources = self.local_resources(&device);
            if let Some(taken) = resources.iter().find(|r| inner.resources.contains_key(r.path())) {
                return Err(RegistrationError::ResourceConflict(taken.path().to_string()));
            }
            for resource in resources {
                inner.resources.insert(resource.path().to_string(), resource);
            }
            inner.local_devices.insert(device.udn().clone(), device.clone());
        }

        info!(
            udn = %device.udn(),
            name = %device.details().friendly_name,
            services = device.all_services().len(),
            "✅ Local device registered"
        );
        self.notify(|l| l.local_device_added(self, &device));
        Ok(())
    }

    fn local_resources(&self, device: &Arc<LocalDevice>) -> Vec<Resource> {
        let ns = &self.namespace;
        let mut out = vec![Resource::new(
            ns.device_descriptor_path(device.udn()),
            ResourceKind::DeviceDescriptor(device.clone()),
        )];
        for node in device.all_devices() {
            for service in node.services() {
                let id = service.service_id();
                out.push(Resource::new(
                    ns.service_descriptor_path(node.udn(), id),
                    ResourceKind::ServiceDescriptor(service.clone()),
                ));
                out.push(Resource::new(
                    ns.control_path(node.udn(), id),
                    ResourceKind::Control(service.clone()),
                ));
                out.push(Resource::new(
                    ns.event_path(node.udn(), id),
                    ResourceKind::Event(service.clone()),
                ));
            }
        }
        out
    }

    /// Retire un périphérique local racine, ses ressources et ses abonnés.
    pub fn remove_local_device(&self, udn: &Udn) -> Option<Arc<LocalDevice>> {
        let device = {
            let mut inner = self.inner.write();
            let device = inner.local_devices.remove(udn)?;
            let paths: HashSet<String> = self
                .local_resources(&device)
                .into_iter()
                .map(|r| r.path().to_string())
                .collect();
            inner.resources.retain(|path, _| !paths.contains(path));
            device
        };

        for service in device.all_services() {
            service.publisher().end_all();
        }
        info!(udn = %udn, "👋 Local device removed");
        self.notify(|l| l.local_device_removed(self, &device));
        Some(device)
    }

    pub fn local_device(&self, udn: &Udn) -> Option<Arc<LocalDevice>> {
        self.inner
            .read()
            .local_devices
            .values()
            .find_map(|d| d.find_device(udn))
    }

    /// Périphériques locaux racine
    pub fn local_devices(&self) -> Vec<Arc<LocalDevice>> {
        self.inner.read().local_devices.values().cloned().collect()
    }

    // ----- recherche -----

    /// Périphérique (racine ou embarqué) d'UDN donné, local d'abord
    pub fn get_device(&self, udn: &Udn) -> Option<DeviceHandle> {
        self.local_device(udn)
            .map(DeviceHandle::Local)
            .or_else(|| self.remote_device(udn).map(DeviceHandle::Remote))
    }

    pub fn get_service(&self, reference: &ServiceReference) -> Option<ServiceHandle> {
        match self.get_device(&reference.udn)? {
            DeviceHandle::Local(d) => d.service(&reference.service_id).cloned().map(ServiceHandle::Local),
            DeviceHandle::Remote(d) => d.service(&reference.service_id).cloned().map(ServiceHandle::Remote),
        }
    }

    /// Périphériques distants implémentant le type demandé
    pub fn find_remote_devices_by_type(&self, requested: &DeviceType) -> Vec<Arc<RemoteDevice>> {
        self.remote_devices()
            .iter()
            .flat_map(|d| d.find_devices_by_type(requested))
            .collect()
    }

    /// Services distants implémentant le type demandé
    pub fn find_remote_services_by_type(&self, requested: &ServiceType) -> Vec<ServiceHandle> {
        self.remote_devices()
            .iter()
            .flat_map(|d| d.find_services_by_type(requested))
            .map(ServiceHandle::Remote)
            .collect()
    }

    /// Instantané sérialisable de tous les périphériques racine
    pub fn device_infos(&self) -> Vec<DeviceInfo> {
        let inner = self.inner.read();
        inner
            .local_devices
            .values()
            .map(|d| d.info())
            .chain(inner.remote_devices.values().map(|e| e.device.info()))
            .collect()
    }

    // ----- ressources -----

    pub fn resource(&self, path: &str, query: Option<&str>) -> Option<Resource> {
        self.inner
            .read()
            .resources
            .get(path)
            .filter(|r| r.matches(path, query))
            .cloned()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.inner.read().resources.values().cloned().collect()
    }

    // ----- abonnements sortants -----

    /// Enregistre un abonnement sortant et son URL de rappel.
    pub fn add_remote_subscription(&self, subscription: Arc<RemoteGenaSubscription>) -> Result<(), RegistrationError> {
        let path = self.namespace.callback_path(subscription.callback_id());
        let mut inner = self.inner.write();
        if inner.resources.contains_key(&path) {
            return Err(RegistrationError::ResourceConflict(path));
        }
        inner.resources.insert(
            path.clone(),
            Resource::new(path, ResourceKind::Callback(subscription.clone())),
        );
        inner
            .outgoing
            .insert(subscription.callback_id().to_string(), subscription);
        Ok(())
    }

    pub fn remove_remote_subscription(&self, callback_id: &str) -> Option<Arc<RemoteGenaSubscription>> {
        let path = self.namespace.callback_path(callback_id);
        let mut inner = self.inner.write();
        inner.resources.remove(&path);
        inner.outgoing.remove(callback_id)
    }

    pub fn remote_subscription(&self, callback_id: &str) -> Option<Arc<RemoteGenaSubscription>> {
        self.inner.read().outgoing.get(callback_id).cloned()
    }

    /// Abonnements sortants établis
    pub fn remote_subscriptions(&self) -> Vec<Arc<RemoteGenaSubscription>> {
        self.inner
            .read()
            .outgoing
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect()
    }

    // ----- maintenance -----

    /// Passage de maintenance.
    ///
    /// 1. retire les périphériques distants expirés ;
    /// 2. termine les abonnements sortants expirés ;
    /// 3. collecte le travail différé des ressources, sans l'exécuter.
    pub fn maintain(&self, now: Instant) -> Vec<DeferredTask> {
        let (expired_devices, expired_subs, resources) = {
            let mut inner = self.inner.write();

            let udns: Vec<Udn> = inner
                .remote_devices
                .iter()
                .filter(|(_, e)| e.expiration.is_expired(now))
                .map(|(udn, _)| udn.clone())
                .collect();
            let mut devices = Vec::with_capacity(udns.len());
            for udn in udns {
                if let Some(entry) = inner.remote_devices.remove(&udn) {
                    let subs = inner.take_subscriptions_of(&entry.device);
                    devices.push((entry.device, subs));
                }
            }

            let ids: Vec<String> = inner
                .outgoing
                .iter()
                .filter(|(_, s)| s.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            let mut subs = Vec::with_capacity(ids.len());
            for id in ids {
                inner.resources.remove(&self.namespace.callback_path(&id));
                if let Some(sub) = inner.outgoing.remove(&id) {
                    subs.push(sub);
                }
            }

            let resources: Vec<Resource> = inner.resources.values().cloned().collect();
            (devices, subs, resources)
        };

        for (device, subs) in expired_devices {
            info!(udn = %device.udn(), "⌛ Remote device expired");
            self.finish_removal(&device, subs);
        }
        for sub in expired_subs {
            sub.end(EndReason::Expired);
        }

        resources.iter().flat_map(|r| r.maintain(now)).collect()
    }

    /// Prévient les observateurs puis vide le registre.
    ///
    /// Les abonnés des services locaux sont retirés ; les abonnements
    /// sortants restants sont terminés en échec.
    pub fn shutdown(&self) {
        self.notify(|l| l.before_shutdown(self));
        let (locals, subs) = {
            let mut inner = self.inner.write();
            let locals: Vec<_> = inner.local_devices.drain().map(|(_, d)| d).collect();
            let subs: Vec<_> = inner.outgoing.drain().map(|(_, s)| s).collect();
            inner.remote_devices.clear();
            inner.resources.clear();
            (locals, subs)
        };
        for device in locals {
            for service in device.all_services() {
                service.publisher().end_all();
            }
        }
        for sub in subs {
            sub.end(EndReason::Failed("registry shut down".to_string()));
        }
        info!("👋 Registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use url::Url;

    use crate::{
        devices::DeviceDetails,
        services::{LocalService, RemoteService, Service},
        types::ServiceId,
    };

    fn remote_device(udn: &Udn) -> Arc<RemoteDevice> {
        let service = Service::new(ServiceType::uda("SwitchPower", 1), ServiceId::uda("SwitchPower"), vec![], vec![])
            .unwrap();
        let base = Url::parse("http://10.0.0.2:4000/").unwrap();
        RemoteDevice::builder(udn.clone(), DeviceType::uda("BinaryLight", 1), DeviceDetails::new("Light", "ACME", "L1"))
            .service(RemoteService::new(
                service,
                base.join("scpd.xml").unwrap(),
                base.join("ctl").unwrap(),
                base.join("evt").unwrap(),
            ))
            .location(base.join("desc.xml").unwrap())
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    impl RegistryListener for Journal {
        fn remote_device_added(&self, _: &Registry, device: &Arc<RemoteDevice>) {
            self.0.lock().unwrap().push(format!("added {}", device.udn()));
        }
        fn remote_device_updated(&self, _: &Registry, device: &Arc<RemoteDevice>) {
            self.0.lock().unwrap().push(format!("updated {}", device.udn()));
        }
        fn remote_device_removed(&self, registry: &Registry, device: &Arc<RemoteDevice>) {
            assert!(registry.remote_device(device.udn()).is_none());
            self.0.lock().unwrap().push(format!("removed {}", device.udn()));
        }
    }

    #[test]
    fn test_add_device_is_idempotent() {
        let registry = Registry::new(Namespace::new(""));
        let journal = Arc::new(Journal::default());
        registry.add_listener(journal.clone());

        let udn = Udn::new("light-1").unwrap();
        let first = registry.add_device(remote_device(&udn), Some(Duration::from_secs(60)));
        let second = registry.add_device(remote_device(&udn), Some(Duration::from_secs(60)));

        assert_eq!(first.unwrap(), Registration::Added);
        assert_eq!(second.unwrap(), Registration::Updated);
        assert_eq!(registry.remote_devices().len(), 1);
        assert_eq!(
            *journal.0.lock().unwrap(),
            vec![format!("added {}", udn), format!("updated {}", udn)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_expires_devices() {
        let registry = Registry::new(Namespace::new(""));
        let journal = Arc::new(Journal::default());
        registry.add_listener(journal.clone());

        let short = Udn::new("short").unwrap();
        let forever = Udn::new("forever").unwrap();
        registry.add_device(remote_device(&short), Some(Duration::from_secs(5))).unwrap();
        registry.add_device(remote_device(&forever), None).unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        registry.maintain(Instant::now());

        assert!(registry.remote_device(&short).is_none());
        assert!(registry.remote_device(&forever).is_some());
        assert!(journal.0.lock().unwrap().contains(&format!("removed {}", short)));
    }

    #[test]
    fn test_local_device_resources_and_lookup() {
        let registry = Registry::new(Namespace::new("/upnp"));
        let service = Service::new(ServiceType::uda("SwitchPower", 1), ServiceId::uda("SwitchPower"), vec![], vec![])
            .unwrap();
        let udn = Udn::random();
        let device = LocalDevice::builder(udn.clone(), DeviceType::uda("BinaryLight", 1), DeviceDetails::default())
            .service(LocalService::inert(service))
            .build()
            .unwrap();
        registry.add_local_device(device.clone()).unwrap();

        let ns = registry.namespace().clone();
        let control = registry
            .resource(&ns.control_path(&udn, &ServiceId::uda("SwitchPower")), None)
            .unwrap();
        assert!(matches!(control.kind(), ResourceKind::Control(_)));
        assert!(registry.resource(&ns.device_descriptor_path(&udn), None).is_some());

        let reference = ServiceReference::new(udn.clone(), ServiceId::uda("SwitchPower"));
        assert!(registry.get_service(&reference).and_then(|s| s.as_local().cloned()).is_some());

        assert!(matches!(
            registry.add_local_device(device),
            Err(RegistrationError::DeviceAlreadyRegistered(_))
        ));

        registry.remove_local_device(&udn).unwrap();
        assert!(registry.resources().is_empty());
        assert!(registry.get_device(&udn).is_none());
    }

    #[test]
    fn test_remote_udn_cannot_shadow_local() {
        let registry = Registry::new(Namespace::new(""));
        let udn = Udn::random();
        let local = LocalDevice::builder(udn.clone(), DeviceType::uda("BinaryLight", 1), DeviceDetails::default())
            .build()
            .unwrap();
        registry.add_local_device(local).unwrap();
        assert!(matches!(
            registry.add_device(remote_device(&udn), None),
            Err(RegistrationError::LocalDeviceConflict(_))
        ));
    }

    #[test]
    fn test_resource_equality_is_by_path_and_query() {
        let device = LocalDevice::builder(Udn::random(), DeviceType::uda("X", 1), DeviceDetails::default())
            .build()
            .unwrap();
        let a = Resource::new("/a", ResourceKind::DeviceDescriptor(device.clone()));
        let b = Resource::new("/a", ResourceKind::DeviceDescriptor(device.clone()));
        let c = Resource::new("/a", ResourceKind::DeviceDescriptor(device)).with_query("x=1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(c.matches("/a", Some("x=1")));
        assert!(!c.matches("/a", None));
    }
}
