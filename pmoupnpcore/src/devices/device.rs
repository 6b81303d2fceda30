use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::{
    devices::{DeviceDetails, DeviceError},
    services::{DeviceService, LocalService, RemoteService, ServiceInfo},
    types::{DeviceType, ServiceId, ServiceType, Udn},
};

/// Nœud de l'arbre des périphériques.
///
/// Les services et sous-périphériques sont figés à la construction
/// ([`DeviceBuilder::build`]). L'identité d'un périphérique est son UDN.
pub struct Device<S: DeviceService> {
    udn: Udn,
    device_type: DeviceType,
    details: DeviceDetails,
    services: Vec<Arc<S>>,
    embedded: Vec<Arc<Device<S>>>,
    location: Option<Url>,
}

/// Périphérique hébergé localement
pub type LocalDevice = Device<LocalService>;

/// Périphérique découvert sur le réseau
pub type RemoteDevice = Device<RemoteService>;

impl<S: DeviceService> fmt::Debug for Device<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device")
            .field("udn", &self.udn)
            .field("device_type", &self.device_type)
            .field("friendly_name", &self.details.friendly_name)
            .field("services", &self.services.len())
            .field("embedded", &self.embedded)
            .finish()
    }
}

impl<S: DeviceService> PartialEq for Device<S> {
    fn eq(&self, other: &Self) -> bool {
        self.udn == other.udn
    }
}

impl<S: DeviceService> Device<S> {
    pub fn builder(udn: Udn, device_type: DeviceType, details: DeviceDetails) -> DeviceBuilder<S> {
        DeviceBuilder {
            udn,
            device_type,
            details,
            services: Vec::new(),
            embedded: Vec::new(),
            location: None,
        }
    }

    pub fn udn(&self) -> &Udn {
        &self.udn
    }

    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    pub fn services(&self) -> &[Arc<S>] {
        &self.services
    }

    pub fn embedded_devices(&self) -> &[Arc<Device<S>>] {
        &self.embedded
    }

    /// URL de la description (périphériques distants racine)
    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    /// Ce périphérique puis tous ses descendants, en profondeur
    pub fn all_devices(self: &Arc<Self>) -> Vec<Arc<Device<S>>> {
        let mut out = vec![self.clone()];
        for child in &self.embedded {
            out.extend(child.all_devices());
        }
        out
    }

    /// Tous les services de l'arbre
    pub fn all_services(self: &Arc<Self>) -> Vec<Arc<S>> {
        self.all_devices()
            .iter()
            .flat_map(|d| d.services.iter().cloned())
            .collect()
    }

    pub fn find_device(self: &Arc<Self>, udn: &Udn) -> Option<Arc<Device<S>>> {
        self.all_devices().into_iter().find(|d| &d.udn == udn)
    }

    /// Service d'identifiant `service_id` porté par ce nœud
    pub fn service(&self, service_id: &ServiceId) -> Option<&Arc<S>> {
        self.services.iter().find(|s| s.service_id() == service_id)
    }

    /// Périphériques de l'arbre implémentant le type demandé
    pub fn find_devices_by_type(self: &Arc<Self>, requested: &DeviceType) -> Vec<Arc<Device<S>>> {
        self.all_devices()
            .into_iter()
            .filter(|d| d.device_type.implements_version(requested))
            .collect()
    }

    /// Services de l'arbre implémentant le type demandé
    pub fn find_services_by_type(self: &Arc<Self>, requested: &ServiceType) -> Vec<Arc<S>> {
        self.all_services()
            .into_iter()
            .filter(|s| s.service_type().implements_version(requested))
            .collect()
    }

    /// Types de service distincts de l'arbre
    pub fn service_types(self: &Arc<Self>) -> Vec<ServiceType> {
        let mut seen = HashSet::new();
        self.all_services()
            .iter()
            .map(|s| s.service_type().clone())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            udn: self.udn.to_string(),
            device_type: self.device_type.to_string(),
            details: self.details.clone(),
            location: self.location.as_ref().map(Url::to_string),
            services: self
                .services
                .iter()
                .map(|s| ServiceInfo::from(s.service().as_ref()))
                .collect(),
            embedded: self.embedded.iter().map(|d| d.info()).collect(),
        }
    }
}

/// Construction d'un [`Device`].
pub struct DeviceBuilder<S: DeviceService> {
    udn: Udn,
    device_type: DeviceType,
    details: DeviceDetails,
    services: Vec<Arc<S>>,
    embedded: Vec<Arc<Device<S>>>,
    location: Option<Url>,
}

impl<S: DeviceService> DeviceBuilder<S> {
    pub fn service(mut self, service: S) -> Self {
        self.services.push(Arc::new(service));
        self
    }

    pub fn embedded(mut self, device: Arc<Device<S>>) -> Self {
        self.embedded.push(device);
        self
    }

    pub fn location(mut self, url: Url) -> Self {
        self.location = Some(url);
        self
    }

    /// Valide l'arbre et rattache les services à leur périphérique.
    ///
    /// Échoue si un UDN apparaît deux fois dans l'arbre ou si deux services
    /// d'un même nœud partagent un identifiant.
    pub fn build(self) -> Result<Arc<Device<S>>, DeviceError> {
        let mut ids = HashSet::new();
        for service in &self.services {
            if !ids.insert(service.service_id().clone()) {
                return Err(DeviceError::ServiceAlreadyExists(service.service_id().to_string()));
            }
        }

        let mut udns = HashSet::new();
        udns.insert(self.udn.clone());
        for child in &self.embedded {
            for device in child.all_devices() {
                if !udns.insert(device.udn.clone()) {
                    return Err(DeviceError::DeviceAlreadyExists(device.udn.clone()));
                }
            }
        }

        for service in &self.services {
            service.bind_device(&self.udn)?;
        }

        Ok(Arc::new(Device {
            udn: self.udn,
            device_type: self.device_type,
            details: self.details,
            services: self.services,
            embedded: self.embedded,
            location: self.location,
        }))
    }
}

/// Instantané sérialisable d'un périphérique.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceInfo {
    pub udn: String,
    pub device_type: String,
    pub details: DeviceDetails,
    pub location: Option<String>,
    pub services: Vec<ServiceInfo>,
    pub embedded: Vec<DeviceInfo>,
}

/// Périphérique local ou distant retourné par le registre.
#[derive(Debug, Clone)]
pub enum DeviceHandle {
    Local(Arc<LocalDevice>),
    Remote(Arc<RemoteDevice>),
}

impl DeviceHandle {
    pub fn udn(&self) -> &Udn {
        match self {
            DeviceHandle::Local(d) => d.udn(),
            DeviceHandle::Remote(d) => d.udn(),
        }
    }

    pub fn info(&self) -> DeviceInfo {
        match self {
            DeviceHandle::Local(d) => d.info(),
            DeviceHandle::Remote(d) => d.info(),
        }
    }
}
