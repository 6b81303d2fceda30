//! Service découvert sur le réseau.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use url::Url;

use crate::{
    services::{DeviceService, Service, ServiceError},
    types::Udn,
};

/// Service distant et ses URL absolues.
#[derive(Debug)]
pub struct RemoteService {
    service: Arc<Service>,
    descriptor_url: Url,
    control_url: Url,
    event_url: Url,
    device_udn: OnceCell<Udn>,
}

impl RemoteService {
    pub fn new(service: Service, descriptor_url: Url, control_url: Url, event_url: Url) -> Self {
        Self {
            service: Arc::new(service),
            descriptor_url,
            control_url,
            event_url,
            device_udn: OnceCell::new(),
        }
    }

    /// URL du SCPD
    pub fn descriptor_url(&self) -> &Url {
        &self.descriptor_url
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }

    pub fn event_url(&self) -> &Url {
        &self.event_url
    }
}

impl DeviceService for RemoteService {
    fn service(&self) -> &Arc<Service> {
        &self.service
    }

    fn device_udn(&self) -> Option<&Udn> {
        self.device_udn.get()
    }

    fn bind_device(&self, udn: &Udn) -> Result<(), ServiceError> {
        match self.device_udn.get() {
            Some(bound) if bound != udn => Err(ServiceError::AlreadyBound(bound.clone())),
            Some(_) => Ok(()),
            None => {
                let _ = self.device_udn.set(udn.clone());
                Ok(())
            }
        }
    }
}
