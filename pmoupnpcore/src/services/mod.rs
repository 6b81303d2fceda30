//! # Services UPnP
//!
//! Un [`Service`] est la description immuable d'un service : son type, son
//! identifiant, ses actions et ses variables d'état. Il est partagé par les
//! deux variantes :
//!
//! - [`LocalService`] : service hébergé, adossé à un [`ServiceManager`] qui
//!   exécute les commandes sur l'implémentation ([`ServiceCommandTarget`]),
//!   et à un [`LocalEventPublisher`](crate::gena::LocalEventPublisher) pour
//!   ses abonnés.
//! - [`RemoteService`] : service découvert, joint par ses URL de contrôle et
//!   d'événements.
//!
//! Le lien vers le périphérique propriétaire est un index (son [`Udn`]),
//! installé une seule fois lors de la construction du périphérique.
//!
//! ```
//! use std::sync::Arc;
//! use pmoupnpcore::actions::{Action, Argument};
//! use pmoupnpcore::services::Service;
//! use pmoupnpcore::state_variables::StateVariable;
//! use pmoupnpcore::types::{ServiceId, ServiceType};
//! use pmoupnpcore::variable_types::StateVarType;
//!
//! let volume = Arc::new(StateVariable::new("Volume", StateVarType::UI2).with_events(true));
//! let get_volume = Action::new("GetVolume")
//!     .with_argument(Argument::output("CurrentVolume", volume.clone()));
//! let service = Service::new(
//!     ServiceType::uda("RenderingControl", 1),
//!     ServiceId::uda("RenderingControl"),
//!     vec![volume],
//!     vec![get_volume],
//! )
//! .unwrap();
//! assert!(service.action("GetVolume").is_some());
//! ```

mod errors;
mod local;
mod manager;
mod remote;

pub use errors::ServiceError;
pub use local::LocalService;
pub use manager::{Command, CommandOutput, ServiceCommandTarget, ServiceManager};
pub use remote::RemoteService;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    actions::Action,
    state_variables::StateVariable,
    types::{ServiceId, ServiceReference, ServiceType, Udn},
};

/// Description immuable d'un service.
#[derive(Debug, Clone)]
pub struct Service {
    service_type: ServiceType,
    service_id: ServiceId,
    state_variables: Vec<Arc<StateVariable>>,
    actions: Vec<Arc<Action>>,
}

impl Service {
    /// Construit et valide un service.
    ///
    /// Les noms d'actions et de variables doivent être uniques, chaque
    /// variable doit être cohérente avec ses contraintes, et chaque argument
    /// doit référencer une variable du service.
    pub fn new(
        service_type: ServiceType,
        service_id: ServiceId,
        state_variables: Vec<Arc<StateVariable>>,
        actions: Vec<Action>,
    ) -> Result<Self, ServiceError> {
        let mut names = HashSet::new();
        for variable in &state_variables {
            if !names.insert(variable.name()) {
                return Err(ServiceError::DuplicateVariable(variable.name().to_string()));
            }
            variable
                .validate()
                .map_err(|source| ServiceError::InvalidVariable {
                    name: variable.name().to_string(),
                    source,
                })?;
        }

        let mut action_names = HashSet::new();
        for action in &actions {
            if !action_names.insert(action.name()) {
                return Err(ServiceError::DuplicateAction(action.name().to_string()));
            }
            action.validate()?;
            for argument in action.arguments() {
                let related = argument.related_state_variable();
                let declared = state_variables
                    .iter()
                    .find(|v| v.name() == related.name());
                if declared.is_none_or(|v| v.datatype() != related.datatype()) {
                    return Err(ServiceError::UnknownVariable {
                        action: action.name().to_string(),
                        argument: argument.name().to_string(),
                        variable: related.name().to_string(),
                    });
                }
            }
        }

        Ok(Self {
            service_type,
            service_id,
            state_variables,
            actions: actions.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Arc<Action>> {
        self.actions.iter().find(|a| a.name() == name)
    }

    pub fn state_variables(&self) -> &[Arc<StateVariable>] {
        &self.state_variables
    }

    pub fn state_variable(&self, name: &str) -> Option<&Arc<StateVariable>> {
        self.state_variables.iter().find(|v| v.name() == name)
    }

    pub fn evented_variables(&self) -> impl Iterator<Item = &Arc<StateVariable>> {
        self.state_variables.iter().filter(|v| v.send_events())
    }

    pub fn has_evented_variables(&self) -> bool {
        self.evented_variables().next().is_some()
    }
}

/// Service d'un périphérique, quelle que soit sa variante.
pub trait DeviceService: Send + Sync {
    fn service(&self) -> &Arc<Service>;

    /// UDN du périphérique propriétaire, une fois rattaché
    fn device_udn(&self) -> Option<&Udn>;

    /// Installe le lien vers le périphérique propriétaire
    fn bind_device(&self, udn: &Udn) -> Result<(), ServiceError>;

    fn service_id(&self) -> &ServiceId {
        self.service().service_id()
    }

    fn service_type(&self) -> &ServiceType {
        self.service().service_type()
    }

    fn reference(&self) -> Option<ServiceReference> {
        self.device_udn()
            .map(|udn| ServiceReference::new(udn.clone(), self.service_id().clone()))
    }
}

/// Service local ou distant retourné par le registre.
#[derive(Debug, Clone)]
pub enum ServiceHandle {
    Local(Arc<LocalService>),
    Remote(Arc<RemoteService>),
}

impl ServiceHandle {
    pub fn service(&self) -> &Arc<Service> {
        match self {
            ServiceHandle::Local(s) => s.service(),
            ServiceHandle::Remote(s) => s.service(),
        }
    }

    pub fn reference(&self) -> Option<ServiceReference> {
        match self {
            ServiceHandle::Local(s) => s.reference(),
            ServiceHandle::Remote(s) => DeviceService::reference(s.as_ref()),
        }
    }

    pub fn as_local(&self) -> Option<&Arc<LocalService>> {
        match self {
            ServiceHandle::Local(s) => Some(s),
            ServiceHandle::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&Arc<RemoteService>> {
        match self {
            ServiceHandle::Remote(s) => Some(s),
            ServiceHandle::Local(_) => None,
        }
    }
}

/// Instantané sérialisable d'un service, pour l'introspection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceInfo {
    pub service_type: String,
    pub service_id: String,
    pub actions: Vec<String>,
    pub evented_variables: Vec<String>,
}

impl From<&Service> for ServiceInfo {
    fn from(service: &Service) -> Self {
        Self {
            service_type: service.service_type.to_string(),
            service_id: service.service_id.to_string(),
            actions: service.actions.iter().map(|a| a.name().to_string()).collect(),
            evented_variables: service
                .evented_variables()
                .map(|v| v.name().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Argument;
    use crate::variable_types::StateVarType;

    fn volume() -> Arc<StateVariable> {
        Arc::new(StateVariable::new("Volume", StateVarType::UI2).with_events(true))
    }

    #[test]
    fn test_service_construction() {
        let volume = volume();
        let service = Service::new(
            ServiceType::uda("RenderingControl", 1),
            ServiceId::uda("RenderingControl"),
            vec![volume.clone()],
            vec![Action::new("GetVolume").with_argument(Argument::output("CurrentVolume", volume))],
        )
        .unwrap();
        assert_eq!(service.actions().len(), 1);
        assert!(service.state_variable("Volume").is_some());
        assert!(service.has_evented_variables());

        let info = ServiceInfo::from(&service);
        assert_eq!(info.evented_variables, vec!["Volume"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Service::new(
            ServiceType::uda("X", 1),
            ServiceId::uda("X"),
            vec![volume(), volume()],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateVariable(name) if name == "Volume"));

        let err = Service::new(
            ServiceType::uda("X", 1),
            ServiceId::uda("X"),
            vec![],
            vec![Action::new("Play"), Action::new("Play")],
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateAction(_)));
    }

    #[test]
    fn test_argument_must_reference_service_variable() {
        let foreign = Arc::new(StateVariable::new("Mute", StateVarType::Boolean));
        let err = Service::new(
            ServiceType::uda("X", 1),
            ServiceId::uda("X"),
            vec![volume()],
            vec![Action::new("GetMute").with_argument(Argument::output("CurrentMute", foreign))],
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownVariable { variable, .. } if variable == "Mute"));
    }
}
