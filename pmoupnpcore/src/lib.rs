//! # PMOUPnPCore - moteur de protocole UPnP
//!
//! Pile UPnP Device Architecture 1.0 côté périphérique et côté point de
//! contrôle :
//!
//! - modèle des périphériques, services, actions et variables d'état
//!   ([`devices`], [`services`], [`actions`], [`state_variables`],
//!   [`variable_types`]) ;
//! - contrôle SOAP ([`soap`], [`message::action`]) ;
//! - événements GENA, abonnés et abonnements ([`gena`]) ;
//! - découverte SSDP et descriptions ([`protocol::discovery`],
//!   [`descriptor`]) ;
//! - registre des périphériques locaux et distants ([`registry`]) ;
//! - couche réseau HTTP et UDP ([`transport`]).
//!
//! [`UpnpService`] assemble le tout à partir d'une
//! [`pmoconfig::Config`] ; [`ControlPoint`] est l'entrée des appelants.

pub mod actions;
pub mod config_ext;
pub mod control_point;
pub mod descriptor;
pub mod devices;
pub mod gena;
pub mod logging;
pub mod message;
pub mod namespace;
pub mod protocol;
pub mod registry;
pub mod services;
pub mod soap;
pub mod state_variables;
pub mod transport;
pub mod types;
pub mod upnp_service;
pub mod value_ranges;
pub mod variable_types;

pub use crate::config_ext::{UpnpConfigExt, UpnpSettings};
pub use crate::control_point::{ActionCallback, ControlPoint};
pub use crate::logging::init_logging;
pub use crate::registry::{Registry, RegistryListener};
pub use crate::types::{DeviceType, ServiceId, ServiceReference, ServiceType, Sid, Udn};
pub use crate::upnp_service::UpnpService;
