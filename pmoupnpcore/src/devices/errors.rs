//! Erreurs relatives aux périphériques UPnP.

use thiserror::Error;

use crate::{services::ServiceError, types::Udn};

/// Erreurs de construction d'un périphérique.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Service déjà présent dans le périphérique
    #[error("Service '{0}' already exists in device")]
    ServiceAlreadyExists(String),

    /// UDN présent deux fois dans l'arbre
    #[error("Device '{0}' already exists")]
    DeviceAlreadyExists(Udn),

    /// Le service ne peut pas être rattaché au périphérique
    #[error("Cannot bind service: {0}")]
    Binding(#[from] ServiceError),
}
