use thiserror::Error;

use crate::types::Udn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("device {0} is already registered")]
    DeviceAlreadyRegistered(Udn),

    #[error("device {0} is registered as a local device")]
    LocalDeviceConflict(Udn),

    #[error("resource path {0} is already in use")]
    ResourceConflict(String),
}
