//! # Périphériques UPnP
//!
//! Un périphérique est un arbre : une identité (UDN, type), des
//! informations descriptives, des services et des sous-périphériques. La
//! structure est générique sur la variante de service :
//! [`LocalDevice`] pour les périphériques hébergés, [`RemoteDevice`] pour
//! ceux découverts sur le réseau.

mod details;
mod device;
mod errors;

pub use details::DeviceDetails;
pub use device::{Device, DeviceBuilder, DeviceHandle, DeviceInfo, LocalDevice, RemoteDevice};
pub use errors::DeviceError;
