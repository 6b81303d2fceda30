use std::sync::Arc;

use crate::{
    devices::{LocalDevice, RemoteDevice},
    registry::Registry,
};

/// Observateur du registre.
///
/// Les notifications partent après libération du verrou du registre : un
/// observateur peut relire le registre, il n'y voit jamais un périphérique
/// retiré.
pub trait RegistryListener: Send + Sync {
    fn remote_device_added(&self, _registry: &Registry, _device: &Arc<RemoteDevice>) {}

    /// Annonce reçue pour un périphérique déjà connu
    fn remote_device_updated(&self, _registry: &Registry, _device: &Arc<RemoteDevice>) {}

    fn remote_device_removed(&self, _registry: &Registry, _device: &Arc<RemoteDevice>) {}

    fn local_device_added(&self, _registry: &Registry, _device: &Arc<LocalDevice>) {}

    fn local_device_removed(&self, _registry: &Registry, _device: &Arc<LocalDevice>) {}

    fn before_shutdown(&self, _registry: &Registry) {}
}
