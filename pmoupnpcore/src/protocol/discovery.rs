//! Découverte SSDP : annonces des périphériques locaux, réponses aux
//! recherches, et suivi des annonces des périphériques distants.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
    devices::LocalDevice,
    message::{
        headers::UsnHeader,
        ssdp::{ROOT_DEVICE, ST_ALL, SsdpMessage},
    },
    protocol::{ProtocolContext, sending},
    services::DeviceService,
    transport::multicast::ssdp_group,
    types::{DeviceType, ServiceType, Udn},
};

/// Couples (NT, USN) annoncés pour un périphérique racine et son arbre :
///
/// - `upnp:rootdevice` pour la racine ;
/// - `uuid:<udn>` et le type de chaque périphérique ;
/// - chaque type de service, une fois par périphérique.
pub fn notification_targets(device: &Arc<LocalDevice>) -> Vec<(String, UsnHeader)> {
    let usn = |udn: &Udn, suffix: Option<String>| UsnHeader {
        udn: udn.clone(),
        suffix,
    };

    let mut targets = vec![(ROOT_DEVICE.to_string(), usn(device.udn(), Some(ROOT_DEVICE.to_string())))];
    for node in device.all_devices() {
        targets.push((node.udn().to_string(), usn(node.udn(), None)));
        let device_type = node.device_type().to_string();
        targets.push((device_type.clone(), usn(node.udn(), Some(device_type))));

        let mut seen = HashSet::new();
        for service in node.services() {
            let service_type = service.service_type().to_string();
            if seen.insert(service_type.clone()) {
                targets.push((service_type.clone(), usn(node.udn(), Some(service_type))));
            }
        }
    }
    targets
}

fn location_of(ctx: &ProtocolContext, device: &LocalDevice) -> Option<Url> {
    ctx.local_url(&ctx.registry().namespace().device_descriptor_path(device.udn()))
}

async fn multicast(ctx: &ProtocolContext, message: &SsdpMessage) {
    let text = message.to_datagram();
    if let Err(e) = ctx.datagrams().send_datagram(text.as_bytes(), ssdp_group()).await {
        warn!("❌ Failed to send SSDP datagram: {}", e);
    }
}

/// `ssdp:alive` pour toutes les cibles d'un périphérique local.
pub async fn announce_alive(ctx: &ProtocolContext, device: &Arc<LocalDevice>) {
    let Some(location) = location_of(ctx, device) else {
        warn!(udn = %device.udn(), "❌ Cannot build descriptor URL, device not announced");
        return;
    };
    let targets = notification_targets(device);
    let count = targets.len();
    for (nt, usn) in targets {
        let message = SsdpMessage::Alive {
            nt,
            usn,
            location: location.clone(),
            max_age: ctx.settings().max_age,
            server: Some(ctx.server_header().to_string()),
        };
        multicast(ctx, &message).await;
    }
    debug!(udn = %device.udn(), count, "📡 NOTIFY alive sent");
}

/// `ssdp:byebye` pour toutes les cibles d'un périphérique local.
pub async fn announce_byebye(ctx: &ProtocolContext, device: &Arc<LocalDevice>) {
    for (nt, usn) in notification_targets(device) {
        multicast(ctx, &SsdpMessage::ByeBye { nt, usn }).await;
    }
    info!(udn = %device.udn(), "👋 NOTIFY byebye sent");
}

/// Émet un M-SEARCH multicast.
pub async fn send_search(ctx: &ProtocolContext, st: &str, mx: u32) {
    let message = SsdpMessage::Search {
        st: st.to_string(),
        mx,
    };
    multicast(ctx, &message).await;
    debug!(st, mx, "📡 M-SEARCH sent");
}

/// Cibles locales répondant au critère de recherche `st`, avec le ST à
/// renvoyer pour chacune.
pub fn search_matches(devices: &[Arc<LocalDevice>], st: &str) -> Vec<(Arc<LocalDevice>, String, UsnHeader)> {
    let st = st.trim();
    let mut matches = Vec::new();

    for root in devices {
        if st == ST_ALL {
            for (nt, usn) in notification_targets(root) {
                matches.push((root.clone(), nt, usn));
            }
        } else if st == ROOT_DEVICE {
            matches.push((
                root.clone(),
                ROOT_DEVICE.to_string(),
                UsnHeader {
                    udn: root.udn().clone(),
                    suffix: Some(ROOT_DEVICE.to_string()),
                },
            ));
        } else if st.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("uuid:")) {
            let Ok(udn) = Udn::new(st) else { continue };
            if root.find_device(&udn).is_some() {
                matches.push((root.clone(), st.to_string(), UsnHeader { udn, suffix: None }));
            }
        } else if let Ok(requested) = st.parse::<DeviceType>() {
            for node in root.find_devices_by_type(&requested) {
                matches.push((
                    root.clone(),
                    st.to_string(),
                    UsnHeader {
                        udn: node.udn().clone(),
                        suffix: Some(st.to_string()),
                    },
                ));
            }
        } else if let Ok(requested) = st.parse::<ServiceType>() {
            for node in root.all_devices() {
                if node.services().iter().any(|s| s.service_type().implements_version(&requested)) {
                    matches.push((
                        root.clone(),
                        st.to_string(),
                        UsnHeader {
                            udn: node.udn().clone(),
                            suffix: Some(st.to_string()),
                        },
                    ));
                }
            }
        }
    }
    matches
}

/// Répond en unicast à un M-SEARCH.
///
/// Les réponses partent immédiatement, sans délai aléatoire dans MX.
pub async fn answer_search(ctx: &ProtocolContext, st: &str, mx: u32, from: SocketAddr) {
    let devices = ctx.registry().local_devices();
    let matches = search_matches(&devices, st);
    if matches.is_empty() {
        trace!(st, from = %from, "M-SEARCH without local match");
        return;
    }
    debug!(st, mx, from = %from, count = matches.len(), "📥 Answering M-SEARCH");

    for (root, st, usn) in matches {
        let Some(location) = location_of(ctx, &root) else {
            continue;
        };
        let message = SsdpMessage::SearchResponse {
            st,
            usn,
            location,
            max_age: ctx.settings().max_age,
            server: Some(ctx.server_header().to_string()),
        };
        if let Err(e) = ctx.datagrams().send_datagram(message.to_datagram().as_bytes(), from).await {
            warn!(to = %from, "❌ Failed to answer M-SEARCH: {}", e);
        }
    }
}

/// Libère la réservation de récupération d'un UDN, même si la tâche est
/// annulée.
struct RetrievalGuard<'a> {
    ctx: &'a ProtocolContext,
    udn: Udn,
}

impl Drop for RetrievalGuard<'_> {
    fn drop(&mut self) {
        self.ctx.end_retrieval(&self.udn);
    }
}

/// `ssdp:alive` ou réponse de recherche d'un périphérique distant.
///
/// Un UDN connu est rafraîchi ; un UDN inconnu déclenche la récupération
/// de sa description, une seule à la fois par UDN.
pub async fn handle_advertisement(ctx: &ProtocolContext, udn: Udn, location: Url, max_age: u32) {
    let registry = ctx.registry();
    if registry.local_device(&udn).is_some() {
        return;
    }
    let max_age = Some(Duration::from_secs(max_age as u64));
    if registry.refresh_device(&udn, max_age) {
        return;
    }
    if registry.remote_device(&udn).is_some() {
        // périphérique embarqué : la racine porte l'expiration
        return;
    }
    if !ctx.begin_retrieval(&udn) {
        trace!(udn = %udn, "Retrieval already in progress");
        return;
    }
    let _guard = RetrievalGuard { ctx, udn: udn.clone() };

    debug!(udn = %udn, location = %location, "📥 Retrieving remote device description");
    match sending::retrieve_remote_device(ctx, &location).await {
        Ok(device) => {
            if let Err(e) = registry.add_device(device, max_age) {
                warn!(udn = %udn, "❌ Cannot register remote device: {}", e);
            }
        }
        Err(e) => warn!(udn = %udn, location = %location, "❌ Cannot retrieve remote device: {}", e),
    }
}

/// `ssdp:byebye` : le périphérique quitte le réseau.
pub fn handle_byebye(ctx: &ProtocolContext, udn: &Udn) {
    if ctx.registry().remove_device(udn).is_some() {
        debug!(udn = %udn, "📥 Remote device said byebye");
    }
}
