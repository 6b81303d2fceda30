//! Sockets SSDP.
//!
//! Deux sockets distincts :
//!
//! - le socket *multicast* écoute `0.0.0.0:1900`, rejoint le groupe
//!   `239.255.255.250` sur chaque interface IPv4 et reçoit NOTIFY et
//!   M-SEARCH ;
//! - le socket *unicast* utilise un port éphémère, émet les annonces et
//!   les M-SEARCH, et reçoit les réponses HTTP/200 aux recherches.
//!
//! Un control point ne doit jamais recevoir les réponses de recherche sur
//! le port 1900 : avec `SO_REUSEADDR` le noyau répartirait les
//! datagrammes entre plusieurs sockets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::{
    message::ssdp::{DatagramMessage, SSDP_MULTICAST_ADDR, SSDP_PORT},
    transport::{DatagramHandler, DatagramSender, RouterError, WorkerPool},
};

/// Taille maximale d'un datagramme SSDP reçu
const MAX_DATAGRAM_SIZE: usize = 8192;

/// TTL multicast recommandé par UDA
const MULTICAST_TTL: u32 = 4;

/// Adresse du groupe SSDP
pub fn ssdp_group() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(SSDP_MULTICAST_ADDR), SSDP_PORT)
}

/// Adresses IPv4 non-loopback des interfaces de la machine
pub fn local_ipv4_addresses() -> Result<Vec<Ipv4Addr>, RouterError> {
    let interfaces = get_if_addrs::get_if_addrs().map_err(RouterError::Multicast)?;
    Ok(interfaces
        .into_iter()
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
            _ => None,
        })
        .collect())
}

/// Ouvre le socket d'écoute SSDP sur le port 1900.
pub fn open_ssdp_socket() -> Result<UdpSocket, RouterError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(RouterError::Multicast)?;
    socket.set_reuse_address(true).map_err(RouterError::Multicast)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true).map_err(RouterError::Multicast)?;

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), SSDP_PORT);
    socket.bind(&bind_addr.into()).map_err(RouterError::Multicast)?;
    socket.set_multicast_loop_v4(true).map_err(RouterError::Multicast)?;
    socket.set_nonblocking(true).map_err(RouterError::Multicast)?;

    let mut joined = 0;
    for ip in local_ipv4_addresses()? {
        match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &ip) {
            Ok(()) => {
                debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ip);
                joined += 1;
            }
            Err(e) => warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ip, e),
        }
    }
    if joined == 0 {
        // machine sans interface IPv4 routable : on tente l'interface par défaut
        socket
            .join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| RouterError::NoInterface(e.to_string()))?;
    }

    let socket = UdpSocket::from_std(socket.into()).map_err(RouterError::Multicast)?;
    info!(address = %bind_addr, "✅ SSDP multicast socket ready");
    Ok(socket)
}

/// Ouvre le socket unicast, sur un port éphémère.
pub fn open_unicast_socket() -> Result<UdpSocket, RouterError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(RouterError::Multicast)?;
    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    socket.bind(&bind_addr.into()).map_err(RouterError::Multicast)?;
    socket
        .set_multicast_ttl_v4(MULTICAST_TTL)
        .map_err(RouterError::Multicast)?;
    socket.set_multicast_loop_v4(true).map_err(RouterError::Multicast)?;
    socket.set_nonblocking(true).map_err(RouterError::Multicast)?;

    let socket = UdpSocket::from_std(socket.into()).map_err(RouterError::Multicast)?;
    if let Ok(addr) = socket.local_addr() {
        info!(address = %addr, "✅ SSDP unicast socket ready");
    }
    Ok(socket)
}

/// Émetteur de datagrammes adossé à un socket UDP partagé.
#[derive(Clone)]
pub struct UdpDatagramSender {
    socket: Arc<UdpSocket>,
}

impl UdpDatagramSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl DatagramSender for UdpDatagramSender {
    async fn send_datagram(&self, data: &[u8], to: SocketAddr) -> std::io::Result<()> {
        trace!(to = %to, size = data.len(), "📤 UDP datagram");
        self.socket.send_to(data, to).await.map(|_| ())
    }
}

/// Émetteur utilisé quand SSDP est désactivé : les datagrammes sont
/// abandonnés.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDatagramSender;

#[async_trait]
impl DatagramSender for DisabledDatagramSender {
    async fn send_datagram(&self, _data: &[u8], to: SocketAddr) -> std::io::Result<()> {
        trace!(to = %to, "SSDP disabled, datagram dropped");
        Ok(())
    }
}

/// Boucle de réception : chaque datagramme valide est confié au handler
/// dans une tâche du pool.
pub fn spawn_receiver(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn DatagramHandler>,
    pool: WorkerPool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    // ICMP port unreachable & co : on continue
                    debug!("SSDP receive error: {}", e);
                    continue;
                }
            };
            if pool.is_closed() {
                break;
            }
            let Some(datagram) = DatagramMessage::parse(&buf[..len], from)
                .filter(|dg| dg.is_notify() || dg.is_search() || dg.is_response())
            else {
                trace!(from = %from, "Ignoring malformed datagram");
                continue;
            };
            let handler = handler.clone();
            pool.spawn(async move {
                handler.handle_datagram(datagram).await;
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Collect(Mutex<Vec<DatagramMessage>>);

    #[async_trait]
    impl DatagramHandler for Collect {
        async fn handle_datagram(&self, datagram: DatagramMessage) {
            self.0.lock().push(datagram);
        }
    }

    #[tokio::test]
    async fn test_unicast_receiver_dispatches_datagrams() {
        let receiver = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let target = receiver.local_addr().unwrap();
        let handler = Arc::new(Collect(Mutex::new(Vec::new())));
        let task = spawn_receiver(receiver, handler.clone(), WorkerPool::new(2));

        let sender = UdpDatagramSender::new(Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()));
        sender
            .send_datagram(b"garbage", target)
            .await
            .unwrap();
        sender
            .send_datagram(
                b"M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: 1\r\nST: ssdp:all\r\n\r\n",
                target,
            )
            .await
            .unwrap();

        for _ in 0..50 {
            if !handler.0.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        task.abort();
        let received = handler.0.lock();
        assert_eq!(received.len(), 1);
        assert!(received[0].is_search());
    }

    #[tokio::test]
    async fn test_disabled_sender_drops_silently() {
        assert!(
            DisabledDatagramSender
                .send_datagram(b"x", ssdp_group())
                .await
                .is_ok()
        );
    }
}
