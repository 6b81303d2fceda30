//! # Transport
//!
//! Couche réseau de la pile, derrière trois coutures :
//!
//! - [`StreamClient`] : requêtes HTTP sortantes (`reqwest`) ;
//! - [`StreamHandler`] : requêtes HTTP entrantes, servies par `axum` ;
//! - [`DatagramHandler`] / [`DatagramSender`] : datagrammes SSDP sur UDP
//!   multicast (`socket2`).
//!
//! Le [`Router`] assemble ces éléments et borne le traitement concurrent
//! des messages entrants avec un [`WorkerPool`].

mod client;
mod errors;
pub mod multicast;
mod pool;
mod router;
pub mod server;

pub use client::{ReqwestStreamClient, StreamClient};
pub use errors::{RouterError, StreamClientError};
pub use multicast::UdpDatagramSender;
pub use pool::WorkerPool;
pub use router::{BoundRouter, Router};

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::{
    message::{StreamRequestMessage, StreamResponseMessage, ssdp::DatagramMessage},
    registry::DeferredTask,
};

/// Réponse à une requête entrante, et travail à lancer une fois la réponse
/// remise au transport.
pub struct StreamOutcome {
    pub response: StreamResponseMessage,
    pub after_response: Option<DeferredTask>,
}

impl StreamOutcome {
    pub fn new(response: StreamResponseMessage) -> Self {
        Self {
            response,
            after_response: None,
        }
    }

    pub fn then(mut self, task: DeferredTask) -> Self {
        self.after_response = Some(task);
        self
    }
}

#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle_stream(&self, request: StreamRequestMessage) -> StreamOutcome;
}

#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn handle_datagram(&self, datagram: DatagramMessage);
}

/// Émission d'un datagramme UDP (multicast ou unicast).
#[async_trait]
pub trait DatagramSender: Send + Sync {
    async fn send_datagram(&self, data: &[u8], to: SocketAddr) -> std::io::Result<()>;
}
