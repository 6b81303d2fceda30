use std::net::SocketAddr;

use thiserror::Error;

/// Aucun protocole ne prend en charge le message reçu.
///
/// Distincte d'un échec de traitement : l'appelant répond 404/405/400
/// et ne réessaie pas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolCreationError {
    #[error("no protocol for {method} {path} (HTTP {status})")]
    UnroutableStream {
        method: String,
        path: String,
        status: u16,
    },

    #[error("no protocol for datagram '{start_line}' from {from}")]
    UnroutableDatagram { start_line: String, from: SocketAddr },
}

impl ProtocolCreationError {
    /// Statut HTTP à renvoyer pour un flux non routable
    pub fn status(&self) -> u16 {
        match self {
            ProtocolCreationError::UnroutableStream { status, .. } => *status,
            ProtocolCreationError::UnroutableDatagram { .. } => 400,
        }
    }
}
