use thiserror::Error;

/// Échec d'un échange HTTP sortant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamClientError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

/// La couche réseau ne peut pas être démarrée ou utilisée.
///
/// Fatale pour le sous-système concerné, jamais réessayée en interne.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("cannot bind HTTP server on {address}: {source}")]
    HttpBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot set up SSDP multicast socket: {0}")]
    Multicast(#[source] std::io::Error),

    #[error("no usable network interface: {0}")]
    NoInterface(String),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] StreamClientError),

    #[error("router is not running")]
    NotRunning,
}
