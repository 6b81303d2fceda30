use thiserror::Error;

use crate::{transport::StreamClientError, types::Sid};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscriptionError {
    #[error("subscription request rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("missing or invalid {0} header in GENA response")]
    InvalidResponse(&'static str),

    #[error(transparent)]
    Transport(#[from] StreamClientError),

    #[error("unknown subscription {0}")]
    UnknownSubscription(Sid),

    #[error("service has no evented state variable")]
    NotEvented,

    #[error("subscription has already ended")]
    Ended,

    #[error("no callback URL available: {0}")]
    NoCallback(String),
}
