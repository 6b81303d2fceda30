use thiserror::Error;

use crate::{devices::DeviceError, services::ServiceError, variable_types::InvalidValueError};

/// Erreurs de lecture ou d'écriture des documents de description.
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("XML parse error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    Write(#[from] xmltree::Error),

    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("Missing element <{0}>")]
    MissingElement(&'static str),

    #[error("Invalid <{element}>: {source}")]
    InvalidValue {
        element: &'static str,
        #[source]
        source: InvalidValueError,
    },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Cannot retrieve {url}: {reason}")]
    Retrieval { url: String, reason: String },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
