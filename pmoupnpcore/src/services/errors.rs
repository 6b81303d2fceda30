use thiserror::Error;

use crate::{actions::ActionError, types::Udn, variable_types::InvalidValueError};

/// Erreurs de construction des services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Deux actions portent le même nom
    #[error("Action '{0}' already exists in service")]
    DuplicateAction(String),

    /// Deux variables d'état portent le même nom
    #[error("State variable '{0}' already exists in service")]
    DuplicateVariable(String),

    /// Un argument référence une variable absente du service
    #[error("Argument '{argument}' of action '{action}' refers to unknown state variable '{variable}'")]
    UnknownVariable {
        action: String,
        argument: String,
        variable: String,
    },

    #[error("Invalid action: {0}")]
    InvalidAction(#[from] ActionError),

    #[error("Invalid state variable '{name}': {source}")]
    InvalidVariable {
        name: String,
        #[source]
        source: InvalidValueError,
    },

    /// Le service est déjà rattaché à un autre périphérique
    #[error("Service is already bound to device {0}")]
    AlreadyBound(Udn),
}
