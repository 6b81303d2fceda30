use thiserror::Error;

use crate::variable_types::StateVarType;

/// Valeur non conforme à un type UPnP ou aux contraintes d'une variable d'état.
///
/// Levée à la frontière où une valeur passe de sa forme texte (XML, en-tête)
/// à sa forme typée. Lorsqu'elle survient pendant le traitement d'une requête
/// de contrôle, elle est convertie en `ActionError(ARGUMENT_VALUE_INVALID)`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidValueError {
    #[error("invalid {datatype} value '{value}': {reason}")]
    Malformed {
        datatype: StateVarType,
        value: String,
        reason: String,
    },

    #[error("state variable '{variable}' expects {expected}, got {actual}")]
    TypeMismatch {
        variable: String,
        expected: StateVarType,
        actual: StateVarType,
    },

    #[error("value {value} of state variable '{variable}' is outside range [{minimum}, {maximum}]")]
    OutOfRange {
        variable: String,
        value: String,
        minimum: String,
        maximum: String,
    },

    #[error("value '{value}' is not in the allowed value list of state variable '{variable}'")]
    NotAllowed { variable: String, value: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },
}

impl InvalidValueError {
    pub(crate) fn malformed(datatype: StateVarType, value: &str, reason: impl ToString) -> Self {
        InvalidValueError::Malformed {
            datatype,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn identifier(value: &str, reason: impl ToString) -> Self {
        InvalidValueError::InvalidIdentifier {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
