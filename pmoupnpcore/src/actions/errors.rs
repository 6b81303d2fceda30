use std::fmt;

use thiserror::Error;

use crate::variable_types::InvalidValueError;

/// Codes d'erreur de contrôle UPnP (UDA 1.0, §3.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidAction,
    InvalidArgs,
    InvalidSequenceNumber,
    InvalidVariable,
    ActionFailed,
    ArgumentValueInvalid,
    ArgumentValueOutOfRange,
    OptionalActionNotImplemented,
    OutOfMemory,
    HumanInterventionRequired,
    StringArgumentTooLong,
    /// Code propre à un service ou à un fabricant
    Other(u32),
}

impl ErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::InvalidAction => 401,
            ErrorCode::InvalidArgs => 402,
            ErrorCode::InvalidSequenceNumber => 403,
            ErrorCode::InvalidVariable => 404,
            ErrorCode::ActionFailed => 501,
            ErrorCode::ArgumentValueInvalid => 600,
            ErrorCode::ArgumentValueOutOfRange => 601,
            ErrorCode::OptionalActionNotImplemented => 602,
            ErrorCode::OutOfMemory => 603,
            ErrorCode::HumanInterventionRequired => 604,
            ErrorCode::StringArgumentTooLong => 605,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            401 => ErrorCode::InvalidAction,
            402 => ErrorCode::InvalidArgs,
            403 => ErrorCode::InvalidSequenceNumber,
            404 => ErrorCode::InvalidVariable,
            501 => ErrorCode::ActionFailed,
            600 => ErrorCode::ArgumentValueInvalid,
            601 => ErrorCode::ArgumentValueOutOfRange,
            602 => ErrorCode::OptionalActionNotImplemented,
            603 => ErrorCode::OutOfMemory,
            604 => ErrorCode::HumanInterventionRequired,
            605 => ErrorCode::StringArgumentTooLong,
            other => ErrorCode::Other(other),
        }
    }

    /// Description standard du code
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAction => "Invalid Action",
            ErrorCode::InvalidArgs => "Invalid Args",
            ErrorCode::InvalidSequenceNumber => "Invalid Sequence Number",
            ErrorCode::InvalidVariable => "Invalid Var",
            ErrorCode::ActionFailed => "Action Failed",
            ErrorCode::ArgumentValueInvalid => "Argument Value Invalid",
            ErrorCode::ArgumentValueOutOfRange => "Argument Value Out of Range",
            ErrorCode::OptionalActionNotImplemented => "Optional Action Not Implemented",
            ErrorCode::OutOfMemory => "Out of Memory",
            ErrorCode::HumanInterventionRequired => "Human Intervention Required",
            ErrorCode::StringArgumentTooLong => "String Argument Too Long",
            ErrorCode::Other(_) => "Vendor Error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Échec d'une invocation d'action, porteur d'un code UPnP.
///
/// C'est la seule forme d'erreur remontée aux appelants d'une action,
/// qu'elle soit locale ou distante.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("UPnP error {code}: {description}")]
pub struct ActionError {
    pub code: ErrorCode,
    pub description: String,
}

impl ActionError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn invalid_action(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAction, description)
    }

    pub fn invalid_args(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgs, description)
    }

    pub fn action_failed(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::ActionFailed, description)
    }

    pub fn argument_value_invalid(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::ArgumentValueInvalid, description)
    }

    /// Convertit l'erreur d'une implémentation de service.
    ///
    /// Une `ActionError` est conservée telle quelle, une `InvalidValueError`
    /// devient `ARGUMENT_VALUE_INVALID`, tout le reste `ACTION_FAILED`.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<ActionError>() {
            Ok(action_error) => action_error,
            Err(err) => match err.downcast::<InvalidValueError>() {
                Ok(invalid) => invalid.into(),
                Err(other) => ActionError::action_failed(format!("{:#}", other)),
            },
        }
    }
}

impl From<InvalidValueError> for ActionError {
    fn from(err: InvalidValueError) -> Self {
        let code = match err {
            InvalidValueError::OutOfRange { .. } => ErrorCode::ArgumentValueOutOfRange,
            _ => ErrorCode::ArgumentValueInvalid,
        };
        ActionError::new(code, err.to_string())
    }
}
