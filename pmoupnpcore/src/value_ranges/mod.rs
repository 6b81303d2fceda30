//! Plages de valeurs autorisées (`<allowedValueRange>` d'un SCPD).

mod methods;

use crate::variable_types::StateValue;

/// Bornes inclusives `[min, max]` et pas optionnel d'une variable numérique.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    min: StateValue,
    max: StateValue,
    step: Option<StateValue>,
}
