//! # Variables d'état
//!
//! Une [`StateVariable`] décrit une variable d'un service : nom, type UPnP,
//! valeur par défaut, contraintes (liste de valeurs autorisées ou plage) et
//! paramètres d'événementiel. Elle est immuable une fois le service construit.
//!
//! Une [`StateVariableValue`] associe une variable à une valeur dont le type
//! et les contraintes ont été vérifiés à la construction.

mod value_methods;
mod variable_methods;

use std::sync::Arc;
use std::time::Duration;

use crate::{
    value_ranges::ValueRange,
    variable_types::{StateValue, StateVarType},
};

/// Paramètres d'événementiel GENA d'une variable.
///
/// `max_rate` limite la fréquence des notifications, `min_delta` ignore les
/// variations numériques trop faibles. Les deux sont facultatifs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventDetails {
    pub send_events: bool,
    pub max_rate: Option<Duration>,
    pub min_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    name: String,
    datatype: StateVarType,
    default_value: Option<StateValue>,
    allowed_values: Vec<String>,
    range: Option<ValueRange>,
    events: EventDetails,
}

/// Valeur validée d'une variable d'état.
#[derive(Debug, Clone)]
pub struct StateVariableValue {
    variable: Arc<StateVariable>,
    value: StateValue,
}
