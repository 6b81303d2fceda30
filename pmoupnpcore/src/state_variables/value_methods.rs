use std::fmt;
use std::sync::Arc;

use crate::{
    state_variables::{StateVariable, StateVariableValue},
    variable_types::{InvalidValueError, StateValue},
};

impl StateVariableValue {
    /// Associe une valeur à une variable.
    ///
    /// Échoue si le type ne correspond pas (les types numériques sont
    /// convertis lorsque la valeur tient dans le type cible), si la valeur
    /// sort de la plage déclarée ou n'est pas dans la liste autorisée.
    pub fn new(variable: Arc<StateVariable>, value: StateValue) -> Result<Self, InvalidValueError> {
        let value = variable.coerce(&value)?;
        Ok(Self { variable, value })
    }

    /// Construit la valeur depuis sa forme texte.
    pub fn from_text(variable: Arc<StateVariable>, text: &str) -> Result<Self, InvalidValueError> {
        let value = variable.parse_value(text)?;
        Ok(Self { variable, value })
    }

    pub fn variable(&self) -> &Arc<StateVariable> {
        &self.variable
    }

    pub fn name(&self) -> &str {
        self.variable.name()
    }

    pub fn value(&self) -> &StateValue {
        &self.value
    }

    pub fn into_value(self) -> StateValue {
        self.value
    }
}

impl fmt::Display for StateVariableValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for StateVariableValue {
    fn eq(&self, other: &Self) -> bool {
        self.variable.name() == other.variable.name() && self.value == other.value
    }
}
