use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    actions::{Action, ActionError},
    variable_types::StateValue,
};

/// Valeurs d'arguments indexées par nom.
pub type ArgumentValues = HashMap<String, StateValue>;

/// Invocation d'une action : entrées, sorties et échec éventuel.
///
/// L'invocation passe par les états construite, envoyée puis réussie
/// (`outputs` rempli) ou échouée (`failure` renseigné).
#[derive(Debug, Clone)]
pub struct ActionInvocation {
    action: Arc<Action>,
    inputs: ArgumentValues,
    outputs: ArgumentValues,
    failure: Option<ActionError>,
    user_agent: Option<String>,
}

impl ActionInvocation {
    pub fn new(action: Arc<Action>) -> Self {
        Self {
            action,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            failure: None,
            user_agent: None,
        }
    }

    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Renseigne une entrée ; la valeur est convertie dans le type de
    /// l'argument et ses contraintes sont vérifiées.
    pub fn set_input(&mut self, name: &str, value: impl Into<StateValue>) -> Result<(), ActionError> {
        let arg = self.action.input(name).ok_or_else(|| {
            ActionError::invalid_args(format!(
                "action '{}' has no input argument '{}'",
                self.action.name(),
                name
            ))
        })?;
        let value = arg.related_state_variable().coerce(&value.into())?;
        self.inputs.insert(name.to_string(), value);
        Ok(())
    }

    /// Renseigne une entrée à partir de sa forme texte.
    pub fn set_input_str(&mut self, name: &str, text: &str) -> Result<(), ActionError> {
        let arg = self.action.input(name).ok_or_else(|| {
            ActionError::invalid_args(format!(
                "action '{}' has no input argument '{}'",
                self.action.name(),
                name
            ))
        })?;
        let value = arg.parse_value(text)?;
        self.inputs.insert(name.to_string(), value);
        Ok(())
    }

    pub fn with_input(mut self, name: &str, value: impl Into<StateValue>) -> Result<Self, ActionError> {
        self.set_input(name, value)?;
        Ok(self)
    }

    pub fn input(&self, name: &str) -> Option<&StateValue> {
        self.inputs.get(name)
    }

    pub fn inputs(&self) -> &ArgumentValues {
        &self.inputs
    }

    /// Chaque entrée doit avoir une valeur, ou une valeur par défaut
    /// déclarée sur sa variable.
    pub fn check_inputs(&self) -> Result<(), ActionError> {
        match self.action.inputs().find(|arg| {
            !self.inputs.contains_key(arg.name()) && arg.related_state_variable().default_value().is_none()
        }) {
            Some(arg) => Err(ActionError::argument_value_invalid(format!(
                "no value for input argument '{}' of action '{}'",
                arg.name(),
                self.action.name()
            ))),
            None => Ok(()),
        }
    }

    /// Entrées dans l'ordre de déclaration, avec le texte à écrire.
    ///
    /// Une entrée absente est écrite avec la valeur par défaut de sa
    /// variable, ou vide.
    pub fn ordered_inputs(&self) -> Vec<(String, String)> {
        self.action
            .inputs()
            .map(|arg| {
                let text = self
                    .inputs
                    .get(arg.name())
                    .or(arg.related_state_variable().default_value())
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                (arg.name().to_string(), text)
            })
            .collect()
    }

    pub fn set_outputs(&mut self, outputs: ArgumentValues) {
        self.outputs = outputs;
    }

    pub fn output(&self, name: &str) -> Option<&StateValue> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> &ArgumentValues {
        &self.outputs
    }

    /// Sorties dans l'ordre de déclaration
    pub fn ordered_outputs(&self) -> Vec<(String, String)> {
        self.action
            .outputs()
            .filter_map(|arg| {
                self.outputs
                    .get(arg.name())
                    .map(|v| (arg.name().to_string(), v.to_string()))
            })
            .collect()
    }

    pub fn set_failure(&mut self, failure: ActionError) {
        self.failure = Some(failure);
    }

    pub fn failure(&self) -> Option<&ActionError> {
        self.failure.as_ref()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn set_user_agent(&mut self, user_agent: Option<String>) {
        self.user_agent = user_agent;
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::Argument,
        state_variables::StateVariable,
        value_ranges::ValueRange,
        variable_types::StateVarType,
    };

    fn set_volume() -> Arc<Action> {
        let id = Arc::new(StateVariable::new("A_ARG_TYPE_InstanceID", StateVarType::UI4));
        let vol = Arc::new(
            StateVariable::new("Volume", StateVarType::UI2)
                .with_range(ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap()),
        );
        Arc::new(
            Action::new("SetVolume")
                .with_argument(Argument::input("InstanceID", id))
                .with_argument(Argument::input("DesiredVolume", vol)),
        )
    }

    #[test]
    fn test_inputs_are_ordered_by_declaration() {
        let mut inv = ActionInvocation::new(set_volume());
        inv.set_input("DesiredVolume", 30u16).unwrap();
        inv.set_input("InstanceID", 0u32).unwrap();
        let names: Vec<_> = inv.ordered_inputs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["InstanceID", "DesiredVolume"]);
    }

    #[test]
    fn test_input_validation() {
        let mut inv = ActionInvocation::new(set_volume());
        let err = inv.set_input("DesiredVolume", 300u16).unwrap_err();
        assert_eq!(err.code, crate::actions::ErrorCode::ArgumentValueOutOfRange);
        assert!(inv.set_input("Nope", 1u16).is_err());
        assert!(inv.set_input_str("InstanceID", "abc").is_err());
    }

    #[test]
    fn test_missing_input_without_default() {
        let mut inv = ActionInvocation::new(set_volume());
        inv.set_input("InstanceID", 0u32).unwrap();
        let err = inv.check_inputs().unwrap_err();
        assert_eq!(err.code, crate::actions::ErrorCode::ArgumentValueInvalid);
        assert!(err.description.contains("DesiredVolume"));

        inv.set_input("DesiredVolume", 10u16).unwrap();
        assert!(inv.check_inputs().is_ok());
    }

    #[test]
    fn test_missing_input_uses_default() {
        let speed = Arc::new(
            StateVariable::new("TransportPlaySpeed", StateVarType::String).with_default(StateValue::String("1".into())),
        );
        let play = Arc::new(Action::new("Play").with_argument(Argument::input("Speed", speed)));
        let inv = ActionInvocation::new(play);
        assert!(inv.check_inputs().is_ok());
        assert_eq!(inv.ordered_inputs(), vec![("Speed".to_string(), "1".to_string())]);
    }
}
