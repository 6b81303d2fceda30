//! # Actions UPnP
//!
//! Une [`Action`] est un descripteur sans état : un nom et une liste
//! ordonnée d'[`Argument`]s, chacun lié à une variable d'état qui porte son
//! type. L'ordre de déclaration est celui dans lequel les arguments sont
//! écrits sur le fil.
//!
//! Une invocation ([`ActionInvocation`]) est créée à chaque appel et porte
//! les valeurs d'entrée, les valeurs de sortie et l'éventuel échec.

mod errors;
mod invocation;

use std::sync::Arc;

use once_cell::sync::Lazy;
use xmltree::{Element, XMLNode};

use crate::{
    state_variables::StateVariable,
    variable_types::{InvalidValueError, StateValue, StateVarType},
};

pub use errors::{ActionError, ErrorCode};
pub use invocation::{ActionInvocation, ArgumentValues};

/// Nom de la pseudo-action de lecture de variable (UPnP 1.0)
pub const QUERY_STATE_VARIABLE: &str = "QueryStateVariable";

/// Argument d'entrée de `QueryStateVariable`
pub const QUERY_VAR_NAME_ARG: &str = "varName";

/// Argument de sortie de `QueryStateVariable`
pub const QUERY_RETURN_ARG: &str = "return";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentDirection {
    In,
    Out,
}

impl ArgumentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentDirection::In => "in",
            ArgumentDirection::Out => "out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    name: String,
    direction: ArgumentDirection,
    related_state_variable: Arc<StateVariable>,
    return_value: bool,
}

impl Argument {
    pub fn input(name: &str, related: Arc<StateVariable>) -> Self {
        Self {
            name: name.to_string(),
            direction: ArgumentDirection::In,
            related_state_variable: related,
            return_value: false,
        }
    }

    pub fn output(name: &str, related: Arc<StateVariable>) -> Self {
        Self {
            name: name.to_string(),
            direction: ArgumentDirection::Out,
            related_state_variable: related,
            return_value: false,
        }
    }

    /// Marque l'argument de sortie comme valeur de retour (`<retval/>`)
    pub fn as_return_value(mut self) -> Self {
        self.return_value = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> ArgumentDirection {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == ArgumentDirection::In
    }

    pub fn is_return_value(&self) -> bool {
        self.return_value
    }

    pub fn related_state_variable(&self) -> &Arc<StateVariable> {
        &self.related_state_variable
    }

    pub fn datatype(&self) -> StateVarType {
        self.related_state_variable.datatype()
    }

    /// Parse la valeur texte reçue pour cet argument.
    pub fn parse_value(&self, text: &str) -> Result<StateValue, InvalidValueError> {
        self.related_state_variable.parse_value(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    name: String,
    arguments: Vec<Argument>,
}

impl Action {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| !a.is_input())
    }

    pub fn input(&self, name: &str) -> Option<&Argument> {
        self.inputs().find(|a| a.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Argument> {
        self.outputs().find(|a| a.name == name)
    }

    pub fn is_query_state_variable(&self) -> bool {
        self.name == QUERY_STATE_VARIABLE
    }

    /// Vérifie la déclaration : noms uniques, entrées avant sorties,
    /// au plus une valeur de retour et placée en première sortie.
    pub fn validate(&self) -> Result<(), ActionError> {
        if self.name.is_empty() {
            return Err(ActionError::invalid_action("action without name"));
        }

        let mut seen_output = false;
        for (i, arg) in self.arguments.iter().enumerate() {
            if self.arguments[..i].iter().any(|a| a.name == arg.name) {
                return Err(ActionError::invalid_args(format!(
                    "duplicate argument '{}' in action '{}'",
                    arg.name, self.name
                )));
            }
            match arg.direction {
                ArgumentDirection::In if seen_output => {
                    return Err(ActionError::invalid_args(format!(
                        "input '{}' declared after an output in action '{}'",
                        arg.name, self.name
                    )));
                }
                ArgumentDirection::Out => seen_output = true,
                _ => {}
            }
            if arg.return_value {
                let first_output = self.outputs().next().map(|a| a.name.as_str());
                if arg.is_input() || first_output != Some(arg.name.as_str()) {
                    return Err(ActionError::invalid_args(format!(
                        "return value '{}' must be the first output of action '{}'",
                        arg.name, self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Argument {
    /// Élément `<argument>` du SCPD.
    pub fn to_xml_element(&self) -> Element {
        let mut elem = Element::new("argument");
        elem.children.push(XMLNode::Element(text_element("name", &self.name)));
        elem.children
            .push(XMLNode::Element(text_element("direction", self.direction.as_str())));
        if self.return_value {
            elem.children.push(XMLNode::Element(Element::new("retval")));
        }
        elem.children.push(XMLNode::Element(text_element(
            "relatedStateVariable",
            self.related_state_variable.name(),
        )));
        elem
    }
}

impl Action {
    /// Élément `<action>` du SCPD, arguments dans l'ordre de déclaration.
    pub fn to_xml_element(&self) -> Element {
        let mut elem = Element::new("action");
        elem.children.push(XMLNode::Element(text_element("name", &self.name)));
        if !self.arguments.is_empty() {
            let mut list = Element::new("argumentList");
            for argument in &self.arguments {
                list.children.push(XMLNode::Element(argument.to_xml_element()));
            }
            elem.children.push(XMLNode::Element(list));
        }
        elem
    }
}

fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

/// Variable liée à l'argument `varName` de `QueryStateVariable`.
pub static QUERY_VAR_NAME: Lazy<Arc<StateVariable>> =
    Lazy::new(|| Arc::new(StateVariable::new("A_ARG_TYPE_VarName", StateVarType::String)));

/// Variable liée à la valeur de retour de `QueryStateVariable`.
pub static QUERY_RETURN: Lazy<Arc<StateVariable>> =
    Lazy::new(|| Arc::new(StateVariable::new("A_ARG_TYPE_Return", StateVarType::String)));

/// La pseudo-action `QueryStateVariable`, disponible sur tout service local.
pub static QUERY_STATE_VARIABLE_ACTION: Lazy<Arc<Action>> = Lazy::new(|| {
    Arc::new(
        Action::new(QUERY_STATE_VARIABLE)
            .with_argument(Argument::input(QUERY_VAR_NAME_ARG, QUERY_VAR_NAME.clone()))
            .with_argument(Argument::output(QUERY_RETURN_ARG, QUERY_RETURN.clone()).as_return_value()),
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    fn var() -> Arc<StateVariable> {
        Arc::new(StateVariable::new("A_ARG_TYPE_InstanceID", StateVarType::UI4))
    }

    #[test]
    fn test_valid_action() {
        let a = Action::new("GetVolume")
            .with_argument(Argument::input("InstanceID", var()))
            .with_argument(Argument::output("CurrentVolume", var()).as_return_value());
        assert!(a.validate().is_ok());
        assert_eq!(a.inputs().count(), 1);
        assert_eq!(a.output("CurrentVolume").unwrap().datatype(), StateVarType::UI4);
    }

    #[test]
    fn test_invalid_action_declarations() {
        let dup = Action::new("X")
            .with_argument(Argument::input("A", var()))
            .with_argument(Argument::input("A", var()));
        assert!(dup.validate().is_err());

        let late_retval = Action::new("X")
            .with_argument(Argument::output("A", var()))
            .with_argument(Argument::output("B", var()).as_return_value());
        assert!(late_retval.validate().is_err());

        let input_after_output = Action::new("X")
            .with_argument(Argument::output("A", var()))
            .with_argument(Argument::input("B", var()));
        assert!(input_after_output.validate().is_err());
    }

    #[test]
    fn test_query_state_variable_action() {
        assert!(QUERY_STATE_VARIABLE_ACTION.is_query_state_variable());
        assert!(QUERY_STATE_VARIABLE_ACTION.validate().is_ok());
    }
}
