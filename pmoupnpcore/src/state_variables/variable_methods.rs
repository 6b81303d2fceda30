use std::time::Duration;

use xmltree::{Element, XMLNode};

use crate::{
    state_variables::{EventDetails, StateVariable},
    value_ranges::ValueRange,
    variable_types::{InvalidValueError, StateValue, StateVarType, UpnpVarType},
};

impl UpnpVarType for StateVariable {
    fn as_state_var_type(&self) -> StateVarType {
        self.datatype
    }
}

fn text_element(name: &str, text: impl ToString) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

impl StateVariable {
    pub fn new(name: &str, datatype: StateVarType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            default_value: None,
            allowed_values: Vec::new(),
            range: None,
            events: EventDetails::default(),
        }
    }

    pub fn with_default(mut self, value: StateValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_allowed_values<S: ToString>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.allowed_values = values.into_iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_range(mut self, range: ValueRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_events(mut self, send_events: bool) -> Self {
        self.events.send_events = send_events;
        self
    }

    pub fn with_max_rate(mut self, rate: Duration) -> Self {
        self.events.max_rate = Some(rate);
        self
    }

    pub fn with_min_delta(mut self, delta: f64) -> Self {
        self.events.min_delta = Some(delta);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> StateVarType {
        self.datatype
    }

    pub fn default_value(&self) -> Option<&StateValue> {
        self.default_value.as_ref()
    }

    pub fn allowed_values(&self) -> &[String] {
        &self.allowed_values
    }

    pub fn range(&self) -> Option<&ValueRange> {
        self.range.as_ref()
    }

    pub fn events(&self) -> &EventDetails {
        &self.events
    }

    pub fn send_events(&self) -> bool {
        self.events.send_events
    }

    /// Vérifie la cohérence interne de la déclaration.
    pub fn validate(&self) -> Result<(), InvalidValueError> {
        if self.name.is_empty() {
            return Err(InvalidValueError::identifier("", "state variable without name"));
        }
        if !self.allowed_values.is_empty() && !self.datatype.is_string() {
            return Err(InvalidValueError::InvalidRange(format!(
                "allowed value list on non-string variable '{}'",
                self.name
            )));
        }
        if let Some(range) = &self.range {
            if !self.datatype.is_comparable() {
                return Err(InvalidValueError::InvalidRange(format!(
                    "value range on {} variable '{}'",
                    self.datatype, self.name
                )));
            }
            if !range.minimum().is_numeric() && !range.as_state_var_type().is_synonym_of(&self.datatype) {
                return Err(InvalidValueError::TypeMismatch {
                    variable: self.name.clone(),
                    expected: self.datatype,
                    actual: range.as_state_var_type(),
                });
            }
        }
        if let Some(default) = &self.default_value {
            self.check(default)?;
        }
        Ok(())
    }

    /// Parse une valeur texte puis applique les contraintes de la variable.
    pub fn parse_value(&self, text: &str) -> Result<StateValue, InvalidValueError> {
        let value = StateValue::from_string(text, &self.datatype)?;
        self.check(&value)?;
        Ok(value)
    }

    /// Convertit `value` dans le type de la variable et vérifie plage et
    /// valeurs autorisées.
    pub fn coerce(&self, value: &StateValue) -> Result<StateValue, InvalidValueError> {
        let actual = value.as_state_var_type();
        let value = if actual.is_synonym_of(&self.datatype) {
            value.clone()
        } else if actual.is_numeric() && self.datatype.is_numeric() {
            value.try_cast(&self.datatype)?
        } else {
            return Err(InvalidValueError::TypeMismatch {
                variable: self.name.clone(),
                expected: self.datatype,
                actual,
            });
        };
        self.check(&value)?;
        Ok(value)
    }

    fn check(&self, value: &StateValue) -> Result<(), InvalidValueError> {
        if let Some(range) = &self.range
            && !range.contains(value)
        {
            return Err(InvalidValueError::OutOfRange {
                variable: self.name.clone(),
                value: value.to_string(),
                minimum: range.minimum().to_string(),
                maximum: range.maximum().to_string(),
            });
        }

        if !self.allowed_values.is_empty() {
            let text = value.to_string();
            if !self.allowed_values.iter().any(|a| *a == text) {
                return Err(InvalidValueError::NotAllowed {
                    variable: self.name.clone(),
                    value: text,
                });
            }
        }
        Ok(())
    }

    /// Élément `<stateVariable>` du SCPD.
    pub fn to_xml_element(&self) -> Element {
        let mut root = Element::new("stateVariable");
        root.attributes.insert(
            "sendEvents".to_string(),
            if self.events.send_events { "yes" } else { "no" }.to_string(),
        );

        root.children.push(XMLNode::Element(text_element("name", &self.name)));
        root.children
            .push(XMLNode::Element(text_element("dataType", self.datatype)));

        if let Some(default) = &self.default_value {
            root.children
                .push(XMLNode::Element(text_element("defaultValue", default)));
        }

        if !self.allowed_values.is_empty() {
            let mut list_elem = Element::new("allowedValueList");
            for val in &self.allowed_values {
                list_elem
                    .children
                    .push(XMLNode::Element(text_element("allowedValue", val)));
            }
            root.children.push(XMLNode::Element(list_elem));
        }

        if let Some(range) = &self.range {
            let mut range_elem = Element::new("allowedValueRange");
            range_elem
                .children
                .push(XMLNode::Element(text_element("minimum", range.minimum())));
            range_elem
                .children
                .push(XMLNode::Element(text_element("maximum", range.maximum())));
            if let Some(step) = range.step() {
                range_elem
                    .children
                    .push(XMLNode::Element(text_element("step", step)));
            }
            root.children.push(XMLNode::Element(range_elem));
        }

        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> StateVariable {
        StateVariable::new("Volume", StateVarType::UI2)
            .with_range(ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap())
            .with_default(StateValue::UI2(20))
            .with_events(true)
    }

    #[test]
    fn test_parse_value_applies_range() {
        let v = volume();
        assert!(v.validate().is_ok());
        assert_eq!(v.parse_value("42").unwrap(), StateValue::UI2(42));
        assert!(matches!(
            v.parse_value("101"),
            Err(InvalidValueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_allowed_values() {
        let v = StateVariable::new("Mode", StateVarType::String).with_allowed_values(["NORMAL", "SHUFFLE"]);
        assert!(v.parse_value("SHUFFLE").is_ok());
        assert!(matches!(
            v.parse_value("REPEAT"),
            Err(InvalidValueError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_invalid_declarations() {
        let v = StateVariable::new("Volume", StateVarType::UI2).with_allowed_values(["1"]);
        assert!(v.validate().is_err());

        let v = StateVariable::new("Volume", StateVarType::UI2).with_default(StateValue::UI2(500))
            .with_range(ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap());
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_coerce_numeric() {
        let v = volume();
        assert_eq!(v.coerce(&StateValue::I4(30)).unwrap(), StateValue::UI2(30));
        assert!(v.coerce(&StateValue::String("30".into())).is_err());
    }

    #[test]
    fn test_xml_element() {
        let elem = volume().to_xml_element();
        assert_eq!(elem.attributes.get("sendEvents").map(String::as_str), Some("yes"));
        let range = elem.get_child("allowedValueRange").unwrap();
        assert_eq!(
            range.get_child("maximum").and_then(|e| e.get_text()).as_deref(),
            Some("100")
        );
    }
}
