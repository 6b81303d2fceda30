use std::cmp::Ordering;

use crate::{
    value_ranges::ValueRange,
    variable_types::{InvalidValueError, StateValue, StateVarType, UpnpVarType},
};

impl UpnpVarType for ValueRange {
    fn as_state_var_type(&self) -> StateVarType {
        self.min.as_state_var_type()
    }
}

impl ValueRange {
    pub fn new(min: StateValue, max: StateValue) -> Result<Self, InvalidValueError> {
        if !min.is_comparable() || !max.is_comparable() {
            return Err(InvalidValueError::InvalidRange(format!(
                "{} values cannot be ordered",
                min.as_state_var_type()
            )));
        }

        match min.partial_cmp(&max) {
            Some(Ordering::Greater) => Err(InvalidValueError::InvalidRange(format!(
                "minimum {} is greater than maximum {}",
                min, max
            ))),
            None => Err(InvalidValueError::InvalidRange(format!(
                "{} and {} are not comparable",
                min, max
            ))),
            _ => Ok(Self {
                min,
                max,
                step: None,
            }),
        }
    }

    pub fn with_step(mut self, step: StateValue) -> Result<Self, InvalidValueError> {
        if !step.is_numeric() || step.as_f64().is_none_or(|s| s <= 0.0) {
            return Err(InvalidValueError::InvalidRange(format!(
                "step {} must be a positive number",
                step
            )));
        }
        self.step = Some(step);
        Ok(self)
    }

    pub fn minimum(&self) -> &StateValue {
        &self.min
    }

    pub fn maximum(&self) -> &StateValue {
        &self.max
    }

    pub fn step(&self) -> Option<&StateValue> {
        self.step.as_ref()
    }

    /// Vrai si `min <= value <= max`.
    ///
    /// Le pas est informatif (UDA) et n'est pas vérifié.
    pub fn contains(&self, value: &StateValue) -> bool {
        matches!(
            self.min.partial_cmp(value),
            Some(Ordering::Less | Ordering::Equal)
        ) && matches!(
            self.max.partial_cmp(value),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let r = ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap();
        assert!(r.contains(&StateValue::UI2(0)));
        assert!(r.contains(&StateValue::UI2(100)));
        assert!(!r.contains(&StateValue::UI2(101)));
        assert!(r.contains(&StateValue::I4(50)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(ValueRange::new(StateValue::I4(10), StateValue::I4(-10)).is_err());
        assert!(ValueRange::new(StateValue::String("a".into()), StateValue::String("z".into())).is_err());
    }

    #[test]
    fn test_step() {
        let r = ValueRange::new(StateValue::UI2(0), StateValue::UI2(100)).unwrap();
        assert!(r.clone().with_step(StateValue::UI2(0)).is_err());
        let r = r.with_step(StateValue::UI2(5)).unwrap();
        assert_eq!(r.step(), Some(&StateValue::UI2(5)));
    }
}
