use std::fmt;
use std::str::FromStr;

use crate::variable_types::{InvalidValueError, StateValue, StateVarType};

/// Prédicats communs à tout ce qui porte un type UPnP.
pub trait UpnpVarType {
    fn as_state_var_type(&self) -> StateVarType;

    fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    fn is_signed_int(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::I1 | StateVarType::I2 | StateVarType::I4 | StateVarType::Int
        )
    }

    fn is_unsigned_int(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::UI1 | StateVarType::UI2 | StateVarType::UI4
        )
    }

    fn is_float(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::R4
                | StateVarType::R8
                | StateVarType::Number
                | StateVarType::Fixed14_4
                | StateVarType::Float
        )
    }

    fn is_bool(&self) -> bool {
        matches!(self.as_state_var_type(), StateVarType::Boolean)
    }

    fn is_string(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::String | StateVarType::Char
        )
    }

    fn is_time(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::Date
                | StateVarType::DateTime
                | StateVarType::DateTimeTZ
                | StateVarType::Time
                | StateVarType::TimeTZ
        )
    }

    fn is_binary(&self) -> bool {
        matches!(
            self.as_state_var_type(),
            StateVarType::BinBase64 | StateVarType::BinHex
        )
    }

    /// Les types pour lesquels un `<allowedValueRange>` a un sens
    fn is_comparable(&self) -> bool {
        self.is_numeric() || self.is_time()
    }
}

impl UpnpVarType for StateVarType {
    fn as_state_var_type(&self) -> StateVarType {
        *self
    }
}

impl UpnpVarType for StateValue {
    fn as_state_var_type(&self) -> StateVarType {
        StateVarType::from(self)
    }
}

impl StateVarType {
    /// Bornes entières du type, `None` pour les types non entiers
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            StateVarType::UI1 => Some((u8::MIN as i64, u8::MAX as i64)),
            StateVarType::UI2 => Some((u16::MIN as i64, u16::MAX as i64)),
            StateVarType::UI4 => Some((u32::MIN as i64, u32::MAX as i64)),
            StateVarType::I1 => Some((i8::MIN as i64, i8::MAX as i64)),
            StateVarType::I2 => Some((i16::MIN as i64, i16::MAX as i64)),
            StateVarType::I4 | StateVarType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }

    /// Deux types dont les valeurs sont interchangeables sans conversion
    pub fn is_synonym_of(&self, other: &StateVarType) -> bool {
        use StateVarType::*;
        self == other
            || matches!(
                (self, other),
                (I4, Int) | (Int, I4) | (R8, Number) | (Number, R8) | (R4, Float) | (Float, R4)
            )
    }
}

impl From<&StateValue> for StateVarType {
    fn from(value: &StateValue) -> Self {
        match value {
            StateValue::UI1(_) => StateVarType::UI1,
            StateValue::UI2(_) => StateVarType::UI2,
            StateValue::UI4(_) => StateVarType::UI4,
            StateValue::I1(_) => StateVarType::I1,
            StateValue::I2(_) => StateVarType::I2,
            StateValue::I4(_) => StateVarType::I4,
            StateValue::Int(_) => StateVarType::Int,
            StateValue::R4(_) => StateVarType::R4,
            StateValue::R8(_) => StateVarType::R8,
            StateValue::Number(_) => StateVarType::Number,
            StateValue::Fixed14_4(_) => StateVarType::Fixed14_4,
            StateValue::Float(_) => StateVarType::Float,
            StateValue::Char(_) => StateVarType::Char,
            StateValue::String(_) => StateVarType::String,
            StateValue::Boolean(_) => StateVarType::Boolean,
            StateValue::BinBase64(_) => StateVarType::BinBase64,
            StateValue::BinHex(_) => StateVarType::BinHex,
            StateValue::Date(_) => StateVarType::Date,
            StateValue::DateTime(_) => StateVarType::DateTime,
            StateValue::DateTimeTZ(_) => StateVarType::DateTimeTZ,
            StateValue::Time(_) => StateVarType::Time,
            StateValue::TimeTZ(_, _) => StateVarType::TimeTZ,
            StateValue::UUID(_) => StateVarType::UUID,
            StateValue::URI(_) => StateVarType::URI,
        }
    }
}

impl fmt::Display for StateVarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            StateVarType::UI1 => "ui1",
            StateVarType::UI2 => "ui2",
            StateVarType::UI4 => "ui4",
            StateVarType::I1 => "i1",
            StateVarType::I2 => "i2",
            StateVarType::I4 => "i4",
            StateVarType::Int => "int",
            StateVarType::R4 => "r4",
            StateVarType::R8 => "r8",
            StateVarType::Number => "number",
            StateVarType::Fixed14_4 => "fixed.14.4",
            StateVarType::Float => "float",
            StateVarType::Char => "char",
            StateVarType::String => "string",
            StateVarType::Boolean => "boolean",
            StateVarType::BinBase64 => "bin.base64",
            StateVarType::BinHex => "bin.hex",
            StateVarType::Date => "date",
            StateVarType::DateTime => "dateTime",
            StateVarType::DateTimeTZ => "dateTime.tz",
            StateVarType::Time => "time",
            StateVarType::TimeTZ => "time.tz",
            StateVarType::UUID => "uuid",
            StateVarType::URI => "uri",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for StateVarType {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ui1" => Ok(StateVarType::UI1),
            "ui2" => Ok(StateVarType::UI2),
            "ui4" => Ok(StateVarType::UI4),
            "i1" => Ok(StateVarType::I1),
            "i2" => Ok(StateVarType::I2),
            "i4" => Ok(StateVarType::I4),
            "int" => Ok(StateVarType::Int),
            "r4" => Ok(StateVarType::R4),
            "r8" => Ok(StateVarType::R8),
            "number" => Ok(StateVarType::Number),
            "fixed.14.4" => Ok(StateVarType::Fixed14_4),
            "float" => Ok(StateVarType::Float),
            "char" => Ok(StateVarType::Char),
            "string" => Ok(StateVarType::String),
            "boolean" => Ok(StateVarType::Boolean),
            "bin.base64" => Ok(StateVarType::BinBase64),
            "bin.hex" => Ok(StateVarType::BinHex),
            "date" => Ok(StateVarType::Date),
            "datetime" => Ok(StateVarType::DateTime),
            "datetime.tz" => Ok(StateVarType::DateTimeTZ),
            "time" => Ok(StateVarType::Time),
            "time.tz" => Ok(StateVarType::TimeTZ),
            "uuid" => Ok(StateVarType::UUID),
            "uri" => Ok(StateVarType::URI),
            _ => Err(InvalidValueError::identifier(s, "unknown UPnP datatype")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_names_roundtrip() {
        for name in ["ui4", "fixed.14.4", "bin.base64", "dateTime.tz", "uuid", "boolean"] {
            let t: StateVarType = name.parse().unwrap();
            assert_eq!(t.to_string(), name);
        }
    }

    #[test]
    fn test_unknown_datatype() {
        assert!("decimal".parse::<StateVarType>().is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(StateVarType::UI1.is_unsigned_int());
        assert!(StateVarType::Int.is_signed_int());
        assert!(StateVarType::Fixed14_4.is_float());
        assert!(StateVarType::Date.is_comparable());
        assert!(!StateVarType::BinHex.is_comparable());
        assert!(StateVarType::I4.is_synonym_of(&StateVarType::Int));
        assert!(!StateVarType::UI4.is_synonym_of(&StateVarType::I4));
    }
}
