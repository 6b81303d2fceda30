use std::fmt;
use std::str::FromStr;

use crate::variable_types::{InvalidValueError, StateValue, StateVarType};

/// Liste de valeurs séparées par des virgules (convention CSV de l'UDA).
///
/// Limitation connue : les virgules contenues dans un élément ne sont pas
/// échappées à la sérialisation, et toute virgule sépare deux éléments au
/// parsing. `Csv(vec!["a,b"])` se relit donc comme deux éléments. Ce
/// comportement est conservé pour rester compatible avec les équipements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Csv<T>(pub Vec<T>);

impl<T> Csv<T> {
    pub fn new(items: Vec<T>) -> Self {
        Csv(items)
    }

    pub fn items(&self) -> &[T] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: fmt::Display> fmt::Display for Csv<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl<T: FromStr> FromStr for Csv<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Csv(Vec::new()));
        }
        s.split(',')
            .map(|item| item.trim().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Csv)
    }
}

impl Csv<StateValue> {
    /// Parse une liste dont chaque élément est du type UPnP donné.
    pub fn parse_as(s: &str, var_type: &StateVarType) -> Result<Self, InvalidValueError> {
        if s.trim().is_empty() {
            return Ok(Csv(Vec::new()));
        }
        s.split(',')
            .map(|item| StateValue::from_string(item, var_type))
            .collect::<Result<Vec<_>, _>>()
            .map(Csv)
    }
}

impl<T> From<Vec<T>> for Csv<T> {
    fn from(items: Vec<T>) -> Self {
        Csv(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split() {
        let list: Csv<u32> = "1, 2,3".parse().unwrap();
        assert_eq!(list.items(), &[1, 2, 3]);
        assert_eq!(list.to_string(), "1,2,3");
        assert!("".parse::<Csv<u32>>().unwrap().is_empty());
    }

    #[test]
    fn test_embedded_commas_are_not_escaped() {
        let list = Csv(vec!["a,b".to_string(), "c".to_string()]);
        let text = list.to_string();
        assert_eq!(text, "a,b,c");
        let back: Csv<String> = text.parse().unwrap();
        assert_eq!(back.items().len(), 3);
    }

    #[test]
    fn test_parse_as_upnp_type() {
        let list = Csv::parse_as("1,0,yes", &StateVarType::Boolean).unwrap();
        assert_eq!(list.to_string(), "1,0,1");
        assert!(Csv::parse_as("1,x", &StateVarType::UI1).is_err());
    }
}
