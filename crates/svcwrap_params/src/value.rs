//! Parameter values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value bound to (or submitted for) a parameter.
///
/// Raw submissions usually arrive as [`ParameterValue::Text`]; each
/// parameter variant coerces them into its own shape during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl ParameterValue {
    /// Truthiness as used by constraints and metadata conditions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Integer(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Text(s) => is_truthy_str(s),
            Self::List(items) => !items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Interpret a submitted string as a boolean flag.
pub fn is_truthy_str(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

pub(crate) fn is_falsy_str(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off" | "disabled"
    )
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ParameterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for ParameterValue {
    fn from(n: i32) -> Self {
        Self::Integer(n as i64)
    }
}

impl From<f64> for ParameterValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for ParameterValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for ParameterValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(ParameterValue::Bool(true).is_truthy());
        assert!(!ParameterValue::Integer(0).is_truthy());
        assert!(ParameterValue::Text("yes".into()).is_truthy());
        assert!(!ParameterValue::Text("no".into()).is_truthy());
        assert!(!ParameterValue::List(vec![]).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(ParameterValue::Float(1.5).to_string(), "1.5");
        assert_eq!(ParameterValue::from(vec!["a", "b"]).to_string(), "a,b");
    }
}
