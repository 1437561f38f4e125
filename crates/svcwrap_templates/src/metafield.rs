//! Derived output metadata: metafield rules and parameter conditions.
//!
//! An output template carries a list of [`MetaRule`]s. Each rule is either a
//! plain [`MetaField`] or a [`ParameterCondition`] that picks one based on
//! the bound global parameters. Conditions are a conjunction of checks; a
//! failed condition with no `otherwise` branch produces nothing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use svcwrap_params::{Parameter, ParameterSet, ParameterValue};

use crate::metadata::Metadata;

/// A single metadata instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum MetaField {
    /// Set a fixed value
    Set { key: String, value: String },
    /// Remove the attribute
    Unset { key: String },
    /// Take the value of a bound parameter
    Parameter { key: String, parameter: String },
    /// Copy an attribute from the parent input file
    Copy {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

/// Effect of a resolved [`MetaField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaUpdate {
    Set(String, String),
    Unset(String),
}

impl MetaField {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. }
            | Self::Unset { key }
            | Self::Parameter { key, .. }
            | Self::Copy { key, .. } => key,
        }
    }

    /// Resolve against the bound parameters and the parent input metadata.
    /// Returns `None` when the source has no value.
    pub fn resolve(&self, parameters: &ParameterSet, input: Option<&Metadata>) -> Option<MetaUpdate> {
        match self {
            Self::Set { key, value } => Some(MetaUpdate::Set(key.clone(), value.clone())),
            Self::Unset { key } => Some(MetaUpdate::Unset(key.clone())),
            Self::Parameter { key, parameter } => parameters
                .value(parameter)
                .map(|v| MetaUpdate::Set(key.clone(), v.to_string())),
            Self::Copy { key, source } => {
                let source = source.as_deref().unwrap_or(key);
                input
                    .and_then(|m| m.get(source))
                    .map(|v| MetaUpdate::Set(key.clone(), v.to_string()))
            }
        }
    }
}

impl MetaUpdate {
    pub fn apply(self, metadata: &mut Metadata) {
        match self {
            Self::Set(key, value) => metadata.insert(key, value),
            Self::Unset(key) => {
                metadata.remove(&key);
            }
        }
    }
}

/// Expected value of a parameter in a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Truthiness check; an unset parameter counts as false
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ConditionValue {
    pub fn matches(&self, parameter: Option<&Parameter>) -> bool {
        let value = parameter.and_then(|p| p.value());
        match self {
            Self::Flag(expected) => parameter.map_or(false, |p| p.constrainable()) == *expected,
            Self::Integer(expected) => match value {
                Some(ParameterValue::Integer(n)) => n == expected,
                Some(ParameterValue::Float(x)) => *x == *expected as f64,
                Some(ParameterValue::Text(s)) => s.trim().parse::<i64>().ok() == Some(*expected),
                _ => false,
            },
            Self::Float(expected) => match value {
                Some(ParameterValue::Float(x)) => x == expected,
                Some(ParameterValue::Integer(n)) => *n as f64 == *expected,
                Some(ParameterValue::Text(s)) => s.trim().parse::<f64>().ok() == Some(*expected),
                _ => false,
            },
            Self::Text(expected) => value.map_or(false, |v| v.to_string() == *expected),
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A metafield, or a condition choosing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaRule {
    Condition(ParameterCondition),
    Field(MetaField),
}

impl MetaRule {
    pub fn evaluate(&self, parameters: &ParameterSet) -> Option<&MetaField> {
        match self {
            Self::Field(field) => Some(field),
            Self::Condition(condition) => condition.evaluate(parameters),
        }
    }
}

impl From<MetaField> for MetaRule {
    fn from(field: MetaField) -> Self {
        Self::Field(field)
    }
}

impl From<ParameterCondition> for MetaRule {
    fn from(condition: ParameterCondition) -> Self {
        Self::Condition(condition)
    }
}

/// Conjunction of parameter checks with a `then` and optional `otherwise`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCondition {
    pub when: BTreeMap<String, ConditionValue>,
    pub then: Box<MetaRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Box<MetaRule>>,
}

impl ParameterCondition {
    pub fn new(then: impl Into<MetaRule>) -> Self {
        Self {
            when: BTreeMap::new(),
            then: Box::new(then.into()),
            otherwise: None,
        }
    }

    pub fn when(mut self, parameter: impl Into<String>, expected: ConditionValue) -> Self {
        self.when.insert(parameter.into(), expected);
        self
    }

    pub fn otherwise(mut self, rule: impl Into<MetaRule>) -> Self {
        self.otherwise = Some(Box::new(rule.into()));
        self
    }

    /// Whether every named check holds.
    pub fn matches(&self, parameters: &ParameterSet) -> bool {
        self.when
            .iter()
            .all(|(id, expected)| expected.matches(parameters.get(id)))
    }

    /// The applicable metafield, or `None` when no metadata is produced.
    pub fn evaluate(&self, parameters: &ParameterSet) -> Option<&MetaField> {
        if self.matches(parameters) {
            self.then.evaluate(parameters)
        } else {
            self.otherwise
                .as_ref()
                .and_then(|rule| rule.evaluate(parameters))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcwrap_params::{BooleanOptions, ParameterInfo};

    fn set_with(x: Option<bool>) -> ParameterSet {
        let mut p = Parameter::boolean(ParameterInfo::new("x", "X"), BooleanOptions::default());
        if let Some(x) = x {
            p.set(x).unwrap();
        }
        ParameterSet::from_parameters(vec![p]).unwrap()
    }

    fn set_a() -> MetaField {
        MetaField::Set {
            key: "a".to_string(),
            value: "yes".to_string(),
        }
    }

    #[test]
    fn test_condition_branches() {
        let condition = ParameterCondition::new(set_a())
            .when("x", ConditionValue::Flag(true))
            .otherwise(MetaField::Unset {
                key: "a".to_string(),
            });

        assert_eq!(condition.evaluate(&set_with(Some(true))), Some(&set_a()));
        assert!(matches!(
            condition.evaluate(&set_with(Some(false))),
            Some(MetaField::Unset { .. })
        ));
        assert!(matches!(
            condition.evaluate(&set_with(None)),
            Some(MetaField::Unset { .. })
        ));
    }

    #[test]
    fn test_condition_without_otherwise_produces_nothing() {
        let condition = ParameterCondition::new(set_a()).when("x", ConditionValue::Flag(true));
        assert!(condition.evaluate(&set_with(Some(false))).is_none());
        assert!(condition.evaluate(&set_with(None)).is_none());
    }

    #[test]
    fn test_nested_condition() {
        let inner = ParameterCondition::new(set_a()).when("x", ConditionValue::Flag(true));
        let outer = ParameterCondition::new(inner).when("missing", ConditionValue::Flag(false));
        assert_eq!(outer.evaluate(&set_with(Some(true))), Some(&set_a()));
    }

    #[test]
    fn test_parameter_and_copy_fields() {
        let mut lang = Parameter::string(ParameterInfo::new("lang", "Lang"), Default::default());
        lang.set("nl").unwrap();
        let set = ParameterSet::from_parameters(vec![lang]).unwrap();
        let input = Metadata::new("PlainTextFormat").with_attribute("encoding", "latin1");

        let field = MetaField::Parameter {
            key: "language".to_string(),
            parameter: "lang".to_string(),
        };
        assert_eq!(
            field.resolve(&set, None),
            Some(MetaUpdate::Set("language".to_string(), "nl".to_string()))
        );

        let copy = MetaField::Copy {
            key: "encoding".to_string(),
            source: None,
        };
        assert_eq!(
            copy.resolve(&set, Some(&input)),
            Some(MetaUpdate::Set("encoding".to_string(), "latin1".to_string()))
        );
        assert!(copy.resolve(&set, None).is_none());
    }

    #[test]
    fn test_rules_from_yaml() {
        let yaml = r#"
- rule: set
  key: author
  value: me
- when:
    x: true
  then:
    rule: set
    key: a
    value: yes
  otherwise:
    rule: unset
    key: a
"#;
        let rules: Vec<MetaRule> = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(rules[0], MetaRule::Field(MetaField::Set { .. })));
        match &rules[1] {
            MetaRule::Condition(c) => {
                assert_eq!(c.when.get("x"), Some(&ConditionValue::Flag(true)));
                assert!(c.otherwise.is_some());
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }
}
