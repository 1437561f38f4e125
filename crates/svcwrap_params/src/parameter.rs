//! Parameter definitions, validation and command-line rendering.
//!
//! A [`Parameter`] pairs a static definition (common [`ParameterInfo`] plus a
//! variant-specific [`ParameterKind`]) with its bound value. Values only ever
//! change through [`Parameter::set`], which validates first and leaves the
//! previous value untouched on failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::value::{is_falsy_str, is_truthy_str, ParameterValue};

/// Delimiter used to join multi-choice values on the command line.
pub const DEFAULT_DELIMITER: &str = ",";

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

/// Fields shared by every parameter variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Identifier, unique within its collection
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Command-line flag token (e.g. `-n`, `--lang=`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    /// Emit flag and value without a separating space
    #[serde(default)]
    pub nospace: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowusers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denyusers: Vec<String>,
    /// Parameters that must also be set when this one is
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require: Vec<String>,
    /// Parameters that must not be set when this one is
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbid: Vec<String>,
}

impl ParameterInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }

    pub fn nospace(mut self) -> Self {
        self.nospace = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_user(mut self, user: impl Into<String>) -> Self {
        self.allowusers.push(user.into());
        self
    }

    pub fn deny_user(mut self, user: impl Into<String>) -> Self {
        self.denyusers.push(user.into());
        self
    }

    pub fn require(mut self, id: impl Into<String>) -> Self {
        self.require.push(id.into());
        self
    }

    pub fn forbid(mut self, id: impl Into<String>) -> Self {
        self.forbid.push(id.into());
        self
    }
}

/// Options for boolean parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooleanOptions {
    /// Emit the flag when the value is false instead of true
    #[serde(default)]
    pub reverse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Options for string and text parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringOptions {
    /// Maximum length in characters, 0 for unlimited
    #[serde(default)]
    pub maxlength: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Options for integer parameters. `minimum == maximum == 0` or
/// `maximum < minimum` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegerOptions {
    #[serde(default)]
    pub minimum: i64,
    #[serde(default)]
    pub maximum: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<i64>,
}

impl IntegerOptions {
    pub fn bounded(&self) -> bool {
        !(self.minimum == 0 && self.maximum == 0) && self.maximum >= self.minimum
    }
}

/// Options for float parameters, same range rules as [`IntegerOptions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatOptions {
    #[serde(default)]
    pub minimum: f64,
    #[serde(default)]
    pub maximum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl FloatOptions {
    pub fn bounded(&self) -> bool {
        !(self.minimum == 0.0 && self.maximum == 0.0) && self.maximum >= self.minimum
    }
}

/// One selectable option of a choice parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub key: String,
    pub label: String,
}

impl Choice {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Declared default selection of a choice parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceSelection {
    One(String),
    Many(Vec<String>),
}

/// Options for choice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOptions {
    pub choices: Vec<Choice>,
    /// Allow an ordered subset of keys instead of exactly one
    #[serde(default)]
    pub multi: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ChoiceSelection>,
}

impl Default for ChoiceOptions {
    fn default() -> Self {
        Self {
            choices: Vec::new(),
            multi: false,
            delimiter: default_delimiter(),
            default: None,
        }
    }
}

impl ChoiceOptions {
    pub fn new(choices: Vec<Choice>) -> Self {
        Self {
            choices,
            ..Default::default()
        }
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.choices.iter().any(|c| c.key == key)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.label.as_str())
    }
}

/// Options for static parameters; the value never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticOptions {
    pub value: ParameterValue,
}

/// Variant-specific part of a parameter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    Boolean(BooleanOptions),
    String(StringOptions),
    Text(StringOptions),
    Integer(IntegerOptions),
    Float(FloatOptions),
    Choice(ChoiceOptions),
    Static(StaticOptions),
}

impl ParameterKind {
    /// Element tag used by the wire document.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "BooleanParameter",
            Self::String(_) => "StringParameter",
            Self::Text(_) => "TextParameter",
            Self::Integer(_) => "IntegerParameter",
            Self::Float(_) => "FloatParameter",
            Self::Choice(_) => "ChoiceParameter",
            Self::Static(_) => "StaticParameter",
        }
    }
}

/// A parameter as declared in a service definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(flatten)]
    pub info: ParameterInfo,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl ParameterDefinition {
    pub fn new(info: ParameterInfo, kind: ParameterKind) -> Self {
        Self { info, kind }
    }
}

/// Outcome of a custom validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(Option<String>),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Valid
        } else {
            Self::Invalid(None)
        }
    }
}

impl From<(bool, String)> for Verdict {
    fn from((ok, message): (bool, String)) -> Self {
        if ok {
            Self::Valid
        } else {
            Self::Invalid(Some(message))
        }
    }
}

impl From<(bool, &str)> for Verdict {
    fn from((ok, message): (bool, &str)) -> Self {
        (ok, message.to_string()).into()
    }
}

/// Custom validation hook run after the type-specific checks.
pub type CustomValidator = Arc<dyn Fn(&ParameterValue) -> Verdict + Send + Sync>;

/// A typed parameter together with its bound value.
#[derive(Clone)]
pub struct Parameter {
    pub info: ParameterInfo,
    pub kind: ParameterKind,
    value: Option<ParameterValue>,
    error: Option<String>,
    validator: Option<CustomValidator>,
}

impl Parameter {
    /// Build a parameter from its definition, applying the declared default.
    pub fn new(definition: ParameterDefinition) -> Self {
        let value = initial_value(&definition.kind);
        Self {
            info: definition.info,
            kind: definition.kind,
            value,
            error: None,
            validator: None,
        }
    }

    pub fn boolean(info: ParameterInfo, options: BooleanOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::Boolean(options)))
    }

    pub fn string(info: ParameterInfo, options: StringOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::String(options)))
    }

    pub fn text(info: ParameterInfo, options: StringOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::Text(options)))
    }

    pub fn integer(info: ParameterInfo, options: IntegerOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::Integer(options)))
    }

    pub fn float(info: ParameterInfo, options: FloatOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::Float(options)))
    }

    pub fn choice(info: ParameterInfo, options: ChoiceOptions) -> Self {
        Self::new(ParameterDefinition::new(info, ParameterKind::Choice(options)))
    }

    pub fn fixed(info: ParameterInfo, value: impl Into<ParameterValue>) -> Self {
        Self::new(ParameterDefinition::new(
            info,
            ParameterKind::Static(StaticOptions {
                value: value.into(),
            }),
        ))
    }

    /// Attach a custom validator. It may return `bool` or `(bool, message)`.
    pub fn with_validator<F, V>(mut self, validator: F) -> Self
    where
        F: Fn(&ParameterValue) -> V + Send + Sync + 'static,
        V: Into<Verdict>,
    {
        self.validator = Some(Arc::new(move |value| validator(value).into()));
        self
    }

    pub fn definition(&self) -> ParameterDefinition {
        ParameterDefinition::new(self.info.clone(), self.kind.clone())
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn value(&self) -> Option<&ParameterValue> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Message from the last failed `set`, for presentation only.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Restore a previously serialized state without re-validating.
    pub fn restore(&mut self, value: Option<ParameterValue>, error: Option<String>) {
        self.value = value;
        self.error = error;
    }

    pub(crate) fn record_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    /// Clear the bound value (static parameters keep theirs).
    pub fn unset(&mut self) {
        if !matches!(self.kind, ParameterKind::Static(_)) {
            self.value = None;
        }
        self.error = None;
    }

    /// Check a candidate value and return it in its coerced form.
    pub fn validate(&self, value: ParameterValue) -> Result<ParameterValue, ValidationError> {
        let coerced = self
            .coerce(value)
            .map_err(|message| ValidationError::new(&self.info.id, message))?;

        if let Some(validator) = &self.validator {
            if let Verdict::Invalid(message) = validator(&coerced) {
                return Err(ValidationError::new(
                    &self.info.id,
                    message.unwrap_or_else(|| "Custom validation failed".to_string()),
                ));
            }
        }

        Ok(coerced)
    }

    /// Validate and bind a value.
    ///
    /// On failure the previous value is kept and the error message is
    /// remembered for presentation.
    pub fn set(
        &mut self,
        value: impl Into<ParameterValue>,
    ) -> Result<&ParameterValue, ValidationError> {
        match self.validate(value.into()) {
            Ok(coerced) => {
                debug!("Parameter {} set to {}", self.info.id, coerced);
                self.error = None;
                Ok(&*self.value.insert(coerced))
            }
            Err(e) => {
                debug!("Parameter {} rejected value: {}", self.info.id, e.message);
                self.error = Some(e.message.clone());
                Err(e)
            }
        }
    }

    fn coerce(&self, value: ParameterValue) -> Result<ParameterValue, String> {
        match &self.kind {
            ParameterKind::Boolean(_) => coerce_bool(value).map(ParameterValue::Bool),
            ParameterKind::String(options) | ParameterKind::Text(options) => {
                let text = single_text(value)?;
                let length = text.chars().count();
                if options.maxlength > 0 && length > options.maxlength {
                    return Err(format!(
                        "Text too long: {} characters exceeds the maximum length of {}",
                        length, options.maxlength
                    ));
                }
                Ok(ParameterValue::Text(text))
            }
            ParameterKind::Integer(options) => {
                let n = coerce_integer(value)?;
                if options.bounded() && (n < options.minimum || n > options.maximum) {
                    return Err(format!(
                        "Number must be between {} and {}, got {}",
                        options.minimum, options.maximum, n
                    ));
                }
                Ok(ParameterValue::Integer(n))
            }
            ParameterKind::Float(options) => {
                let x = coerce_float(value)?;
                if options.bounded() && (x < options.minimum || x > options.maximum) {
                    return Err(format!(
                        "Number must be between {} and {}, got {}",
                        options.minimum, options.maximum, x
                    ));
                }
                Ok(ParameterValue::Float(x))
            }
            ParameterKind::Choice(options) => coerce_choice(options, value),
            ParameterKind::Static(options) => {
                if options.value.to_string() == value.to_string() {
                    Ok(options.value.clone())
                } else {
                    Err("Static parameter can not be changed".to_string())
                }
            }
        }
    }

    /// Extract this parameter's raw value from untyped post data.
    ///
    /// Multi-select choices also accept one boolean flag per choice, keyed
    /// `id[choicekey]`. The value is returned unconverted for a later `set`.
    pub fn value_from_postdata(
        &self,
        postdata: &HashMap<String, String>,
    ) -> Option<ParameterValue> {
        if let ParameterKind::Choice(options) = &self.kind {
            if options.multi {
                if let Some(raw) = postdata.get(&self.info.id) {
                    return Some(ParameterValue::List(split_list(raw, &options.delimiter)));
                }
                let picked: Vec<String> = options
                    .choices
                    .iter()
                    .filter(|c| {
                        postdata
                            .get(&format!("{}[{}]", self.info.id, c.key))
                            .map_or(false, |v| is_truthy_str(v))
                    })
                    .map(|c| c.key.clone())
                    .collect();
                return if picked.is_empty() {
                    None
                } else {
                    Some(ParameterValue::List(picked))
                };
            }
        }

        postdata
            .get(&self.info.id)
            .map(|raw| ParameterValue::Text(raw.clone()))
    }

    /// Render the parameter as a single command-line token.
    ///
    /// Returns `None` when nothing should be emitted (unset, or a boolean
    /// whose state does not trigger its flag).
    pub fn compile_arg(&self) -> Option<String> {
        let value = self.value.as_ref()?;

        if let ParameterKind::Boolean(options) = &self.kind {
            return if value.is_truthy() != options.reverse {
                self.info.flag.clone()
            } else {
                None
            };
        }

        let rendered = match (&self.kind, value) {
            (ParameterKind::Choice(options), ParameterValue::List(keys)) => {
                keys.join(&options.delimiter)
            }
            _ => value.to_string(),
        };
        let quoted = shell_quote(&rendered);

        match &self.info.flag {
            Some(flag) => {
                let separator = if flag.ends_with('=') || self.info.nospace {
                    ""
                } else {
                    " "
                };
                Some(format!("{}{}{}", flag, separator, quoted))
            }
            None => Some(quoted),
        }
    }

    /// Whether `user` may set this parameter.
    pub fn access(&self, user: Option<&str>) -> bool {
        if let Some(user) = user {
            if self.info.denyusers.iter().any(|u| u == user) {
                return false;
            }
        }
        if !self.info.allowusers.is_empty() {
            return user.map_or(false, |u| self.info.allowusers.iter().any(|a| a == u));
        }
        true
    }

    /// Whether the parameter counts as "set" for `require`/`forbid` checks.
    pub fn constrainable(&self) -> bool {
        match (&self.kind, &self.value) {
            (_, None) => false,
            (ParameterKind::Boolean(_), Some(value)) => value.is_truthy(),
            (ParameterKind::Integer(_), Some(ParameterValue::Integer(n))) => *n != 0,
            (ParameterKind::Float(_), Some(ParameterValue::Float(x))) => *x != 0.0,
            (ParameterKind::Choice(_), Some(ParameterValue::List(keys))) => !keys.is_empty(),
            (_, Some(_)) => true,
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("info", &self.info)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("error", &self.error)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
            && self.kind == other.kind
            && self.value == other.value
            && self.error == other.error
    }
}

fn initial_value(kind: &ParameterKind) -> Option<ParameterValue> {
    match kind {
        ParameterKind::Boolean(options) => options.default.map(ParameterValue::Bool),
        ParameterKind::String(options) | ParameterKind::Text(options) => {
            options.default.clone().map(ParameterValue::Text)
        }
        ParameterKind::Integer(options) => options.default.map(ParameterValue::Integer),
        ParameterKind::Float(options) => options.default.map(ParameterValue::Float),
        ParameterKind::Choice(options) => match (&options.default, options.multi) {
            (Some(ChoiceSelection::One(key)), false) => Some(ParameterValue::Text(key.clone())),
            (Some(ChoiceSelection::Many(keys)), false) => {
                keys.first().cloned().map(ParameterValue::Text)
            }
            (Some(ChoiceSelection::One(key)), true) => {
                Some(ParameterValue::List(vec![key.clone()]))
            }
            (Some(ChoiceSelection::Many(keys)), true) => Some(ParameterValue::List(keys.clone())),
            // Single-select defaults to the first choice; multi-select stays empty.
            (None, false) => options
                .choices
                .first()
                .map(|c| ParameterValue::Text(c.key.clone())),
            (None, true) => None,
        },
        ParameterKind::Static(options) => Some(options.value.clone()),
    }
}

fn single_text(value: ParameterValue) -> Result<String, String> {
    match value {
        ParameterValue::List(mut items) => {
            if items.len() == 1 {
                Ok(items.remove(0))
            } else {
                Err("Expected a single value".to_string())
            }
        }
        other => Ok(other.to_string()),
    }
}

fn coerce_bool(value: ParameterValue) -> Result<bool, String> {
    match value {
        ParameterValue::Bool(b) => Ok(b),
        ParameterValue::Integer(n) => Ok(n != 0),
        ParameterValue::Float(x) => Ok(x != 0.0),
        ParameterValue::Text(s) => {
            if is_truthy_str(&s) {
                Ok(true)
            } else if is_falsy_str(&s) {
                Ok(false)
            } else {
                Err(format!("Not a valid boolean value: {}", s))
            }
        }
        ParameterValue::List(_) => Err("Expected a single boolean value".to_string()),
    }
}

/// Integers accept float input, rounded to the nearest integer.
fn coerce_integer(value: ParameterValue) -> Result<i64, String> {
    match value {
        ParameterValue::Integer(n) => Ok(n),
        ParameterValue::Float(x) => round_to_integer(x),
        ParameterValue::Text(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(n);
            }
            match trimmed.parse::<f64>() {
                Ok(x) => round_to_integer(x),
                Err(_) => Err(format!("Not a valid integer: {}", s)),
            }
        }
        ParameterValue::List(items) if items.len() == 1 => {
            coerce_integer(ParameterValue::Text(items[0].clone()))
        }
        other => Err(format!("Not a valid integer: {}", other)),
    }
}

fn round_to_integer(x: f64) -> Result<i64, String> {
    if x.is_finite() {
        Ok(x.round() as i64)
    } else {
        Err(format!("Not a valid integer: {}", x))
    }
}

fn coerce_float(value: ParameterValue) -> Result<f64, String> {
    match value {
        ParameterValue::Float(x) if x.is_finite() => Ok(x),
        ParameterValue::Integer(n) => Ok(n as f64),
        ParameterValue::Text(s) => match s.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => Ok(x),
            _ => Err(format!("Not a valid number: {}", s)),
        },
        ParameterValue::List(items) if items.len() == 1 => {
            coerce_float(ParameterValue::Text(items[0].clone()))
        }
        other => Err(format!("Not a valid number: {}", other)),
    }
}

fn coerce_choice(options: &ChoiceOptions, value: ParameterValue) -> Result<ParameterValue, String> {
    let submitted = match value {
        ParameterValue::List(items) => items,
        ParameterValue::Text(s) if options.multi => split_list(&s, &options.delimiter),
        other => vec![other.to_string()],
    };

    let mut selected: Vec<String> = Vec::with_capacity(submitted.len());
    for key in submitted {
        if !selected.contains(&key) {
            selected.push(key);
        }
    }

    if let Some(invalid) = selected.iter().find(|k| !options.contains(k)) {
        return Err(format!("Invalid choice: {}", invalid));
    }

    if options.multi {
        return Ok(ParameterValue::List(selected));
    }

    match selected.len() {
        0 => Err("No option selected".to_string()),
        1 => Ok(ParameterValue::Text(selected.remove(0))),
        _ => Err("Only one option may be selected".to_string()),
    }
}

fn split_list(raw: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![raw.to_string()];
    }
    raw.split(delimiter)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

const SHELL_SPECIAL: &[char] = &[
    '"', '\'', '\\', '$', '`', '&', '|', ';', '<', '>', '(', ')', '*', '?', '[', ']', '{', '}',
    '!', '#', '~',
];

/// Quote a value for inclusion in a shell command line when needed.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "\"\"".to_string();
    }
    let needs_quoting = value
        .chars()
        .any(|c| c.is_whitespace() || SHELL_SPECIAL.contains(&c));
    if !needs_quoting {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integer(min: i64, max: i64) -> Parameter {
        Parameter::integer(
            ParameterInfo::new("n", "Number").flag("-n"),
            IntegerOptions {
                minimum: min,
                maximum: max,
                default: None,
            },
        )
    }

    fn languages(multi: bool) -> Parameter {
        let mut options = ChoiceOptions::new(vec![
            Choice::new("en", "English"),
            Choice::new("fr", "French"),
            Choice::new("nl", "Dutch"),
        ]);
        options.multi = multi;
        Parameter::choice(ParameterInfo::new("lang", "Language").flag("--lang="), options)
    }

    #[test]
    fn test_integer_range_is_inclusive() {
        let mut p = integer(0, 10);
        assert!(p.set(0).is_ok());
        assert!(p.set(10).is_ok());
        assert!(p.set(11).is_err());
        assert!(p.set(-1).is_err());
        assert_eq!(p.value(), Some(&ParameterValue::Integer(10)));
    }

    #[test]
    fn test_integer_unbounded_ranges() {
        let mut p = integer(0, 0);
        assert!(p.set(-5000).is_ok());
        assert!(p.set(i64::MAX).is_ok());

        let mut inverted = integer(10, 5);
        assert!(inverted.set(100).is_ok());
    }

    #[test]
    fn test_integer_rounds_float_input() {
        let mut p = integer(0, 0);
        p.set(2.6).unwrap();
        assert_eq!(p.value(), Some(&ParameterValue::Integer(3)));
        p.set("4.4").unwrap();
        assert_eq!(p.value(), Some(&ParameterValue::Integer(4)));
        assert!(p.set("four").is_err());
    }

    #[test]
    fn test_failed_set_keeps_previous_value() {
        let mut p = integer(1, 5);
        p.set(3).unwrap();
        let err = p.set(9).unwrap_err();
        assert_eq!(err.parameter, "n");
        assert_eq!(p.value(), Some(&ParameterValue::Integer(3)));
        assert!(p.error().is_some());

        p.set(4).unwrap();
        assert!(p.error().is_none());
    }

    #[test]
    fn test_string_maxlength() {
        let mut p = Parameter::string(
            ParameterInfo::new("s", "S"),
            StringOptions {
                maxlength: 10,
                default: None,
            },
        );
        assert!(p.set("abcdefghij").is_ok());
        let err = p.set("abcdefghijk").unwrap_err();
        assert!(err.message.contains("maximum length"));
    }

    #[test]
    fn test_choice_single_rejects_two_keys() {
        let mut p = languages(false);
        assert_eq!(p.value(), Some(&ParameterValue::Text("en".into())));
        assert!(p.set(vec!["en", "fr"]).is_err());
        assert!(p.set("de").is_err());
        assert!(p.set("fr").is_ok());
    }

    #[test]
    fn test_choice_multi_subset() {
        let mut p = languages(true);
        assert!(!p.has_value());
        p.set(vec!["nl", "en"]).unwrap();
        assert_eq!(
            p.value(),
            Some(&ParameterValue::List(vec!["nl".into(), "en".into()]))
        );
        assert!(p.set(vec!["en", "xx"]).is_err());
        assert_eq!(p.compile_arg().as_deref(), Some("--lang=nl,en"));
    }

    #[test]
    fn test_multi_choice_postdata_flags() {
        let p = languages(true);
        let mut post = HashMap::new();
        post.insert("lang[fr]".to_string(), "on".to_string());
        post.insert("lang[nl]".to_string(), "true".to_string());
        post.insert("lang[en]".to_string(), "false".to_string());
        assert_eq!(
            p.value_from_postdata(&post),
            Some(ParameterValue::List(vec!["fr".into(), "nl".into()]))
        );
    }

    #[test]
    fn test_boolean_reverse_flag() {
        let info = ParameterInfo::new("nocase", "No case").flag("-i");
        let mut p = Parameter::boolean(
            info,
            BooleanOptions {
                reverse: true,
                default: None,
            },
        );
        p.set(false).unwrap();
        assert_eq!(p.compile_arg().as_deref(), Some("-i"));
        p.set("yes").unwrap();
        assert_eq!(p.compile_arg(), None);
        assert!(p.constrainable());
    }

    #[test]
    fn test_compile_arg_quotes_and_separators() {
        let mut p = Parameter::string(ParameterInfo::new("t", "T").flag("-t"), StringOptions::default());
        p.set("hello world \"x\"").unwrap();
        assert_eq!(p.compile_arg().as_deref(), Some("-t \"hello world \\\"x\\\"\""));

        let mut q = Parameter::string(
            ParameterInfo::new("o", "O").flag("-o").nospace(),
            StringOptions::default(),
        );
        q.set("plain").unwrap();
        assert_eq!(q.compile_arg().as_deref(), Some("-oplain"));
    }

    #[test]
    fn test_access_lists() {
        let p = Parameter::string(
            ParameterInfo::new("s", "S").allow_user("alice").deny_user("bob"),
            StringOptions::default(),
        );
        assert!(p.access(Some("alice")));
        assert!(!p.access(Some("bob")));
        assert!(!p.access(Some("carol")));
        assert!(!p.access(None));

        let open = Parameter::string(ParameterInfo::new("o", "O").deny_user("bob"), StringOptions::default());
        assert!(open.access(None));
        assert!(!open.access(Some("bob")));
    }

    #[test]
    fn test_constrainable_numeric_zero() {
        let mut p = integer(0, 0);
        assert!(!p.constrainable());
        p.set(0).unwrap();
        assert!(!p.constrainable());
        p.set(2).unwrap();
        assert!(p.constrainable());
    }

    #[test]
    fn test_custom_validator() {
        let mut p = integer(0, 0).with_validator(|v: &ParameterValue| {
            let even = matches!(v, ParameterValue::Integer(n) if n % 2 == 0);
            (even, "Must be even")
        });
        assert!(p.set(4).is_ok());
        let err = p.set(3).unwrap_err();
        assert_eq!(err.message, "Must be even");
    }

    #[test]
    fn test_static_parameter_is_immutable() {
        let mut p = Parameter::fixed(ParameterInfo::new("v", "Version"), "1.0");
        assert!(p.set("1.0").is_ok());
        assert!(p.set("2.0").is_err());
        p.unset();
        assert_eq!(p.value(), Some(&ParameterValue::Text("1.0".into())));
    }

    #[test]
    fn test_definition_from_yaml() {
        let def: ParameterDefinition = serde_yaml::from_str(
            r#"
id: lang
name: Language
type: choice
flag: --lang=
choices:
  - key: en
    label: English
  - key: fr
    label: French
default: fr
"#,
        )
        .unwrap();
        let p = Parameter::new(def);
        assert_eq!(p.tag(), "ChoiceParameter");
        assert_eq!(p.value(), Some(&ParameterValue::Text("fr".into())));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("abc"), "abc");
        assert_eq!(shell_quote(""), "\"\"");
        assert_eq!(shell_quote("a$b"), "\"a\\$b\"");
    }
}
