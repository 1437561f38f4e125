//! Error types for the parameter model.

use std::fmt;

use thiserror::Error;

/// Result type alias for parameter operations.
pub type ParamResult<T> = Result<T, ParamError>;

/// A single parameter rejected a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{parameter}: {message}")]
pub struct ValidationError {
    pub parameter: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

/// Validation errors accumulated over a whole request.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_message(&mut self, parameter: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError::new(parameter, message));
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Messages reported for one parameter.
    pub fn for_parameter(&self, id: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.parameter == id)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// `Ok(())` when nothing was collected, the whole set otherwise.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", joined.join("; "))
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Errors raised while assembling or querying parameter collections.
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Parameter not found: {0}")]
    NotFound(String),

    #[error("Duplicate parameter id: {0}")]
    Duplicate(String),

    #[error("Invalid parameter definition for {parameter}: {message}")]
    InvalidDefinition { parameter: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}
