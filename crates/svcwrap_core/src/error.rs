//! Error types for the core module.

use thiserror::Error;

use svcwrap_params::{ParamError, ValidationErrors};
use svcwrap_runner::RunnerError;
use svcwrap_templates::TemplateError;
use svcwrap_wire::WireError;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The service definition can not be used
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The wrapped program could not be started
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// The request does not fit the project's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("Template error: {0}")]
    Template(TemplateError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<TemplateError> for CoreError {
    fn from(error: TemplateError) -> Self {
        match error {
            TemplateError::Validation(errors) => Self::Validation(errors),
            other => Self::Template(other),
        }
    }
}
