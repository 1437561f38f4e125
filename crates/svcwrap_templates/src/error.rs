//! Error types for templates, formats and converters.

use thiserror::Error;

use svcwrap_params::{ParamError, ValidationErrors};

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while resolving templates, checking formats or
/// converting files.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Format not found: {0}")]
    FormatNotFound(String),

    #[error("Converter not found: {0}")]
    ConverterNotFound(String),

    #[error("Invalid template {template}: {message}")]
    InvalidTemplate { template: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Converter {converter} can not handle format {format}: {message}")]
    Conversion {
        converter: String,
        format: String,
        message: String,
    },

    #[error("Content rejected by format {format}: {message}")]
    InvalidContent { format: String, message: String },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
