//! Error types for the wire codec.

use thiserror::Error;

/// Result type alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while reading or writing a wire document.
#[derive(Error, Debug)]
pub enum WireError {
    /// The document does not match the expected schema
    #[error("Invalid wire document: {0}")]
    Format(String),

    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Unknown element: {0}")]
    UnknownTag(String),

    #[error("Missing attribute {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid value {value:?} for {attribute} on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Parameter error: {0}")]
    Param(#[from] svcwrap_params::ParamError),
}
