//! # svcwrap_wire
//!
//! XML codec for the service document exchanged with remote callers.
//!
//! The document carries the parameter schema with bound values and errors,
//! the declared formats and profiles, file listings and the project status.
//! Reading it back yields an equivalent model; converters and viewers are
//! not part of the document.
//!
//! ```rust
//! use svcwrap_params::{IntegerOptions, Parameter, ParameterInfo, ParameterSet};
//! use svcwrap_wire::ServiceDocument;
//!
//! let mut n = Parameter::integer(
//!     ParameterInfo::new("n", "Iterations").flag("-n"),
//!     IntegerOptions { minimum: 1, maximum: 10, default: None },
//! );
//! n.set(4).unwrap();
//!
//! let mut document = ServiceDocument::new("demo", "Demo service");
//! document.parameters = ParameterSet::from_parameters(vec![n]).unwrap();
//!
//! let xml = document.to_xml().unwrap();
//! let decoded = ServiceDocument::from_xml(&xml).unwrap();
//! assert_eq!(decoded.parameters, document.parameters);
//! ```

pub mod document;
pub mod dom;
pub mod error;
pub mod parameter;
pub mod template;

pub use document::{FileEntry, FormatInfo, ProgramEntry, ServiceDocument, StatusInfo};
pub use dom::Element;
pub use error::{WireError, WireResult};
pub use parameter::{encode_definition, encode_parameter, encode_set, ParameterCodec};
pub use template::{
    decode_input_template, decode_output_template, decode_profile, decode_rule,
    encode_input_template, encode_output_template, encode_profile, encode_rule,
};
