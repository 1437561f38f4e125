//! # svcwrap_templates
//!
//! Formats, converters and file templates for svcwrap.
//!
//! - [`FormatRegistry`]: declared file kinds with a content check and an
//!   attribute schema
//! - [`ConverterRegistry`]: converters with declared produce/consume formats
//! - [`InputTemplate`] / [`OutputTemplate`]: file roles inside a project,
//!   with filename patterns such as `test.$encoding.$language.txt`
//! - [`MetaRule`]: metadata derivation for outputs, optionally guarded by a
//!   [`ParameterCondition`]
//! - [`Profile`]: required inputs and the outputs they produce
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use svcwrap_templates::InputTemplate;
//!
//! let template = InputTemplate::new("text", "PlainTextFormat")
//!     .filename("test.$encoding.$language.txt");
//!
//! let mut values = HashMap::new();
//! values.insert("encoding".to_string(), "utf-8".to_string());
//! values.insert("language".to_string(), "fr".to_string());
//!
//! let name = template.resolve_filename(&values, None, 0).unwrap();
//! assert_eq!(name, "test.utf-8.fr.txt");
//! ```

pub mod converter;
pub mod error;
pub mod format;
pub mod metadata;
pub mod metafield;
pub mod profile;
pub mod renderer;
pub mod template;

pub use converter::{ConversionBackend, Converter, ConverterRegistry, ConverterSpec, CopyBackend};
pub use error::{TemplateError, TemplateResult};
pub use format::{ContentCheck, Format, FormatRegistry, InlineMetadata};
pub use metadata::Metadata;
pub use metafield::{ConditionValue, MetaField, MetaRule, MetaUpdate, ParameterCondition};
pub use profile::{find_input_template, find_output_template, Profile};
pub use renderer::TemplateRenderer;
pub use template::{validate_filename, InputTemplate, OutputTemplate};
