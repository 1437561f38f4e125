//! Converter capabilities and the converter registry.
//!
//! A converter declares which formats it can produce when converting an
//! uploaded file into an input format, and which formats it can consume when
//! converting an output file into something else. The conversion itself is
//! delegated to a [`ConversionBackend`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TemplateError, TemplateResult};
use crate::format::Format;

/// Declared capabilities of a converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterSpec {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Input formats this converter can produce
    #[serde(default)]
    pub produces: Vec<String>,
    /// Output formats this converter can consume
    #[serde(default)]
    pub consumes: Vec<String>,
}

impl ConverterSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }

    pub fn produces(mut self, format: impl Into<String>) -> Self {
        self.produces.push(format.into());
        self
    }

    pub fn consumes(mut self, format: impl Into<String>) -> Self {
        self.consumes.push(format.into());
        self
    }
}

/// Performs an actual file conversion.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Convert `source` into `target`; `format` is the input format being
    /// produced or the output format being consumed.
    async fn convert(&self, source: &Path, target: &Path, format: &Format) -> TemplateResult<()>;
}

/// Backend that copies the file unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyBackend;

#[async_trait]
impl ConversionBackend for CopyBackend {
    async fn convert(&self, source: &Path, target: &Path, _format: &Format) -> TemplateResult<()> {
        tokio::fs::copy(source, target).await?;
        Ok(())
    }
}

/// A converter: declared capabilities plus the backend doing the work.
#[derive(Clone)]
pub struct Converter {
    pub spec: ConverterSpec,
    backend: Arc<dyn ConversionBackend>,
}

impl Converter {
    pub fn new(spec: ConverterSpec, backend: Arc<dyn ConversionBackend>) -> Self {
        Self { spec, backend }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Whether this converter may produce the given input format.
    pub fn check_input(&self, format: &str) -> TemplateResult<()> {
        if self.spec.produces.iter().any(|f| f == format) {
            Ok(())
        } else {
            Err(self.conversion_error(format, "format is not among the produced formats"))
        }
    }

    /// Whether this converter may consume the given output format.
    pub fn check_output(&self, format: &str) -> TemplateResult<()> {
        if self.spec.consumes.iter().any(|f| f == format) {
            Ok(())
        } else {
            Err(self.conversion_error(format, "format is not among the consumed formats"))
        }
    }

    /// Convert an uploaded file into `format`.
    pub async fn convert_input(
        &self,
        source: &Path,
        target: &Path,
        format: &Format,
    ) -> TemplateResult<()> {
        self.check_input(&format.name)?;
        info!(
            "Converting {:?} to {} with {}",
            source, format.name, self.spec.id
        );
        self.backend.convert(source, target, format).await
    }

    /// Convert an output file of `format` into this converter's target.
    pub async fn convert_output(
        &self,
        source: &Path,
        target: &Path,
        format: &Format,
    ) -> TemplateResult<()> {
        self.check_output(&format.name)?;
        info!(
            "Converting {:?} from {} with {}",
            source, format.name, self.spec.id
        );
        self.backend.convert(source, target, format).await
    }

    fn conversion_error(&self, format: &str, message: &str) -> TemplateError {
        TemplateError::Conversion {
            converter: self.spec.id.clone(),
            format: format.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("spec", &self.spec).finish()
    }
}

/// Registry of converters, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, converter: Converter) {
        debug!("Registering converter: {}", converter.id());
        self.converters.insert(converter.id().to_string(), converter);
    }

    /// Register a declared converter with a pass-through backend.
    pub fn register_spec(&mut self, spec: ConverterSpec) {
        self.register(Converter::new(spec, Arc::new(CopyBackend)));
    }

    pub fn get(&self, id: &str) -> Option<&Converter> {
        self.converters.get(id)
    }

    pub fn get_required(&self, id: &str) -> TemplateResult<&Converter> {
        self.get(id)
            .ok_or_else(|| TemplateError::ConverterNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.converters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
