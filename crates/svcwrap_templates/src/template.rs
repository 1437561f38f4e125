//! Input and output templates: file roles within a project.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use svcwrap_params::{ParameterDefinition, ParameterSet};

use crate::error::{TemplateError, TemplateResult};
use crate::metadata::Metadata;
use crate::metafield::MetaRule;
use crate::renderer::{ensure_extension, insert_sequence, strip_extension, TemplateRenderer};

/// Role an uploaded file can fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTemplate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Name of the format files must conform to
    pub format: String,
    /// Per-file parameters, stored as file metadata
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    /// Converters that may produce this template's format
    #[serde(default)]
    pub converters: Vec<String>,
    /// At most one file may fill this role
    #[serde(default)]
    pub unique: bool,
    /// A profile still matches when no file fills this role
    #[serde(default)]
    pub optional: bool,
    /// Filename pattern with `$parameter` tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl InputTemplate {
    pub fn new(id: impl Into<String>, format: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            format: format.into(),
            parameters: Vec::new(),
            converters: Vec::new(),
            unique: false,
            optional: false,
            filename: None,
            extension: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn converter(mut self, converter: impl Into<String>) -> Self {
        self.converters.push(converter.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn filename(mut self, pattern: impl Into<String>) -> Self {
        self.filename = Some(pattern.into());
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Fresh parameter set for one submission, defaults applied.
    pub fn parameter_set(&self) -> TemplateResult<ParameterSet> {
        Ok(ParameterSet::from_definitions(&self.parameters)?)
    }

    /// Bind submitted values to this template's parameters.
    ///
    /// Either every parameter validates and the bound set is returned, or the
    /// full list of errors is.
    pub fn bind(
        &self,
        postdata: &HashMap<String, String>,
        user: Option<&str>,
    ) -> TemplateResult<ParameterSet> {
        let mut parameters = self.parameter_set()?;
        parameters.bind(postdata, user)?;
        Ok(parameters)
    }

    /// Resolve the staged filename.
    ///
    /// Without a pattern the uploaded filename is used. `seq` is the number
    /// of files already staged under this template, i.e. the zero-based
    /// index of this file.
    pub fn resolve_filename(
        &self,
        values: &HashMap<String, String>,
        uploaded: Option<&str>,
        seq: usize,
    ) -> TemplateResult<String> {
        let base = match (&self.filename, uploaded) {
            (Some(pattern), _) => render_pattern(pattern, values),
            (None, Some(name)) => basename(name).to_string(),
            (None, None) => {
                return Err(TemplateError::InvalidFilename(format!(
                    "template {} has no filename pattern and no filename was given",
                    self.id
                )))
            }
        };
        finish_filename(&base, self.extension.as_deref(), self.unique, seq)
    }

    /// Metadata for a file bound with `parameters`.
    pub fn metadata(&self, parameters: &ParameterSet) -> Metadata {
        let mut metadata = Metadata::new(&self.format).with_template(&self.id);
        metadata.attributes.extend(parameters.value_map());
        metadata
    }
}

/// Role a produced file fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTemplate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub format: String,
    /// Metadata derivation rules, applied in order
    #[serde(default)]
    pub metadata: Vec<MetaRule>,
    /// Converters that may consume this template's format
    #[serde(default)]
    pub converters: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Input template whose files this output derives from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Start from a copy of the parent file's metadata
    #[serde(default)]
    pub copymetadata: bool,
}

impl OutputTemplate {
    pub fn new(id: impl Into<String>, format: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            format: format.into(),
            metadata: Vec::new(),
            converters: Vec::new(),
            unique: false,
            filename: None,
            extension: None,
            parent: None,
            copymetadata: false,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn rule(mut self, rule: impl Into<MetaRule>) -> Self {
        self.metadata.push(rule.into());
        self
    }

    pub fn converter(mut self, converter: impl Into<String>) -> Self {
        self.converters.push(converter.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn filename(mut self, pattern: impl Into<String>) -> Self {
        self.filename = Some(pattern.into());
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn copymetadata(mut self) -> Self {
        self.copymetadata = true;
        self
    }

    /// Derive metadata for an output file from the global parameters and
    /// the parent input file's metadata.
    pub fn generate_metadata(
        &self,
        parameters: &ParameterSet,
        input: Option<&Metadata>,
    ) -> Metadata {
        let mut metadata = Metadata::new(&self.format).with_template(&self.id);
        if self.copymetadata {
            if let Some(input) = input {
                metadata.attributes = input.attributes.clone();
            }
        }
        for rule in &self.metadata {
            let Some(field) = rule.evaluate(parameters) else {
                continue;
            };
            match field.resolve(parameters, input) {
                Some(update) => update.apply(&mut metadata),
                None => debug!(
                    "Metafield {} for output {} has no source value",
                    field.key(),
                    self.id
                ),
            }
        }
        metadata
    }

    /// Resolve the output filename.
    ///
    /// Without a pattern the parent filename is used with its extension
    /// replaced by this template's. Pattern tokens are looked up in `values`.
    pub fn resolve_filename(
        &self,
        values: &HashMap<String, String>,
        parent_filename: Option<&str>,
        seq: usize,
    ) -> TemplateResult<String> {
        let base = match (&self.filename, parent_filename) {
            (Some(pattern), _) => render_pattern(pattern, values),
            (None, Some(parent)) if self.extension.is_some() => {
                strip_extension(basename(parent)).to_string()
            }
            (None, Some(parent)) => basename(parent).to_string(),
            (None, None) => {
                return Err(TemplateError::InvalidFilename(format!(
                    "output template {} has neither a filename pattern nor a parent file",
                    self.id
                )))
            }
        };
        finish_filename(&base, self.extension.as_deref(), self.unique, seq)
    }
}

fn render_pattern(pattern: &str, values: &HashMap<String, String>) -> String {
    TemplateRenderer::new().render_tokens(pattern, |token| values.get(token).cloned())
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Index 0 keeps the bare name so a template holding one file reads the
/// same whether or not it is unique; index n > 0 becomes `name.n.ext`.
fn finish_filename(
    base: &str,
    extension: Option<&str>,
    unique: bool,
    seq: usize,
) -> TemplateResult<String> {
    let mut filename = ensure_extension(base, extension);
    if !unique && seq > 0 {
        filename = insert_sequence(&filename, seq);
    }
    validate_filename(&filename)?;
    Ok(filename)
}

/// Reject names that are empty, hidden, or escape their directory.
pub fn validate_filename(filename: &str) -> TemplateResult<()> {
    let invalid = |reason: &str| Err(TemplateError::InvalidFilename(format!("{}: {}", filename, reason)));
    if filename.is_empty() {
        return invalid("empty filename");
    }
    if filename.starts_with('.') {
        return invalid("filename may not start with a dot");
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains('\0') {
        return invalid("filename may not contain path separators");
    }
    Ok(())
}
