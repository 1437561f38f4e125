//! Per-file metadata and its JSON sidecar.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TemplateResult;

/// Metadata attached to a staged input or predicted output file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the format the file conforms to
    pub format: String,
    /// Template the file was staged or produced under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.attributes.remove(key)
    }

    /// Sidecar location for `file`: `dir/.name.METADATA`.
    pub fn sidecar_path(file: &Path) -> PathBuf {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        file.with_file_name(format!(".{}.METADATA", name))
    }

    /// Write the sidecar for `file`.
    pub fn save(&self, file: &Path) -> TemplateResult<()> {
        let path = Self::sidecar_path(file);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        debug!("Saved metadata to {:?}", path);
        Ok(())
    }

    /// Read the sidecar for `file`, if there is one.
    pub fn load(file: &Path) -> TemplateResult<Option<Self>> {
        let path = Self::sidecar_path(file);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove the sidecar for `file`, ignoring a missing one.
    pub fn remove_sidecar(file: &Path) -> TemplateResult<()> {
        let path = Self::sidecar_path(file);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
