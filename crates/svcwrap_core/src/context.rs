//! Service context passed to the project manager.

use std::path::{Path, PathBuf};

use crate::definition::ServiceDefinition;

/// Runtime settings of one service instance.
///
/// Built once at startup and handed to the components that need it; there
/// is no process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContext {
    /// Storage root
    pub root: PathBuf,
    pub base_url: String,
    /// Keep temporary files and log compiled commands at info level
    pub debug: bool,
}

impl ServiceContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_url: String::new(),
            debug: false,
        }
    }

    /// Context with the root and base URL from a definition.
    pub fn from_definition(definition: &ServiceDefinition) -> Self {
        Self::new(&definition.root).with_base_url(&definition.base_url)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Directory holding one subdirectory per project.
    pub fn projects_path(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn project_path(&self, id: &str) -> PathBuf {
        self.projects_path().join(id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let ctx = ServiceContext::new("/srv/wc").with_debug(true);
        assert_eq!(ctx.projects_path(), PathBuf::from("/srv/wc/projects"));
        assert_eq!(ctx.project_path("p1"), PathBuf::from("/srv/wc/projects/p1"));
        assert!(ctx.debug);
    }
}
