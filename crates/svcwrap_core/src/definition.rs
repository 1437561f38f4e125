//! Service definitions: what the service wraps and what it accepts.
//!
//! A definition is a YAML (or TOML) file. `{{VAR}}` and `{{VAR=default}}`
//! references are substituted from the environment before parsing, and every
//! cross reference is checked before the service is used.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use svcwrap_params::{ParameterGroupDefinition, ParameterSet};
use svcwrap_runner::CommandTemplate;
use svcwrap_templates::{
    find_input_template, find_output_template, ConverterRegistry, ConverterSpec, Format,
    FormatRegistry, InputTemplate, OutputTemplate, Profile, TemplateRenderer,
};

use crate::error::{CoreError, CoreResult};

/// Syntax of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionSyntax {
    Yaml,
    Toml,
}

impl DefinitionSyntax {
    /// `.toml` files are TOML, everything else YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("svcwrap-data")
}

/// A service as declared in its definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub system_id: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub system_description: String,
    /// Storage root; projects live under `<root>/projects`
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub base_url: String,
    /// Command line of the wrapped program
    pub command: CommandTemplate,
    /// Global parameters, in groups
    #[serde(default)]
    pub parameters: Vec<ParameterGroupDefinition>,
    /// Formats in addition to the built-in ones
    #[serde(default)]
    pub formats: Vec<Format>,
    #[serde(default)]
    pub converters: Vec<ConverterSpec>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl ServiceDefinition {
    /// Read a definition file, resolving variables from the environment.
    ///
    /// A relative `root` is taken relative to the file's directory.
    pub fn load(path: &Path) -> CoreResult<Self> {
        debug!("Loading service definition from {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("can not read {}: {}", path.display(), e))
        })?;
        let variables: HashMap<String, String> = std::env::vars().collect();
        let mut definition = Self::parse(&content, DefinitionSyntax::from_path(path), &variables)?;

        if definition.root.is_relative() {
            if let Some(dir) = path.parent() {
                definition.root = dir.join(&definition.root);
            }
        }
        Ok(definition)
    }

    /// Parse definition text after substituting `variables`.
    pub fn parse(
        content: &str,
        syntax: DefinitionSyntax,
        variables: &HashMap<String, String>,
    ) -> CoreResult<Self> {
        let resolved = TemplateRenderer::new()
            .render_variables(content, variables)
            .map_err(|missing| {
                CoreError::Configuration(format!(
                    "unresolved variables without default: {}",
                    missing.join(", ")
                ))
            })?;

        match syntax {
            DefinitionSyntax::Yaml => serde_yaml::from_str(&resolved)
                .map_err(|e| CoreError::Configuration(format!("invalid YAML definition: {}", e))),
            DefinitionSyntax::Toml => toml::from_str(&resolved)
                .map_err(|e| CoreError::Configuration(format!("invalid TOML definition: {}", e))),
        }
    }
}

/// A validated service: the definition plus its resolved registries.
#[derive(Debug, Clone)]
pub struct Service {
    definition: ServiceDefinition,
    formats: FormatRegistry,
    converters: ConverterRegistry,
}

impl Service {
    /// Validate a definition and build its registries.
    pub fn new(definition: ServiceDefinition) -> CoreResult<Self> {
        if definition.system_id.trim().is_empty() {
            return Err(CoreError::Configuration("system_id is empty".to_string()));
        }
        CommandTemplate::new(definition.command.as_str())
            .map_err(|e| CoreError::Configuration(e.to_string()))?;

        let globals = ParameterSet::from_group_definitions(&definition.parameters)
            .map_err(|e| CoreError::Configuration(format!("global parameters: {}", e)))?;
        for parameter in globals.iter() {
            for other in parameter.info.require.iter().chain(&parameter.info.forbid) {
                if !globals.contains(other) {
                    return Err(CoreError::Configuration(format!(
                        "parameter {} refers to unknown parameter {}",
                        parameter.id(),
                        other
                    )));
                }
            }
        }

        let mut formats = FormatRegistry::builtin();
        for format in &definition.formats {
            formats.register(format.clone());
        }

        let mut converters = ConverterRegistry::new();
        let mut seen = HashSet::new();
        for spec in &definition.converters {
            if !seen.insert(spec.id.as_str()) {
                return Err(CoreError::Configuration(format!(
                    "duplicate converter {}",
                    spec.id
                )));
            }
            converters.register_spec(spec.clone());
        }

        for (index, profile) in definition.profiles.iter().enumerate() {
            profile
                .check(&formats, &converters)
                .map_err(|e| CoreError::Configuration(format!("profile {}: {}", index + 1, e)))?;
        }

        info!(
            "Loaded service {} ({} parameters, {} profiles)",
            definition.system_id,
            globals.len(),
            definition.profiles.len()
        );
        Ok(Self {
            definition,
            formats,
            converters,
        })
    }

    /// Load and validate a definition file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::new(ServiceDefinition::load(path)?)
    }

    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.definition.profiles
    }

    /// Fresh global parameters with defaults applied.
    pub fn parameters(&self) -> CoreResult<ParameterSet> {
        Ok(ParameterSet::from_group_definitions(
            &self.definition.parameters,
        )?)
    }

    pub fn input_template(&self, id: &str) -> CoreResult<&InputTemplate> {
        find_input_template(self.profiles(), id)
            .ok_or_else(|| CoreError::NotFound(format!("input template {}", id)))
    }

    pub fn output_template(&self, id: &str) -> CoreResult<&OutputTemplate> {
        find_output_template(self.profiles(), id)
            .ok_or_else(|| CoreError::NotFound(format!("output template {}", id)))
    }

    /// Formats accepted by any input template, in declaration order.
    pub fn input_formats(&self) -> Vec<&Format> {
        let names = self
            .profiles()
            .iter()
            .flat_map(|p| p.input.iter().map(|t| t.format.as_str()));
        self.distinct_formats(names)
    }

    /// Formats produced by any output template, in declaration order.
    pub fn output_formats(&self) -> Vec<&Format> {
        let names = self
            .profiles()
            .iter()
            .flat_map(|p| p.output.iter().map(|t| t.format.as_str()));
        self.distinct_formats(names)
    }

    fn distinct_formats<'a>(&'a self, names: impl Iterator<Item = &'a str>) -> Vec<&'a Format> {
        let mut seen = HashSet::new();
        names
            .filter(|name| seen.insert(*name))
            .filter_map(|name| self.formats.get(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEFINITION: &str = r#"
system_id: "{{SVC_ID}}"
system_name: Word counter
root: "{{SVC_ROOT=data}}"
command: "wc -w $INPUTDIRECTORY/* > $OUTPUTDIRECTORY/count.txt"
parameters:
  - name: Options
    parameters:
      - id: lines
        name: Count lines
        type: boolean
        flag: "-l"
profiles:
  - input:
      - id: text
        format: PlainTextFormat
        extension: txt
    output:
      - id: count
        format: PlainTextFormat
        filename: count.txt
        unique: true
"#;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_with_variables() {
        let definition =
            ServiceDefinition::parse(DEFINITION, DefinitionSyntax::Yaml, &vars(&[("SVC_ID", "wc")]))
                .unwrap();
        assert_eq!(definition.system_id, "wc");
        assert_eq!(definition.root, PathBuf::from("data"));

        let service = Service::new(definition).unwrap();
        assert_eq!(service.parameters().unwrap().len(), 1);
        assert_eq!(service.input_formats().len(), 1);
        assert!(service.input_template("text").is_ok());
        assert!(matches!(
            service.input_template("nope"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_unresolved_variable_is_fatal() {
        let result = ServiceDefinition::parse(DEFINITION, DefinitionSyntax::Yaml, &HashMap::new());
        match result {
            Err(CoreError::Configuration(message)) => assert!(message.contains("SVC_ID")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_resolves_relative_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("service.yaml");
        fs::write(&path, DEFINITION.replace("{{SVC_ID}}", "wc")).unwrap();

        let definition = ServiceDefinition::load(&path).unwrap();
        assert_eq!(definition.root, dir.path().join("data"));
    }

    #[test]
    fn test_toml_definition() {
        let content = r#"
system_id = "echo"
command = "echo $PARAMETERS"

[[parameters]]
name = "Main"

[[parameters.parameters]]
id = "n"
name = "Count"
type = "integer"
minimum = 1
maximum = 5
"#;
        let definition =
            ServiceDefinition::parse(content, DefinitionSyntax::Toml, &HashMap::new()).unwrap();
        let service = Service::new(definition).unwrap();
        assert!(service.parameters().unwrap().contains("n"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let content = DEFINITION
            .replace("{{SVC_ID}}", "wc")
            .replace("format: PlainTextFormat\n        extension", "format: WordFormat\n        extension");
        let definition =
            ServiceDefinition::parse(&content, DefinitionSyntax::Yaml, &HashMap::new()).unwrap();
        assert!(matches!(
            Service::new(definition),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_dangling_constraint_rejected() {
        let content = DEFINITION
            .replace("{{SVC_ID}}", "wc")
            .replace("flag: \"-l\"", "flag: \"-l\"\n        require: [words]");
        let definition =
            ServiceDefinition::parse(&content, DefinitionSyntax::Yaml, &HashMap::new()).unwrap();
        assert!(matches!(
            Service::new(definition),
            Err(CoreError::Configuration(_))
        ));
    }
}
