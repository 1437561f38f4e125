//! Profiles: which inputs a run needs and which outputs it produces.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::converter::ConverterRegistry;
use crate::error::{TemplateError, TemplateResult};
use crate::format::FormatRegistry;
use crate::template::{InputTemplate, OutputTemplate};

/// A set of input templates together with the outputs they lead to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub input: Vec<InputTemplate>,
    #[serde(default)]
    pub output: Vec<OutputTemplate>,
}

impl Profile {
    pub fn new(input: Vec<InputTemplate>, output: Vec<OutputTemplate>) -> Self {
        Self { input, output }
    }

    pub fn input_template(&self, id: &str) -> Option<&InputTemplate> {
        self.input.iter().find(|t| t.id == id)
    }

    pub fn output_template(&self, id: &str) -> Option<&OutputTemplate> {
        self.output.iter().find(|t| t.id == id)
    }

    /// Whether the staged files satisfy this profile. `staged` maps input
    /// template ids to the number of files staged under them.
    pub fn matches(&self, staged: &HashMap<String, usize>) -> bool {
        self.input.iter().all(|template| {
            let count = staged.get(&template.id).copied().unwrap_or(0);
            match (template.optional, template.unique) {
                (_, true) if count > 1 => false,
                (true, _) => true,
                (false, _) => count >= 1,
            }
        })
    }

    /// Check that every referenced format, converter and parent exists.
    pub fn check(
        &self,
        formats: &FormatRegistry,
        converters: &ConverterRegistry,
    ) -> TemplateResult<()> {
        let mut seen = HashSet::new();
        for template in &self.input {
            if !seen.insert(template.id.as_str()) {
                return Err(invalid(&template.id, "duplicate template id"));
            }
            formats.get_required(&template.format)?;
            for converter in &template.converters {
                converters.get_required(converter)?.check_input(&template.format)?;
            }
        }
        for template in &self.output {
            if !seen.insert(template.id.as_str()) {
                return Err(invalid(&template.id, "duplicate template id"));
            }
            formats.get_required(&template.format)?;
            for converter in &template.converters {
                converters.get_required(converter)?.check_output(&template.format)?;
            }
            if let Some(parent) = &template.parent {
                if self.input_template(parent).is_none() {
                    return Err(invalid(
                        &template.id,
                        &format!("parent {} is not an input template of this profile", parent),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn invalid(template: &str, message: &str) -> TemplateError {
    TemplateError::InvalidTemplate {
        template: template.to_string(),
        message: message.to_string(),
    }
}

/// Find an input template by id across profiles.
pub fn find_input_template<'a>(profiles: &'a [Profile], id: &str) -> Option<&'a InputTemplate> {
    profiles.iter().find_map(|p| p.input_template(id))
}

/// Find an output template by id across profiles.
pub fn find_output_template<'a>(profiles: &'a [Profile], id: &str) -> Option<&'a OutputTemplate> {
    profiles.iter().find_map(|p| p.output_template(id))
}
