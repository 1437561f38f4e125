//! Ordered, grouped parameter collections.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ParamError, ParamResult, ValidationErrors};
use crate::parameter::{Parameter, ParameterDefinition};
use crate::value::ParameterValue;

/// A named group of parameter definitions, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroupDefinition {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

/// A named group of parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGroup {
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl ParameterGroup {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

/// An ordered collection of parameters, optionally split into groups.
///
/// Identifiers are unique across all groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    groups: Vec<ParameterGroup>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single unnamed group.
    pub fn from_parameters(parameters: Vec<Parameter>) -> ParamResult<Self> {
        Self::from_groups(vec![ParameterGroup::new("", parameters)])
    }

    pub fn from_groups(groups: Vec<ParameterGroup>) -> ParamResult<Self> {
        let mut seen = HashSet::new();
        for group in &groups {
            for parameter in &group.parameters {
                if !seen.insert(parameter.id().to_string()) {
                    return Err(ParamError::Duplicate(parameter.id().to_string()));
                }
            }
        }
        Ok(Self { groups })
    }

    pub fn from_definitions(definitions: &[ParameterDefinition]) -> ParamResult<Self> {
        Self::from_parameters(definitions.iter().cloned().map(Parameter::new).collect())
    }

    pub fn from_group_definitions(definitions: &[ParameterGroupDefinition]) -> ParamResult<Self> {
        let groups = definitions
            .iter()
            .map(|g| {
                ParameterGroup::new(
                    g.name.clone(),
                    g.parameters.iter().cloned().map(Parameter::new).collect(),
                )
            })
            .collect();
        Self::from_groups(groups)
    }

    /// Append a parameter to the last group.
    pub fn push(&mut self, parameter: Parameter) -> ParamResult<()> {
        if self.contains(parameter.id()) {
            return Err(ParamError::Duplicate(parameter.id().to_string()));
        }
        match self.groups.last_mut() {
            Some(group) => group.parameters.push(parameter),
            None => self.groups.push(ParameterGroup::new("", vec![parameter])),
        }
        Ok(())
    }

    pub fn groups(&self) -> &[ParameterGroup] {
        &self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.groups.iter().flat_map(|g| g.parameters.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.groups.iter_mut().flat_map(|g| g.parameters.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.parameters.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.iter().find(|p| p.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.iter_mut().find(|p| p.id() == id)
    }

    pub fn get_required(&self, id: &str) -> ParamResult<&Parameter> {
        self.get(id)
            .ok_or_else(|| ParamError::NotFound(id.to_string()))
    }

    pub fn value(&self, id: &str) -> Option<&ParameterValue> {
        self.get(id).and_then(|p| p.value())
    }

    /// Bind raw post data to every parameter in the set.
    ///
    /// All errors are collected. Nothing is bound unless the whole
    /// submission is valid; on failure only the per-parameter error
    /// messages are updated.
    pub fn bind(
        &mut self,
        postdata: &HashMap<String, String>,
        user: Option<&str>,
    ) -> Result<(), ValidationErrors> {
        let mut candidate = self.clone();
        let mut errors = ValidationErrors::new();

        for parameter in candidate.iter_mut() {
            let Some(raw) = parameter.value_from_postdata(postdata) else {
                continue;
            };
            if !parameter.access(user) {
                let message = "Access denied".to_string();
                parameter.record_error(Some(message.clone()));
                errors.add_message(parameter.id(), message);
                continue;
            }
            if let Err(e) = parameter.set(raw) {
                errors.add(e);
            }
        }

        // A rejected value already explains why a required parameter is unset.
        for missing in candidate.check_required().errors {
            if errors.for_parameter(&missing.parameter).is_empty() {
                errors.add(missing);
            }
        }
        errors.merge(candidate.check_constraints());

        if errors.is_empty() {
            debug!("Bound {} parameters", candidate.len());
            *self = candidate;
            return Ok(());
        }

        for parameter in self.iter_mut() {
            let messages = errors.for_parameter(parameter.id());
            let message = if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            };
            parameter.record_error(message);
        }
        Err(errors)
    }

    /// Required parameters without a value.
    pub fn check_required(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for parameter in self.iter() {
            if parameter.info.required && !parameter.has_value() {
                errors.add_message(parameter.id(), "Required parameter is not set");
            }
        }
        errors
    }

    /// Evaluate `require`/`forbid` between constrainable parameters.
    pub fn check_constraints(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for parameter in self.iter().filter(|p| p.constrainable()) {
            for other in &parameter.info.require {
                if !self.get(other).map_or(false, |p| p.constrainable()) {
                    errors.add_message(
                        parameter.id(),
                        format!("{} requires {} to be set", parameter.id(), other),
                    );
                }
            }
            for other in &parameter.info.forbid {
                if self.get(other).map_or(false, |p| p.constrainable()) {
                    errors.add_message(
                        parameter.id(),
                        format!("{} can not be combined with {}", parameter.id(), other),
                    );
                }
            }
        }
        errors
    }

    /// Compiled command-line tokens in declaration order.
    pub fn compile_args(&self) -> Vec<String> {
        self.iter().filter_map(|p| p.compile_arg()).collect()
    }

    /// Identifiers and messages of parameters currently in error.
    pub fn errors(&self) -> Vec<(&str, &str)> {
        self.iter()
            .filter_map(|p| p.error().map(|e| (p.id(), e)))
            .collect()
    }

    /// String view of all bound values, for token substitution.
    pub fn value_map(&self) -> HashMap<String, String> {
        self.iter()
            .filter_map(|p| p.value().map(|v| (p.id().to_string(), v.to_string())))
            .collect()
    }

    /// Merge another set's groups after this one's.
    pub fn extend(&mut self, other: ParameterSet) -> ParamResult<()> {
        for group in &other.groups {
            for parameter in &group.parameters {
                if self.contains(parameter.id()) {
                    return Err(ParamError::Duplicate(parameter.id().to_string()));
                }
            }
        }
        self.groups.extend(other.groups);
        Ok(())
    }
}
