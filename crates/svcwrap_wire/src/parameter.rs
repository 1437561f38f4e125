//! Parameter elements.
//!
//! Each variant is written under its own tag (`BooleanParameter`,
//! `ChoiceParameter`, ...). Reading goes through [`ParameterCodec`], a fixed
//! table from tag to the function that rebuilds the variant's options.

use std::collections::HashMap;

use svcwrap_params::{
    BooleanOptions, Choice, ChoiceOptions, ChoiceSelection, FloatOptions, IntegerOptions,
    Parameter, ParameterDefinition, ParameterGroup, ParameterInfo, ParameterKind, ParameterSet,
    ParameterValue, StaticOptions, StringOptions,
};

use crate::dom::Element;
use crate::error::{WireError, WireResult};

type KindDecoder = fn(&Element) -> WireResult<ParameterKind>;

/// Tag to variant decoder table.
#[derive(Clone)]
pub struct ParameterCodec {
    decoders: HashMap<&'static str, KindDecoder>,
}

impl std::fmt::Debug for ParameterCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("ParameterCodec").field("tags", &tags).finish()
    }
}

impl Default for ParameterCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterCodec {
    pub fn new() -> Self {
        let mut decoders: HashMap<&'static str, KindDecoder> = HashMap::new();
        decoders.insert("BooleanParameter", decode_boolean);
        decoders.insert("StringParameter", decode_string);
        decoders.insert("TextParameter", decode_text);
        decoders.insert("IntegerParameter", decode_integer);
        decoders.insert("FloatParameter", decode_float);
        decoders.insert("ChoiceParameter", decode_choice);
        decoders.insert("StaticParameter", decode_static);
        Self { decoders }
    }

    pub fn is_parameter_tag(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Rebuild a parameter, including its bound value and error.
    pub fn decode(&self, element: &Element) -> WireResult<Parameter> {
        let decoder = self
            .decoders
            .get(element.name.as_str())
            .ok_or_else(|| WireError::UnknownTag(element.name.clone()))?;
        let info = decode_info(element)?;
        let kind = decoder(element)?;
        let value = decode_value(&kind, element)?;
        let error = element.get("error").map(str::to_string);

        let mut parameter = Parameter::new(ParameterDefinition::new(info, kind));
        parameter.restore(value, error);
        Ok(parameter)
    }

    /// Decode a `<parametergroup>` list into a set.
    pub fn decode_set(&self, parent: &Element) -> WireResult<ParameterSet> {
        let mut groups = Vec::new();
        for group in parent.find_all("parametergroup") {
            let parameters = group
                .children
                .iter()
                .map(|e| self.decode(e))
                .collect::<WireResult<Vec<_>>>()?;
            groups.push(ParameterGroup::new(group.get("name").unwrap_or(""), parameters));
        }
        Ok(ParameterSet::from_groups(groups)?)
    }

    /// Decode parameter elements that sit directly under `parent`.
    pub fn decode_list(&self, parent: &Element) -> WireResult<Vec<Parameter>> {
        parent
            .children
            .iter()
            .filter(|e| self.is_parameter_tag(&e.name))
            .map(|e| self.decode(e))
            .collect()
    }
}

/// Serialize a parameter with its current value and error.
pub fn encode_parameter(parameter: &Parameter) -> Element {
    let mut element = encode_definition(&parameter.info, &parameter.kind);

    match (&parameter.kind, parameter.value()) {
        (_, None) => {}
        (ParameterKind::Choice(options), Some(ParameterValue::List(keys))) => {
            element = element.attr("value", keys.join(&options.delimiter));
        }
        (_, Some(value)) => element = element.attr("value", value),
    }
    element = element.attr_opt("error", parameter.error());

    let selected = selected_keys(parameter.value());
    for choice in element.children.iter_mut().filter(|c| c.name == "choice") {
        let marked = choice.get("id").map_or(false, |id| selected.contains(&id));
        if marked {
            choice.attributes.push(("selected".to_string(), "yes".to_string()));
        }
    }
    element
}

/// Serialize a definition without any bound state.
pub fn encode_definition(info: &ParameterInfo, kind: &ParameterKind) -> Element {
    let mut element = Element::new(kind.tag())
        .attr("id", &info.id)
        .attr("name", &info.name)
        .attr("description", &info.description)
        .attr_opt("flag", info.flag.as_ref())
        .flag("nospace", info.nospace)
        .flag("required", info.required);
    for (key, list) in [
        ("allowusers", &info.allowusers),
        ("denyusers", &info.denyusers),
        ("require", &info.require),
        ("forbid", &info.forbid),
    ] {
        if !list.is_empty() {
            element = element.attr(key, list.join(","));
        }
    }

    match kind {
        ParameterKind::Boolean(options) => element
            .flag("reverse", options.reverse)
            .attr_opt("default", options.default),
        ParameterKind::String(options) | ParameterKind::Text(options) => element
            .attr("maxlength", options.maxlength)
            .attr_opt("default", options.default.as_ref()),
        ParameterKind::Integer(options) => element
            .attr("minimum", options.minimum)
            .attr("maximum", options.maximum)
            .attr_opt("default", options.default),
        ParameterKind::Float(options) => element
            .attr("minimum", options.minimum)
            .attr("maximum", options.maximum)
            .attr_opt("default", options.default),
        ParameterKind::Choice(options) => {
            let default = options.default.as_ref().map(|selection| match selection {
                ChoiceSelection::One(key) => key.clone(),
                ChoiceSelection::Many(keys) => keys.join(&options.delimiter),
            });
            element
                .flag("multi", options.multi)
                .attr("delimiter", &options.delimiter)
                .attr_opt("default", default)
                .children(options.choices.iter().map(|choice| {
                    Element::new("choice")
                        .attr("id", &choice.key)
                        .text(&choice.label)
                }))
        }
        ParameterKind::Static(options) => element
            .attr("staticvalue", &options.value)
            .attr("valuetype", value_type(&options.value)),
    }
}

/// Serialize a set as `<parametergroup>` elements.
pub fn encode_set(set: &ParameterSet) -> Vec<Element> {
    set.groups()
        .iter()
        .map(|group| {
            Element::new("parametergroup")
                .attr("name", &group.name)
                .children(group.parameters.iter().map(encode_parameter))
        })
        .collect()
}

fn selected_keys(value: Option<&ParameterValue>) -> Vec<&str> {
    match value {
        Some(ParameterValue::Text(key)) => vec![key.as_str()],
        Some(ParameterValue::List(keys)) => keys.iter().map(|k| k.as_str()).collect(),
        _ => Vec::new(),
    }
}

fn split(raw: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return vec![raw.to_string()];
    }
    raw.split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn decode_info(element: &Element) -> WireResult<ParameterInfo> {
    let list = |key: &str| element.get(key).map(|raw| split(raw, ",")).unwrap_or_default();
    Ok(ParameterInfo {
        id: element.require("id")?.to_string(),
        name: element.get("name").unwrap_or("").to_string(),
        description: element.get("description").unwrap_or("").to_string(),
        flag: element.get("flag").map(str::to_string),
        nospace: element.get_flag("nospace"),
        required: element.get_flag("required"),
        allowusers: list("allowusers"),
        denyusers: list("denyusers"),
        require: list("require"),
        forbid: list("forbid"),
    })
}

fn decode_boolean(element: &Element) -> WireResult<ParameterKind> {
    Ok(ParameterKind::Boolean(BooleanOptions {
        reverse: element.get_flag("reverse"),
        default: element.parse("default")?,
    }))
}

fn string_options(element: &Element) -> WireResult<StringOptions> {
    Ok(StringOptions {
        maxlength: element.parse("maxlength")?.unwrap_or(0),
        default: element.get("default").map(str::to_string),
    })
}

fn decode_string(element: &Element) -> WireResult<ParameterKind> {
    Ok(ParameterKind::String(string_options(element)?))
}

fn decode_text(element: &Element) -> WireResult<ParameterKind> {
    Ok(ParameterKind::Text(string_options(element)?))
}

fn decode_integer(element: &Element) -> WireResult<ParameterKind> {
    Ok(ParameterKind::Integer(IntegerOptions {
        minimum: element.parse("minimum")?.unwrap_or(0),
        maximum: element.parse("maximum")?.unwrap_or(0),
        default: element.parse("default")?,
    }))
}

fn decode_float(element: &Element) -> WireResult<ParameterKind> {
    Ok(ParameterKind::Float(FloatOptions {
        minimum: element.parse("minimum")?.unwrap_or(0.0),
        maximum: element.parse("maximum")?.unwrap_or(0.0),
        default: element.parse("default")?,
    }))
}

fn decode_choice(element: &Element) -> WireResult<ParameterKind> {
    let choices = element
        .find_all("choice")
        .map(|c| Ok(Choice::new(c.require("id")?, c.text.as_str())))
        .collect::<WireResult<Vec<_>>>()?;
    let multi = element.get_flag("multi");
    let mut options = ChoiceOptions::new(choices);
    options.multi = multi;
    if let Some(delimiter) = element.get("delimiter") {
        options.delimiter = delimiter.to_string();
    }
    options.default = element.get("default").map(|raw| {
        if multi {
            ChoiceSelection::Many(split(raw, &options.delimiter))
        } else {
            ChoiceSelection::One(raw.to_string())
        }
    });
    Ok(ParameterKind::Choice(options))
}

fn value_type(value: &ParameterValue) -> &'static str {
    match value {
        ParameterValue::Bool(_) => "bool",
        ParameterValue::Integer(_) => "integer",
        ParameterValue::Float(_) => "float",
        ParameterValue::Text(_) => "text",
        ParameterValue::List(_) => "list",
    }
}

/// Static values carry their type; without one they are text.
fn decode_static(element: &Element) -> WireResult<ParameterKind> {
    let raw = element.require("staticvalue")?;
    let invalid = || WireError::InvalidAttribute {
        element: element.name.clone(),
        attribute: "staticvalue".to_string(),
        value: raw.to_string(),
    };
    let value = match element.get("valuetype").unwrap_or("text") {
        "bool" => ParameterValue::Bool(raw.parse().map_err(|_| invalid())?),
        "integer" => ParameterValue::Integer(raw.parse().map_err(|_| invalid())?),
        "float" => ParameterValue::Float(raw.parse().map_err(|_| invalid())?),
        "text" => ParameterValue::Text(raw.to_string()),
        "list" => ParameterValue::List(split(raw, ",")),
        other => {
            return Err(WireError::InvalidAttribute {
                element: element.name.clone(),
                attribute: "valuetype".to_string(),
                value: other.to_string(),
            })
        }
    };
    Ok(ParameterKind::Static(StaticOptions { value }))
}

fn decode_value(kind: &ParameterKind, element: &Element) -> WireResult<Option<ParameterValue>> {
    let invalid = |raw: &str| WireError::InvalidAttribute {
        element: element.name.clone(),
        attribute: "value".to_string(),
        value: raw.to_string(),
    };

    let Some(raw) = element.get("value") else {
        // Choices may only carry selection markers.
        if let ParameterKind::Choice(options) = kind {
            let selected: Vec<String> = element
                .find_all("choice")
                .filter(|c| c.get_flag("selected"))
                .filter_map(|c| c.get("id").map(str::to_string))
                .collect();
            return Ok(match (options.multi, selected.len()) {
                (_, 0) => None,
                (true, _) => Some(ParameterValue::List(selected)),
                (false, _) => selected.into_iter().next().map(ParameterValue::Text),
            });
        }
        return Ok(None);
    };

    let value = match kind {
        ParameterKind::Boolean(_) => match raw {
            "true" | "yes" | "1" => ParameterValue::Bool(true),
            "false" | "no" | "0" => ParameterValue::Bool(false),
            _ => return Err(invalid(raw)),
        },
        ParameterKind::String(_) | ParameterKind::Text(_) => ParameterValue::Text(raw.to_string()),
        ParameterKind::Integer(_) => {
            ParameterValue::Integer(raw.parse().map_err(|_| invalid(raw))?)
        }
        ParameterKind::Float(_) => ParameterValue::Float(raw.parse().map_err(|_| invalid(raw))?),
        ParameterKind::Choice(options) if options.multi => {
            ParameterValue::List(split(raw, &options.delimiter))
        }
        ParameterKind::Choice(_) => ParameterValue::Text(raw.to_string()),
        ParameterKind::Static(options) => options.value.clone(),
    };
    Ok(Some(value))
}
