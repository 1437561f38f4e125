//! Template, metadata rule and profile elements.

use svcwrap_templates::{
    ConditionValue, InputTemplate, MetaField, MetaRule, OutputTemplate, ParameterCondition, Profile,
};

use crate::dom::Element;
use crate::error::{WireError, WireResult};
use crate::parameter::{encode_definition, ParameterCodec};

pub fn encode_input_template(template: &InputTemplate) -> Element {
    Element::new("InputTemplate")
        .attr("id", &template.id)
        .attr("label", &template.label)
        .attr("format", &template.format)
        .flag("unique", template.unique)
        .flag("optional", template.optional)
        .attr_opt("filename", template.filename.as_ref())
        .attr_opt("extension", template.extension.as_ref())
        .children(encode_converters(&template.converters))
        .children(
            template
                .parameters
                .iter()
                .map(|d| encode_definition(&d.info, &d.kind)),
        )
}

pub fn decode_input_template(codec: &ParameterCodec, element: &Element) -> WireResult<InputTemplate> {
    expect_tag(element, "InputTemplate")?;
    let parameters = codec
        .decode_list(element)?
        .iter()
        .map(|p| p.definition())
        .collect();
    Ok(InputTemplate {
        id: element.require("id")?.to_string(),
        label: element.get("label").unwrap_or("").to_string(),
        format: element.require("format")?.to_string(),
        parameters,
        converters: decode_converters(element)?,
        unique: element.get_flag("unique"),
        optional: element.get_flag("optional"),
        filename: element.get("filename").map(str::to_string),
        extension: element.get("extension").map(str::to_string),
    })
}

pub fn encode_output_template(template: &OutputTemplate) -> Element {
    Element::new("OutputTemplate")
        .attr("id", &template.id)
        .attr("label", &template.label)
        .attr("format", &template.format)
        .flag("unique", template.unique)
        .attr_opt("filename", template.filename.as_ref())
        .attr_opt("extension", template.extension.as_ref())
        .attr_opt("parent", template.parent.as_ref())
        .flag("copymetadata", template.copymetadata)
        .children(encode_converters(&template.converters))
        .children(template.metadata.iter().map(encode_rule))
}

pub fn decode_output_template(element: &Element) -> WireResult<OutputTemplate> {
    expect_tag(element, "OutputTemplate")?;
    let metadata = element
        .children
        .iter()
        .filter(|c| c.name != "converter")
        .map(decode_rule)
        .collect::<WireResult<Vec<_>>>()?;
    Ok(OutputTemplate {
        id: element.require("id")?.to_string(),
        label: element.get("label").unwrap_or("").to_string(),
        format: element.require("format")?.to_string(),
        metadata,
        converters: decode_converters(element)?,
        unique: element.get_flag("unique"),
        filename: element.get("filename").map(str::to_string),
        extension: element.get("extension").map(str::to_string),
        parent: element.get("parent").map(str::to_string),
        copymetadata: element.get_flag("copymetadata"),
    })
}

pub fn encode_profile(profile: &Profile) -> Element {
    Element::new("profile")
        .child(Element::new("input").children(profile.input.iter().map(encode_input_template)))
        .child(Element::new("output").children(profile.output.iter().map(encode_output_template)))
}

pub fn decode_profile(codec: &ParameterCodec, element: &Element) -> WireResult<Profile> {
    expect_tag(element, "profile")?;
    let input = match element.find("input") {
        Some(list) => list
            .children
            .iter()
            .map(|e| decode_input_template(codec, e))
            .collect::<WireResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    let output = match element.find("output") {
        Some(list) => list
            .children
            .iter()
            .map(decode_output_template)
            .collect::<WireResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(Profile::new(input, output))
}

pub fn encode_rule(rule: &MetaRule) -> Element {
    match rule {
        MetaRule::Field(field) => encode_field(field),
        MetaRule::Condition(condition) => {
            let mut element = Element::new("ParameterCondition");
            for (parameter, expected) in &condition.when {
                let kind = match expected {
                    ConditionValue::Flag(_) => "flag",
                    ConditionValue::Integer(_) => "integer",
                    ConditionValue::Float(_) => "float",
                    ConditionValue::Text(_) => "text",
                };
                element = element.child(
                    Element::new("when")
                        .attr("parameter", parameter)
                        .attr("type", kind)
                        .attr("value", expected),
                );
            }
            element = element.child(Element::new("then").child(encode_rule(&condition.then)));
            if let Some(otherwise) = &condition.otherwise {
                element = element.child(Element::new("otherwise").child(encode_rule(otherwise)));
            }
            element
        }
    }
}

fn encode_field(field: &MetaField) -> Element {
    match field {
        MetaField::Set { key, value } => Element::new("SetMetaField")
            .attr("key", key)
            .attr("value", value),
        MetaField::Unset { key } => Element::new("UnsetMetaField").attr("key", key),
        MetaField::Parameter { key, parameter } => Element::new("ParameterMetaField")
            .attr("key", key)
            .attr("parameter", parameter),
        MetaField::Copy { key, source } => Element::new("CopyMetaField")
            .attr("key", key)
            .attr_opt("source", source.as_ref()),
    }
}

pub fn decode_rule(element: &Element) -> WireResult<MetaRule> {
    let key = || element.require("key").map(str::to_string);
    let field = match element.name.as_str() {
        "SetMetaField" => MetaField::Set {
            key: key()?,
            value: element.get("value").unwrap_or("").to_string(),
        },
        "UnsetMetaField" => MetaField::Unset { key: key()? },
        "ParameterMetaField" => MetaField::Parameter {
            key: key()?,
            parameter: element.require("parameter")?.to_string(),
        },
        "CopyMetaField" => MetaField::Copy {
            key: key()?,
            source: element.get("source").map(str::to_string),
        },
        "ParameterCondition" => return decode_condition(element).map(MetaRule::Condition),
        other => return Err(WireError::UnknownTag(other.to_string())),
    };
    Ok(MetaRule::Field(field))
}

fn decode_condition(element: &Element) -> WireResult<ParameterCondition> {
    let branch = |name: &str| -> WireResult<Option<MetaRule>> {
        match element.find(name) {
            None => Ok(None),
            Some(wrapper) => match wrapper.children.first() {
                Some(rule) => decode_rule(rule).map(Some),
                None => Err(WireError::Format(format!("empty <{}> branch", name))),
            },
        }
    };

    let then = branch("then")?
        .ok_or_else(|| WireError::Format("condition without <then> branch".to_string()))?;
    let mut condition = ParameterCondition::new(then);
    if let Some(otherwise) = branch("otherwise")? {
        condition = condition.otherwise(otherwise);
    }

    for check in element.find_all("when") {
        let parameter = check.require("parameter")?;
        let raw = check.require("value")?;
        let invalid = || WireError::InvalidAttribute {
            element: "when".to_string(),
            attribute: "value".to_string(),
            value: raw.to_string(),
        };
        let expected = match check.get("type").unwrap_or("text") {
            "flag" => ConditionValue::Flag(raw.parse().map_err(|_| invalid())?),
            "integer" => ConditionValue::Integer(raw.parse().map_err(|_| invalid())?),
            "float" => ConditionValue::Float(raw.parse().map_err(|_| invalid())?),
            _ => ConditionValue::Text(raw.to_string()),
        };
        condition = condition.when(parameter, expected);
    }
    Ok(condition)
}

fn encode_converters(converters: &[String]) -> Vec<Element> {
    converters
        .iter()
        .map(|id| Element::new("converter").attr("id", id))
        .collect()
}

fn decode_converters(element: &Element) -> WireResult<Vec<String>> {
    element
        .find_all("converter")
        .map(|c| c.require("id").map(str::to_string))
        .collect()
}

fn expect_tag(element: &Element, tag: &str) -> WireResult<()> {
    if element.name == tag {
        Ok(())
    } else {
        Err(WireError::Format(format!(
            "expected <{}>, found <{}>",
            tag, element.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_condition_roundtrip() {
        let rule: MetaRule = ParameterCondition::new(
            ParameterCondition::new(MetaField::Set {
                key: "case".to_string(),
                value: "lower".to_string(),
            })
            .when("level", ConditionValue::Integer(2)),
        )
        .when("lowercase", ConditionValue::Flag(true))
        .when("lang", ConditionValue::Text("nl".to_string()))
        .otherwise(MetaField::Copy {
            key: "case".to_string(),
            source: None,
        })
        .into();

        let element = encode_rule(&rule);
        assert_eq!(element.find_all("when").count(), 2);
        assert_eq!(decode_rule(&element).unwrap(), rule);
    }

    #[test]
    fn test_condition_requires_then() {
        let element = Element::new("ParameterCondition")
            .child(Element::new("when").attr("parameter", "x").attr("value", "true"));
        assert!(matches!(decode_rule(&element), Err(WireError::Format(_))));
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let element = Element::new("OrCondition");
        assert!(matches!(decode_rule(&element), Err(WireError::UnknownTag(_))));
    }
}
