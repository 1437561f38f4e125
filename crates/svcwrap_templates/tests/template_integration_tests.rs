//! Integration tests for formats, templates and metadata rules.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use svcwrap_params::{BooleanOptions, Parameter, ParameterInfo, ParameterSet};
use svcwrap_templates::{
    ConditionValue, Converter, ConverterRegistry, ConverterSpec, CopyBackend, FormatRegistry,
    InputTemplate, MetaField, Metadata, OutputTemplate, ParameterCondition, Profile,
    TemplateError,
};
use tempfile::tempdir;

const PROFILE_YAML: &str = r#"
input:
  - id: text
    label: Text document
    format: PlainTextFormat
    extension: txt
    filename: "test.$encoding.$language.txt"
    parameters:
      - id: encoding
        name: Encoding
        type: string
        required: true
        default: utf-8
      - id: language
        name: Language
        type: choice
        choices:
          - { key: en, label: English }
          - { key: fr, label: French }
output:
  - id: tokens
    format: XMLFormat
    parent: text
    extension: xml
    copymetadata: true
    metadata:
      - rule: set
        key: tokenizer
        value: simple
      - when: { lowercase: true }
        then: { rule: set, key: case, value: lower }
        otherwise: { rule: set, key: case, value: mixed }
"#;

fn post(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn globals(lowercase: Option<bool>) -> ParameterSet {
    let mut p = Parameter::boolean(
        ParameterInfo::new("lowercase", "Lowercase").flag("-l"),
        BooleanOptions::default(),
    );
    if let Some(value) = lowercase {
        p.set(value).unwrap();
    }
    ParameterSet::from_parameters(vec![p]).unwrap()
}

#[test]
fn test_profile_from_yaml() {
    let profile: Profile = serde_yaml::from_str(PROFILE_YAML).unwrap();
    assert_eq!(profile.input.len(), 1);
    assert_eq!(profile.output.len(), 1);
    assert!(profile
        .check(&FormatRegistry::builtin(), &ConverterRegistry::new())
        .is_ok());
}

#[test]
fn test_bind_and_resolve_input_filename() {
    let profile: Profile = serde_yaml::from_str(PROFILE_YAML).unwrap();
    let template = profile.input_template("text").unwrap();

    let bound = template.bind(&post(&[("language", "fr")]), None).unwrap();
    let name = template
        .resolve_filename(&bound.value_map(), Some("upload.txt"), 0)
        .unwrap();
    assert_eq!(name, "test.utf-8.fr.txt");

    let err = template
        .bind(&post(&[("language", "de")]), None)
        .unwrap_err();
    assert!(matches!(err, TemplateError::Validation(_)));
}

#[test]
fn test_output_metadata_follows_condition() {
    let profile: Profile = serde_yaml::from_str(PROFILE_YAML).unwrap();
    let output = profile.output_template("tokens").unwrap();
    let input = Metadata::new("PlainTextFormat")
        .with_template("text")
        .with_attribute("language", "fr");

    let on = output.generate_metadata(&globals(Some(true)), Some(&input));
    assert_eq!(on.get("case"), Some("lower"));
    assert_eq!(on.get("tokenizer"), Some("simple"));
    assert_eq!(on.get("language"), Some("fr"));
    assert_eq!(on.format, "XMLFormat");

    let off = output.generate_metadata(&globals(Some(false)), Some(&input));
    assert_eq!(off.get("case"), Some("mixed"));

    let unset = output.generate_metadata(&globals(None), Some(&input));
    assert_eq!(unset.get("case"), Some("mixed"));

    let name = output
        .resolve_filename(&HashMap::new(), Some("test.utf-8.fr.txt"), 0)
        .unwrap();
    assert_eq!(name, "test.utf-8.fr.xml");
}

#[test]
fn test_condition_without_otherwise() {
    let condition = ParameterCondition::new(MetaField::Set {
        key: "case".to_string(),
        value: "lower".to_string(),
    })
    .when("lowercase", ConditionValue::Flag(true));

    assert!(condition.evaluate(&globals(Some(true))).is_some());
    assert!(condition.evaluate(&globals(Some(false))).is_none());
    assert!(condition.evaluate(&globals(None)).is_none());
}

#[test]
fn test_format_validation_and_metadata_sidecar() {
    let dir = tempdir().unwrap();
    let formats = FormatRegistry::builtin();
    let xml = formats.get_required("XMLFormat").unwrap();

    let good = dir.path().join("good.xml");
    fs::write(&good, "<doc><w>hello</w></doc>").unwrap();
    xml.validate(&fs::read(&good).unwrap()).unwrap();

    let bad = fs::read("/dev/null").unwrap();
    assert!(matches!(
        xml.validate(&bad),
        Err(TemplateError::InvalidContent { .. })
    ));

    let mut metadata = Metadata::new("XMLFormat").with_template("tokens");
    xml.complete_metadata(&mut metadata).unwrap();
    metadata.save(&good).unwrap();
    assert!(dir.path().join(".good.xml.METADATA").exists());
    assert_eq!(
        Metadata::load(&good).unwrap().unwrap().get("encoding"),
        Some("utf-8")
    );
}

#[tokio::test]
async fn test_converter_contract() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("upload.bin");
    fs::write(&source, "hello").unwrap();

    let formats = FormatRegistry::builtin();
    let converter = Converter::new(
        ConverterSpec::new("charset", "Charset converter").produces("PlainTextFormat"),
        Arc::new(CopyBackend),
    );

    let text = formats.get_required("PlainTextFormat").unwrap();
    let target = dir.path().join("doc.txt");
    converter.convert_input(&source, &target, text).await.unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "hello");

    let json = formats.get_required("JSONFormat").unwrap();
    let err = converter
        .convert_input(&source, &dir.path().join("doc.json"), json)
        .await
        .unwrap_err();
    match err {
        TemplateError::Conversion { format, .. } => assert_eq!(format, "JSONFormat"),
        other => panic!("expected conversion error, got {:?}", other),
    }
    assert!(converter.convert_output(&target, &source, text).await.is_err());
}

#[test]
fn test_sequence_for_non_unique_template() {
    let template = InputTemplate::new("text", "PlainTextFormat").extension("txt");
    let names: Vec<String> = (0..3)
        .map(|seq| {
            template
                .resolve_filename(&HashMap::new(), Some("doc.txt"), seq)
                .unwrap()
        })
        .collect();
    assert_eq!(names, vec!["doc.txt", "doc.1.txt", "doc.2.txt"]);

    let output = OutputTemplate::new("summary", "PlainTextFormat")
        .filename("summary.txt")
        .unique();
    assert_eq!(
        output.resolve_filename(&HashMap::new(), None, 4).unwrap(),
        "summary.txt"
    );
}
