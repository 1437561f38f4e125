//! Integration tests for parameter groups declared in configuration.

use std::collections::HashMap;

use svcwrap_params::{
    FloatOptions, Parameter, ParameterGroupDefinition, ParameterInfo, ParameterSet,
    ParameterValue,
};

const GROUPS_YAML: &str = r#"
- name: Tokenisation
  parameters:
    - id: lowercase
      name: Lowercase
      type: boolean
      flag: -l
    - id: keepcase
      name: Keep case
      type: boolean
      flag: -k
      forbid: [lowercase]
    - id: language
      name: Language
      type: choice
      flag: --lang=
      choices:
        - { key: en, label: English }
        - { key: nl, label: Dutch }
        - { key: fr, label: French }
- name: Output
  parameters:
    - id: layers
      name: Layers
      type: choice
      flag: -L
      multi: true
      choices:
        - { key: pos, label: Part-of-speech }
        - { key: lemma, label: Lemma }
        - { key: ner, label: Entities }
    - id: beam
      name: Beam size
      type: integer
      flag: -b
      minimum: 1
      maximum: 20
      default: 5
    - id: model
      name: Model path
      type: string
      flag: -m
      maxlength: 10
      allowusers: [admin]
"#;

fn load() -> ParameterSet {
    let groups: Vec<ParameterGroupDefinition> = serde_yaml::from_str(GROUPS_YAML).unwrap();
    ParameterSet::from_group_definitions(&groups).unwrap()
}

fn post(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_groups_and_defaults() {
    let set = load();
    assert_eq!(set.groups().len(), 2);
    assert_eq!(set.len(), 6);
    assert_eq!(set.value("language"), Some(&ParameterValue::Text("en".to_string())));
    assert!(set.value("layers").is_none());
    assert_eq!(set.value("beam"), Some(&ParameterValue::Integer(5)));
}

#[test]
fn test_full_submission_compiles_in_order() {
    let mut set = load();
    set.bind(
        &post(&[
            ("lowercase", "yes"),
            ("language", "nl"),
            ("layers[lemma]", "1"),
            ("layers[pos]", "on"),
            ("beam", "20"),
        ]),
        None,
    )
    .unwrap();

    assert_eq!(
        set.compile_args(),
        vec![
            "-l".to_string(),
            "--lang=nl".to_string(),
            "-L pos,lemma".to_string(),
            "-b 20".to_string(),
        ]
    );
}

#[test]
fn test_errors_are_aggregated() {
    let mut set = load();
    let errors = set
        .bind(
            &post(&[
                ("lowercase", "1"),
                ("keepcase", "1"),
                ("layers", "pos,syntax"),
                ("beam", "0"),
            ]),
            None,
        )
        .unwrap_err();

    assert_eq!(errors.len(), 3);
    assert_eq!(errors.for_parameter("keepcase").len(), 1);
    assert_eq!(errors.for_parameter("layers").len(), 1);
    assert_eq!(errors.for_parameter("beam").len(), 1);
    assert!(set.value("lowercase").is_none());
    assert!(set.get("beam").unwrap().error().is_some());
}

#[test]
fn test_access_list_on_bind() {
    let mut set = load();
    let errors = set.bind(&post(&[("model", "small")]), Some("guest")).unwrap_err();
    assert_eq!(errors.for_parameter("model"), vec!["Access denied"]);

    set.bind(&post(&[("model", "small")]), Some("admin")).unwrap();
    assert_eq!(set.get("model").unwrap().compile_arg().as_deref(), Some("-m small"));
}

#[test]
fn test_string_length_boundary() {
    let mut set = load();
    assert!(set.bind(&post(&[("model", "abcdefghij")]), Some("admin")).is_ok());
    let errors = set
        .bind(&post(&[("model", "abcdefghijk")]), Some("admin"))
        .unwrap_err();
    assert!(errors.errors[0].message.contains("too long"));
    assert_eq!(
        set.value("model"),
        Some(&ParameterValue::Text("abcdefghij".to_string()))
    );
}

#[test]
fn test_float_range_boundaries() {
    let mut threshold = Parameter::float(
        ParameterInfo::new("threshold", "Threshold").flag("-t"),
        FloatOptions {
            minimum: 0.0,
            maximum: 1.0,
            default: None,
        },
    );
    assert!(threshold.set(0.0).is_ok());
    assert!(threshold.set("1.0").is_ok());
    assert!(threshold.set(1.5).is_err());
    assert_eq!(threshold.value(), Some(&ParameterValue::Float(1.0)));
    assert_eq!(threshold.compile_arg().as_deref(), Some("-t 1"));

    let mut free = Parameter::float(ParameterInfo::new("w", "Weight"), FloatOptions::default());
    assert!(free.set(-1e9).is_ok());
}
