//! File formats and the format registry.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use svcwrap_params::{
    ParameterDefinition, ParameterInfo, ParameterKind, ParameterSet, StringOptions,
    ValidationErrors,
};

use crate::error::{TemplateError, TemplateResult};
use crate::metadata::Metadata;

fn default_mimetype() -> String {
    "application/octet-stream".to_string()
}

/// Structural check applied to file content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCheck {
    /// Accept any bytes
    #[default]
    Any,
    /// Valid UTF-8
    Text,
    /// UTF-8 with a consistent number of comma separated fields
    Csv,
    /// Well-formed XML
    Xml,
    /// Parseable JSON
    Json,
}

impl ContentCheck {
    pub fn check(&self, content: &[u8]) -> Result<(), String> {
        match self {
            Self::Any => Ok(()),
            Self::Text => as_text(content).map(|_| ()),
            Self::Csv => check_csv(as_text(content)?),
            Self::Xml => check_xml(as_text(content)?),
            Self::Json => serde_json::from_slice::<serde_json::Value>(content)
                .map(|_| ())
                .map_err(|e| format!("Invalid JSON: {}", e)),
        }
    }
}

/// Metadata stored inside the file itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineMetadata {
    #[default]
    None,
    /// The `encoding` of an `<?xml ...?>` declaration
    XmlDeclaration,
}

impl InlineMetadata {
    /// Attributes found in the content.
    pub fn load(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        if let Self::XmlDeclaration = self {
            let Ok(text) = std::str::from_utf8(content) else {
                return found;
            };
            let mut reader = Reader::from_str(text);
            loop {
                match reader.read_event() {
                    Ok(Event::Decl(decl)) => {
                        if let Some(Ok(encoding)) = decl.encoding() {
                            found.insert(
                                "encoding".to_string(),
                                String::from_utf8_lossy(&encoding).to_lowercase(),
                            );
                        }
                        break;
                    }
                    Ok(Event::Start(_)) | Ok(Event::Empty(_)) | Ok(Event::Eof) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }
        found
    }

    /// Content with the metadata written inline. Returns `None` when nothing
    /// needs to change.
    pub fn save(&self, content: &[u8], metadata: &Metadata) -> Option<Vec<u8>> {
        match self {
            Self::None => None,
            Self::XmlDeclaration => {
                if content.starts_with(b"<?xml") {
                    return None;
                }
                let encoding = metadata.get("encoding").unwrap_or("utf-8");
                let mut out =
                    format!("<?xml version=\"1.0\" encoding=\"{}\"?>\n", encoding).into_bytes();
                out.extend_from_slice(content);
                Some(out)
            }
        }
    }
}

/// A declared file kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    /// Registry key, also the name used on the wire
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_mimetype")]
    pub mimetype: String,
    /// Conventional extensions, without the dot
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub check: ContentCheck,
    #[serde(default)]
    pub inline: InlineMetadata,
    /// Attribute schema for file metadata
    #[serde(default)]
    pub attributes: Vec<ParameterDefinition>,
}

impl Format {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            mimetype: default_mimetype(),
            extensions: Vec::new(),
            check: ContentCheck::Any,
            inline: InlineMetadata::None,
            attributes: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn check(mut self, check: ContentCheck) -> Self {
        self.check = check;
        self
    }

    pub fn inline(mut self, inline: InlineMetadata) -> Self {
        self.inline = inline;
        self
    }

    pub fn attribute(mut self, attribute: ParameterDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Extension used when a template does not declare one.
    pub fn default_extension(&self) -> Option<&str> {
        self.extensions.first().map(|s| s.as_str())
    }

    /// Check file content against this format.
    pub fn validate(&self, content: &[u8]) -> TemplateResult<()> {
        self.check
            .check(content)
            .map_err(|message| TemplateError::InvalidContent {
                format: self.name.clone(),
                message,
            })
    }

    /// Validate metadata attributes against the attribute schema and fill in
    /// declared defaults. Attributes outside the schema are kept as-is.
    pub fn complete_metadata(&self, metadata: &mut Metadata) -> Result<(), ValidationErrors> {
        let mut schema = match ParameterSet::from_definitions(&self.attributes) {
            Ok(schema) => schema,
            Err(e) => {
                let mut errors = ValidationErrors::new();
                errors.add_message(&self.name, e.to_string());
                return Err(errors);
            }
        };
        let postdata: HashMap<String, String> = metadata
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        schema.bind(&postdata, None)?;
        metadata.attributes.extend(schema.value_map());
        metadata.format = self.name.clone();
        Ok(())
    }
}

fn as_text(content: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(content).map_err(|e| format!("Content is not valid UTF-8: {}", e))
}

fn check_xml(text: &str) -> Result<(), String> {
    let mut reader = Reader::from_str(text);
    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "Unexpected closing tag".to_string())?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "Malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
        }
    }
    match (depth, roots) {
        (0, 1) => Ok(()),
        (0, 0) => Err("No root element".to_string()),
        (0, _) => Err("More than one root element".to_string()),
        (n, _) => Err(format!("{} unclosed element(s)", n)),
    }
}

fn check_csv(text: &str) -> Result<(), String> {
    let mut expected: Option<usize> = None;
    let mut fields = 1usize;
    let mut in_quotes = false;
    let mut record_empty = true;
    let mut line = 1usize;

    let mut finish = |fields: usize, empty: bool, line: usize| -> Result<(), String> {
        if empty {
            return Ok(());
        }
        match expected {
            None => {
                expected = Some(fields);
                Ok(())
            }
            Some(n) if n == fields => Ok(()),
            Some(n) => Err(format!(
                "Line {} has {} fields, expected {}",
                line, fields, n
            )),
        }
    };

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                record_empty = false;
            }
            ',' if !in_quotes => {
                fields += 1;
                record_empty = false;
            }
            '\n' if !in_quotes => {
                finish(fields, record_empty, line)?;
                fields = 1;
                record_empty = true;
                line += 1;
            }
            '\r' if !in_quotes => {}
            _ => record_empty = false,
        }
    }
    if in_quotes {
        return Err("Unterminated quoted field".to_string());
    }
    finish(fields, record_empty, line)
}

fn encoding_attribute() -> ParameterDefinition {
    ParameterDefinition::new(
        ParameterInfo::new("encoding", "Encoding").description("Character encoding"),
        ParameterKind::String(StringOptions {
            maxlength: 32,
            default: Some("utf-8".to_string()),
        }),
    )
}

fn language_attribute() -> ParameterDefinition {
    ParameterDefinition::new(
        ParameterInfo::new("language", "Language").description("Language code"),
        ParameterKind::String(StringOptions {
            maxlength: 16,
            default: None,
        }),
    )
}

/// Registry of known formats, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: HashMap<String, Format>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// A registry holding the built-in formats.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            Format::new("PlainTextFormat")
                .label("Plain text")
                .mimetype("text/plain")
                .extension("txt")
                .check(ContentCheck::Text)
                .attribute(encoding_attribute())
                .attribute(language_attribute()),
        );
        registry.register(
            Format::new("CSVFormat")
                .label("Comma separated values")
                .mimetype("text/csv")
                .extension("csv")
                .check(ContentCheck::Csv)
                .attribute(encoding_attribute()),
        );
        registry.register(
            Format::new("XMLFormat")
                .label("XML")
                .mimetype("text/xml")
                .extension("xml")
                .check(ContentCheck::Xml)
                .inline(InlineMetadata::XmlDeclaration)
                .attribute(encoding_attribute()),
        );
        registry.register(
            Format::new("JSONFormat")
                .label("JSON")
                .mimetype("application/json")
                .extension("json")
                .check(ContentCheck::Json),
        );
        registry.register(Format::new("BinaryDataFormat").label("Binary data"));
        registry
    }

    /// Register a format, replacing any with the same name.
    pub fn register(&mut self, format: Format) {
        debug!("Registering format: {}", format.name);
        self.formats.insert(format.name.clone(), format);
    }

    pub fn get(&self, name: &str) -> Option<&Format> {
        self.formats.get(name)
    }

    pub fn get_required(&self, name: &str) -> TemplateResult<&Format> {
        self.get(name)
            .ok_or_else(|| TemplateError::FormatNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.formats.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svcwrap_params::IntegerOptions;

    #[test]
    fn test_builtin_registry() {
        let registry = FormatRegistry::builtin();
        assert_eq!(registry.len(), 5);
        assert!(registry.contains("PlainTextFormat"));
        assert!(matches!(
            registry.get_required("NopeFormat"),
            Err(TemplateError::FormatNotFound(_))
        ));
    }

    #[test]
    fn test_text_check() {
        let registry = FormatRegistry::builtin();
        let text = registry.get("PlainTextFormat").unwrap();
        assert!(text.validate("héllo".as_bytes()).is_ok());
        assert!(matches!(
            text.validate(&[0xff, 0xfe, 0x00]),
            Err(TemplateError::InvalidContent { .. })
        ));
    }

    #[test]
    fn test_xml_check() {
        let check = ContentCheck::Xml;
        assert!(check.check(b"<?xml version=\"1.0\"?><a><b/>text</a>").is_ok());
        assert!(check.check(b"<a><b></a>").is_err());
        assert!(check.check(b"<a>").is_err());
        assert!(check.check(b"<a/><b/>").is_err());
        assert!(check.check(b"just text").is_err());
    }

    #[test]
    fn test_csv_check() {
        let check = ContentCheck::Csv;
        assert!(check.check(b"a,b,c\n1,2,3\n\"x,y\",2,3\n").is_ok());
        assert!(check.check(b"a,b\r\n1,2\r\n").is_ok());
        let err = check.check(b"a,b,c\n1,2\n").unwrap_err();
        assert!(err.contains("Line 2"));
        assert!(check.check(b"a,\"b\n").is_err());
    }

    #[test]
    fn test_json_check() {
        assert!(ContentCheck::Json.check(b"{\"a\": [1, 2]}").is_ok());
        assert!(ContentCheck::Json.check(b"{a: 1").is_err());
    }

    #[test]
    fn test_complete_metadata_applies_defaults() {
        let registry = FormatRegistry::builtin();
        let text = registry.get("PlainTextFormat").unwrap();
        let mut metadata = Metadata::new("").with_attribute("language", "fr");
        text.complete_metadata(&mut metadata).unwrap();
        assert_eq!(metadata.format, "PlainTextFormat");
        assert_eq!(metadata.get("encoding"), Some("utf-8"));
        assert_eq!(metadata.get("language"), Some("fr"));
    }

    #[test]
    fn test_complete_metadata_rejects_missing_required() {
        let format = Format::new("Scored").attribute(ParameterDefinition::new(
            ParameterInfo::new("score", "Score").required(),
            ParameterKind::Integer(IntegerOptions {
                minimum: 0,
                maximum: 100,
                default: None,
            }),
        ));
        let mut metadata = Metadata::new("Scored");
        let errors = format.complete_metadata(&mut metadata).unwrap_err();
        assert_eq!(errors.for_parameter("score").len(), 1);

        let mut metadata = Metadata::new("Scored").with_attribute("score", "200");
        assert!(format.complete_metadata(&mut metadata).is_err());
    }

    #[test]
    fn test_xml_declaration_metadata() {
        let inline = InlineMetadata::XmlDeclaration;
        let found = inline.load(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a/>");
        assert_eq!(found.get("encoding").map(|s| s.as_str()), Some("iso-8859-1"));
        assert!(inline.load(b"<a/>").is_empty());

        let saved = inline
            .save(b"<a/>", &Metadata::new("XMLFormat"))
            .unwrap();
        assert!(String::from_utf8(saved).unwrap().starts_with("<?xml"));
    }
}
