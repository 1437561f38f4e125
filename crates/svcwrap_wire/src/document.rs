//! The service document: the full view of a service or project exchanged
//! with callers.
//!
//! ```text
//! <service id name project baseurl user>
//!   <description/>
//!   <status code message completion errors errormsg/>
//!   <parameters><parametergroup name>...</parametergroup></parameters>
//!   <profiles><profile>...</profile></profiles>
//!   <inputformats/> <outputformats/>
//!   <input><file name template format><meta id>..</meta></file></input>
//!   <output/> <program/> <corpora/> <projects/>
//! </service>
//! ```

use std::collections::BTreeMap;

use svcwrap_params::ParameterSet;
use svcwrap_templates::{Format, Metadata, Profile};
use tracing::debug;

use crate::dom::Element;
use crate::error::{WireError, WireResult};
use crate::parameter::{encode_set, ParameterCodec};
use crate::template::{decode_profile, encode_profile};

/// Status block of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub code: u8,
    pub message: String,
    /// Completion percentage
    pub completion: u8,
    pub error: bool,
    pub errormsg: String,
}

impl StatusInfo {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn completion(mut self, completion: u8) -> Self {
        self.completion = completion;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = true;
        self.errormsg = message.into();
        self
    }

    fn encode(&self) -> Element {
        Element::new("status")
            .attr("code", self.code)
            .attr("message", &self.message)
            .attr("completion", self.completion)
            .flag("errors", self.error)
            .attr("errormsg", &self.errormsg)
    }

    fn decode(element: &Element) -> WireResult<Self> {
        Ok(Self {
            code: element.parse("code")?.unwrap_or(0),
            message: element.get("message").unwrap_or("").to_string(),
            completion: element.parse("completion")?.unwrap_or(0),
            error: element.get_flag("errors"),
            errormsg: element.get("errormsg").unwrap_or("").to_string(),
        })
    }
}

/// Summary of a format, without its checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatInfo {
    pub name: String,
    pub label: String,
    pub mimetype: String,
    pub extensions: Vec<String>,
}

impl From<&Format> for FormatInfo {
    fn from(format: &Format) -> Self {
        Self {
            name: format.name.clone(),
            label: format.label.clone(),
            mimetype: format.mimetype.clone(),
            extensions: format.extensions.clone(),
        }
    }
}

impl FormatInfo {
    fn encode(&self) -> Element {
        Element::new("format")
            .attr("name", &self.name)
            .attr("label", &self.label)
            .attr("mimetype", &self.mimetype)
            .attr("extensions", self.extensions.join(","))
    }

    fn decode(element: &Element) -> WireResult<Self> {
        Ok(Self {
            name: element.require("name")?.to_string(),
            label: element.get("label").unwrap_or("").to_string(),
            mimetype: element.get("mimetype").unwrap_or("").to_string(),
            extensions: element
                .get("extensions")
                .map(|raw| {
                    raw.split(',')
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

/// A staged input or output file with its resolved format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the project's input or output directory
    pub filename: String,
    pub template: Option<String>,
    pub format: String,
    pub metadata: BTreeMap<String, String>,
}

impl FileEntry {
    pub fn new(filename: impl Into<String>, metadata: &Metadata) -> Self {
        Self {
            filename: filename.into(),
            template: metadata.template.clone(),
            format: metadata.format.clone(),
            metadata: metadata.attributes.clone(),
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        Metadata {
            format: self.format.clone(),
            template: self.template.clone(),
            attributes: self.metadata.clone(),
        }
    }

    fn encode(&self, tag: &str) -> Element {
        Element::new(tag)
            .attr("name", &self.filename)
            .attr_opt("template", self.template.as_ref())
            .attr("format", &self.format)
            .children(
                self.metadata
                    .iter()
                    .map(|(k, v)| Element::new("meta").attr("id", k).text(v)),
            )
    }

    fn decode(element: &Element) -> WireResult<Self> {
        let metadata = element
            .find_all("meta")
            .map(|m| Ok((m.require("id")?.to_string(), m.text.clone())))
            .collect::<WireResult<BTreeMap<_, _>>>()?;
        Ok(Self {
            filename: element.require("name")?.to_string(),
            template: element.get("template").map(str::to_string),
            format: element.get("format").unwrap_or("").to_string(),
            metadata,
        })
    }
}

/// One expected output and the inputs it is made from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramEntry {
    pub output: FileEntry,
    pub inputs: Vec<String>,
}

impl ProgramEntry {
    fn encode(&self) -> Element {
        self.output.encode("outputfile").children(
            self.inputs
                .iter()
                .map(|name| Element::new("inputfile").attr("name", name)),
        )
    }

    fn decode(element: &Element) -> WireResult<Self> {
        let inputs = element
            .find_all("inputfile")
            .map(|e| e.require("name").map(str::to_string))
            .collect::<WireResult<Vec<_>>>()?;
        Ok(Self {
            output: FileEntry::decode(element)?,
            inputs,
        })
    }
}

/// Everything a caller sees of a service, optionally scoped to one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDocument {
    pub system_id: String,
    pub system_name: String,
    pub system_description: String,
    pub project: Option<String>,
    pub base_url: String,
    pub user: Option<String>,
    pub status: StatusInfo,
    pub parameters: ParameterSet,
    pub profiles: Vec<Profile>,
    pub input_formats: Vec<FormatInfo>,
    pub output_formats: Vec<FormatInfo>,
    pub inputs: Vec<FileEntry>,
    pub outputs: Vec<FileEntry>,
    pub program: Vec<ProgramEntry>,
    pub corpora: Vec<String>,
    pub projects: Vec<String>,
}

impl ServiceDocument {
    pub fn new(system_id: impl Into<String>, system_name: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            system_name: system_name.into(),
            ..Default::default()
        }
    }

    pub fn to_element(&self) -> Element {
        let list = |tag: &str, items: Vec<Element>| Element::new(tag).children(items);

        Element::new("service")
            .attr("id", &self.system_id)
            .attr("name", &self.system_name)
            .attr_opt("project", self.project.as_ref())
            .attr("baseurl", &self.base_url)
            .attr_opt("user", self.user.as_ref())
            .child(Element::new("description").text(&self.system_description))
            .child(self.status.encode())
            .child(list("parameters", encode_set(&self.parameters)))
            .child(list("profiles", self.profiles.iter().map(encode_profile).collect()))
            .child(list(
                "inputformats",
                self.input_formats.iter().map(FormatInfo::encode).collect(),
            ))
            .child(list(
                "outputformats",
                self.output_formats.iter().map(FormatInfo::encode).collect(),
            ))
            .child(list(
                "input",
                self.inputs.iter().map(|f| f.encode("file")).collect(),
            ))
            .child(list(
                "output",
                self.outputs.iter().map(|f| f.encode("file")).collect(),
            ))
            .child(list(
                "program",
                self.program.iter().map(ProgramEntry::encode).collect(),
            ))
            .child(list(
                "corpora",
                self.corpora
                    .iter()
                    .map(|c| Element::new("corpus").text(c))
                    .collect(),
            ))
            .child(list(
                "projects",
                self.projects
                    .iter()
                    .map(|p| Element::new("project").text(p))
                    .collect(),
            ))
    }

    pub fn to_xml(&self) -> WireResult<String> {
        self.to_element().to_xml()
    }

    pub fn from_xml(xml: &str) -> WireResult<Self> {
        let root = Element::parse_document(xml)?;
        Self::from_element(&root)
    }

    pub fn from_element(root: &Element) -> WireResult<Self> {
        if root.name != "service" {
            return Err(WireError::Format(format!(
                "expected <service> root, found <{}>",
                root.name
            )));
        }
        let codec = ParameterCodec::new();
        let section = |tag: &str| root.find(tag).map(|e| e.children.as_slice()).unwrap_or(&[]);

        let document = Self {
            system_id: root.require("id")?.to_string(),
            system_name: root.get("name").unwrap_or("").to_string(),
            system_description: root
                .find("description")
                .map(|e| e.text.clone())
                .unwrap_or_default(),
            project: root.get("project").map(str::to_string),
            base_url: root.get("baseurl").unwrap_or("").to_string(),
            user: root.get("user").map(str::to_string),
            status: match root.find("status") {
                Some(status) => StatusInfo::decode(status)?,
                None => StatusInfo::default(),
            },
            parameters: match root.find("parameters") {
                Some(parameters) => codec.decode_set(parameters)?,
                None => ParameterSet::new(),
            },
            profiles: section("profiles")
                .iter()
                .map(|e| decode_profile(&codec, e))
                .collect::<WireResult<_>>()?,
            input_formats: section("inputformats")
                .iter()
                .map(FormatInfo::decode)
                .collect::<WireResult<_>>()?,
            output_formats: section("outputformats")
                .iter()
                .map(FormatInfo::decode)
                .collect::<WireResult<_>>()?,
            inputs: section("input")
                .iter()
                .map(FileEntry::decode)
                .collect::<WireResult<_>>()?,
            outputs: section("output")
                .iter()
                .map(FileEntry::decode)
                .collect::<WireResult<_>>()?,
            program: section("program")
                .iter()
                .map(ProgramEntry::decode)
                .collect::<WireResult<_>>()?,
            corpora: section("corpora").iter().map(|e| e.text.clone()).collect(),
            projects: section("projects").iter().map(|e| e.text.clone()).collect(),
        };
        debug!(
            "Decoded service document for {} ({} parameters)",
            document.system_id,
            document.parameters.len()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_root_is_format_error() {
        let result = ServiceDocument::from_xml("<project id=\"x\"/>");
        assert!(matches!(result, Err(WireError::Format(_))));
    }

    #[test]
    fn test_minimal_document() {
        let document = ServiceDocument::from_xml("<service id=\"demo\"/>").unwrap();
        assert_eq!(document.system_id, "demo");
        assert!(document.parameters.is_empty());
        assert_eq!(document.status, StatusInfo::default());
    }

    #[test]
    fn test_status_and_files_roundtrip() {
        let mut document = ServiceDocument::new("demo", "Demo");
        document.project = Some("p1".to_string());
        document.base_url = "http://localhost:8080".to_string();
        document.status = StatusInfo::new(4, "Failed")
            .completion(40)
            .error("exit code 2");
        let metadata = Metadata::new("PlainTextFormat")
            .with_template("text")
            .with_attribute("encoding", "utf-8");
        document.inputs.push(FileEntry::new("a.txt", &metadata));
        document.program.push(ProgramEntry {
            output: FileEntry::new("a.xml", &Metadata::new("XMLFormat")),
            inputs: vec!["a.txt".to_string()],
        });
        document.projects = vec!["p1".to_string(), "p2".to_string()];

        let xml = document.to_xml().unwrap();
        assert!(xml.contains("<service id=\"demo\""));
        assert_eq!(ServiceDocument::from_xml(&xml).unwrap(), document);
    }
}
