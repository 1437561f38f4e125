//! Integration tests for the project lifecycle.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use svcwrap_core::{
    CoreError, DefinitionSyntax, InputUpload, ProjectManager, ProjectStatus, Service,
    ServiceContext, ServiceDefinition,
};
use svcwrap_templates::Metadata;
use svcwrap_wire::ServiceDocument;
use tempfile::{tempdir, TempDir};

const DEFINITION: &str = r#"
system_id: wc
system_name: Word counter
command: "{{COMMAND}}"
parameters:
  - name: Options
    parameters:
      - id: lines
        name: Count lines
        type: boolean
        flag: "-l"
      - id: mode
        name: Mode
        type: choice
        flag: "-m"
        choices:
          - key: words
            label: Words
          - key: chars
            label: Characters
profiles:
  - input:
      - id: text
        format: PlainTextFormat
        extension: txt
        converters: [passthrough]
        parameters:
          - id: author
            name: Author
            type: string
            maxlength: 12
      - id: config
        format: JSONFormat
        filename: config.json
        unique: true
        optional: true
      - id: annotations
        format: XMLFormat
        extension: xml
        optional: true
    output:
      - id: count
        format: PlainTextFormat
        parent: text
        extension: count
        copymetadata: true
        converters: [passthrough]
        metadata:
          - rule: parameter
            key: mode
            parameter: mode
      - id: summary
        format: CSVFormat
        filename: summary.csv
        unique: true
converters:
  - id: passthrough
    label: Pass through
    produces: [PlainTextFormat]
    consumes: [PlainTextFormat]
"#;

struct Fixture {
    dir: TempDir,
    manager: ProjectManager,
}

fn manager(root: &Path, command: &str) -> ProjectManager {
    let vars: HashMap<String, String> =
        [("COMMAND".to_string(), command.to_string())].into_iter().collect();
    let definition = ServiceDefinition::parse(DEFINITION, DefinitionSyntax::Yaml, &vars).unwrap();
    let service = Service::new(definition).unwrap();
    let context = ServiceContext::new(root).with_base_url("http://localhost:8080");
    ProjectManager::new(Arc::new(service), context)
}

fn fixture(command: &str) -> Fixture {
    let dir = tempdir().unwrap();
    Fixture {
        manager: manager(dir.path(), command),
        dir,
    }
}

fn upload(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_successful_run() {
    let f = fixture("cat $INPUTDIRECTORY/*.txt > $OUTPUTDIRECTORY/all.out; echo $PARAMETERS > $OUTPUTDIRECTORY/args.out");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "hello.txt", "hello world");

    let entry = m
        .add_input(
            "p1",
            InputUpload::new("text", &source).value("author", "ann"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(entry.filename, "hello.txt");
    assert_eq!(entry.format, "PlainTextFormat");
    assert_eq!(entry.metadata.get("author").map(String::as_str), Some("ann"));
    assert_eq!(entry.metadata.get("encoding").map(String::as_str), Some("utf-8"));

    let postdata: HashMap<String, String> =
        [("lines".to_string(), "true".to_string())].into_iter().collect();
    let state = m.submit("p1", &postdata, Some("ann")).await.unwrap();
    assert!(matches!(
        state.status,
        ProjectStatus::Running | ProjectStatus::Done
    ));

    let state = m.wait("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Done);
    assert_eq!(state.completion, 100);

    let layout = m.layout("p1").unwrap();
    let args = fs::read_to_string(layout.output_path("args.out")).unwrap();
    assert_eq!(args.trim(), "-l -m words");
    assert_eq!(
        fs::read_to_string(layout.output_path("all.out")).unwrap(),
        "hello world"
    );

    // Predicted outputs carry their derived metadata.
    let count = Metadata::load(&layout.output_path("hello.count")).unwrap().unwrap();
    assert_eq!(count.template.as_deref(), Some("count"));
    assert_eq!(count.get("author"), Some("ann"));
    assert_eq!(count.get("mode"), Some("words"));

    let document = m.document(Some("p1"), Some("ann")).unwrap();
    assert_eq!(document.status.code, 2);
    assert_eq!(document.program.len(), 2);
    assert_eq!(document.program[0].output.filename, "hello.count");
    assert_eq!(document.program[0].inputs, vec!["hello.txt".to_string()]);
    assert_eq!(document.program[1].output.filename, "summary.csv");
    assert!(document.program[1].inputs.is_empty());
    assert_eq!(document.parameters.value("lines").unwrap().to_string(), "true");

    let reparsed = ServiceDocument::from_xml(&document.to_xml().unwrap()).unwrap();
    assert_eq!(reparsed.project.as_deref(), Some("p1"));
    assert_eq!(reparsed.inputs.len(), 1);
}

#[tokio::test]
async fn test_failing_program_reports_error() {
    let f = fixture("sh -c 'exit 3'");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();

    m.submit("p1", &HashMap::new(), None).await.unwrap();
    let state = m.wait("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Error);
    assert_eq!(state.exit_code, Some(3));
    assert_eq!(state.message, "Failed with exit code 3");

    let document = m.document(Some("p1"), None).unwrap();
    assert!(document.status.error);

    // A finished project must be reset before it runs again.
    let result = m.submit("p1", &HashMap::new(), None).await;
    assert!(matches!(result, Err(CoreError::Conflict(_))));

    let state = m.reset("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Ready);
    let layout = m.layout("p1").unwrap();
    assert!(layout.outputs().unwrap().is_empty());
    assert!(!layout.data_file.exists());
    assert_eq!(layout.inputs().unwrap().len(), 1);
}

#[tokio::test]
async fn test_abort_running_project() {
    let f = fixture("sleep 30");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();

    let state = m.submit("p1", &HashMap::new(), None).await.unwrap();
    assert_eq!(state.status, ProjectStatus::Running);
    assert!(state.pid.is_some());

    let again = m.submit("p1", &HashMap::new(), None).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));
    let late = m
        .add_input("p1", InputUpload::new("text", &source).filename("b.txt"), None)
        .await;
    assert!(matches!(late, Err(CoreError::Conflict(_))));
    assert!(matches!(m.reset("p1").await, Err(CoreError::Conflict(_))));

    let state = m.abort("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Aborted);
    assert!(matches!(m.abort("p1").await, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn test_abort_from_another_manager_while_waiting() {
    let f = fixture("sleep 30");
    let owner = Arc::new(manager(f.dir.path(), "sleep 30"));
    owner.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    owner
        .add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();
    owner.submit("p1", &HashMap::new(), None).await.unwrap();

    let waiter = {
        let owner = owner.clone();
        tokio::spawn(async move { owner.wait("p1").await })
    };

    // The second manager shares the storage root but not the supervisor.
    let other = &f.manager;
    assert_eq!(other.status("p1").unwrap().status, ProjectStatus::Running);
    let state = other.abort("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Aborted);

    let seen = waiter.await.unwrap().unwrap();
    assert_eq!(seen.status, ProjectStatus::Aborted);
    assert_eq!(owner.status("p1").unwrap().status, ProjectStatus::Aborted);
    assert_eq!(other.status("p1").unwrap().status, ProjectStatus::Aborted);
}

#[tokio::test]
async fn test_abort_while_waiting_goes_through_supervisor() {
    let f = fixture("sleep 30");
    let m = Arc::new(manager(f.dir.path(), "sleep 30"));
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();
    m.submit("p1", &HashMap::new(), None).await.unwrap();

    let waiter = {
        let m = m.clone();
        tokio::spawn(async move { m.wait("p1").await })
    };
    tokio::task::yield_now().await;
    // The handle is still registered while someone waits on it.
    assert_eq!(m.status("p1").unwrap().status, ProjectStatus::Running);

    let state = m.abort("p1").await.unwrap();
    assert_eq!(state.status, ProjectStatus::Aborted);
    assert_eq!(waiter.await.unwrap().unwrap().status, ProjectStatus::Aborted);
}

#[tokio::test]
async fn test_input_staging_rules() {
    let f = fixture("true");
    let m = &f.manager;
    m.create("p1").await.unwrap();

    let config = upload(f.dir.path(), "settings.json", r#"{"n": 1}"#);
    let entry = m
        .add_input("p1", InputUpload::new("config", &config), None)
        .await
        .unwrap();
    assert_eq!(entry.filename, "config.json");
    let second = m
        .add_input("p1", InputUpload::new("config", &config), None)
        .await;
    assert!(matches!(second, Err(CoreError::Conflict(_))));

    let broken = upload(f.dir.path(), "broken.json", "{not json");
    m.remove_input("p1", "config.json").await.unwrap();
    let rejected = m
        .add_input("p1", InputUpload::new("config", &broken), None)
        .await;
    assert!(matches!(rejected, Err(CoreError::Template(_))));
    assert!(m.layout("p1").unwrap().inputs().unwrap().is_empty());

    let text = upload(f.dir.path(), "a.txt", "x");
    let too_long = m
        .add_input(
            "p1",
            InputUpload::new("text", &text).value("author", "a name that is too long"),
            None,
        )
        .await;
    match too_long {
        Err(CoreError::Validation(errors)) => assert!(!errors.for_parameter("author").is_empty()),
        other => panic!("expected validation error, got {:?}", other),
    }

    let unknown = m
        .add_input("p1", InputUpload::new("nope", &text), None)
        .await;
    assert!(matches!(unknown, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_converted_upload() {
    let f = fixture("true");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "raw.dat", "converted text");

    let entry = m
        .add_input(
            "p1",
            InputUpload::new("text", &source)
                .filename("doc")
                .converter("passthrough"),
            None,
        )
        .await
        .unwrap();
    assert_eq!(entry.filename, "doc.txt");
    let layout = m.layout("p1").unwrap();
    assert_eq!(
        fs::read_to_string(layout.input_path("doc.txt")).unwrap(),
        "converted text"
    );

    let refused = m
        .add_input(
            "p1",
            InputUpload::new("config", &source).converter("passthrough"),
            None,
        )
        .await;
    assert!(matches!(refused, Err(CoreError::Template(_))));
}

#[tokio::test]
async fn test_xml_input_gets_inline_declaration() {
    let f = fixture("true");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "notes.xml", "<notes><n>1</n></notes>");

    let entry = m
        .add_input("p1", InputUpload::new("annotations", &source), None)
        .await
        .unwrap();
    assert_eq!(entry.format, "XMLFormat");
    let staged = fs::read_to_string(m.layout("p1").unwrap().input_path("notes.xml")).unwrap();
    assert!(staged.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    assert!(staged.ends_with("<notes><n>1</n></notes>"));

    // A declaration already present is kept as uploaded.
    let declared = upload(
        f.dir.path(),
        "latin.xml",
        r#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#,
    );
    let entry = m
        .add_input("p1", InputUpload::new("annotations", &declared), None)
        .await
        .unwrap();
    assert_eq!(entry.metadata.get("encoding").map(String::as_str), Some("iso-8859-1"));
    let staged = fs::read_to_string(m.layout("p1").unwrap().input_path("latin.xml")).unwrap();
    assert!(staged.starts_with(r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#));
}

#[tokio::test]
async fn test_convert_produced_output() {
    let f = fixture("cp $INPUTDIRECTORY/a.txt $OUTPUTDIRECTORY/a.count");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "three little words");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();
    m.submit("p1", &HashMap::new(), None).await.unwrap();
    assert_eq!(m.wait("p1").await.unwrap().status, ProjectStatus::Done);

    let converted = m.convert_output("p1", "a.count", "passthrough").await.unwrap();
    assert!(converted.starts_with(&m.layout("p1").unwrap().tmp_dir));
    assert_eq!(fs::read_to_string(&converted).unwrap(), "three little words");

    // Only converters offered by the output template may be used.
    let refused = m.convert_output("p1", "a.count", "tocsv").await;
    assert!(matches!(refused, Err(CoreError::Template(_))));
    let missing = m.convert_output("p1", "summary.csv", "passthrough").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_submit_without_matching_profile() {
    let f = fixture("true");
    let m = &f.manager;
    m.create("p1").await.unwrap();

    match m.submit("p1", &HashMap::new(), None).await {
        Err(CoreError::Validation(errors)) => assert!(!errors.for_parameter("input").is_empty()),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(m.status("p1").unwrap().status, ProjectStatus::Ready);
}

#[tokio::test]
async fn test_invalid_parameters_block_submit() {
    let f = fixture("true");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();

    let postdata: HashMap<String, String> =
        [("mode".to_string(), "lines".to_string())].into_iter().collect();
    let result = m.submit("p1", &postdata, None).await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
    assert!(!m.layout("p1").unwrap().data_file.exists());
}

#[tokio::test]
async fn test_project_management() {
    let f = fixture("true");
    let m = &f.manager;

    assert!(m.list().unwrap().is_empty());
    m.create("b").await.unwrap();
    m.create("a").await.unwrap();
    m.create("a").await.unwrap();
    assert_eq!(m.list().unwrap(), vec!["a".to_string(), "b".to_string()]);

    let document = m.document(None, None).unwrap();
    assert_eq!(document.projects, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(document.system_id, "wc");
    assert_eq!(document.input_formats.len(), 3);
    assert_eq!(document.output_formats.len(), 2);

    assert_eq!(m.status("a").unwrap().status, ProjectStatus::Ready);
    m.delete("a").await.unwrap();
    assert_eq!(m.list().unwrap(), vec!["b".to_string()]);
    assert!(matches!(m.status("a"), Err(CoreError::ProjectNotFound(_))));
    assert!(matches!(
        m.delete("a").await,
        Err(CoreError::ProjectNotFound(_))
    ));
    assert!(matches!(
        m.create("../escape").await,
        Err(CoreError::InvalidProjectId(_))
    ));

    let id = ProjectManager::generate_id();
    assert_eq!(id.len(), 32);
    m.create(&id).await.unwrap();
}

#[tokio::test]
async fn test_unresolvable_command_leaves_project_ready() {
    let f = fixture("svcwrap-no-such-program $INPUTDIRECTORY");
    let m = &f.manager;
    m.create("p1").await.unwrap();
    let source = upload(f.dir.path(), "a.txt", "x");
    m.add_input("p1", InputUpload::new("text", &source), None)
        .await
        .unwrap();

    let result = m.submit("p1", &HashMap::new(), None).await;
    assert!(matches!(result, Err(CoreError::Dispatch(_))));
    assert_eq!(m.status("p1").unwrap().status, ProjectStatus::Ready);
    let layout = m.layout("p1").unwrap();
    assert!(!layout.data_file.exists());
    assert!(layout.outputs().unwrap().is_empty());
}
