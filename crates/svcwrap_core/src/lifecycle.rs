//! Project lifecycle: staging inputs, dispatching the wrapped program and
//! tracking it until it ends.
//!
//! Mutating operations on a project are serialized by a per-project async
//! lock. Status queries take no project lock: they look at the supervisor
//! handle if this process owns one, and otherwise reconcile from the pid
//! and exit files on disk.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use svcwrap_params::{ParameterSet, ValidationErrors};
use svcwrap_runner::{
    reconcile, terminate, CommandContext, ProcessHandle, ProcessRunner, ProcessState,
    RunnerError, ShellRunner, StatusLog,
};
use svcwrap_templates::{validate_filename, Metadata, TemplateError};
use svcwrap_wire::{FileEntry, FormatInfo, ProgramEntry, ServiceDocument, StatusInfo};

use crate::context::ServiceContext;
use crate::definition::Service;
use crate::error::{CoreError, CoreResult};
use crate::project::{validate_project_id, ProjectLayout, ProjectState, ProjectStatus};

/// A file offered for one of the input templates.
#[derive(Debug, Clone, Default)]
pub struct InputUpload {
    /// Input template id
    pub template: String,
    /// Where the uploaded content currently is
    pub source: PathBuf,
    /// Name given by the caller; defaults to the source file name
    pub filename: Option<String>,
    /// Converter to run on the content first
    pub converter: Option<String>,
    /// Raw values for the template's parameters
    pub postdata: HashMap<String, String>,
}

impl InputUpload {
    pub fn new(template: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.postdata.insert(key.into(), value.into());
        self
    }

    pub fn postdata(mut self, postdata: HashMap<String, String>) -> Self {
        self.postdata.extend(postdata);
        self
    }
}

/// Owns the projects of one service.
pub struct ProjectManager {
    service: Arc<Service>,
    context: ServiceContext,
    runner: Arc<dyn ProcessRunner>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    handles: Mutex<HashMap<String, Arc<ProcessHandle>>>,
}

impl fmt::Debug for ProjectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectManager")
            .field("service", &self.service.definition().system_id)
            .field("context", &self.context)
            .field("running", &self.handles.lock().len())
            .finish()
    }
}

impl ProjectManager {
    pub fn new(service: Arc<Service>, context: ServiceContext) -> Self {
        Self {
            service,
            context,
            runner: Arc::new(ShellRunner::new()),
            locks: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different process runner.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// A fresh random project id.
    pub fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn layout(&self, id: &str) -> CoreResult<ProjectLayout> {
        ProjectLayout::new(id, self.context.project_path(id))
    }

    fn existing(&self, id: &str) -> CoreResult<ProjectLayout> {
        let layout = self.layout(id)?;
        if layout.exists() {
            Ok(layout)
        } else {
            Err(CoreError::ProjectNotFound(id.to_string()))
        }
    }

    fn lock(&self, id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn ensure_not_running(&self, id: &str) -> CoreResult<()> {
        if self.status(id)?.status == ProjectStatus::Running {
            return Err(CoreError::Conflict(format!("project {} is running", id)));
        }
        Ok(())
    }

    /// Create a project. Creating an existing project changes nothing.
    pub async fn create(&self, id: &str) -> CoreResult<ProjectLayout> {
        let layout = self.layout(id)?;
        let lock = self.lock(id);
        let _guard = lock.lock().await;

        if layout.exists() {
            debug!("Project {} already exists", id);
        } else {
            info!("Creating project {}", id);
        }
        layout.materialize()?;
        Ok(layout)
    }

    /// Stage an input file under one of the input templates.
    ///
    /// The template parameters are bound as a whole, the content is checked
    /// against the template's format and nothing is written unless every
    /// check passes.
    pub async fn add_input(
        &self,
        id: &str,
        upload: InputUpload,
        user: Option<&str>,
    ) -> CoreResult<FileEntry> {
        let lock = self.lock(id);
        let _guard = lock.lock().await;
        let layout = self.existing(id)?;
        self.ensure_not_running(id)?;

        let template = self.service.input_template(&upload.template)?;
        let format = self.service.formats().get_required(&template.format)?;
        let parameters = template.bind(&upload.postdata, user)?;

        let seq = layout
            .inputs()?
            .iter()
            .filter(|(_, m)| m.template.as_deref() == Some(template.id.as_str()))
            .count();
        if template.unique && seq > 0 {
            return Err(CoreError::Conflict(format!(
                "input template {} accepts a single file",
                template.id
            )));
        }

        let uploaded = upload.filename.clone().or_else(|| {
            upload
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        });
        // Uploaded names are kept as given; only patterns are numbered.
        let numbered = if template.filename.is_some() { seq } else { 0 };
        let filename =
            template.resolve_filename(&parameters.value_map(), uploaded.as_deref(), numbered)?;
        let target = layout.input_path(&filename);
        if target.exists() {
            return Err(CoreError::Conflict(format!(
                "input file {} already exists",
                filename
            )));
        }

        let content = match &upload.converter {
            Some(converter_id) => {
                if !template.converters.iter().any(|c| c == converter_id) {
                    return Err(TemplateError::Conversion {
                        converter: converter_id.clone(),
                        format: template.format.clone(),
                        message: format!("not offered by input template {}", template.id),
                    }
                    .into());
                }
                let converter = self.service.converters().get_required(converter_id)?;
                let converted = layout.tmp_dir.join(format!("{}.converted", filename));
                converter
                    .convert_input(&upload.source, &converted, format)
                    .await?;
                let content = tokio::fs::read(&converted).await?;
                if !self.context.debug {
                    if let Err(e) = tokio::fs::remove_file(&converted).await {
                        debug!("Could not remove {:?}: {}", converted, e);
                    }
                }
                content
            }
            None => tokio::fs::read(&upload.source).await?,
        };

        if let Err(e) = format.validate(&content) {
            warn!("Rejected input {} for project {}: {}", filename, id, e);
            return Err(e.into());
        }

        let mut metadata = template.metadata(&parameters);
        for (key, value) in format.inline.load(&content) {
            metadata.attributes.entry(key).or_insert(value);
        }
        format.complete_metadata(&mut metadata)?;
        let content = format.inline.save(&content, &metadata).unwrap_or(content);

        tokio::fs::write(&target, &content).await?;
        metadata.save(&target)?;
        info!(
            "Added input {} to project {} as {}",
            filename, id, metadata.format
        );
        Ok(FileEntry::new(filename, &metadata))
    }

    /// Convert a produced output file with one of the converters its output
    /// template offers. The result is written to the project's `tmp/`
    /// directory and its path returned.
    pub async fn convert_output(
        &self,
        id: &str,
        filename: &str,
        converter_id: &str,
    ) -> CoreResult<PathBuf> {
        let layout = self.existing(id)?;
        validate_filename(filename)?;
        let source = layout.output_path(filename);
        if !source.is_file() {
            return Err(CoreError::NotFound(format!("output file {}", filename)));
        }
        let metadata = Metadata::load(&source)?
            .ok_or_else(|| CoreError::NotFound(format!("metadata of output file {}", filename)))?;
        let template_id = metadata.template.as_deref().ok_or_else(|| {
            CoreError::NotFound(format!("output template of {}", filename))
        })?;
        let template = self.service.output_template(template_id)?;
        if !template.converters.iter().any(|c| c == converter_id) {
            return Err(TemplateError::Conversion {
                converter: converter_id.to_string(),
                format: metadata.format.clone(),
                message: format!("not offered by output template {}", template.id),
            }
            .into());
        }

        let converter = self.service.converters().get_required(converter_id)?;
        let format = self.service.formats().get_required(&metadata.format)?;
        fs::create_dir_all(&layout.tmp_dir)?;
        let target = layout
            .tmp_dir
            .join(format!("{}.{}", filename, converter_id));
        converter.convert_output(&source, &target, format).await?;
        info!(
            "Converted output {} of project {} with {}",
            filename, id, converter_id
        );
        Ok(target)
    }

    /// Remove a staged input file and its metadata.
    pub async fn remove_input(&self, id: &str, filename: &str) -> CoreResult<()> {
        let lock = self.lock(id);
        let _guard = lock.lock().await;
        let layout = self.existing(id)?;
        self.ensure_not_running(id)?;

        validate_filename(filename)?;
        let path = layout.input_path(filename);
        if !path.is_file() {
            return Err(CoreError::NotFound(format!("input file {}", filename)));
        }
        fs::remove_file(&path)?;
        Metadata::remove_sidecar(&path)?;
        info!("Removed input {} from project {}", filename, id);
        Ok(())
    }

    /// Bind the global parameters and start the wrapped program.
    pub async fn submit(
        &self,
        id: &str,
        postdata: &HashMap<String, String>,
        user: Option<&str>,
    ) -> CoreResult<ProjectState> {
        let lock = self.lock(id);
        let _guard = lock.lock().await;
        let layout = self.existing(id)?;

        match self.status(id)?.status {
            ProjectStatus::Ready => {}
            ProjectStatus::Running => {
                return Err(CoreError::Conflict(format!(
                    "project {} is already running",
                    id
                )))
            }
            other => {
                return Err(CoreError::Conflict(format!(
                    "project {} is {}, reset it first",
                    id, other
                )))
            }
        }

        let mut parameters = self.service.parameters()?;
        parameters.bind(postdata, user)?;

        let command = &self.service.definition().command;
        command.check_resolvable().map_err(dispatch_error)?;

        let inputs = layout.inputs()?;
        let program = self.program(&parameters, &inputs)?;
        for entry in &program {
            entry
                .output
                .to_metadata()
                .save(&layout.output_path(&entry.output.filename))?;
        }

        let mut document = self.base_document(user)?;
        document.project = Some(id.to_string());
        document.status = StatusInfo::new(ProjectStatus::Running.code(), "Submitted");
        document.parameters = parameters.clone();
        document.inputs = inputs
            .iter()
            .map(|(name, metadata)| FileEntry::new(name, metadata))
            .collect();
        document.program = program;
        fs::write(&layout.data_file, document.to_xml()?)?;

        let context = CommandContext::new()
            .input_dir(&layout.input_dir)
            .output_dir(&layout.output_dir)
            .tmp_dir(&layout.tmp_dir)
            .status_file(&layout.run.status_file)
            .data_file(&layout.data_file)
            .parameters(parameters.compile_args())
            .user(user);
        let compiled = command.compile(&context);
        if self.context.debug {
            info!("Command for project {}: {}", id, compiled);
        }

        StatusLog::new(&layout.run.status_file).clear()?;
        let handle = match self.runner.spawn(&compiled, &layout.run).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not start project {}: {}", id, e);
                // Leave the project as it was before the submission.
                ProjectLayout::clear_dir(&layout.output_dir)?;
                remove_file_if_exists(&layout.data_file)?;
                return Err(dispatch_error(e));
            }
        };
        info!("Started project {} as process {}", id, handle.pid());
        self.handles.lock().insert(id.to_string(), Arc::new(handle));

        self.status(id)
    }

    /// Current state of a project.
    ///
    /// Takes no project lock. Without a live supervisor handle the state is
    /// reconciled from disk, so a process that vanished is reported as
    /// finished instead of running forever.
    pub fn status(&self, id: &str) -> CoreResult<ProjectState> {
        let layout = self.existing(id)?;

        let owned = {
            let mut handles = self.handles.lock();
            match handles.get(id).map(|h| (h.pid(), h.is_finished())) {
                Some((pid, false)) => Some(ProcessState::Running(pid)),
                Some((_, true)) => {
                    // The supervisor has written the exit record.
                    handles.remove(id);
                    None
                }
                None => None,
            }
        };
        let process = match owned {
            Some(state) => state,
            None => reconcile(&layout.run)?,
        };

        let last = StatusLog::new(&layout.run.status_file)
            .last()?
            .map(|entry| (entry.percentage, entry.message));
        Ok(ProjectState::from_process(process, last))
    }

    /// Wait for a process started by this manager to end.
    ///
    /// Returns the current state right away when no owned process is
    /// running. The handle stays registered while waiting, so status and
    /// abort keep going through the supervisor.
    pub async fn wait(&self, id: &str) -> CoreResult<ProjectState> {
        let handle = self.handles.lock().get(id).cloned();
        if let Some(handle) = handle {
            let record = handle.wait().await?;
            info!(
                "Project {} finished with exit code {:?}",
                id, record.exit_code
            );
        }
        self.status(id)
    }

    /// Terminate the running program.
    pub async fn abort(&self, id: &str) -> CoreResult<ProjectState> {
        let lock = self.lock(id);
        let _guard = lock.lock().await;
        let layout = self.existing(id)?;
        self.abort_locked(id, &layout).await?;
        self.status(id)
    }

    async fn abort_locked(&self, id: &str, layout: &ProjectLayout) -> CoreResult<()> {
        let handle = self.handles.lock().get(id).cloned();
        match handle.filter(|h| !h.is_finished()) {
            Some(handle) => {
                handle.abort().await?;
                self.handles.lock().remove(id);
            }
            None => match reconcile(&layout.run)? {
                ProcessState::Running(pid) => {
                    warn!("Terminating unowned process {} of project {}", pid, id);
                    terminate(&layout.run)?;
                }
                _ => {
                    return Err(CoreError::Conflict(format!(
                        "project {} is not running",
                        id
                    )))
                }
            },
        }
        info!("Aborted project {}", id);
        Ok(())
    }

    /// Return a finished project to `Ready`, discarding its outputs.
    pub async fn reset(&self, id: &str) -> CoreResult<ProjectState> {
        let lock = self.lock(id);
        let _guard = lock.lock().await;
        let layout = self.existing(id)?;

        let status = self.status(id)?.status;
        if status == ProjectStatus::Running {
            return Err(CoreError::Conflict(format!(
                "project {} is running, abort it first",
                id
            )));
        }
        if status.is_terminal() {
            ProjectLayout::clear_dir(&layout.output_dir)?;
            ProjectLayout::clear_dir(&layout.tmp_dir)?;
            for path in [&layout.run.done_file, &layout.run.pid_file, &layout.data_file] {
                remove_file_if_exists(path)?;
            }
            StatusLog::new(&layout.run.status_file).clear()?;
            info!("Reset project {}", id);
        }
        self.status(id)
    }

    /// Delete a project, aborting it first if it is running.
    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        let lock = self.lock(id);
        {
            let _guard = lock.lock().await;
            let layout = self.existing(id)?;
            if self.status(id)?.status == ProjectStatus::Running {
                self.abort_locked(id, &layout).await?;
            }
            fs::remove_dir_all(&layout.root)?;
            info!("Deleted project {}", id);
        }
        self.locks.lock().remove(id);
        Ok(())
    }

    /// Ids of all projects, sorted.
    pub fn list(&self) -> CoreResult<Vec<String>> {
        let dir = self.context.projects_path();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let projects = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| validate_project_id(name).is_ok())
            .collect();
        Ok(projects)
    }

    /// Expected outputs for the staged inputs.
    ///
    /// Every profile matching the staged inputs contributes its output
    /// templates: one output per parent input file, or a single output for
    /// templates without a parent. Filename tokens are looked up in the
    /// global parameters first and the parent's metadata second.
    pub fn program(
        &self,
        parameters: &ParameterSet,
        inputs: &[(String, Metadata)],
    ) -> CoreResult<Vec<ProgramEntry>> {
        let profiles = self.service.profiles();
        if profiles.is_empty() {
            return Ok(Vec::new());
        }

        let mut staged: HashMap<String, usize> = HashMap::new();
        for (_, metadata) in inputs {
            if let Some(template) = &metadata.template {
                *staged.entry(template.clone()).or_default() += 1;
            }
        }
        let matching: Vec<_> = profiles.iter().filter(|p| p.matches(&staged)).collect();
        if matching.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add_message("input", "The staged input files do not match any profile");
            return Err(errors.into());
        }

        let globals = parameters.value_map();
        let mut program: Vec<ProgramEntry> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for profile in matching {
            for template in &profile.output {
                let parents: Vec<Option<&(String, Metadata)>> = match &template.parent {
                    Some(parent) => inputs
                        .iter()
                        .filter(|(_, m)| m.template.as_deref() == Some(parent.as_str()))
                        .map(Some)
                        .collect(),
                    None => vec![None],
                };

                for parent in parents {
                    let mut values: HashMap<String, String> = parent
                        .map(|(_, m)| m.attributes.clone().into_iter().collect())
                        .unwrap_or_default();
                    values.extend(globals.clone());

                    // Names derived from the parent are already distinct.
                    let seq = if template.filename.is_some() {
                        counts.get(template.id.as_str()).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    let filename = template.resolve_filename(
                        &values,
                        parent.map(|(name, _)| name.as_str()),
                        seq,
                    )?;
                    let parent_name = parent.map(|(name, _)| name.clone());

                    if let Some(existing) = program.iter_mut().find(|e| e.output.filename == filename) {
                        existing.inputs.extend(parent_name);
                        continue;
                    }
                    *counts.entry(template.id.as_str()).or_default() += 1;

                    let metadata = template.generate_metadata(parameters, parent.map(|(_, m)| m));
                    program.push(ProgramEntry {
                        output: FileEntry::new(filename, &metadata),
                        inputs: parent_name.into_iter().collect(),
                    });
                }
            }
        }
        debug!("Program has {} output files", program.len());
        Ok(program)
    }

    fn base_document(&self, user: Option<&str>) -> CoreResult<ServiceDocument> {
        let definition = self.service.definition();
        let mut document = ServiceDocument::new(&definition.system_id, &definition.system_name);
        document.system_description = definition.system_description.clone();
        document.base_url = self.context.base_url.clone();
        document.user = user.map(str::to_string);
        document.parameters = self.service.parameters()?;
        document.profiles = self.service.profiles().to_vec();
        document.input_formats = self
            .service
            .input_formats()
            .into_iter()
            .map(FormatInfo::from)
            .collect();
        document.output_formats = self
            .service
            .output_formats()
            .into_iter()
            .map(FormatInfo::from)
            .collect();
        Ok(document)
    }

    /// The wire document for the service, or for one project.
    ///
    /// A submitted project shows the parameters it was started with and its
    /// output program, read back from its data file.
    pub fn document(&self, id: Option<&str>, user: Option<&str>) -> CoreResult<ServiceDocument> {
        let mut document = self.base_document(user)?;
        let Some(id) = id else {
            document.projects = self.list()?;
            return Ok(document);
        };

        let layout = self.existing(id)?;
        let state = self.status(id)?;
        document.project = Some(id.to_string());
        document.status = status_info(&state);
        document.inputs = file_entries(layout.inputs()?);
        document.outputs = file_entries(layout.outputs()?);

        if layout.data_file.exists() {
            let submitted = ServiceDocument::from_xml(&fs::read_to_string(&layout.data_file)?)?;
            document.parameters = submitted.parameters;
            document.program = submitted.program;
        }
        Ok(document)
    }
}

fn status_info(state: &ProjectState) -> StatusInfo {
    let info = StatusInfo::new(state.status.code(), &state.message).completion(state.completion);
    if state.status == ProjectStatus::Error {
        info.error(&state.message)
    } else {
        info
    }
}

fn file_entries(files: Vec<(String, Metadata)>) -> Vec<FileEntry> {
    files
        .iter()
        .map(|(name, metadata)| FileEntry::new(name, metadata))
        .collect()
}

fn dispatch_error(error: RunnerError) -> CoreError {
    CoreError::Dispatch(error.to_string())
}

fn remove_file_if_exists(path: &Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
