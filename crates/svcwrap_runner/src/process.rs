//! Spawning and supervising the wrapped program.
//!
//! Each spawned process is owned by a supervisor task. The task waits for
//! the child to exit or for an abort request, writes the exit record and
//! removes the pid file. The [`ProcessHandle`] returned to the caller is the
//! only way to reach the task; it can be shared, so one caller may abort
//! while another waits.
//!
//! Pids under supervision are registered process-wide until their exit
//! record is written, so reconciliation never judges a supervised process
//! by its pid alone.

use std::collections::BTreeSet;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::reconcile::signal_group;

/// Files the runner reads and writes for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Working directory of the child
    pub workdir: PathBuf,
    /// Holds the pid while the process runs
    pub pid_file: PathBuf,
    /// Exit record, written once the process has terminated
    pub done_file: PathBuf,
    /// Status log written by the child
    pub status_file: PathBuf,
    /// Receives stdout and stderr of the child
    pub log_file: Option<PathBuf>,
}

impl RunPaths {
    /// Conventional layout under a project directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            workdir: dir.to_path_buf(),
            pid_file: dir.join(".pid"),
            done_file: dir.join(".done"),
            status_file: dir.join(".status"),
            log_file: Some(dir.join("output").join("error.log")),
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    /// Exit code, absent when killed by a signal or unknown
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub aborted: bool,
    /// Derived after the fact instead of observed by a supervisor
    #[serde(default)]
    pub reconciled: bool,
    pub finished_at: DateTime<Utc>,
}

impl ExitRecord {
    pub fn exited(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            aborted: false,
            reconciled: false,
            finished_at: Utc::now(),
        }
    }

    pub fn aborted() -> Self {
        Self {
            exit_code: None,
            aborted: true,
            reconciled: false,
            finished_at: Utc::now(),
        }
    }

    /// Record for a process that disappeared without a supervisor.
    pub fn reconciled(completed: bool) -> Self {
        Self {
            exit_code: completed.then_some(0),
            aborted: false,
            reconciled: true,
            finished_at: Utc::now(),
        }
    }

    pub fn success(&self) -> bool {
        !self.aborted && self.exit_code == Some(0)
    }

    /// Write the record, replacing any previous one in a single rename.
    pub fn save(&self, path: &Path) -> RunnerResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!("Saved exit record to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> RunnerResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

static SUPERVISED: Mutex<BTreeSet<u32>> = parking_lot::const_mutex(BTreeSet::new());

/// Whether a supervisor task in this process still owns `pid`.
pub fn is_supervised(pid: u32) -> bool {
    SUPERVISED.lock().contains(&pid)
}

type Outcome = Option<Result<ExitRecord, String>>;

/// Handle to a supervised process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    exit: watch::Receiver<Outcome>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the supervisor has finished (exit record written).
    pub fn is_finished(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Wait for the process to end.
    pub async fn wait(&self) -> RunnerResult<ExitRecord> {
        let mut exit = self.exit.clone();
        let outcome = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RunnerError::Supervisor("supervisor ended without a record".into()))?
            .clone();
        match outcome {
            Some(Ok(record)) => Ok(record),
            Some(Err(message)) => Err(RunnerError::Supervisor(message)),
            None => Err(RunnerError::Supervisor("supervisor ended without a record".into())),
        }
    }

    /// Ask the supervisor to terminate the process and wait until it has.
    pub async fn abort(&self) -> RunnerResult<ExitRecord> {
        if let Some(cancel) = self.cancel.lock().take() {
            // The supervisor may already be gone if the child exited.
            let _ = cancel.send(());
        }
        self.wait().await
    }
}

/// Starts wrapped programs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn `command` and hand it to a supervisor task.
    async fn spawn(&self, command: &str, paths: &RunPaths) -> RunnerResult<ProcessHandle>;
}

/// Runs commands through `sh -c` in their own process group.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    grace: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            grace: Duration::from_secs(5),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Time between SIGTERM and SIGKILL on abort.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn output(&self, paths: &RunPaths) -> RunnerResult<(Stdio, Stdio)> {
        match &paths.log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = fs::File::create(path)?;
                Ok((Stdio::from(file.try_clone()?), Stdio::from(file)))
            }
            None => Ok((Stdio::null(), Stdio::null())),
        }
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn spawn(&self, command: &str, paths: &RunPaths) -> RunnerResult<ProcessHandle> {
        remove_if_exists(&paths.done_file)?;
        let (stdout, stderr) = self.output(paths)?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&paths.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::Spawn(format!("{}: {}", self.shell, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| RunnerError::Spawn("failed to get process ID".to_string()))?;

        SUPERVISED.lock().insert(pid);
        if let Err(e) = fs::write(&paths.pid_file, pid.to_string()) {
            SUPERVISED.lock().remove(&pid);
            let _ = child.start_kill();
            return Err(e.into());
        }
        info!("Spawned process {}", pid);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        let paths = paths.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            let outcome = supervise(child, pid, cancel_rx, &paths, grace)
                .await
                .map_err(|e| e.to_string());
            if let Err(e) = &outcome {
                warn!("Supervisor of process {} failed: {}", pid, e);
            }
            SUPERVISED.lock().remove(&pid);
            exit_tx.send_replace(Some(outcome));
        });

        Ok(ProcessHandle {
            pid,
            cancel: Mutex::new(Some(cancel_tx)),
            exit: exit_rx,
        })
    }
}

async fn supervise(
    mut child: Child,
    pid: u32,
    mut cancel: oneshot::Receiver<()>,
    paths: &RunPaths,
    grace: Duration,
) -> RunnerResult<ExitRecord> {
    let record = tokio::select! {
        status = child.wait() => {
            let status = status?;
            // An abort from outside this supervisor leaves its record first.
            match ExitRecord::load(&paths.done_file) {
                Ok(Some(existing)) if existing.aborted => {
                    info!("Process {} was aborted", pid);
                    existing
                }
                _ => {
                    info!("Process {} exited with {:?}", pid, status.code());
                    ExitRecord::exited(status.code())
                }
            }
        }
        Ok(()) = &mut cancel => {
            info!("Aborting process {}", pid);
            if let Err(e) = signal_group(pid, nix::sys::signal::Signal::SIGTERM) {
                debug!("{}", e);
            }
            if tokio::time::timeout(grace, child.wait()).await.is_err() {
                warn!("Process {} ignored SIGTERM, killing it", pid);
                let _ = signal_group(pid, nix::sys::signal::Signal::SIGKILL);
                child.kill().await?;
            }
            ExitRecord::aborted()
        }
    };

    record.save(&paths.done_file)?;
    remove_if_exists(&paths.pid_file)?;
    Ok(record)
}

pub(crate) fn remove_if_exists(path: &Path) -> RunnerResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
