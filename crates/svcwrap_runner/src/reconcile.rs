//! Recovering process state from disk when no supervisor owns it.
//!
//! After a restart the pid file and the status log are all that is left of
//! a run. Liveness is checked with a null signal; a process that is gone
//! without an exit record gets one derived from its last status line.
//! Processes supervised in this process are left to their supervisor.

use std::fs;
use std::path::Path;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::warn;

use crate::error::{RunnerError, RunnerResult};
use crate::process::{is_supervised, remove_if_exists, ExitRecord, RunPaths};
use crate::status::StatusLog;

/// Process state as far as the filesystem can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Nothing has been started
    Idle,
    /// The recorded process is alive
    Running(u32),
    Finished(ExitRecord),
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Whether a process with this id exists.
pub fn is_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    match kill(target, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Signal the process group led by `pid`, falling back to the process alone.
pub fn signal_group(pid: u32, signal: Signal) -> RunnerResult<()> {
    let target = to_pid(pid).ok_or_else(|| RunnerError::Signal {
        pid,
        message: "invalid process id".to_string(),
    })?;
    killpg(target, signal)
        .or_else(|_| kill(target, signal))
        .map_err(|e| RunnerError::Signal {
            pid,
            message: e.to_string(),
        })
}

/// Read the pid file, if there is a usable one.
pub fn read_pid(path: &Path) -> RunnerResult<Option<u32>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match content.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        Err(_) => {
            warn!("Ignoring unreadable pid file {:?}", path);
            Ok(None)
        }
    }
}

/// Derive the process state from the files in `paths`.
///
/// A dead process without an exit record is marked finished: successful if
/// its last status line reported 100%, failed otherwise. The derived record
/// is written so later queries agree.
pub fn reconcile(paths: &RunPaths) -> RunnerResult<ProcessState> {
    if let Some(record) = ExitRecord::load(&paths.done_file)? {
        return Ok(ProcessState::Finished(record));
    }
    let Some(pid) = read_pid(&paths.pid_file)? else {
        return Ok(ProcessState::Idle);
    };
    if is_supervised(pid) || is_alive(pid) {
        return Ok(ProcessState::Running(pid));
    }

    let completed = StatusLog::new(&paths.status_file)
        .last()?
        .map_or(false, |entry| entry.percentage >= 100);
    warn!(
        "Process {} disappeared without an exit record, marking it {}",
        pid,
        if completed { "done" } else { "failed" }
    );
    let record = ExitRecord::reconciled(completed);
    record.save(&paths.done_file)?;
    remove_if_exists(&paths.pid_file)?;
    Ok(ProcessState::Finished(record))
}

/// Terminate a process known only by its pid file.
///
/// The aborted record is written before the signal is sent, so a supervisor
/// elsewhere that sees the child exit finds it and keeps it.
pub fn terminate(paths: &RunPaths) -> RunnerResult<Option<ExitRecord>> {
    let Some(pid) = read_pid(&paths.pid_file)? else {
        return Ok(None);
    };
    let record = ExitRecord::aborted();
    record.save(&paths.done_file)?;
    if is_alive(pid) {
        signal_group(pid, Signal::SIGTERM)?;
    }
    remove_if_exists(&paths.pid_file)?;
    Ok(Some(record))
}
