//! # svcwrap_runner
//!
//! Subprocess dispatch for svcwrap.
//!
//! This crate turns a command template into a concrete command line, runs it
//! under a supervisor task and keeps the on-disk trail (pid file, exit
//! record, status log) that lets state be recovered after a restart.
//!
//! # Features
//!
//! - **Command templates**: `$INPUTDIRECTORY`, `$OUTPUTDIRECTORY`,
//!   `$TMPDIRECTORY`, `$STATUSFILE`, `$DATAFILE`, `$PARAMETERS`, `$USERNAME`
//! - **Supervision**: one task per process owns the child handle; abort goes
//!   through that task
//! - **Reconciliation**: liveness probe on the recorded pid, exit record
//!   derived for processes that vanished
//! - **Status log**: `<pct>%\t<timestamp>\t<message>` lines, partial trailing
//!   lines ignored
//!
//! # Example
//!
//! ```rust,no_run
//! use svcwrap_runner::{CommandContext, CommandTemplate, ProcessRunner, RunPaths, ShellRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = CommandTemplate::new("tool $INPUTDIRECTORY $OUTPUTDIRECTORY $PARAMETERS")?;
//!     let context = CommandContext::new()
//!         .input_dir("/srv/p1/input")
//!         .output_dir("/srv/p1/output")
//!         .parameters(vec!["-n 3".to_string()]);
//!
//!     let handle = ShellRunner::new()
//!         .spawn(&template.compile(&context), &RunPaths::in_dir("/srv/p1"))
//!         .await?;
//!     let record = handle.wait().await?;
//!     println!("Exit code: {:?}", record.exit_code);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod process;
pub mod reconcile;
pub mod status;

pub use config::{resolve_program, CommandContext, CommandTemplate, ANONYMOUS_USER, TOKENS};
pub use error::{RunnerError, RunnerResult};
pub use process::{is_supervised, ExitRecord, ProcessHandle, ProcessRunner, RunPaths, ShellRunner};
pub use reconcile::{is_alive, read_pid, reconcile, signal_group, terminate, ProcessState};
pub use status::{StatusEntry, StatusLog};
