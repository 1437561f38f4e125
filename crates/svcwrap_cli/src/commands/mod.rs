//! CLI command definitions.
//!
//! Every command operates on one service definition file. Commands return
//! the process exit code on success.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use svcwrap_core::{ProjectManager, Service, ServiceContext};

pub mod create;
pub mod info;
pub mod manage;
pub mod start;
pub mod status;
pub mod upload;
pub mod validate;

/// svcwrap - expose a command-line program as a project-based service
#[derive(Parser)]
#[command(name = "svcwrap")]
#[command(version, about = "svcwrap - expose a command-line program as a project-based service")]
#[command(long_about = r#"
svcwrap wraps a command-line program described by a service definition.
Clients create projects, upload input files, set parameters and start the
program; its progress and outputs are tracked per project.

COMMANDS:
  validate  → Check a service definition
  info      → Print the service or project document (XML)
  create    → Create a project
  upload    → Stage an input file in a project
  start     → Bind parameters and run the program
  status    → Show the state of a project
  abort     → Terminate a running project
  reset     → Return a finished project to ready
  delete    → Remove a project

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or unknown project
  3 - Validation failure
  4 - Conflict with the project state
  5 - The wrapped program failed or could not be started
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a service definition
    Validate(validate::ValidateArgs),

    /// Print the service document, or a project's
    Info(info::InfoArgs),

    /// Create a project
    Create(create::CreateArgs),

    /// Stage an input file
    Upload(upload::UploadArgs),

    /// Bind the global parameters and start the program
    Start(start::StartArgs),

    /// Show the state of a project
    Status(status::StatusArgs),

    /// Terminate a running project
    Abort(manage::ProjectArgs),

    /// Return a finished project to ready, discarding its outputs
    Reset(manage::ProjectArgs),

    /// Delete a project
    Delete(manage::ProjectArgs),
}

/// Where the service comes from.
#[derive(Args, Clone, Debug)]
pub struct ServiceArgs {
    /// Service definition file (YAML, or TOML with a .toml extension)
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "SVCWRAP_DEFINITION",
        default_value = "service.yaml"
    )]
    pub definition: PathBuf,

    /// Storage root, overriding the definition
    #[arg(long, global = true, env = "SVCWRAP_ROOT")]
    pub root: Option<PathBuf>,

    /// Keep temporary files and log compiled commands
    #[arg(long, global = true)]
    pub debug: bool,
}

impl ServiceArgs {
    pub fn service(&self) -> Result<Service> {
        Service::load(&self.definition)
            .with_context(|| format!("Failed to load {}", self.definition.display()))
    }

    pub fn manager(&self) -> Result<ProjectManager> {
        let service = self.service()?;
        let mut context = ServiceContext::from_definition(service.definition()).with_debug(self.debug);
        if let Some(root) = &self.root {
            context = context.with_root(root);
        }
        Ok(ProjectManager::new(Arc::new(service), context))
    }
}

/// Parse `key=value` pairs given on the command line.
pub fn parse_values(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid parameter '{}', expected key=value", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid parameter '{}': empty key", pair);
        }
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}
