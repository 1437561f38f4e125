//! svcwrap CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or unknown project
//! - 3: Validation failure
//! - 4: Conflict with the project state
//! - 5: The wrapped program failed or could not be started

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use svcwrap_core::CoreError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const CONFLICT: u8 = 4;
    pub const PROGRAM_FAILED: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "svcwrap=debug,warn"
    } else if cli.quiet {
        "warn"
    } else {
        "svcwrap=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (plain, json) = if cli.log_json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer().with_target(false)), None)
    };
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init();

    let service = cli.service;
    let result = match cli.command {
        Commands::Validate(args) => commands::validate::execute(args, &service).await,
        Commands::Info(args) => commands::info::execute(args, &service).await,
        Commands::Create(args) => commands::create::execute(args, &service).await,
        Commands::Upload(args) => commands::upload::execute(args, &service).await,
        Commands::Start(args) => commands::start::execute(args, &service).await,
        Commands::Status(args) => commands::status::execute(args, &service).await,
        Commands::Abort(args) => commands::manage::abort(args, &service).await,
        Commands::Reset(args) => commands::manage::reset(args, &service).await,
        Commands::Delete(args) => commands::manage::delete(args, &service).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error to its exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::Validation(_)) => ExitCodes::VALIDATION_FAILURE,
        Some(CoreError::Template(_)) => ExitCodes::VALIDATION_FAILURE,
        Some(CoreError::Configuration(_)) => ExitCodes::VALIDATION_FAILURE,
        Some(CoreError::Conflict(_)) => ExitCodes::CONFLICT,
        Some(CoreError::Dispatch(_)) => ExitCodes::PROGRAM_FAILED,
        Some(CoreError::ProjectNotFound(_))
        | Some(CoreError::NotFound(_))
        | Some(CoreError::InvalidProjectId(_)) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}
