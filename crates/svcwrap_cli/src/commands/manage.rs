//! Abort, reset and delete commands.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::status::print_state;
use super::ServiceArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct ProjectArgs {
    /// Project id
    project: String,
}

pub async fn abort(args: ProjectArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    let state = manager.abort(&args.project).await?;
    print_state(&args.project, &state);
    Ok(ExitCodes::SUCCESS)
}

pub async fn reset(args: ProjectArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    let state = manager.reset(&args.project).await?;
    print_state(&args.project, &state);
    Ok(ExitCodes::SUCCESS)
}

pub async fn delete(args: ProjectArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    manager.delete(&args.project).await?;
    info!("Project {} removed", args.project);
    println!("🗑️  Deleted project {}", args.project);
    Ok(ExitCodes::SUCCESS)
}
