//! Create command - Create a project.

use anyhow::Result;
use clap::Args;

use svcwrap_core::ProjectManager;

use super::ServiceArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct CreateArgs {
    /// Project id (generated when omitted)
    project: Option<String>,
}

pub async fn execute(args: CreateArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    let id = args.project.unwrap_or_else(ProjectManager::generate_id);
    let layout = manager.create(&id).await?;

    println!("✅ Project {} ready", id);
    println!("   📁 {}", layout.root.display());
    Ok(ExitCodes::SUCCESS)
}
