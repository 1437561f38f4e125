//! Info command - Print the service document.

use anyhow::Result;
use clap::Args;

use super::ServiceArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct InfoArgs {
    /// Describe this project instead of the service
    #[arg(short, long)]
    project: Option<String>,

    /// User the document is rendered for
    #[arg(short, long, env = "SVCWRAP_USER")]
    user: Option<String>,
}

pub async fn execute(args: InfoArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    let document = manager.document(args.project.as_deref(), args.user.as_deref())?;
    print!("{}", document.to_xml()?);
    Ok(ExitCodes::SUCCESS)
}
