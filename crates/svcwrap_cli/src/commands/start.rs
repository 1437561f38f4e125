//! Start command - Bind the global parameters and run the program.

use anyhow::Result;
use clap::Args;

use svcwrap_core::ProjectStatus;

use super::status::print_state;
use super::{parse_values, ServiceArgs};
use crate::ExitCodes;

#[derive(Args)]
pub struct StartArgs {
    /// Project id
    project: String,

    /// Global parameter, as key=value (repeatable)
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// User the project is started as
    #[arg(short, long, env = "SVCWRAP_USER")]
    user: Option<String>,

    /// Return once the program is started instead of waiting for it
    #[arg(long)]
    detach: bool,
}

pub async fn execute(args: StartArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    let postdata = parse_values(&args.params)?;

    let state = manager
        .submit(&args.project, &postdata, args.user.as_deref())
        .await?;
    if args.detach {
        print_state(&args.project, &state);
        return Ok(ExitCodes::SUCCESS);
    }

    println!("⏳ Running project {} (pid {})", args.project, state.pid.unwrap_or_default());
    let state = manager.wait(&args.project).await?;
    print_state(&args.project, &state);

    if state.status == ProjectStatus::Done {
        Ok(ExitCodes::SUCCESS)
    } else {
        Ok(ExitCodes::PROGRAM_FAILED)
    }
}
