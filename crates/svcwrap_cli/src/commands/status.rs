//! Status command - Show the state of a project.

use anyhow::Result;
use clap::Args;

use svcwrap_core::{ProjectState, ProjectStatus};

use super::ServiceArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct StatusArgs {
    /// Project id
    project: String,

    /// Print the project document instead of a summary
    #[arg(long)]
    xml: bool,
}

pub async fn execute(args: StatusArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;
    if args.xml {
        let document = manager.document(Some(&args.project), None)?;
        print!("{}", document.to_xml()?);
        return Ok(ExitCodes::SUCCESS);
    }

    let state = manager.status(&args.project)?;
    print_state(&args.project, &state);

    let layout = manager.layout(&args.project)?;
    let inputs = layout.inputs()?;
    if !inputs.is_empty() {
        println!("   Inputs:");
        for (name, metadata) in &inputs {
            println!("     📄 {} ({})", name, metadata.format);
        }
    }
    if state.status.is_terminal() {
        let outputs = layout.outputs()?;
        println!("   Outputs:");
        for (name, metadata) in &outputs {
            if metadata.format.is_empty() {
                println!("     📄 {}", name);
            } else {
                println!("     📄 {} ({})", name, metadata.format);
            }
        }
    }
    Ok(ExitCodes::SUCCESS)
}

/// One-line summary of a project state.
pub fn print_state(project: &str, state: &ProjectState) {
    let icon = match state.status {
        ProjectStatus::Ready => "📋",
        ProjectStatus::Running => "⏳",
        ProjectStatus::Done => "✅",
        ProjectStatus::Aborted => "⚠️ ",
        ProjectStatus::Error => "❌",
    };
    println!(
        "{} {}: {} [{}%] {}",
        icon, project, state.status, state.completion, state.message
    );
}
