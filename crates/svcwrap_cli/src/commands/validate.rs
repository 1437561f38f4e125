//! Validate command - Check a service definition.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::ServiceArgs;
use crate::ExitCodes;

#[derive(Args)]
pub struct ValidateArgs {
    /// Also check that the wrapped program can be found
    #[arg(long)]
    check_command: bool,
}

pub async fn execute(args: ValidateArgs, service_args: &ServiceArgs) -> Result<u8> {
    info!("Validating {}", service_args.definition.display());
    let service = service_args.service()?;
    let definition = service.definition();

    println!("✅ Service definition is valid");
    println!();
    println!("  System:     {} ({})", definition.system_id, definition.system_name);
    println!("  Root:       {}", definition.root.display());
    println!("  Parameters: {}", service.parameters()?.len());
    println!("  Formats:    {}", service.formats().len());
    println!("  Converters: {}", service.converters().len());
    println!("  Profiles:   {}", service.profiles().len());

    if args.check_command {
        match definition.command.check_resolvable() {
            Ok(()) => println!("  Command:    ✅ {}", definition.command.as_str()),
            Err(e) => {
                println!("  Command:    ❌ {}", e);
                return Ok(ExitCodes::PROGRAM_FAILED);
            }
        }
    }
    Ok(ExitCodes::SUCCESS)
}
