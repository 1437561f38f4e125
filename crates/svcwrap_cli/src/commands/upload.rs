//! Upload command - Stage an input file.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use svcwrap_core::InputUpload;

use super::{parse_values, ServiceArgs};
use crate::ExitCodes;

#[derive(Args)]
pub struct UploadArgs {
    /// Project id
    project: String,

    /// Input template the file is staged under
    template: String,

    /// File to upload
    file: PathBuf,

    /// Name to stage the file under
    #[arg(short, long)]
    name: Option<String>,

    /// Converter to run on the file first
    #[arg(short, long)]
    converter: Option<String>,

    /// Template parameter, as key=value (repeatable)
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,

    /// User the upload is made as
    #[arg(short, long, env = "SVCWRAP_USER")]
    user: Option<String>,
}

pub async fn execute(args: UploadArgs, service_args: &ServiceArgs) -> Result<u8> {
    let manager = service_args.manager()?;

    let mut upload = InputUpload::new(&args.template, &args.file).postdata(parse_values(&args.params)?);
    if let Some(name) = args.name {
        upload = upload.filename(name);
    }
    if let Some(converter) = args.converter {
        upload = upload.converter(converter);
    }

    let entry = manager
        .add_input(&args.project, upload, args.user.as_deref())
        .await?;
    println!("✅ Staged {} ({})", entry.filename, entry.format);
    for (key, value) in &entry.metadata {
        println!("   {} = {}", key, value);
    }
    Ok(ExitCodes::SUCCESS)
}
