use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use conlink::copy::copy_tree;
use conlink::interpolation::process_environment;
use conlink::utils::exec_command;

/// Recursively copy a directory, optionally substituting `{{VAR}}` from the
/// environment, then exec the command given after `--`.
#[derive(Parser, Debug)]
#[command(name = "copy", version, about)]
struct Cli {
    /// Enable variable substitution
    #[arg(short = 'T', long = "template")]
    template: bool,

    /// Source directory
    source: PathBuf,

    /// Destination directory
    destination: PathBuf,

    /// Command to exec after copying
    #[arg(last = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    let env = cli.template.then(process_environment);
    copy_tree(&cli.source, &cli.destination, env.as_ref()).with_context(|| {
        format!(
            "copying {} to {}",
            cli.source.display(),
            cli.destination.display()
        )
    })?;

    if cli.command.is_empty() {
        return Ok(());
    }
    tracing::info!("running: {:?}", cli.command);
    Err(exec_command(&cli.command)).with_context(|| format!("running {}", cli.command.join(" ")))
}
