use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use conlink::dot::render_dot;
use conlink::loader::read_document;

/// Render a conlink network file as a Graphviz digraph on stdout.
#[derive(Parser, Debug)]
#[command(name = "net2dot", version, about)]
struct Cli {
    /// Network or compose file
    network_file: PathBuf,
    /// Name of the container that runs the emulated topology
    network_name: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let doc = read_document(&args.network_file)
        .with_context(|| format!("loading {}", args.network_file.display()))?;
    let dot = render_dot(&doc, &args.network_name).context("rendering network")?;
    print!("{dot}");
    Ok(())
}
