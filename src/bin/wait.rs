use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

use conlink::utils::exec_command;
use conlink::wait::{Condition, wait_all};

/// Wait until files, interfaces, routes, TCP ports or commands are ready,
/// then exec the command given after `--`.
#[derive(Parser, Debug)]
#[command(name = "wait", version, about)]
struct Cli {
    /// Wait until the file exists
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Wait until the network interface exists
    #[arg(short = 'i', long = "intf", visible_alias = "if", value_name = "IFACE")]
    interfaces: Vec<String>,

    /// Wait until the interface has IP/routing
    #[arg(short = 'I', long = "ip", value_name = "IFACE")]
    routed: Vec<String>,

    /// Wait until HOST:PORT accepts TCP connections
    #[arg(short = 't', long = "tcp", value_name = "HOST:PORT")]
    tcp: Vec<String>,

    /// Wait until the shell command succeeds
    #[arg(short = 'c', long = "cmd", visible_alias = "command", value_name = "COMMAND")]
    commands: Vec<String>,

    /// Seconds between retries
    #[arg(short = 's', long = "sleep", value_name = "SECONDS", default_value_t = 1)]
    sleep: u64,

    /// Command to exec once everything is ready
    #[arg(last = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Pair each value of option `id` with its position on the command line.
fn positioned<T>(
    matches: &ArgMatches,
    id: &str,
    values: Vec<T>,
    make: impl Fn(T) -> Result<Condition>,
) -> Result<Vec<(usize, Condition)>> {
    let indices = matches.indices_of(id).into_iter().flatten();
    indices
        .zip(values)
        .map(|(idx, value)| Ok((idx, make(value)?)))
        .collect()
}

/// Conditions in the order they were given.
fn conditions(matches: &ArgMatches, cli: Cli) -> Result<Vec<Condition>> {
    let mut all = positioned(matches, "files", cli.files, |p| Ok(Condition::File(p)))?;
    all.extend(positioned(matches, "interfaces", cli.interfaces, |i| {
        Ok(Condition::Interface(i))
    })?);
    all.extend(positioned(matches, "routed", cli.routed, |i| Ok(Condition::Routed(i)))?);
    all.extend(positioned(matches, "tcp", cli.tcp, |t| Ok(Condition::tcp(&t)?))?);
    all.extend(positioned(matches, "commands", cli.commands, |c| {
        Ok(Condition::Command(c))
    })?);
    all.sort_by_key(|(idx, _)| *idx);
    Ok(all.into_iter().map(|(_, condition)| condition).collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    let interval = Duration::from_secs(cli.sleep);
    let command = cli.command.clone();

    let conditions = conditions(&matches, cli)?;
    wait_all(&conditions, interval).await.context("waiting")?;

    if command.is_empty() {
        return Ok(());
    }
    Err(exec_command(&command)).with_context(|| format!("running {}", command.join(" ")))
}
