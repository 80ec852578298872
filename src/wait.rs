//! Readiness conditions for the `wait` container helper.
//!
//! A container command can be wrapped in `wait` so it only starts once the
//! interfaces conlink wires into the container (or other prerequisites)
//! are actually there.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::info;

use crate::error::HelperError;

const SYS_CLASS_NET: &str = "/sys/class/net";
const ROUTE_TABLE: &str = "/proc/net/route";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The path exists.
    File(PathBuf),
    /// The network interface exists.
    Interface(String),
    /// The interface appears in the IPv4 routing table.
    Routed(String),
    /// A TCP connection to `host:port` succeeds.
    Tcp { host: String, port: u16 },
    /// `sh -c <command>` exits successfully.
    Command(String),
}

impl Condition {
    /// Parse `HOST:PORT`; the last `:` separates the port.
    pub fn tcp(address: &str) -> Result<Self, HelperError> {
        let (host, port) = address
            .rsplit_once(':')
            .filter(|(host, _)| !host.is_empty())
            .ok_or_else(|| HelperError::TcpAddress(address.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| HelperError::TcpAddress(address.to_string()))?;
        Ok(Condition::Tcp {
            host: host.to_string(),
            port,
        })
    }

    pub async fn is_met(&self) -> Result<bool, HelperError> {
        match self {
            Condition::File(path) => Ok(path.exists()),
            Condition::Interface(name) => Ok(Path::new(SYS_CLASS_NET).join(name).exists()),
            Condition::Routed(name) => {
                // No routing table (e.g. not Linux) means not ready yet.
                let table = std::fs::read_to_string(ROUTE_TABLE).unwrap_or_default();
                Ok(interface_has_route(&table, name))
            }
            Condition::Tcp { host, port } => {
                Ok(TcpStream::connect((host.as_str(), *port)).await.is_ok())
            }
            Condition::Command(command) => {
                let status = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .status()
                    .await
                    .map_err(|source| HelperError::Io {
                        context: format!("running '{command}'"),
                        source,
                    })?;
                Ok(status.success())
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::File(path) => write!(f, "file '{}'", path.display()),
            Condition::Interface(name) => write!(f, "interface '{name}'"),
            Condition::Routed(name) => write!(f, "IP/routing on interface '{name}'"),
            Condition::Tcp { host, port } => write!(f, "TCP connection to {host}:{port}"),
            Condition::Command(command) => write!(f, "command '{command}'"),
        }
    }
}

/// Whether `/proc/net/route` contents list a route through `interface`.
pub fn interface_has_route(table: &str, interface: &str) -> bool {
    table
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .any(|iface| iface == interface)
}

/// Poll `condition` every `interval` until it holds.
pub async fn wait_for(condition: &Condition, interval: Duration) -> Result<(), HelperError> {
    while !condition.is_met().await? {
        info!("waiting for {condition}...");
        tokio::time::sleep(interval).await;
    }
    info!("{condition} is ready");
    Ok(())
}

/// Wait for every condition in turn.
pub async fn wait_all(conditions: &[Condition], interval: Duration) -> Result<(), HelperError> {
    for condition in conditions {
        wait_for(condition, interval).await?;
    }
    Ok(())
}
