//! External helpers that mutate network namespaces.
//!
//! Each helper is an opaque program: a veth pair between two container
//! pids, a tunnel endpoint in our own namespace, or a host interface moved
//! into a container. Success is a zero exit status.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::DriverError;
use crate::network::{HostInterface, Tunnel};
use crate::state::ReadyLink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPaths {
    pub veth: PathBuf,
    pub tunnel: PathBuf,
    pub move_interface: PathBuf,
}

impl Default for DriverPaths {
    fn default() -> Self {
        Self {
            veth: PathBuf::from("/sbin/veth-link.sh"),
            tunnel: PathBuf::from("/sbin/tun-link.sh"),
            move_interface: PathBuf::from("/sbin/move-intf.sh"),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait LinkDriver {
    async fn create_veth(&self, link: &ReadyLink) -> Result<(), DriverError>;

    async fn create_tunnel(&self, tunnel: &Tunnel) -> Result<(), DriverError>;

    async fn move_interface(
        &self,
        container: &str,
        intf: &HostInterface,
        pid: u32,
    ) -> Result<(), DriverError>;
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: Option<impl ToString>) {
    if let Some(value) = value {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// `intf0 intf1 pid0 pid1 [--mac0 M] [--mac1 M] [--ip0 I] [--ip1 I]`
pub fn veth_args(link: &ReadyLink) -> Vec<String> {
    let mut args = vec![
        link.local.interface.clone(),
        link.peer.interface.clone(),
        link.local_pid.to_string(),
        link.peer_pid.to_string(),
    ];
    push_opt(&mut args, "--mac0", link.local.mac.as_deref());
    push_opt(&mut args, "--mac1", link.peer.mac.as_deref());
    push_opt(&mut args, "--ip0", link.local.ip.as_deref());
    push_opt(&mut args, "--ip1", link.peer.ip.as_deref());
    args
}

/// `intf type vni remote [--mac M] [--ip I] [link args...]`
pub fn tunnel_args(tunnel: &Tunnel) -> Vec<String> {
    let mut args = vec![
        tunnel.interface.clone(),
        tunnel.kind.to_string(),
        tunnel.vni.to_string(),
        tunnel.remote.clone(),
    ];
    push_opt(&mut args, "--mac", tunnel.mac.as_deref());
    push_opt(&mut args, "--ip", tunnel.ip.as_deref());
    args.extend(tunnel.link_args().unwrap_or_default());
    args
}

/// `type host-intf intf 1 pid [--mode M] [--vlanid V] [--ip I] [--nat N]`
///
/// The literal `1` selects "target namespace given by pid".
pub fn move_args(intf: &HostInterface, pid: u32) -> Vec<String> {
    let mut args = vec![
        intf.kind.clone(),
        intf.host_interface.clone(),
        intf.interface.clone(),
        "1".to_string(),
        pid.to_string(),
    ];
    push_opt(&mut args, "--mode", intf.mode.as_deref());
    push_opt(&mut args, "--vlanid", intf.vlanid);
    push_opt(&mut args, "--ip", intf.ip.as_deref());
    push_opt(&mut args, "--nat", intf.nat.as_deref());
    args
}

/// Runs the helper scripts shipped in the conlink image.
#[derive(Debug, Clone)]
pub struct ScriptDriver {
    paths: DriverPaths,
    verbose: bool,
}

impl ScriptDriver {
    /// With `verbose`, helpers receive `VERBOSE=1` and details are logged.
    /// Nothing else from conlink's own environment besides `PATH` is passed
    /// on.
    pub fn new(paths: DriverPaths, verbose: bool) -> Self {
        Self { paths, verbose }
    }

    async fn run(&self, program: &Path, args: Vec<String>) -> Result<(), DriverError> {
        let command = format!("{} {}", program.display(), args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        // Helpers see only PATH and, when verbose, VERBOSE=1.
        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        if self.verbose {
            cmd.env("VERBOSE", "1");
        }

        debug!(%command, "running driver");
        let output = cmd.output().await.map_err(|source| DriverError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(DriverError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.unwrap_or(placeholder)
}

impl LinkDriver for ScriptDriver {
    async fn create_veth(&self, link: &ReadyLink) -> Result<(), DriverError> {
        if self.verbose {
            info!(
                left_pid = link.local_pid,
                right_pid = link.peer_pid,
                left_mac = or_placeholder(link.local.mac.as_deref(), "<AUTOMATIC>"),
                right_mac = or_placeholder(link.peer.mac.as_deref(), "<AUTOMATIC>"),
                left_ip = or_placeholder(link.local.ip.as_deref(), "<UNSET>"),
                right_ip = or_placeholder(link.peer.ip.as_deref(), "<UNSET>"),
                "link {} details",
                link.index
            );
        }
        self.run(&self.paths.veth, veth_args(link)).await
    }

    async fn create_tunnel(&self, tunnel: &Tunnel) -> Result<(), DriverError> {
        if self.verbose {
            let link_args = tunnel.link_args().unwrap_or_default().join(" ");
            info!(
                mac = or_placeholder(tunnel.mac.as_deref(), "<AUTOMATIC>"),
                ip = or_placeholder(tunnel.ip.as_deref(), "<UNSET>"),
                link_args = if link_args.is_empty() { "<UNSET>" } else { link_args.as_str() },
                "tunnel {} details",
                tunnel.interface
            );
        }
        self.run(&self.paths.tunnel, tunnel_args(tunnel)).await
    }

    async fn move_interface(
        &self,
        container: &str,
        intf: &HostInterface,
        pid: u32,
    ) -> Result<(), DriverError> {
        if self.verbose {
            info!(
                mode = ?intf.mode,
                vlanid = ?intf.vlanid,
                ip = ?intf.ip,
                nat = ?intf.nat,
                "interface {container}/{} details",
                intf.interface
            );
        }
        self.run(&self.paths.move_interface, move_args(intf, pid)).await
    }
}
