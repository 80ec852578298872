//! The event loop that turns container starts into network wiring.
//!
//! A single task owns the [`ConnectivityState`] and processes one container
//! at a time: every driver call for an event finishes before the next event
//! is pulled.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::driver::LinkDriver;
use crate::error::{ConlinkError, Result, RuntimeError};
use crate::network::{NetworkConfig, Tunnel};
use crate::runtime::{ContainerDetails, ContainerRuntime, LabelFilter};
use crate::state::{ConnectivityState, Registration};

pub struct Orchestrator<R, D> {
    runtime: R,
    driver: D,
    state: ConnectivityState,
}

impl<R: ContainerRuntime, D: LinkDriver> Orchestrator<R, D> {
    pub fn new(runtime: R, driver: D, config: &NetworkConfig) -> Self {
        Self {
            runtime,
            driver,
            state: ConnectivityState::new(config),
        }
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// Create every tunnel endpoint; these do not wait for any container.
    pub async fn create_tunnels(&self, tunnels: &[Tunnel]) -> Result<()> {
        for tunnel in tunnels {
            info!(
                "creating tunnel {} ({} vni {} to {})",
                tunnel.interface, tunnel.kind, tunnel.vni, tunnel.remote
            );
            self.driver.create_tunnel(tunnel).await?;
        }
        Ok(())
    }

    /// Process one container id from the initial listing or a start event.
    pub async fn handle_container(&mut self, cid: &str) -> Result<()> {
        let details = match self.runtime.inspect(cid).await {
            Ok(details) => details,
            Err(err) if err.is_gone() => {
                debug!(%cid, "container no longer exists, ignoring");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let Some(container) = self.state.container(&details.name) else {
            debug!(name = %details.name, "container not in network config, ignoring");
            return Ok(());
        };
        if container.pid.is_some() {
            debug!(name = %details.name, "container already registered, ignoring");
            return Ok(());
        }

        let Some(pid) = self.resolve_pid(&details).await? else {
            warn!(name = %details.name, "container exited before its pid was known, skipping");
            return Ok(());
        };

        self.register_start(&details.name, &details.id, pid).await
    }

    /// The container's main pid, or the first live pid in its process
    /// table when the main process is already gone.
    async fn resolve_pid(&self, details: &ContainerDetails) -> Result<Option<u32>> {
        if let Some(pid) = details.pid.filter(|&pid| self.runtime.process_exists(pid)) {
            return Ok(Some(pid));
        }
        let pids = match self.runtime.top_pids(&details.id).await {
            Ok(pids) => pids,
            Err(err) if err.is_gone() => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(pids.into_iter().find(|&pid| self.runtime.process_exists(pid)))
    }

    /// Record a started container, create whatever links became possible
    /// and run the one-shot completions of every fully connected container.
    pub async fn register_start(&mut self, name: &str, cid: &str, pid: u32) -> Result<()> {
        match self.state.register_start(name, cid, pid) {
            Registration::Untracked | Registration::Duplicate => return Ok(()),
            Registration::Registered => {}
        }
        info!(name, pid, "container started");

        self.span_links(name).await?;
        self.complete_ready().await
    }

    async fn span_links(&mut self, name: &str) -> Result<()> {
        for link in self.state.ready_links(name) {
            info!(
                "creating link {}: {}/{} <-> {}/{}",
                link.index,
                link.local.container,
                link.local.interface,
                link.peer.container,
                link.peer.interface
            );
            self.driver.create_veth(&link).await?;
            self.state.mark_connected(link.index);
        }
        Ok(())
    }

    async fn complete_ready(&mut self) -> Result<()> {
        for name in self.state.due_interface_moves() {
            self.move_interfaces(&name).await?;
        }
        for name in self.state.due_commands() {
            self.run_commands(&name).await?;
        }
        Ok(())
    }

    async fn move_interfaces(&mut self, name: &str) -> Result<()> {
        let Some(container) = self.state.container(name) else {
            return Ok(());
        };
        let (interfaces, pid) = (container.interfaces.clone(), container.pid);
        if let Some(pid) = pid {
            for intf in &interfaces {
                info!(
                    "moving host interface {} into {name} as {}",
                    intf.host_interface, intf.interface
                );
                self.driver.move_interface(name, intf, pid).await?;
            }
        }
        self.state.mark_interfaces_moved(name);
        Ok(())
    }

    async fn run_commands(&mut self, name: &str) -> Result<()> {
        let Some(container) = self.state.container(name) else {
            return Ok(());
        };
        let (commands, cid) = (container.commands.clone(), container.cid.clone());
        if let Some(cid) = cid {
            for command in &commands {
                info!("running command in {name}: {command}");
                match self.runtime.exec(&cid, command).await {
                    Ok(()) => {}
                    Err(err) if err.is_gone() => {
                        warn!(name, "container went away while running commands");
                        break;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        self.state.mark_commands_completed(name);
        Ok(())
    }

    /// Wire the whole topology.
    ///
    /// The start-event subscription is established before running
    /// containers are listed, so a container starting in between is seen
    /// at least once; repeats are dropped by
    /// [`ConnectivityState::register_start`].
    pub async fn run(
        &mut self,
        tunnels: &[Tunnel],
        filter: &LabelFilter,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut events = self.runtime.subscribe_starts(filter).await?;
        info!("reached healthy state");

        self.create_tunnels(tunnels).await?;

        for summary in self.runtime.list_running(filter).await? {
            debug!(name = %summary.name, "found running container");
            self.handle_container(&summary.id).await?;
        }

        while !self.state.all_connected() {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, events.recv())
                    .await
                    .map_err(|_| ConlinkError::Timeout {
                        unconnected: self.state.unconnected(),
                    })?,
                None => events.recv().await,
            };
            match next {
                Some(Ok(cid)) => self.handle_container(&cid).await?,
                Some(Err(err)) => return Err(err.into()),
                None => return Err(RuntimeError::StreamClosed.into()),
            }
        }

        info!("all containers are connected");
        Ok(())
    }
}
