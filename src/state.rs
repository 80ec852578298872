//! Per-container connectivity bookkeeping.
//!
//! One [`ContainerState`] exists for every container named by a link,
//! command or host interface. The set is fixed at construction; start
//! events only fill in ids and move counters.
//!
//! ```text
//! Pending ──pid──▶ Connecting ──last link──▶ FullyConnected
//!    └────────pid, no links─────────────────────────┘
//! ```
//!
//! `FullyConnected` gates two one-shot completions: interface moves and
//! commands.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::network::{HostInterface, Link, LinkEndpoint, NetworkConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No process id observed yet.
    Pending,
    /// Running, with links still waiting on peers.
    Connecting,
    /// Running and every link created.
    FullyConnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub name: String,
    pub cid: Option<String>,
    pub pid: Option<u32>,
    /// Indices into the link table; a self-link appears twice.
    pub links: Vec<usize>,
    pub connected: usize,
    pub unconnected: usize,
    pub commands: Vec<String>,
    pub commands_completed: bool,
    pub interfaces: Vec<HostInterface>,
    pub interfaces_completed: bool,
}

impl ContainerState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.pid, self.unconnected) {
            (None, _) => Phase::Pending,
            (Some(_), 0) => Phase::FullyConnected,
            (Some(_), _) => Phase::Connecting,
        }
    }

    pub fn is_fully_connected(&self) -> bool {
        self.phase() == Phase::FullyConnected
    }

    pub fn total_links(&self) -> usize {
        self.connected + self.unconnected
    }
}

/// Outcome of recording a start event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Not part of the declared topology.
    Untracked,
    /// Already has a pid; the event is a repeat.
    Duplicate,
    Registered,
}

/// A link whose two endpoints both have a known pid, oriented from the
/// container whose start made it ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyLink {
    pub index: usize,
    pub local: LinkEndpoint,
    pub peer: LinkEndpoint,
    pub local_pid: u32,
    pub peer_pid: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityState {
    links: Vec<Link>,
    connected: Vec<bool>,
    containers: Vec<ContainerState>,
    by_name: HashMap<String, usize>,
}

impl ConnectivityState {
    pub fn new(config: &NetworkConfig) -> Self {
        let mut state = Self::default();

        // Slot order decides completion order within one event: every
        // left endpoint, then every right endpoint, then commands and
        // interfaces.
        let names = config
            .links
            .iter()
            .map(|l| &l.left.container)
            .chain(config.links.iter().map(|l| &l.right.container))
            .chain(config.commands.iter().map(|c| &c.container))
            .chain(config.interfaces.iter().map(|i| &i.container));
        for name in names {
            state.slot(name);
        }

        for (idx, link) in config.links.iter().enumerate() {
            let mut link = link.clone();
            link.index = idx;
            for name in [&link.left.container, &link.right.container] {
                let slot = state.slot(name);
                let container = &mut state.containers[slot];
                container.links.push(idx);
                container.unconnected += 1;
            }
            state.links.push(link);
            state.connected.push(false);
        }

        for cmd in &config.commands {
            let slot = state.slot(&cmd.container);
            state.containers[slot].commands.extend(cmd.command.to_vec());
        }

        for intf in &config.interfaces {
            let slot = state.slot(&intf.container);
            state.containers[slot].interfaces.push(intf.clone());
        }

        state
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.by_name.get(name) {
            return slot;
        }
        let slot = self.containers.len();
        self.containers.push(ContainerState::new(name));
        self.by_name.insert(name.to_string(), slot);
        slot
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn container(&self, name: &str) -> Option<&ContainerState> {
        self.by_name.get(name).map(|&slot| &self.containers[slot])
    }

    /// All tracked containers in first-reference order.
    pub fn containers(&self) -> impl Iterator<Item = &ContainerState> {
        self.containers.iter()
    }

    pub fn is_link_connected(&self, index: usize) -> bool {
        self.connected.get(index).copied().unwrap_or(false)
    }

    /// Record the first start of `name`. Later starts are reported as
    /// [`Registration::Duplicate`] and change nothing.
    pub fn register_start(&mut self, name: &str, cid: &str, pid: u32) -> Registration {
        let Some(&slot) = self.by_name.get(name) else {
            return Registration::Untracked;
        };
        let container = &mut self.containers[slot];
        if container.pid.is_some() {
            debug!(name, cid, pid, "duplicate start event, ignoring");
            return Registration::Duplicate;
        }
        container.cid = Some(cid.to_string());
        container.pid = Some(pid);
        Registration::Registered
    }

    /// Unconnected links of `name` whose peer already has a pid.
    pub fn ready_links(&self, name: &str) -> Vec<ReadyLink> {
        let Some(container) = self.container(name) else {
            return Vec::new();
        };
        let Some(local_pid) = container.pid else {
            return Vec::new();
        };

        let mut indices = container.links.clone();
        indices.dedup();

        indices
            .into_iter()
            .filter(|&idx| !self.connected[idx])
            .filter_map(|idx| {
                let link = &self.links[idx];
                let (local, peer) = link.oriented(name)?;
                let peer_pid = self.container(&peer.container)?.pid?;
                Some(ReadyLink {
                    index: idx,
                    local: local.clone(),
                    peer: peer.clone(),
                    local_pid,
                    peer_pid,
                })
            })
            .collect()
    }

    /// Mark a link created, moving the counters of both endpoints together.
    ///
    /// Returns `false` if the link was already connected.
    pub fn mark_connected(&mut self, index: usize) -> bool {
        match self.connected.get_mut(index) {
            Some(flag) if !*flag => *flag = true,
            _ => return false,
        }

        let names = {
            let link = &self.links[index];
            [link.left.container.clone(), link.right.container.clone()]
        };
        for name in &names {
            let slot = self.by_name[name];
            let container = &mut self.containers[slot];
            container.connected += 1;
            container.unconnected -= 1;
        }

        let mut reported = names.to_vec();
        reported.dedup();
        for name in reported {
            let container = &self.containers[self.by_name[&name]];
            let state = if container.unconnected > 0 { "partially" } else { "fully" };
            info!(
                "container {} is {} connected ({}/{} links)",
                name,
                state,
                container.connected,
                container.total_links()
            );
        }
        true
    }

    /// Fully connected containers whose interface moves have not run.
    pub fn due_interface_moves(&self) -> Vec<String> {
        self.containers
            .iter()
            .filter(|c| c.is_fully_connected() && !c.interfaces_completed)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn mark_interfaces_moved(&mut self, name: &str) {
        if let Some(&slot) = self.by_name.get(name) {
            let container = &mut self.containers[slot];
            debug_assert!(container.is_fully_connected());
            container.interfaces_completed = true;
        }
    }

    /// Fully connected containers whose commands have not run.
    pub fn due_commands(&self) -> Vec<String> {
        self.containers
            .iter()
            .filter(|c| c.is_fully_connected() && !c.commands_completed)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn mark_commands_completed(&mut self, name: &str) {
        if let Some(&slot) = self.by_name.get(name) {
            let container = &mut self.containers[slot];
            debug_assert!(container.is_fully_connected());
            container.commands_completed = true;
        }
    }

    /// Termination: no tracked container has a link left to create.
    pub fn all_connected(&self) -> bool {
        self.containers.iter().all(|c| c.unconnected == 0)
    }

    /// Names of containers that still have unconnected links.
    pub fn unconnected(&self) -> Vec<String> {
        self.containers
            .iter()
            .filter(|c| c.unconnected > 0)
            .map(|c| c.name.clone())
            .collect()
    }
}
