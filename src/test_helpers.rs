#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - they're used by library tests but not binary tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

use crate::compose::Scope;
use crate::driver::{LinkDriver, move_args, tunnel_args, veth_args};
use crate::error::{DriverError, RuntimeError};
use crate::loader::assemble;
use crate::network::{HostInterface, NetworkConfig, Tunnel};
use crate::runtime::{ContainerDetails, ContainerRuntime, ContainerSummary, LabelFilter, StartEvents};
use crate::state::ReadyLink;

/// One externally visible side effect, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Veth(Vec<String>),
    Tunnel(Vec<String>),
    Move(String, Vec<String>),
    /// Container id and command.
    Exec(String, String),
}

/// Journal shared between a [`FakeRuntime`] and a [`RecordingDriver`].
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn veth_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Veth(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    pub fn exec_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec(id, cmd) => Some((id, cmd)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct FakeContainer {
    name: String,
    pid: Option<u32>,
    labels: HashMap<String, String>,
    top: Vec<u32>,
    running: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    gone: HashSet<String>,
    dead_pids: HashSet<u32>,
    queued: Vec<String>,
    sender: Option<UnboundedSender<Result<String, RuntimeError>>>,
    close_after_queue: bool,
    inspect_error: Option<String>,
    subscribe_error: Option<String>,
    start_on_subscribe: Vec<String>,
}

/// In-memory container runtime.
///
/// Events queued before the orchestrator subscribes are delivered right
/// after subscription, in order.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
    log: CallLog,
}

impl FakeRuntime {
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Arc::default(),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Declare a container; `name` is the runtime name, e.g. `/a`.
    pub fn add_container(&self, id: &str, name: &str, pid: u32) {
        self.lock().containers.insert(
            id.to_string(),
            FakeContainer {
                name: name.to_string(),
                pid: Some(pid),
                top: vec![pid],
                ..Default::default()
            },
        );
    }

    pub fn set_labels(&self, id: &str, labels: &[(&str, &str)]) {
        if let Some(c) = self.lock().containers.get_mut(id) {
            c.labels = labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn set_top(&self, id: &str, pids: &[u32]) {
        if let Some(c) = self.lock().containers.get_mut(id) {
            c.top = pids.to_vec();
        }
    }

    /// Mark as already running, so the initial listing reports it.
    pub fn set_running(&self, id: &str) {
        if let Some(c) = self.lock().containers.get_mut(id) {
            c.running = true;
        }
    }

    /// Start a container: mark it running and emit a start event.
    pub fn start(&self, id: &str) {
        self.set_running(id);
        self.emit(id);
    }

    /// Emit a start event without changing container state.
    pub fn emit(&self, id: &str) {
        let mut guard = self.lock();
        let state = &mut *guard;
        match &state.sender {
            Some(tx) => {
                let _ = tx.send(Ok(id.to_string()));
            }
            None => state.queued.push(id.to_string()),
        }
    }

    /// Close the event stream once queued events are delivered.
    pub fn close_after_queue(&self) {
        self.lock().close_after_queue = true;
    }

    /// Inspecting or exec'ing `id` reports it as gone.
    pub fn mark_gone(&self, id: &str) {
        self.lock().gone.insert(id.to_string());
    }

    pub fn kill_pid(&self, pid: u32) {
        self.lock().dead_pids.insert(pid);
    }

    /// Start `id` right after the subscription is established, before
    /// anything gets a chance to list containers.
    pub fn start_on_subscribe(&self, id: &str) {
        self.lock().start_on_subscribe.push(id.to_string());
    }

    /// Make the start-event subscription fail.
    pub fn fail_subscribe(&self, message: &str) {
        self.lock().subscribe_error = Some(message.to_string());
    }

    /// Make every inspect fail with a non-recoverable API error.
    pub fn fail_inspect(&self, message: &str) {
        self.lock().inspect_error = Some(message.to_string());
    }

    fn lookup(&self, id: &str) -> Result<FakeContainer, RuntimeError> {
        let state = self.lock();
        if state.gone.contains(id) {
            return Err(RuntimeError::Gone(format!("no such container: {id}")));
        }
        state
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::Gone(format!("no such container: {id}")))
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn list_running(
        &self,
        filter: &LabelFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| c.running && filter.matches(&c.labels))
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                name: c.name.clone(),
            })
            .collect())
    }

    async fn subscribe_starts(&self, _filter: &LabelFilter) -> Result<StartEvents, RuntimeError> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(message) = state.subscribe_error.clone() {
            return Err(RuntimeError::Api(message));
        }
        for id in std::mem::take(&mut state.queued) {
            let _ = tx.send(Ok(id));
        }
        for id in std::mem::take(&mut state.start_on_subscribe) {
            if let Some(c) = state.containers.get_mut(&id) {
                c.running = true;
            }
            let _ = tx.send(Ok(id));
        }
        if !state.close_after_queue {
            state.sender = Some(tx);
        }
        Ok(rx)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        if let Some(message) = self.lock().inspect_error.clone() {
            return Err(RuntimeError::Api(message));
        }
        let c = self.lookup(id)?;
        Ok(ContainerDetails {
            id: id.to_string(),
            name: c.name,
            pid: c.pid,
        })
    }

    async fn top_pids(&self, id: &str) -> Result<Vec<u32>, RuntimeError> {
        Ok(self.lookup(id)?.top)
    }

    async fn exec(&self, id: &str, command: &str) -> Result<(), RuntimeError> {
        self.lookup(id)?;
        self.log.push(Call::Exec(id.to_string(), command.to_string()));
        Ok(())
    }

    fn process_exists(&self, pid: u32) -> bool {
        !self.lock().dead_pids.contains(&pid)
    }
}

/// Driver that records its argument vectors instead of running anything.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    log: CallLog,
    fail: bool,
}

impl RecordingDriver {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }

    /// Every call is recorded and then reported as a non-zero exit.
    pub fn failing(log: CallLog) -> Self {
        Self { log, fail: true }
    }

    fn finish(&self, call: Call) -> Result<(), DriverError> {
        let command = format!("{call:?}");
        self.log.push(call);
        if self.fail {
            return Err(DriverError::Failed {
                command,
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl LinkDriver for RecordingDriver {
    async fn create_veth(&self, link: &ReadyLink) -> Result<(), DriverError> {
        self.finish(Call::Veth(veth_args(link)))
    }

    async fn create_tunnel(&self, tunnel: &Tunnel) -> Result<(), DriverError> {
        self.finish(Call::Tunnel(tunnel_args(tunnel)))
    }

    async fn move_interface(
        &self,
        container: &str,
        intf: &HostInterface,
        pid: u32,
    ) -> Result<(), DriverError> {
        self.finish(Call::Move(container.to_string(), move_args(intf, pid)))
    }
}

/// Parse, validate and normalize a network document in plain mode.
pub fn network_from_yaml(yaml: &str) -> NetworkConfig {
    let doc = serde_yaml::from_str(yaml).unwrap();
    let vars: HashMap<String, String> = HashMap::new();
    assemble(vec![doc], Scope::plain(), &vars).unwrap().config
}

/// The two-container topology with one link and one command on `a`.
pub const PAIR_NETWORK: &str = r#"
links:
  - left: {container: a, intf: eth0}
    right: {container: b, intf: eth0}
commands:
  - container: a
    command: echo hi
"#;
