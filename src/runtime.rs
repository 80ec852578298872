//! Container runtime access: listing, start events, inspection and exec.
//!
//! [`ContainerRuntime`] is the seam the orchestrator is written against;
//! [`DockerRuntime`] implements it over the Docker (or podman-compatible)
//! API socket.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions, TopOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::system::EventsOptions;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, warn};

use crate::error::RuntimeError;

/// Label constraints (`key=value`) a container must carry to be considered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<String>,
}

impl LabelFilter {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Whether `labels` satisfies every constraint.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.labels.iter().all(|constraint| match constraint.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(constraint.as_str()),
        })
    }

    fn to_filters(&self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        if !self.is_empty() {
            filters.insert("label".to_string(), self.labels.clone());
        }
        filters
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    /// Runtime name, including the leading `/`.
    pub name: String,
    /// `State.Pid`; `None` when the runtime reports no live process.
    pub pid: Option<u32>,
}

/// Start events delivered in order; each item is a container id.
pub type StartEvents = UnboundedReceiver<Result<String, RuntimeError>>;

#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    /// Running containers matching `filter`, in runtime listing order.
    async fn list_running(&self, filter: &LabelFilter)
    -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Subscribe to container start events.
    ///
    /// Once this returns, every start from that point on is delivered,
    /// including starts that race with a listing made right after it.
    /// Events that arrive before the receiver is polled are buffered.
    async fn subscribe_starts(&self, filter: &LabelFilter) -> Result<StartEvents, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// Pids of every process in the container, in process-table order.
    async fn top_pids(&self, id: &str) -> Result<Vec<u32>, RuntimeError>;

    /// Run `command` inside the container, forwarding its output.
    async fn exec(&self, id: &str, command: &str) -> Result<(), RuntimeError>;

    fn process_exists(&self, pid: u32) -> bool {
        crate::utils::pid_exists(pid)
    }
}

/// [`ContainerRuntime`] over the Docker engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

/// Seconds before an API request is abandoned.
const API_TIMEOUT_SECS: u64 = 120;

/// How far back the event subscription replays, covering the time between
/// issuing the `/events` request and the daemon attaching it.
const EVENT_REPLAY_SLACK: Duration = Duration::from_secs(1);

/// `since` value for the events API: unix seconds, `EVENT_REPLAY_SLACK`
/// before `now`.
pub fn replay_since(now: SystemTime) -> String {
    let since = now
        .checked_sub(EVENT_REPLAY_SLACK)
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default();
    format!("{}.{:09}", since.as_secs(), since.subsec_nanos())
}

impl DockerRuntime {
    pub fn connect(socket: &str) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_socket(socket, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?;
        debug!(socket, "connected to container runtime");
        Ok(Self { docker })
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn list_running(
        &self,
        filter: &LabelFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            filters: filter.to_filters(),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    name: c.names.and_then(|n| n.into_iter().next()).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn subscribe_starts(&self, filter: &LabelFilter) -> Result<StartEvents, RuntimeError> {
        // Fails here, before anything is listed, if the daemon is unreachable.
        self.docker.ping().await?;

        let mut filters = filter.to_filters();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("event".to_string(), vec!["start".to_string()]);
        // The daemon replays buffered events from `since`, so a start that
        // happens before the stream is attached is still delivered.
        let since = replay_since(SystemTime::now());
        debug!(%since, "subscribing to container start events");
        let options = EventsOptions::<String> {
            since: Some(since),
            filters,
            ..Default::default()
        };

        let (tx, rx) = unbounded_channel();
        let docker = self.docker.clone();
        tokio::spawn(async move {
            let mut stream = Box::pin(docker.events(Some(options)));
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(msg) => match msg.actor.and_then(|actor| actor.id) {
                        Some(id) => Ok(id),
                        None => {
                            warn!("start event without container id, ignoring");
                            continue;
                        }
                    },
                    Err(err) => Err(RuntimeError::from(err)),
                };
                let fatal = event.is_err();
                if tx.send(event).is_err() || fatal {
                    break;
                }
            }
            debug!("container event stream ended");
        });
        Ok(rx)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        Ok(ContainerDetails {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info.name.unwrap_or_default(),
            pid: info
                .state
                .and_then(|s| s.pid)
                .and_then(|pid| u32::try_from(pid).ok())
                .filter(|&pid| pid > 0),
        })
    }

    async fn top_pids(&self, id: &str) -> Result<Vec<u32>, RuntimeError> {
        let top = self
            .docker
            .top_processes(id, Some(TopOptions { ps_args: "-ef" }))
            .await?;
        let column = top
            .titles
            .unwrap_or_default()
            .iter()
            .position(|title| title == "PID")
            .unwrap_or(1);
        Ok(top
            .processes
            .unwrap_or_default()
            .iter()
            .filter_map(|row| row.get(column)?.parse().ok())
            .collect())
    }

    async fn exec(&self, id: &str, command: &str) -> Result<(), RuntimeError> {
        let argv = shlex::split(command)
            .ok_or_else(|| RuntimeError::Api(format!("cannot parse command: {command}")))?;
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(argv),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = output.next().await {
                let bytes = chunk?.into_bytes();
                stdout
                    .write_all(&bytes)
                    .await
                    .map_err(|e| RuntimeError::Api(format!("forwarding exec output: {e}")))?;
            }
            let _ = stdout.flush().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(LabelFilter::default().matches(&HashMap::new()));
        assert!(LabelFilter::default().to_filters().is_empty());
    }

    #[test]
    fn test_replay_since_reaches_back() {
        let now = UNIX_EPOCH + Duration::new(1_700_000_010, 250_000_000);
        assert_eq!(replay_since(now), "1700000009.250000000");
        assert_eq!(replay_since(UNIX_EPOCH), "0.000000000");
    }

    #[test]
    fn test_filter_requires_all_labels() {
        let filter = LabelFilter::new(vec![
            "com.docker.compose.project=demo".to_string(),
            "com.docker.compose.project.working_dir=/src".to_string(),
        ]);
        assert!(filter.matches(&labels(&[
            ("com.docker.compose.project", "demo"),
            ("com.docker.compose.project.working_dir", "/src"),
        ])));
        assert!(!filter.matches(&labels(&[("com.docker.compose.project", "demo")])));
        assert!(!filter.matches(&labels(&[
            ("com.docker.compose.project", "other"),
            ("com.docker.compose.project.working_dir", "/src"),
        ])));
    }
}
