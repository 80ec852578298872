//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use conlink::error::RuntimeError;
use conlink::runtime::{
    ContainerDetails, ContainerRuntime, ContainerSummary, LabelFilter, StartEvents,
};
use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

/// A directory of driver scripts that append their argv to `calls.log`.
pub struct ScriptDir {
    pub dir: TempDir,
}

impl ScriptDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Write an executable script named `name` with the given body.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A script that logs `<name> <args...>` and exits 0.
    pub fn logging_script(&self, name: &str) -> PathBuf {
        let log = self.log_path();
        self.script(
            name,
            &format!("echo \"{name} $* VERBOSE=${{VERBOSE:-}}\" >> '{}'", log.display()),
        )
    }

    pub fn calls(&self) -> Vec<String> {
        read_lines(&self.log_path())
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Runtime with a fixed set of already-running containers and no events.
#[derive(Clone, Default)]
pub struct StaticRuntime {
    containers: Vec<(String, String, u32)>,
    pub execs: Arc<Mutex<Vec<(String, String)>>>,
}

impl StaticRuntime {
    pub fn new(containers: &[(&str, &str, u32)]) -> Self {
        Self {
            containers: containers
                .iter()
                .map(|(id, name, pid)| (id.to_string(), name.to_string(), *pid))
                .collect(),
            execs: Arc::default(),
        }
    }
}

impl ContainerRuntime for StaticRuntime {
    async fn list_running(
        &self,
        _filter: &LabelFilter,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Ok(self
            .containers
            .iter()
            .map(|(id, name, _)| ContainerSummary {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn subscribe_starts(&self, _filter: &LabelFilter) -> Result<StartEvents, RuntimeError> {
        let (_tx, rx) = unbounded_channel();
        Ok(rx)
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let (_, name, pid) = self
            .containers
            .iter()
            .find(|(cid, _, _)| cid == id)
            .ok_or_else(|| RuntimeError::Gone(id.to_string()))?;
        Ok(ContainerDetails {
            id: id.to_string(),
            name: name.clone(),
            pid: Some(*pid),
        })
    }

    async fn top_pids(&self, _id: &str) -> Result<Vec<u32>, RuntimeError> {
        Ok(Vec::new())
    }

    async fn exec(&self, id: &str, command: &str) -> Result<(), RuntimeError> {
        self.execs
            .lock()
            .unwrap()
            .push((id.to_string(), command.to_string()));
        Ok(())
    }

    fn process_exists(&self, _pid: u32) -> bool {
        true
    }
}
