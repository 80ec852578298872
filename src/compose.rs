//! Docker compose awareness: which containers a project will schedule,
//! where inline `x-network` documents live, and which project conlink
//! itself belongs to.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;
use crate::runtime::LabelFilter;
use crate::utils::{container_id_from_cgroup, container_id_from_mountinfo};

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// Key holding an inline network document.
pub const NETWORK_KEY: &str = "x-network";

/// Naming and filtering applied to the declared topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Prepended to every declared container name.
    pub prefix: String,
    /// Concrete names that will run; `None` allows any name.
    pub scheduled: Option<BTreeSet<String>>,
    /// Runtime filter for listing containers and start events.
    pub filter: LabelFilter,
}

impl Scope {
    /// Plain (non-compose) mode: runtime names are `/<name>`.
    pub fn plain() -> Self {
        Self {
            prefix: "/".to_string(),
            scheduled: None,
            filter: LabelFilter::default(),
        }
    }

    pub fn compose(project: &ComposeProject, compose: &Mapping, profiles: &[String]) -> Self {
        let prefix = project.container_prefix();
        Self {
            scheduled: Some(scheduled_containers(compose, profiles, &prefix)),
            filter: project.label_filter(),
            prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: String,
    pub working_dir: String,
}

impl ComposeProject {
    pub fn from_labels(labels: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let label = |key: &str| {
            labels.get(key).cloned().ok_or_else(|| ConfigError::Syntax {
                path: format!("Config/Labels/{key}"),
                message: "missing compose label on conlink container".to_string(),
            })
        };
        Ok(Self {
            name: label(PROJECT_LABEL)?,
            working_dir: label(WORKING_DIR_LABEL)?,
        })
    }

    pub fn container_prefix(&self) -> String {
        format!("/{}_", self.name)
    }

    pub fn label_filter(&self) -> LabelFilter {
        LabelFilter::new(vec![
            format!("{PROJECT_LABEL}={}", self.name),
            format!("{WORKING_DIR_LABEL}={}", self.working_dir),
        ])
    }
}

fn services(compose: &Mapping) -> impl Iterator<Item = (&str, Option<&Mapping>)> {
    compose
        .get("services")
        .and_then(Value::as_mapping)
        .into_iter()
        .flat_map(|services| services.iter())
        .filter_map(|(name, service)| Some((name.as_str()?, service.as_mapping())))
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn service_scale(service: &Mapping) -> u64 {
    service
        .get("scale")
        .and_then(as_count)
        .or_else(|| {
            service
                .get("deploy")
                .and_then(Value::as_mapping)
                .and_then(|deploy| deploy.get("replicas"))
                .and_then(as_count)
        })
        .unwrap_or(1)
}

fn service_profiles(service: &Mapping) -> Vec<&str> {
    service
        .get("profiles")
        .and_then(Value::as_sequence)
        .map(|seq| seq.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Names `<prefix><service>_<n>` for every scheduled replica.
///
/// A service with profiles is scheduled only if one of them is active.
pub fn scheduled_containers(
    compose: &Mapping,
    profiles: &[String],
    prefix: &str,
) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (name, service) in services(compose) {
        let (declared, scale) = match service {
            Some(service) => (service_profiles(service), service_scale(service)),
            None => (Vec::new(), 1),
        };
        if !declared.is_empty() && !declared.iter().any(|p| profiles.iter().any(|a| a == p)) {
            continue;
        }
        for idx in 1..=scale {
            names.insert(format!("{prefix}{name}_{idx}"));
        }
    }
    names
}

/// Inline network documents: top-level first, then per service.
pub fn network_documents(compose: &Mapping) -> Vec<Value> {
    compose
        .get(NETWORK_KEY)
        .cloned()
        .into_iter()
        .chain(
            services(compose)
                .filter_map(|(_, service)| service?.get(NETWORK_KEY).cloned()),
        )
        .collect()
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Id of the container this process runs in.
pub fn own_container_id() -> Result<String, ConfigError> {
    let cgroup = read_text(Path::new("/proc/self/cgroup"))?;
    if let Some(id) = container_id_from_cgroup(&cgroup) {
        return Ok(id);
    }
    let mountinfo = read_text(Path::new("/proc/self/mountinfo"))?;
    container_id_from_mountinfo(&mountinfo).ok_or(ConfigError::ContainerId)
}

/// Expand a `%s` container config path template.
pub fn container_config_path(template: &str, cid: &str) -> PathBuf {
    PathBuf::from(template.replace("%s", cid))
}

/// Labels from a container's `config.v2.json`.
pub fn read_container_labels(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = read_text(path)?;
    let json: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| ConfigError::Syntax {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(json
        .pointer("/Config/Labels")
        .and_then(serde_json::Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default())
}
