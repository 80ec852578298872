//! Turns compose files and network files into a normalized
//! [`NetworkConfig`]: merge, interpolate, validate, normalize.

use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::compose::{self, ComposeProject, Scope};
use crate::config::Settings;
use crate::error::ConfigError;
use crate::interpolation::{Variables, interpolate};
use crate::merge::{COMPOSE_MERGE_DEPTH, NETWORK_MERGE_DEPTH, merge_documents, value_kind};
use crate::network::{NetworkConfig, check_interface_reuse, parse_network_config};
use crate::normalize::normalize;

/// A normalized network together with the scope it was normalized for.
#[derive(Debug, Clone)]
pub struct LoadedNetwork {
    pub config: NetworkConfig,
    pub scope: Scope,
}

/// Parse one YAML (or JSON) document.
pub fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge, interpolate, validate and normalize already-read documents.
///
/// Interface reuse is checked on the normalized links only.
pub fn assemble<V: Variables + ?Sized>(
    docs: Vec<Value>,
    scope: Scope,
    vars: &V,
) -> Result<LoadedNetwork, ConfigError> {
    if docs.is_empty() {
        return Err(ConfigError::NoNetworkConfig);
    }

    let merged = merge_documents(docs, NETWORK_MERGE_DEPTH)?;
    let interpolated = match interpolate(&Value::Mapping(merged), vars)? {
        Value::Mapping(map) => map,
        other => {
            return Err(ConfigError::Syntax {
                path: "/".to_string(),
                message: format!("expected a mapping, found {}", value_kind(&other)),
            });
        }
    };

    debug!("validating network configuration");
    let raw = parse_network_config(interpolated)?;
    let config = normalize(raw, scope.scheduled.as_ref(), &scope.prefix);
    let reused = check_interface_reuse(&config.links);
    if !reused.is_empty() {
        return Err(ConfigError::Validation(reused));
    }
    debug!(
        links = config.links.len(),
        commands = config.commands.len(),
        interfaces = config.interfaces.len(),
        tunnels = config.tunnels.len(),
        "network configuration normalized"
    );
    Ok(LoadedNetwork { config, scope })
}

/// Load everything `settings` points at.
pub fn load<V: Variables + ?Sized>(settings: &Settings, vars: &V) -> Result<LoadedNetwork, ConfigError> {
    let mut docs = Vec::new();
    let mut scope = Scope::plain();

    if !settings.compose_files.is_empty() {
        info!("loading compose files: {:?}", settings.compose_files);
        let compose_docs = settings
            .compose_files
            .iter()
            .map(|path| read_document(path))
            .collect::<Result<Vec<_>, _>>()?;
        let compose = merge_documents(compose_docs, COMPOSE_MERGE_DEPTH)?;

        debug!("determining container id");
        let cid = compose::own_container_id()?;
        let labels = compose::read_container_labels(&compose::container_config_path(
            &settings.container_template,
            &cid,
        ))?;
        let project = ComposeProject::from_labels(&labels)?;
        debug!(%cid, project = %project.name, "conlink container identified");

        let inline = compose::network_documents(&compose);
        if !inline.is_empty() {
            debug!("using inline {} config", compose::NETWORK_KEY);
        }
        docs.extend(inline);
        scope = Scope::compose(&project, &compose, &settings.profiles);
    }

    for path in &settings.network_files {
        info!("loading network file {}", path.display());
        docs.push(read_document(path)?);
    }

    debug!(prefix = %scope.prefix, scheduled = ?scope.scheduled, filter = ?scope.filter, "scope");
    assemble(docs, scope, vars)
}
