//! Rewrites container references to runtime names and prunes everything
//! that refers to containers which will not be scheduled.

use std::collections::{BTreeSet, HashSet};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::network::NetworkConfig;

/// Apply `prefix` to every container reference and drop links, commands and
/// host interfaces naming a container outside `scheduled`.
///
/// With `scheduled == None` every container is allowed. Links are kept only
/// when both endpoints are allowed. Tunnels are always kept. Emulated
/// topology interfaces survive only if a kept link or tunnel uses them.
pub fn normalize(
    mut config: NetworkConfig,
    scheduled: Option<&BTreeSet<String>>,
    prefix: &str,
) -> NetworkConfig {
    let allowed = |name: &str| scheduled.is_none_or(|set| set.contains(name));
    let mut used_interfaces: HashSet<String> = HashSet::new();

    let mut links = Vec::with_capacity(config.links.len());
    for mut link in std::mem::take(&mut config.links) {
        let left = format!("{prefix}{}", link.left.container);
        let right = format!("{prefix}{}", link.right.container);
        if !(allowed(&left) && allowed(&right)) {
            debug!(%left, %right, "pruning link to unscheduled container");
            continue;
        }
        link.left.container = left;
        link.right.container = right;
        link.index = links.len();
        used_interfaces.insert(link.left.interface.clone());
        used_interfaces.insert(link.right.interface.clone());
        links.push(link);
    }
    config.links = links;

    config.interfaces = std::mem::take(&mut config.interfaces)
        .into_iter()
        .filter_map(|mut intf| {
            intf.container = format!("{prefix}{}", intf.container);
            allowed(&intf.container).then_some(intf)
        })
        .collect();

    config.commands = std::mem::take(&mut config.commands)
        .into_iter()
        .filter_map(|mut cmd| {
            cmd.container = format!("{prefix}{}", cmd.container);
            allowed(&cmd.container).then_some(cmd)
        })
        .collect();

    for tunnel in &config.tunnels {
        used_interfaces.insert(tunnel.interface.clone());
    }

    if let Some(topology) = config.topology.as_mut() {
        prune_topology_interfaces(topology, &used_interfaces);
    }

    config
}

fn entry_str<'a>(entry: &'a Mapping, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Keep emulated interfaces whose `name` or `origName` is in `used`.
fn prune_topology_interfaces(topology: &mut Mapping, used: &HashSet<String>) {
    let Some(Value::Sequence(interfaces)) = topology.get_mut("interfaces") else {
        return;
    };
    interfaces.retain(|entry| {
        let Value::Mapping(entry) = entry else {
            return false;
        };
        ["name", "origName"]
            .into_iter()
            .filter_map(|key| entry_str(entry, key))
            .any(|name| used.contains(name))
    });
}
