//! Graphviz rendering of a declared network (the `net2dot` tool).
//!
//! Each container becomes a cluster holding its link interfaces. The
//! network container additionally holds one sub-cluster per emulated
//! switch or host.

use std::fmt::Write as _;

use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

const NODE_PROPS: &str = "shape=box style=filled penwidth=1";
const CONTAINER_PROPS: &str =
    r##"fontsize = 12 style = filled fillcolor = "#e1d5e7" color = "#9673a6""##;
const INTF_PROPS: &str = r##"width=0.1 height=0.1 fontsize=10 fillcolor="#ffbb9e" color="#d7db00""##;
const SWITCH_PROPS: &str = r##"fontsize=12 style="rounded,filled" fillcolor="#dae8fc" color="#6c8ebf""##;
const HOST_PROPS: &str = r##"fontsize=12 fillcolor="#f5f5f5" color="#666666""##;

const DUMMY_PREFIX: &str = "DUMMY_";

/// Graphviz-safe identifier.
fn dot_id(name: &str) -> String {
    name.replace('-', "_")
}

fn syntax(path: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Syntax {
        path: path.into(),
        message: message.into(),
    }
}

fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn require_str<'a>(map: &'a Mapping, key: &str, path: &str) -> Result<&'a str, ConfigError> {
    get_str(map, key).ok_or_else(|| syntax(format!("{path}/{key}"), "expected a string"))
}

fn seq<'a>(map: &'a Mapping, key: &str) -> impl Iterator<Item = &'a Value> {
    map.get(key)
        .and_then(Value::as_sequence)
        .into_iter()
        .flatten()
}

fn require_map<'a>(value: &'a Value, path: &str) -> Result<&'a Mapping, ConfigError> {
    value
        .as_mapping()
        .ok_or_else(|| syntax(path, "expected a mapping"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamespaceKind {
    Switch,
    Host,
}

#[derive(Debug)]
struct Namespace {
    name: String,
    kind: NamespaceKind,
    interfaces: Vec<Mapping>,
}

impl Namespace {
    /// Name of the interface edges into this namespace attach to.
    fn anchor(&self) -> &str {
        self.interfaces
            .first()
            .and_then(|intf| get_str(intf, "name"))
            .unwrap_or_default()
    }
}

type Endpoint = (String, String);

#[derive(Debug, Default)]
struct Graph {
    /// Clusters in first-seen order with their interface nodes.
    containers: Vec<(String, Vec<Mapping>)>,
    namespaces: Vec<Namespace>,
    edges: Vec<(Endpoint, Endpoint)>,
}

impl Graph {
    fn container_nodes(&mut self, name: &str) -> &mut Vec<Mapping> {
        let idx = match self.containers.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.containers.push((name.to_string(), Vec::new()));
                self.containers.len() - 1
            }
        };
        &mut self.containers[idx].1
    }

    fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }
}

/// The network document inside `doc`: the document itself, or the
/// `x-network` of the compose service running `network_name`.
fn network_document<'a>(doc: &'a Value, network_name: &str) -> Result<&'a Mapping, ConfigError> {
    let root = require_map(doc, "/")?;
    let Some(services) = root.get("services") else {
        return Ok(root);
    };
    let service = network_name.strip_suffix("_1").unwrap_or(network_name);
    let path = format!("/services/{service}/x-network");
    let network = services
        .get(service)
        .and_then(|s| s.get("x-network"))
        .ok_or_else(|| syntax(path.as_str(), "not found"))?;
    require_map(network, &path)
}

fn build_graph(net: &Mapping, network_name: &str) -> Result<Graph, ConfigError> {
    let empty = Mapping::new();
    let topology = match net.get("mininet-cfg") {
        Some(value) => require_map(value, "/mininet-cfg")?,
        None => &empty,
    };

    let mut graph = Graph::default();
    graph.container_nodes(network_name);

    for (idx, link) in seq(net, "links").enumerate() {
        let path = format!("/links/{idx}");
        let link = require_map(link, &path)?;
        let mut ends = Vec::with_capacity(2);
        for side in ["left", "right"] {
            let side_path = format!("{path}/{side}");
            let end = link
                .get(side)
                .ok_or_else(|| syntax(side_path.as_str(), "missing"))?;
            let end = require_map(end, &side_path)?;
            let container = require_str(end, "container", &side_path)?;
            let intf = require_str(end, "intf", &side_path)?;
            ends.push((container.to_string(), intf.to_string()));
            graph.container_nodes(container).push(end.clone());
        }
        let right = ends.pop();
        let left = ends.pop();
        if let (Some(left), Some(right)) = (left, right) {
            graph.edges.push((left, right));
        }
    }

    for (idx, link) in seq(topology, "links").enumerate() {
        let path = format!("/mininet-cfg/links/{idx}");
        let link = require_map(link, &path)?;
        let left = require_str(link, "left", &path)?;
        let right = require_str(link, "right", &path)?;
        graph.edges.push((
            (network_name.to_string(), left.to_string()),
            (network_name.to_string(), right.to_string()),
        ));
    }

    for (key, kind) in [("switches", NamespaceKind::Switch), ("hosts", NamespaceKind::Host)] {
        for (idx, node) in seq(topology, key).enumerate() {
            let path = format!("/mininet-cfg/{key}/{idx}");
            let node = require_map(node, &path)?;
            let ns = Namespace {
                name: require_str(node, "name", &path)?.to_string(),
                kind,
                interfaces: Vec::new(),
            };
            match graph.namespaces.iter_mut().find(|n| n.name == ns.name) {
                Some(existing) => *existing = ns,
                None => graph.namespaces.push(ns),
            }
        }
    }

    for (idx, intf) in seq(topology, "interfaces").enumerate() {
        let path = format!("/mininet-cfg/interfaces/{idx}");
        let intf = require_map(intf, &path)?;
        let name = match get_str(intf, "origName") {
            Some(name) => name,
            None => require_str(intf, "name", &path)?,
        };
        let node = require_str(intf, "node", &path)?;
        match graph.namespaces.iter_mut().find(|ns| ns.name == node) {
            Some(ns) => ns.interfaces.push(intf.clone()),
            None => graph.edges.push((
                (network_name.to_string(), name.to_string()),
                (network_name.to_string(), node.to_string()),
            )),
        }
    }

    // Edges need a node to attach to, even for empty namespaces.
    for ns in &mut graph.namespaces {
        if ns.interfaces.is_empty() {
            let mut dummy = Mapping::new();
            dummy.insert("name".into(), format!("{DUMMY_PREFIX}{}", ns.name).into());
            ns.interfaces.push(dummy);
        }
    }

    Ok(graph)
}

fn interface_node(cluster: &str, intf: &Mapping) -> String {
    let name = ["intf", "origName", "name"]
        .into_iter()
        .find_map(|key| get_str(intf, key))
        .unwrap_or_default();
    if name.starts_with(DUMMY_PREFIX) {
        return format!("{}__{} [shape=point style=invis]", dot_id(cluster), dot_id(name));
    }
    let ip = get_str(intf, "ip")
        .or_else(|| {
            intf.get("opts")
                .and_then(Value::as_mapping)
                .and_then(|opts| get_str(opts, "ip"))
        })
        .filter(|ip| !ip.is_empty())
        .map(|ip| format!("\\n{ip}"))
        .unwrap_or_default();
    format!(
        "{}__{} [label=\"{name}{ip}\" {INTF_PROPS}]",
        dot_id(cluster),
        dot_id(name)
    )
}

fn write_graph(graph: &Graph, network_name: &str) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    writeln!(out, "digraph D {{")?;
    writeln!(out, "  splines = true;")?;
    writeln!(out, "  compound = true;")?;
    writeln!(out, "  node [{NODE_PROPS}];")?;

    for (cname, nodes) in &graph.containers {
        let is_network = cname == network_name;
        writeln!(out, "  subgraph cluster_{} {{", dot_id(cname))?;
        writeln!(out, "    label = \"{cname}\";")?;
        if is_network {
            writeln!(out, "    {CONTAINER_PROPS} penwidth = 2;")?;
        } else {
            writeln!(out, "    {CONTAINER_PROPS};")?;
        }
        for node in nodes {
            writeln!(out, "    {};", interface_node(cname, node))?;
        }
        // Emulated namespaces come last so their definitions win.
        if is_network {
            for ns in &graph.namespaces {
                writeln!(out, "    subgraph cluster_{}__{} {{", dot_id(cname), dot_id(&ns.name))?;
                writeln!(out, "      label = \"{}\";", ns.name)?;
                let props = match ns.kind {
                    NamespaceKind::Switch => SWITCH_PROPS,
                    NamespaceKind::Host => HOST_PROPS,
                };
                writeln!(out, "      {props};")?;
                for intf in &ns.interfaces {
                    writeln!(out, "      {};", interface_node(cname, intf))?;
                }
                writeln!(out, "    }}")?;
            }
        }
        writeln!(out, "  }}")?;
    }

    for ((lc, ln), (rc, rn)) in &graph.edges {
        let mut extra = String::new();
        let mut left = dot_id(ln);
        let mut right = dot_id(rn);
        if lc == network_name {
            if let Some(ns) = graph.namespace(ln) {
                write!(extra, " ltail=cluster_{}__{}", dot_id(network_name), dot_id(ln))?;
                left = dot_id(ns.anchor());
            }
        }
        if rc == network_name {
            if let Some(ns) = graph.namespace(rn) {
                write!(extra, " lhead=cluster_{}__{}", dot_id(network_name), dot_id(rn))?;
                right = dot_id(ns.anchor());
            }
        }
        writeln!(
            out,
            "  {}__{left} -> {}__{right} [dir=none{extra}];",
            dot_id(lc),
            dot_id(rc)
        )?;
    }

    writeln!(out, "}}")?;
    Ok(out)
}

/// Render the network in `doc` (a network file or a compose file) as a
/// Graphviz digraph. `network_name` is the container running the
/// emulated topology.
pub fn render_dot(doc: &Value, network_name: &str) -> Result<String, ConfigError> {
    let net = network_document(doc, network_name)?;
    let graph = build_graph(net, network_name)?;
    write_graph(&graph, network_name).map_err(|e| syntax("/", e.to_string()))
}
