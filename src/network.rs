//! Typed network configuration: links, commands, host interfaces and
//! tunnels, plus the emulated-topology subtree handed to the builder.
//!
//! Values coming out of interpolation are strings, so numeric and boolean
//! fields also accept their string spelling.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

/// Linux limit on network interface names (IFNAMSIZ - 1).
pub const MAX_INTERFACE_NAME: usize = 15;

/// Largest VNI representable in the 24-bit VXLAN/Geneve header field.
pub const MAX_VNI: u32 = 0x00ff_ffff;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub container: String,
    #[serde(rename = "intf")]
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Position among the links that survived normalization.
    #[serde(skip)]
    pub index: usize,
    pub left: LinkEndpoint,
    pub right: LinkEndpoint,
}

impl Link {
    /// Returns `(local, peer)` as seen from `container`.
    ///
    /// For a link between two interfaces of the same container the left
    /// endpoint is treated as local.
    pub fn oriented(&self, container: &str) -> Option<(&LinkEndpoint, &LinkEndpoint)> {
        if self.left.container == container {
            Some((&self.left, &self.right))
        } else if self.right.container == container {
            Some((&self.right, &self.left))
        } else {
            None
        }
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub container: String,
    pub command: OneOrMany,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInterface {
    pub container: String,
    #[serde(rename = "host-intf")]
    pub host_interface: String,
    #[serde(rename = "intf")]
    pub interface: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub vlanid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Geneve,
    Vxlan,
}

impl fmt::Display for TunnelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelKind::Geneve => write!(f, "geneve"),
            TunnelKind::Vxlan => write!(f, "vxlan"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    #[serde(rename = "type")]
    pub kind: TunnelKind,
    #[serde(rename = "intf")]
    pub interface: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub vni: u32,
    pub remote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_args: Option<OneOrMany>,
}

impl Tunnel {
    /// Extra link arguments; a single string is split shell-style.
    pub fn link_args(&self) -> Option<Vec<String>> {
        match &self.link_args {
            None => Some(Vec::new()),
            Some(OneOrMany::One(s)) => shlex::split(s),
            Some(OneOrMany::Many(v)) => Some(v.clone()),
        }
    }
}

/// The declared network after merging and interpolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub interfaces: Vec<HostInterface>,
    #[serde(default)]
    pub tunnels: Vec<Tunnel>,
    /// Emulated switches/hosts/interfaces, consumed by the topology builder.
    #[serde(
        rename = "mininet-cfg",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub topology: Option<Mapping>,
    /// Keys not interpreted here; passed through to the builder untouched.
    #[serde(flatten)]
    pub extra: Mapping,
}

// -- lenient scalar parsing --

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn to_u32<E: serde::de::Error>(raw: NumberOrString) -> Result<u32, E> {
    match raw {
        NumberOrString::Number(n) => u32::try_from(n).map_err(E::custom),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("\"{s}\" is not a valid integer"))),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    to_u32(NumberOrString::deserialize(deserializer)?)
}

fn lenient_opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(to_u32)
        .transpose()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::String(s) => match s.to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "on" => Ok(true),
            "n" | "no" | "false" | "off" => Ok(false),
            _ => Err(D::Error::custom(format!("\"{s}\" is not a valid boolean value"))),
        },
    }
}

// -- validation --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// Every violation found in a network document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl ValidationErrors {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut by_path: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for issue in &self.0 {
            by_path.entry(&issue.path).or_default().push(&issue.message);
        }
        let rendered = serde_json::to_string_pretty(&by_path).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

fn check_interface(errors: &mut ValidationErrors, path: String, name: &str) {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME {
        errors.push(
            path,
            format!("interface name '{name}' must be 1-{MAX_INTERFACE_NAME} bytes"),
        );
    }
}

fn check_container(errors: &mut ValidationErrors, path: String, name: &str) {
    if name.is_empty() {
        errors.push(path, "container name must not be empty");
    }
}

/// Semantic checks that serde cannot express.
pub fn validate(config: &NetworkConfig) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    for (idx, link) in config.links.iter().enumerate() {
        for (side, ep) in [("left", &link.left), ("right", &link.right)] {
            let base = format!("links/{idx}/{side}");
            check_container(&mut errors, format!("{base}/container"), &ep.container);
            check_interface(&mut errors, format!("{base}/intf"), &ep.interface);
        }
    }

    for (idx, cmd) in config.commands.iter().enumerate() {
        check_container(&mut errors, format!("commands/{idx}/container"), &cmd.container);
    }

    for (idx, intf) in config.interfaces.iter().enumerate() {
        check_container(&mut errors, format!("interfaces/{idx}/container"), &intf.container);
        check_interface(&mut errors, format!("interfaces/{idx}/intf"), &intf.interface);
    }

    for (idx, tunnel) in config.tunnels.iter().enumerate() {
        check_interface(&mut errors, format!("tunnels/{idx}/intf"), &tunnel.interface);
        if tunnel.vni > MAX_VNI {
            errors.push(
                format!("tunnels/{idx}/vni"),
                format!("vni {} exceeds {MAX_VNI}", tunnel.vni),
            );
        }
        if tunnel.link_args().is_none() {
            errors.push(format!("tunnels/{idx}/link_args"), "unbalanced quoting");
        }
    }

    errors
}

/// Container interfaces claimed by more than one link.
///
/// Only meaningful once links to unscheduled containers are dropped:
/// alternatives gated behind inactive profiles may share an interface.
pub fn check_interface_reuse(links: &[Link]) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    let mut used: HashMap<(&str, &str), usize> = HashMap::new();
    for (idx, link) in links.iter().enumerate() {
        for (side, ep) in [("left", &link.left), ("right", &link.right)] {
            if let Some(prev) = used.insert((ep.container.as_str(), ep.interface.as_str()), idx) {
                errors.push(
                    format!("links/{idx}/{side}/intf"),
                    format!(
                        "interface {}/{} is already used by link {prev}",
                        ep.container, ep.interface
                    ),
                );
            }
        }
    }
    errors
}

/// Deserialize and validate an interpolated network document.
pub fn parse_network_config(doc: Mapping) -> Result<NetworkConfig, ConfigError> {
    let config: NetworkConfig = serde_yaml::from_value(Value::Mapping(doc)).map_err(|err| {
        let mut errors = ValidationErrors::default();
        errors.push("/", err.to_string());
        ConfigError::Validation(errors)
    })?;

    let errors = validate(&config);
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    Ok(config)
}
