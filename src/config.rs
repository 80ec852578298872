//! Run settings for conlink.
//!
//! Built from the command line in `main`; everything below the CLI works
//! from [`Settings`] only.

use std::path::PathBuf;
use std::time::Duration;

use crate::driver::DriverPaths;

pub const DEFAULT_CONTAINER_TEMPLATE: &str = "/var/lib/docker/containers/%s/config.v2.json";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_BUILDER: &str = "/sbin/config_mininet";
pub const DEFAULT_PID_FILE: &str = "/var/run/conlink.pid";

/// Environment variables consulted, in order, when no `-v` is given.
pub const VERBOSE_ENV_VARS: [&str; 2] = ["CONLINK_VERBOSE", "VERBOSE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// 0 = info, 1 = debug, 2+ = trace and verbose drivers.
    pub verbose: u8,
    pub network_files: Vec<PathBuf>,
    pub compose_files: Vec<PathBuf>,
    pub profiles: Vec<String>,
    /// Path to a container's `config.v2.json`, with `%s` for its id.
    pub container_template: String,
    pub docker_socket: String,
    pub drivers: DriverPaths,
    /// Topology builder run after wiring; `None` skips the handoff.
    pub builder: Option<PathBuf>,
    pub pid_file: PathBuf,
    /// Give up if links are still missing after this long.
    pub startup_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verbose: 0,
            network_files: Vec::new(),
            compose_files: Vec::new(),
            profiles: Vec::new(),
            container_template: DEFAULT_CONTAINER_TEMPLATE.to_string(),
            docker_socket: DEFAULT_DOCKER_SOCKET.to_string(),
            drivers: DriverPaths::default(),
            builder: Some(PathBuf::from(DEFAULT_BUILDER)),
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            startup_timeout: None,
        }
    }
}

impl Settings {
    /// Default log filter directive for the configured verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Drivers and the topology builder only get verbose from `-vv` up.
    pub fn verbose_helpers(&self) -> bool {
        self.verbose >= 2
    }
}

/// Verbosity from `-v` count, falling back to the environment.
///
/// A numeric variable is taken as the level; any other non-empty value
/// means 1.
pub fn resolve_verbosity<F>(flag_count: u8, env: F) -> u8
where
    F: Fn(&str) -> Option<String>,
{
    if flag_count > 0 {
        return flag_count;
    }
    let Some(value) = VERBOSE_ENV_VARS
        .iter()
        .find_map(|&name| env(name).filter(|v| !v.is_empty()))
    else {
        return 0;
    };
    value.parse().unwrap_or(1)
}

/// Flatten repeated `--profile` values, each of which may hold several
/// comma- or space-separated names.
pub fn split_profiles(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|arg| arg.split([' ', ',']))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
