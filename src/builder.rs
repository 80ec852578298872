//! Process lifecycle around the event loop: the pid file and the handoff
//! of the normalized network to the topology builder.

use std::io::Write;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ConlinkError, Result};
use crate::network::NetworkConfig;

fn io_error(context: String) -> impl FnOnce(std::io::Error) -> ConlinkError {
    move |source| ConlinkError::Io { context, source }
}

/// Write our pid to `path`, refusing to overwrite an existing file.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_error(format!("creating pid file {}", path.display())))?;
    writeln!(file, "{}", std::process::id())
        .map_err(io_error(format!("writing pid file {}", path.display())))?;
    debug!(path = %path.display(), "pid file written");
    Ok(())
}

/// Arguments passed to the builder for a config written to `config_path`.
pub fn builder_args(config_path: &Path, verbose: bool) -> Vec<String> {
    let mut args = Vec::new();
    if verbose {
        args.push("--verbose=debug".to_string());
    }
    args.push(config_path.display().to_string());
    args
}

/// Serialize `config` to a temporary YAML file and run `builder` on it.
///
/// The file is removed once the builder exits.
pub async fn hand_off(config: &NetworkConfig, builder: &Path, verbose: bool) -> Result<()> {
    let yaml = serde_yaml::to_string(config).map_err(|e| ConlinkError::Io {
        context: "serializing network config".to_string(),
        source: std::io::Error::other(e),
    })?;

    let mut file = tempfile::Builder::new()
        .prefix("conlink-")
        .suffix(".yaml")
        .tempfile()
        .map_err(io_error("creating temporary network config".to_string()))?;
    let context = format!("writing {}", file.path().display());
    file.write_all(yaml.as_bytes())
        .and_then(|()| file.flush())
        .map_err(io_error(context))?;

    let args = builder_args(file.path(), verbose);
    info!("starting topology builder: {} {}", builder.display(), args.join(" "));
    let status = Command::new(builder)
        .args(&args)
        .status()
        .await
        .map_err(io_error(format!("running {}", builder.display())))?;

    if !status.success() {
        return Err(ConlinkError::Builder(status));
    }
    info!("topology builder finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conlink.pid");

        write_pid_file(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim(), std::process::id().to_string());

        let err = write_pid_file(&path).unwrap_err();
        assert!(matches!(err, ConlinkError::Io { .. }));
    }

    #[test]
    fn test_builder_args() {
        let path = Path::new("/tmp/conlink-x.yaml");
        assert_eq!(builder_args(path, false), vec!["/tmp/conlink-x.yaml"]);
        assert_eq!(
            builder_args(path, true),
            vec!["--verbose=debug", "/tmp/conlink-x.yaml"]
        );
    }
}
