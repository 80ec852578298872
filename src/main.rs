use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use conlink::config::{self, Settings};
use conlink::driver::DriverPaths;

// Use mimalloc as the global allocator for the binary (non-Windows only)
#[cfg(not(windows))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "conlink",
    author,
    version,
    disable_version_flag = true,
    about = "Declarative container networking: links, tunnels and host interfaces"
)]
struct Cli {
    /// Print the version and exit
    #[arg(short = 'V', long = "version", action = clap::ArgAction::SetTrue)]
    print_version: bool,

    /// Increase verbosity (repeat for trace output and verbose drivers)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Network config file(s); may be repeated or ':'-separated
    #[arg(long = "network-file", value_delimiter = ':')]
    network_files: Vec<PathBuf>,

    /// Docker compose file(s); may be repeated or ':'-separated
    #[arg(long = "compose-file", value_delimiter = ':')]
    compose_files: Vec<PathBuf>,

    /// Active compose profiles (comma or space separated)
    #[arg(long = "profile")]
    profiles: Vec<String>,

    /// Path template for a container's config.v2.json ('%s' = container id)
    #[arg(long = "container-template", default_value = config::DEFAULT_CONTAINER_TEMPLATE)]
    container_template: String,

    /// Docker API socket
    #[arg(long = "docker-socket", default_value = config::DEFAULT_DOCKER_SOCKET)]
    docker_socket: String,

    #[arg(long = "veth-driver", default_value = "/sbin/veth-link.sh")]
    veth_driver: PathBuf,

    #[arg(long = "tunnel-driver", default_value = "/sbin/tun-link.sh")]
    tunnel_driver: PathBuf,

    #[arg(long = "move-driver", default_value = "/sbin/move-intf.sh")]
    move_driver: PathBuf,

    /// Program that realizes the emulated topology after wiring
    #[arg(long = "builder", default_value = config::DEFAULT_BUILDER)]
    builder: PathBuf,

    /// Exit after wiring instead of starting the topology builder
    #[arg(long = "no-builder")]
    no_builder: bool,

    #[arg(long = "pid-file", default_value = config::DEFAULT_PID_FILE)]
    pid_file: PathBuf,

    /// Fail if links are still missing after this many seconds
    #[arg(long = "startup-timeout", value_name = "SECS")]
    startup_timeout: Option<u64>,
}

impl Cli {
    fn into_settings(self) -> Settings {
        Settings {
            verbose: config::resolve_verbosity(self.verbose, |name| std::env::var(name).ok()),
            network_files: self.network_files,
            compose_files: self.compose_files,
            profiles: config::split_profiles(&self.profiles),
            container_template: self.container_template,
            docker_socket: self.docker_socket,
            drivers: DriverPaths {
                veth: self.veth_driver,
                tunnel: self.tunnel_driver,
                move_interface: self.move_driver,
            },
            builder: (!self.no_builder).then_some(self.builder),
            pid_file: self.pid_file,
            startup_timeout: self.startup_timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Cli::parse();
    if args.print_version {
        let version = env!("CARGO_PKG_VERSION");
        let git_hash = env!("GIT_HASH");
        let git_branch = env!("GIT_BRANCH");
        let git_dirty = env!("GIT_DIRTY");

        println!(
            "{} ({}@{}{}) [{}]",
            version,
            git_branch,
            git_hash,
            git_dirty,
            env!("CARGO_PKG_NAME")
        );
        return Ok(());
    }

    if args.network_files.is_empty() && args.compose_files.is_empty() {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "either --network-file or --compose-file is required",
            )
            .exit();
    }

    let settings = args.into_settings();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    conlink::runner::run(&settings)
        .await
        .context("conlink failed")
}
