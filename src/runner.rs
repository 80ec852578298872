//! Top-level conlink run: load, wire, hand off.

use tracing::info;

use crate::builder::{hand_off, write_pid_file};
use crate::config::Settings;
use crate::driver::ScriptDriver;
use crate::error::Result;
use crate::interpolation::process_environment;
use crate::loader;
use crate::orchestrator::Orchestrator;
use crate::runtime::DockerRuntime;

pub async fn run(settings: &Settings) -> Result<()> {
    let env = process_environment();
    let network = loader::load(settings, &env)?;

    let runtime = DockerRuntime::connect(&settings.docker_socket)?;
    let driver = ScriptDriver::new(settings.drivers.clone(), settings.verbose_helpers());

    write_pid_file(&settings.pid_file)?;

    let mut orchestrator = Orchestrator::new(runtime, driver, &network.config);
    orchestrator
        .run(
            &network.config.tunnels,
            &network.scope.filter,
            settings.startup_timeout,
        )
        .await?;

    match &settings.builder {
        Some(builder) => hand_off(&network.config, builder, settings.verbose_helpers()).await,
        None => {
            info!("no topology builder configured, exiting");
            Ok(())
        }
    }
}
