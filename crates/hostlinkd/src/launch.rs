//! Wires configuration, telemetry, the bridge server, and the host loop.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tracing::info;

use hostlink::{
    BridgeServer, HealthReporter, StructuredHealthReporter, main_thread_channel, telemetry,
};
use hostlink_config::Config;

use crate::HOST_TARGET;
use crate::errors::LaunchError;
use crate::handlers::scene_router;
use crate::scene::Scene;
use crate::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the host configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader(pub Config);

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

/// Runs the host with the production collaborators until a termination
/// signal arrives.
///
/// # Errors
///
/// See [`LaunchError`].
pub fn run_host() -> Result<(), LaunchError> {
    let shutdown = SystemShutdownSignal::install()?;
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    run_host_with(&SystemConfigLoader, &shutdown, reporter).map(drop)
}

/// Runs the host with injected collaborators and returns the scene as it
/// stood at shutdown.
///
/// The calling thread becomes the scene's main thread: it drains bridge work
/// once per tick until `shutdown` is requested, stops the server, then runs
/// whatever was still queued.
///
/// # Errors
///
/// See [`LaunchError`].
pub fn run_host_with(
    loader: &dyn ConfigLoader,
    shutdown: &dyn ShutdownSignal,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Scene, LaunchError> {
    let config = loader.load()?;
    config.validate()?;
    telemetry::initialise(&config)?;

    let (scheduler, queue) = main_thread_channel(config.task_timeout());
    let mut server = BridgeServer::new(scene_router(), scheduler).with_reporter(reporter);
    let addr = server.start(config.host(), config.port())?;
    info!(
        target: HOST_TARGET,
        %addr,
        commands = server.router().get_registered_commands().len(),
        "host ready"
    );

    let mut scene = Scene::default();
    let tick = config.tick_interval();
    while !shutdown.requested() {
        queue.wait_and_drain(&mut scene, tick);
    }

    server.stop();
    let leftover = queue.drain(&mut scene);
    info!(target: HOST_TARGET, leftover, "host stopped");
    Ok(scene)
}
