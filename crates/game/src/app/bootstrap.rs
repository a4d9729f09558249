use engine::{resolve_app_paths, LoopConfig, Scene, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::gameplay::SkirmishScene;
use super::scenario::{load_scenario, ScenarioError};
use super::tuning::{load_tuning, TuningError};

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Tuning(#[from] TuningError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Skirmish Startup ===");

    let app_paths = resolve_app_paths()?;
    let tuning = load_tuning(&app_paths)?;
    let scenario = load_scenario(&app_paths)?;
    let config = tuning.loop_config();

    Ok(AppWiring {
        config,
        scene: Box::new(SkirmishScene::new(tuning, scenario)),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
