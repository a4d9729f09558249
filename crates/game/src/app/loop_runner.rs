use std::process::ExitCode;

use engine::run_app;
use tracing::{error, info};

use super::bootstrap::{AppWiring, BootstrapError};

pub(crate) fn run(app: Result<AppWiring, BootstrapError>) -> ExitCode {
    let app = match app {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    match run_app(app.config, app.scene) {
        Ok(report) => {
            info!(
                ticks = report.ticks_run,
                stop_reason = ?report.stop_reason,
                entities = report.final_entity_count,
                "skirmish_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
