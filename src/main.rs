//! drydock - run a build command inside ephemeral Docker containers
//!
//! The binary is the build-runner collaborator: it loads the build's
//! configuration, launches the containers, delegates the command given on
//! the command line into the main container, and tears everything down —
//! on success, failure, or interruption.

use anyhow::Result;
use tracing::{error, info, warn};

use drydock::config::AppConfig;
use drydock::exec::{Delegate, ExecRequest};
use drydock::launch::Launcher;
use drydock::logging::init_logging;
use drydock::runner::{ArgList, CliRunner};
use drydock::state::RuntimeState;
use drydock::teardown::tear_down;
use drydock::version::EngineVersion;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting drydock");

    let runner = CliRunner::new(config.engine.as_deref(), config.debug);
    let engine_version = EngineVersion::probe(&runner).await;
    if config.debug {
        info!(engine_version = %engine_version, "Engine probed");
    }

    let launcher = Launcher::new(&runner, &config, engine_version.clone());
    let state = match launcher.launch().await {
        Ok(state) => state,
        Err(failure) => {
            error!(error = %failure.source, "Launch failed; cleaning up partial state");
            tear_down(&runner, failure.state).await;
            return Err(failure.source.into());
        }
    };
    info!(
        main_container_id = %state.main_container_id().unwrap_or_default(),
        containers = state.container_ids().len(),
        "Containers ready"
    );

    let command: Vec<String> = std::env::args().skip(1).collect();
    let outcome = if command.is_empty() {
        warn!("No command given; nothing to delegate");
        Ok(0)
    } else {
        run_delegated(&runner, &config, engine_version, &state, command).await
    };

    // Teardown runs regardless of how the build went.
    tear_down(&runner, state).await;

    match outcome {
        Ok(0) => Ok(()),
        Ok(status) => std::process::exit(status),
        Err(e) => Err(e),
    }
}

/// Delegate the command into the main container and wait it out. Ctrl-C
/// kills the delegated process; there is no other cancellation mechanism.
async fn run_delegated(
    runner: &CliRunner,
    config: &AppConfig,
    engine_version: EngineVersion,
    state: &RuntimeState,
    command: Vec<String>,
) -> Result<i32> {
    let delegate = Delegate::new(runner, config, engine_version, state);

    let mut request = ExecRequest::new(ArgList::from_tokens(command));
    request.pwd = Some(config.workspace_target());

    let mut handle = delegate.exec(request).await?;

    let status = tokio::select! {
        status = handle.wait() => Some(status?),
        _ = tokio::signal::ctrl_c() => None,
    };

    match status {
        Some(status) => {
            info!(status, "Delegated command finished");
            Ok(status)
        }
        None => {
            warn!("Interrupted; killing delegated command");
            handle.kill().await?;
            Ok(130)
        }
    }
}
