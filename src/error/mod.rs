//! Error types for the container orchestration core

use thiserror::Error;

use crate::state::RuntimeState;

/// Errors raised by drydock operations
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected during pre-launch validation. No external command has run.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A container-creation, network-creation, image-pull, or image-build
    /// command exited non-zero after exhausting any retries.
    #[error("{0}")]
    Launch(String),

    /// A command was delegated before the main container existed.
    #[error("the container has not been launched; call launch() first")]
    ContainerNotStarted,

    /// The engine version string did not match the expected shape.
    #[error("could not parse '{0}'")]
    VersionParse(String),

    /// The engine binary could not be spawned or its streams read.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A failed launch, carrying whatever partial state was created.
///
/// Callers must pass `state` to [`crate::teardown::tear_down`] so that
/// containers and the network created before the failure are cleaned up.
#[derive(Debug, Error)]
#[error("failed to launch containers: {source}")]
pub struct LaunchError {
    #[source]
    pub source: Error,
    pub state: RuntimeState,
}
