//! drydock library
//!
//! Isolates a build's execution inside ephemeral Docker containers: a main
//! container that receives every delegated build command, plus optional side
//! containers (databases, services) sharing a private bridge network.
//!
//! The pieces compose in a fixed order:
//!
//! 1. [`version::EngineVersion::probe`] detects the engine dialect.
//! 2. [`launch::Launcher::launch`] provisions the network and containers,
//!    producing an immutable [`state::RuntimeState`].
//! 3. [`exec::Delegate::exec`] delegates build commands into the main
//!    container, any number of times.
//! 4. [`teardown::tear_down`] consumes the state at build end — on success,
//!    failure, or cancellation, including the partial state a failed launch
//!    leaves behind.

pub mod config;
pub mod error;
pub mod exec;
pub mod launch;
pub mod logging;
pub mod network;
pub mod runner;
pub mod state;
pub mod teardown;
pub mod vars;
pub mod version;

pub use config::AppConfig;
pub use error::{Error, LaunchError};
pub use state::RuntimeState;
