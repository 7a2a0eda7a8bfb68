//! Private bridge network for side containers
//!
//! A network is created only when the build declares side containers; main
//! and side containers attach to it so they can address one another by name.
//! Builds without side containers stay on the engine's default bridge.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Error;
use crate::runner::{ArgList, CommandRunner};

/// A created bridge network. Exists between [`BridgeNetwork::create`] and
/// [`BridgeNetwork::remove`]; container specs reference it, never own it.
#[derive(Debug, Clone)]
pub struct BridgeNetwork {
    id: String,
}

impl BridgeNetwork {
    /// Create a bridge network with a random name. The engine prints the
    /// network id on stdout.
    pub async fn create(runner: &dyn CommandRunner) -> Result<Self, Error> {
        let name = Uuid::new_v4().to_string();
        let args = ArgList::from_tokens(["network", "create", name.as_str()]);

        let out = runner.run(&args).await?;
        if !out.success() {
            return Err(Error::Launch(format!(
                "could not create network: {}",
                out.stderr.trim()
            )));
        }

        let id = out.stdout.trim().to_string();
        info!(network_id = %id, "Network created");
        Ok(Self { id })
    }

    /// Rehydrate a handle from a persisted id.
    pub fn from_id(id: String) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append the attachment flag to a container-creation argument list.
    pub fn run_args(&self, args: &mut ArgList) {
        args.add_pair("--network", &self.id);
    }

    /// Remove the network. Callers during teardown treat a failure as
    /// non-fatal and log it.
    pub async fn remove(&self, runner: &dyn CommandRunner) -> Result<(), Error> {
        let args = ArgList::from_tokens(["network", "rm", self.id.as_str()]);
        let out = runner.run(&args).await?;
        if !out.success() {
            return Err(Error::Launch(format!(
                "could not remove network {}: {}",
                self.id,
                out.stderr.trim()
            )));
        }
        debug!(network_id = %self.id, "Network removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;

    #[tokio::test]
    async fn test_create_captures_trimmed_id() {
        let runner = FakeRunner::new();
        runner.push(0, "0a1b2c3d\n");

        let net = BridgeNetwork::create(&runner).await.unwrap();
        assert_eq!(net.id(), "0a1b2c3d");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0][..2], ["network", "create"]);
        // Random name, but always a UUID.
        assert_eq!(calls[0][2].len(), 36);
    }

    #[tokio::test]
    async fn test_create_fails_on_nonzero_exit() {
        let runner = FakeRunner::new();
        runner.push(1, "");
        assert!(matches!(
            BridgeNetwork::create(&runner).await,
            Err(Error::Launch(_))
        ));
    }

    #[test]
    fn test_run_args_appends_attachment() {
        let net = BridgeNetwork::from_id("deadbeef".to_string());
        let mut args = ArgList::new();
        net.run_args(&mut args);
        let tokens: Vec<&str> = args.tokens().collect();
        assert_eq!(tokens, vec!["--network", "deadbeef"]);
    }

    #[tokio::test]
    async fn test_remove_issues_network_rm() {
        let runner = FakeRunner::new();
        let net = BridgeNetwork::from_id("deadbeef".to_string());
        net.remove(&runner).await.unwrap();
        assert_eq!(
            runner.calls(),
            vec![vec![
                "network".to_string(),
                "rm".to_string(),
                "deadbeef".to_string()
            ]]
        );
    }
}
