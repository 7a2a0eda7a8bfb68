//! Best-effort teardown of a launched build
//!
//! Teardown never fails the build: every individual removal problem is
//! logged with the offending identifier and processing continues, so a
//! cleanup hiccup cannot mask the build's real outcome.

use tracing::{error, info};

use crate::network::BridgeNetwork;
use crate::runner::{ArgList, CommandRunner};
use crate::state::RuntimeState;

/// Stop or remove every tracked container, then the network.
///
/// Consumes the state: the identifiers are meaningless afterwards. Containers
/// are visited in strict reverse creation order (main first, then side
/// containers), so the exec target goes away before the services it depends
/// on. A container that is already gone behaves like any other failed
/// removal: logged and skipped.
pub async fn tear_down(runner: &dyn CommandRunner, state: RuntimeState) {
    for container_id in state.container_ids().iter().rev() {
        let args = if state.remove_on_teardown() {
            ArgList::from_tokens(["rm", "-f", container_id.as_str()])
        } else {
            ArgList::from_tokens(["stop", container_id.as_str()])
        };

        match runner.run(&args).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                error!(
                    container_id = %container_id,
                    status = out.status,
                    stderr = %out.stderr.trim(),
                    "Failed to remove container"
                );
            }
            Err(e) => {
                error!(container_id = %container_id, error = %e, "Failed to remove container");
            }
        }
    }

    // The network goes last; containers referencing it were handled above.
    if let Some(network_id) = state.network_id() {
        let network = BridgeNetwork::from_id(network_id.to_string());
        if let Err(e) = network.remove(runner).await {
            error!(network_id = %network_id, error = %e, "Failed to remove network");
        }
    }

    info!(
        containers = state.container_ids().len(),
        "Teardown complete"
    );
}
