//! Post-launch runtime state
//!
//! [`RuntimeState`] is the immutable snapshot of container and network
//! identifiers produced by a launch. Delegation reads it, teardown consumes
//! it; no field changes after `launch()` returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifiers of everything a launch created.
///
/// `container_ids` holds every container that was actually created, in
/// creation order, even when a later creation failed — this is what makes
/// partial-failure teardown possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    main_container_id: Option<String>,
    container_ids: Vec<String>,
    network_id: Option<String>,
    remove_on_teardown: bool,
    debug: bool,
    launched_at: DateTime<Utc>,
}

impl RuntimeState {
    pub(crate) fn new(debug: bool, remove_on_teardown: bool) -> Self {
        Self {
            main_container_id: None,
            container_ids: Vec::new(),
            network_id: None,
            remove_on_teardown,
            debug,
            launched_at: Utc::now(),
        }
    }

    pub(crate) fn record_network(&mut self, id: String) {
        self.network_id = Some(id);
    }

    pub(crate) fn record_container(&mut self, id: String) {
        self.container_ids.push(id);
    }

    /// Record the main container. Set exactly once, after its creation
    /// succeeded.
    pub(crate) fn record_main(&mut self, id: String) {
        debug_assert!(self.main_container_id.is_none(), "main container id set twice");
        self.main_container_id = Some(id);
    }

    /// The exec target. `None` until the main container was created.
    pub fn main_container_id(&self) -> Option<&str> {
        self.main_container_id.as_deref()
    }

    /// Every created container, side and main, in creation order.
    pub fn container_ids(&self) -> &[String] {
        &self.container_ids
    }

    /// The private network id, present only if side containers existed.
    pub fn network_id(&self) -> Option<&str> {
        self.network_id.as_deref()
    }

    /// Remove containers at teardown, or merely stop them.
    pub fn remove_on_teardown(&self) -> bool {
        self.remove_on_teardown
    }

    /// Verbose delegated-process output.
    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    /// Serialize for persistence across a process restart.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Restore a persisted snapshot.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_ids_in_creation_order() {
        let mut state = RuntimeState::new(false, true);
        state.record_network("net-1".to_string());
        state.record_container("side-a".to_string());
        state.record_container("side-b".to_string());
        state.record_container("main-c".to_string());
        state.record_main("main-c".to_string());

        assert_eq!(state.container_ids(), ["side-a", "side-b", "main-c"]);
        assert_eq!(state.main_container_id(), Some("main-c"));
        assert_eq!(state.network_id(), Some("net-1"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut state = RuntimeState::new(true, false);
        state.record_container("abc".to_string());
        state.record_main("abc".to_string());

        let restored = RuntimeState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored.main_container_id(), Some("abc"));
        assert_eq!(restored.container_ids(), ["abc"]);
        assert!(restored.debug());
        assert!(!restored.remove_on_teardown());
        assert_eq!(restored.network_id(), None);
    }
}
