//! Listener lifecycle tracking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Lifecycle of one topic listener.
///
/// `Completed` and `Failed` are terminal. There is no restarting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    NotStarted,
    Running,
    Completed,
    Failed(String),
}

impl ListenerState {
    /// Short name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerState::NotStarted => "not_started",
            ListenerState::Running => "running",
            ListenerState::Completed => "completed",
            ListenerState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Per-topic listener states, shared between the coordinator and the
/// readiness endpoint.
#[derive(Debug, Clone, Default)]
pub struct ListenerStatus {
    states: Arc<RwLock<BTreeMap<String, ListenerState>>>,
}

impl ListenerStatus {
    /// Track the given topics, all `NotStarted`.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = topics
            .into_iter()
            .map(|topic| (topic.into(), ListenerState::NotStarted))
            .collect();

        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Record a state transition.
    pub fn set(&self, topic: &str, state: ListenerState) {
        self.states.write().insert(topic.to_string(), state);
    }

    /// Current state of a topic's listener.
    pub fn get(&self, topic: &str) -> Option<ListenerState> {
        self.states.read().get(topic).cloned()
    }

    /// Copy of every state, ordered by topic.
    pub fn snapshot(&self) -> BTreeMap<String, ListenerState> {
        self.states.read().clone()
    }

    /// Whether at least one listener is tracked and every one is running.
    pub fn all_running(&self) -> bool {
        let states = self.states.read();
        !states.is_empty()
            && states
                .values()
                .all(|state| *state == ListenerState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ListenerState::NotStarted.to_string(), "not_started");
        assert_eq!(ListenerState::Running.to_string(), "running");
        assert_eq!(ListenerState::Completed.to_string(), "completed");
        assert_eq!(
            ListenerState::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }

    #[test]
    fn test_new_topics_not_started() {
        let status = ListenerStatus::new(["voltha.kpis", "onos.kpis"]);

        assert_eq!(status.get("onos.kpis"), Some(ListenerState::NotStarted));
        assert_eq!(status.get("missing"), None);
        assert!(!status.all_running());
    }

    #[test]
    fn test_all_running() {
        let status = ListenerStatus::new(["a", "b"]);
        status.set("a", ListenerState::Running);
        assert!(!status.all_running());

        status.set("b", ListenerState::Running);
        assert!(status.all_running());

        status.set("b", ListenerState::Failed("unknown topic".into()));
        assert!(!status.all_running());
    }

    #[test]
    fn test_empty_status_is_not_running() {
        let status = ListenerStatus::default();
        assert!(!status.all_running());
    }

    #[test]
    fn test_clones_share_state() {
        let status = ListenerStatus::new(["a"]);
        let view = status.clone();
        status.set("a", ListenerState::Completed);

        assert_eq!(view.snapshot()["a"], ListenerState::Completed);
    }

    #[test]
    fn test_display() {
        assert_eq!(ListenerState::Running.to_string(), "running");
        assert_eq!(
            ListenerState::Failed("gone".into()).to_string(),
            "failed: gone"
        );
    }
}
