use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lifecycle phase of a worker.
///
/// Values outside the four named phases are kept verbatim in `Unknown` so the
/// control surface can introduce ad-hoc states; the loop treats them as idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunState {
    Init,
    Running,
    Paused,
    Shutdown,
    Unknown(String),
}

impl RunState {
    /// Wire name of the state
    pub fn as_str(&self) -> &str {
        match self {
            RunState::Init => "INIT",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Shutdown => "SHUTDOWN",
            RunState::Unknown(raw) => raw,
        }
    }

    /// Parse a raw control value. Matching is exact; anything else is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "INIT" => RunState::Init,
            "RUNNING" => RunState::Running,
            "PAUSED" => RunState::Paused,
            "SHUTDOWN" => RunState::Shutdown,
            other => RunState::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RunState::Unknown(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RunState {
    fn from(raw: String) -> Self {
        match RunState::parse(&raw) {
            RunState::Unknown(_) => RunState::Unknown(raw),
            known => known,
        }
    }
}

impl From<&str> for RunState {
    fn from(raw: &str) -> Self {
        RunState::parse(raw)
    }
}

impl From<RunState> for String {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Shared run-state cell read by the loop and written by the control surface.
///
/// Every write replaces the whole value under the lock, so readers never see a
/// partially written state.
#[derive(Debug)]
pub struct RunStateStore {
    current: RwLock<RunState>,
}

impl RunStateStore {
    pub fn new(initial: RunState) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> RunState {
        self.current.read().clone()
    }

    /// Overwrite the state and return the previous value. No validation.
    pub fn set(&self, state: RunState) -> RunState {
        let mut current = self.current.write();
        debug!("Run state {} -> {}", current, state);
        std::mem::replace(&mut *current, state)
    }

    /// Replace the state only if it still equals `expected`.
    pub fn compare_and_set(&self, expected: &RunState, next: RunState) -> bool {
        let mut current = self.current.write();
        if *current != *expected {
            return false;
        }
        debug!("Run state {} -> {}", current, next);
        *current = next;
        true
    }
}

impl Default for RunStateStore {
    fn default() -> Self {
        Self::new(RunState::Init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_parse_named_states() {
        assert_eq!(RunState::parse("INIT"), RunState::Init);
        assert_eq!(RunState::parse("RUNNING"), RunState::Running);
        assert_eq!(RunState::parse("PAUSED"), RunState::Paused);
        assert_eq!(RunState::parse("SHUTDOWN"), RunState::Shutdown);
    }

    #[test]
    fn test_unrecognized_values_are_kept_verbatim() {
        assert_eq!(
            RunState::parse("running"),
            RunState::Unknown("running".to_string())
        );
        assert_eq!(RunState::parse(""), RunState::Unknown(String::new()));

        let state = RunState::from("DRAINING".to_string());
        assert!(!state.is_known());
        assert_eq!(state.to_string(), "DRAINING");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&RunState::Paused).unwrap();
        assert_eq!(json, "\"PAUSED\"");

        let parsed: RunState = serde_json::from_str("\"SHUTDOWN\"").unwrap();
        assert_eq!(parsed, RunState::Shutdown);

        let custom: RunState = serde_json::from_str("\"MAINTENANCE\"").unwrap();
        assert_eq!(custom, RunState::Unknown("MAINTENANCE".to_string()));
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let store = RunStateStore::default();

        for state in [
            RunState::Init,
            RunState::Running,
            RunState::Paused,
            RunState::Shutdown,
            RunState::Unknown("custom".to_string()),
        ] {
            store.set(state.clone());
            assert_eq!(store.get(), state);
        }
    }

    #[test]
    fn test_set_returns_previous() {
        let store = RunStateStore::new(RunState::Running);
        let previous = store.set(RunState::Paused);
        assert_eq!(previous, RunState::Running);
    }

    #[test]
    fn test_compare_and_set_only_on_match() {
        let store = RunStateStore::new(RunState::Init);

        assert!(store.compare_and_set(&RunState::Init, RunState::Running));
        assert_eq!(store.get(), RunState::Running);

        assert!(!store.compare_and_set(&RunState::Init, RunState::Paused));
        assert_eq!(store.get(), RunState::Running);
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let store = Arc::new(RunStateStore::default());
        let mut handles = Vec::new();

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    if i % 2 == 0 {
                        store.set(RunState::Running);
                    } else {
                        store.set(RunState::Unknown("X".repeat(64)));
                    }
                    let seen = store.get();
                    assert!(
                        seen == RunState::Running
                            || seen == RunState::Unknown("X".repeat(64))
                            || seen == RunState::Init
                    );
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
