use super::ComponentState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Lifecycle state of each worker component, shared with the control surface
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    states: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every component as `Stopped`, replacing earlier entries
    pub async fn register(&self, components: &[&str]) {
        let mut states = self.states.lock().await;
        for component in components {
            states.insert(component.to_string(), ComponentState::Stopped);
        }
    }

    pub async fn set(&self, component: &str, state: ComponentState) {
        debug!("Component '{}' state changed to: {:?}", component, state);
        self.states.lock().await.insert(component.to_string(), state);
    }

    pub async fn get(&self, component: &str) -> Option<ComponentState> {
        self.states.lock().await.get(component).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, ComponentState> {
        self.states.lock().await.clone()
    }
}
