//! In-memory doubles for the worker's external collaborators.

use crate::bus::{BusConnector, MessagePublisher};
use crate::error::{BusError, LifecycleError, PeerError, ResolveError};
use crate::lifecycle::{ProcessInfo, ProcessRuntime};
use crate::peer::{PeerClient, PeerMessage};
use crate::resolve::AddressResolver;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Publisher that records every message per topic
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
    failing_topics: Mutex<HashSet<String>>,
    closed: Mutex<bool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.failing_topics.lock().remove(topic);
    }

    /// All `(topic, payload)` pairs in publish order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn messages_for(&self, topic: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        if self.failing_topics.lock().contains(topic) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                details: "mock failure".to_string(),
            });
        }
        debug!("Mock publish to '{}': {}", topic, payload);
        self.sent
            .lock()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), BusError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Connector that refuses the first `n` attempts, then hands out one shared
/// `RecordingPublisher`
pub struct FlakyConnector {
    failures_left: Mutex<u32>,
    addresses: Mutex<Vec<String>>,
    publisher: Arc<RecordingPublisher>,
}

impl FlakyConnector {
    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_left: Mutex::new(n),
            addresses: Mutex::new(Vec::new()),
            publisher: Arc::new(RecordingPublisher::new()),
        }
    }

    /// Connector that never succeeds
    pub fn unreachable() -> Self {
        Self::failing_times(u32::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.addresses.lock().len()
    }

    /// Addresses dialed, one per attempt
    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }

    pub fn publisher(&self) -> Arc<RecordingPublisher> {
        Arc::clone(&self.publisher)
    }
}

#[async_trait]
impl BusConnector for FlakyConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn MessagePublisher>, BusError> {
        self.addresses.lock().push(address.to_string());

        let mut failures_left = self.failures_left.lock();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(BusError::Connect {
                address: address.to_string(),
                details: "connection refused".to_string(),
            });
        }

        Ok(self.publisher.clone())
    }
}

/// Peer client answering from a script, falling back to a fixed status
pub struct ScriptedPeerClient {
    default_status: u16,
    script: Mutex<VecDeque<Result<u16, PeerError>>>,
    calls: Mutex<Vec<(String, PeerMessage)>>,
}

impl ScriptedPeerClient {
    pub fn always(status: u16) -> Self {
        Self {
            default_status: status,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_status(&self, status: u16) {
        self.script.lock().push_back(Ok(status));
    }

    pub fn push_error(&self, error: PeerError) {
        self.script.lock().push_back(Err(error));
    }

    /// `(url, body)` for every request made
    pub fn calls(&self) -> Vec<(String, PeerMessage)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PeerClient for ScriptedPeerClient {
    async fn post_message(&self, url: &str, body: &PeerMessage) -> Result<u16, PeerError> {
        self.calls.lock().push((url.to_string(), body.clone()));
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Ok(self.default_status))
    }
}

/// Process runtime over a fixed listing that records stop calls
pub struct FakeProcessRuntime {
    processes: Vec<ProcessInfo>,
    failing_stops: Mutex<HashSet<String>>,
    fail_list: Mutex<bool>,
    attempts: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
}

impl FakeProcessRuntime {
    pub fn new(processes: Vec<ProcessInfo>) -> Self {
        Self {
            processes,
            failing_stops: Mutex::new(HashSet::new()),
            fail_list: Mutex::new(false),
            attempts: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_stop(&self, id: &str) {
        self.failing_stops.lock().insert(id.to_string());
    }

    pub fn fail_list(&self) {
        *self.fail_list.lock() = true;
    }

    /// Ids passed to `stop_process`, including failed ones
    pub fn stop_attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    /// Ids that were stopped successfully, in order
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().clone()
    }
}

#[async_trait]
impl ProcessRuntime for FakeProcessRuntime {
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>, LifecycleError> {
        if *self.fail_list.lock() {
            return Err(LifecycleError::ListFailed {
                details: "mock listing failure".to_string(),
            });
        }
        Ok(self.processes.clone())
    }

    async fn stop_process(&self, id: &str) -> Result<(), LifecycleError> {
        self.attempts.lock().push(id.to_string());

        if self.failing_stops.lock().contains(id) {
            return Err(LifecycleError::StopFailed {
                id: id.to_string(),
                name: String::new(),
                details: "mock stop failure".to_string(),
            });
        }

        self.stopped.lock().push(id.to_string());
        Ok(())
    }
}

/// Resolver over a fixed name → address table
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    table: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service_name: &str, address: &str) -> Self {
        self.table
            .insert(service_name.to_string(), address.to_string());
        self
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, service_name: &str) -> Result<String, ResolveError> {
        self.table
            .get(service_name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                service: service_name.to_string(),
            })
    }
}
