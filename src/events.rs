use crate::run_state::RunState;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Things that happen inside a worker, observable in-process
#[derive(Debug, Clone, Serialize)]
pub enum WorkerEvent {
    /// The loop moved the run state on its own
    StateChanged {
        from: RunState,
        to: RunState,
        timestamp: SystemTime,
    },
    /// A work message went out during a RUNNING tick
    WorkSent {
        iteration: u64,
        timestamp: SystemTime,
    },
    /// The peer call finished (synthetic 500 on transport failure)
    PeerResponded {
        status_code: u16,
        timestamp: SystemTime,
    },
    /// A publish failed and was skipped
    PublishFailed { topic: String, error: String },
    /// Fleet teardown is starting
    FleetStopRequested { timestamp: SystemTime },
    /// Every managed process was stopped
    FleetStopCompleted { stopped: usize },
    /// Fleet teardown aborted
    FleetStopFailed { error: String },
}

impl WorkerEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            WorkerEvent::StateChanged { from, to, .. } => format!("{} -> {}", from, to),
            WorkerEvent::WorkSent { iteration, .. } => format!("Work message {} sent", iteration),
            WorkerEvent::PeerResponded { status_code, .. } => {
                format!("Peer responded with {}", status_code)
            }
            WorkerEvent::PublishFailed { topic, error } => {
                format!("Publish to '{}' failed: {}", topic, error)
            }
            WorkerEvent::FleetStopRequested { .. } => "Fleet stop requested".to_string(),
            WorkerEvent::FleetStopCompleted { stopped } => {
                format!("Fleet stop completed ({} processes)", stopped)
            }
            WorkerEvent::FleetStopFailed { error } => format!("Fleet stop failed: {}", error),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkerEvent::StateChanged { .. } => "state_changed",
            WorkerEvent::WorkSent { .. } => "work_sent",
            WorkerEvent::PeerResponded { .. } => "peer_responded",
            WorkerEvent::PublishFailed { .. } => "publish_failed",
            WorkerEvent::FleetStopRequested { .. } => "fleet_stop_requested",
            WorkerEvent::FleetStopCompleted { .. } => "fleet_stop_completed",
            WorkerEvent::FleetStopFailed { .. } => "fleet_stop_failed",
        }
    }
}

/// In-process broadcast of worker events
pub struct EventBus {
    sender: broadcast::Sender<WorkerEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.sender.subscribe()
    }

    /// Log the event and hand it to subscribers; returns how many received it
    pub fn publish(&self, event: WorkerEvent) -> usize {
        match &event {
            WorkerEvent::StateChanged { .. }
            | WorkerEvent::FleetStopRequested { .. }
            | WorkerEvent::FleetStopCompleted { .. } => info!("{}", event.description()),
            WorkerEvent::PublishFailed { .. } => warn!("{}", event.description()),
            WorkerEvent::FleetStopFailed { .. } => error!("{}", event.description()),
            _ => debug!("{}", event.description()),
        }

        // No subscribers is normal outside of tests
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
