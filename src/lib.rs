pub mod app;
pub mod bus;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod mock;
pub mod peer;
pub mod recovery;
pub mod resolve;
pub mod run_state;

pub use app::{ComponentState, ShutdownReason, WorkerDependencies, WorkerOrchestrator};
pub use bus::{AmqpConnector, AmqpPublisher, BusConnector, LogEntry, MessagePublisher};
pub use clock::Timestamper;
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use events::{EventBus, WorkerEvent};
pub use lifecycle::{DockerRuntime, LifecycleManager, ProcessRuntime, StopReport};
pub use peer::{HttpPeerClient, PeerClient, PeerInvoker};
pub use recovery::RetryPolicy;
pub use resolve::{AddressResolver, DnsResolver};
pub use run_state::{RunState, RunStateStore};
