use super::state::ComponentRegistry;
use super::types::ShutdownReason;
use crate::bus::{AmqpConnector, BusConnector, MessagePublisher};
use crate::clock::Timestamper;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::lifecycle::{DockerRuntime, ProcessRuntime, StopReport};
use crate::peer::{HttpPeerClient, PeerClient};
use crate::resolve::{AddressResolver, DnsResolver};
use crate::run_state::{RunState, RunStateStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The external systems a worker talks to
#[derive(Clone)]
pub struct WorkerDependencies {
    pub connector: Arc<dyn BusConnector>,
    pub resolver: Arc<dyn AddressResolver>,
    pub peer_client: Arc<dyn PeerClient>,
    pub runtime: Arc<dyn ProcessRuntime>,
}

impl WorkerDependencies {
    /// AMQP broker, system DNS, HTTP peer, local Docker daemon
    pub fn production(config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            connector: Arc::new(AmqpConnector::new(config.bus.clone())),
            resolver: Arc::new(DnsResolver),
            peer_client: Arc::new(HttpPeerClient::new(config.peer.request_timeout())?),
            runtime: Arc::new(DockerRuntime::connect_local()?),
        })
    }
}

pub(super) type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Main application coordinator that wires the worker together
pub struct WorkerOrchestrator {
    pub(super) config: WorkerConfig,
    pub(super) dependencies: WorkerDependencies,
    pub(super) run_state: Arc<RunStateStore>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) timestamper: Timestamper,

    // Set once started
    pub(super) publisher: Option<Arc<dyn MessagePublisher>>,
    pub(super) control_addr: Option<SocketAddr>,
    pub(super) control_handle: Option<JoinHandle<Result<()>>>,
    pub(super) loop_handle: Option<JoinHandle<Result<Option<StopReport>>>>,

    // Lifecycle management
    pub(super) components: ComponentRegistry,
    pub(super) shutdown_sender: SharedShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl WorkerOrchestrator {
    /// Create a new orchestrator talking to the real bus, DNS, peer and Docker
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let dependencies = WorkerDependencies::production(&config)?;
        Ok(Self::with_dependencies(config, dependencies))
    }

    /// Create an orchestrator over the given collaborators
    pub fn with_dependencies(config: WorkerConfig, dependencies: WorkerDependencies) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let timestamper = Timestamper::utc(config.schedule.timestamp_format.clone());
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            dependencies,
            run_state: Arc::new(RunStateStore::new(RunState::Init)),
            event_bus,
            timestamper,
            publisher: None,
            control_addr: None,
            control_handle: None,
            loop_handle: None,
            components: ComponentRegistry::new(),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Use a different timestamp source for bus messages
    pub fn set_timestamper(&mut self, timestamper: Timestamper) {
        self.timestamper = timestamper;
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Shared run state, as seen by the control surface
    pub fn run_state(&self) -> Arc<RunStateStore> {
        Arc::clone(&self.run_state)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Component states, as reported by `/health`
    pub fn components(&self) -> ComponentRegistry {
        self.components.clone()
    }

    /// Address the control surface is bound to, once started
    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }
}
