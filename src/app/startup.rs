use super::types::{BUS_COMPONENT, CONTROL_COMPONENT, LOOP_COMPONENT};
use super::worker_loop::{LoopSettings, WorkerLoop};
use super::{ComponentState, ShutdownReason, WorkerOrchestrator};
use crate::bus::connect_with_backoff;
use crate::control::{ControlServer, ControlState};
use crate::error::{Result, WorkerError};
use crate::lifecycle::LifecycleManager;
use crate::peer::PeerInvoker;
use crate::recovery::retry_with_backoff;
use crate::run_state::RunState;
use std::sync::Arc;
use tracing::{error, info};

impl WorkerOrchestrator {
    /// Check the configuration and register components before anything starts
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing worker components");

        self.config.validate()?;
        self.components
            .register(&[BUS_COMPONENT, CONTROL_COMPONENT, LOOP_COMPONENT])
            .await;

        info!("All components initialized successfully");
        Ok(())
    }

    /// Connect to the bus, then start the control surface and the loop.
    ///
    /// Blocks until the bus is reachable; nothing is served before that.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting worker");
        self.config.validate()?;

        // Message bus first, retried until it answers
        self.components.set(BUS_COMPONENT, ComponentState::Starting).await;
        let policy = self.config.bus.connect_policy();
        let publisher = connect_with_backoff(
            self.dependencies.connector.as_ref(),
            self.dependencies.resolver.as_ref(),
            &self.config.bus.service_name,
            &policy,
        )
        .await
        .map_err(|e| {
            error!("Failed to connect to message bus: {}", e);
            e
        })?;
        self.publisher = Some(Arc::clone(&publisher));
        self.components.set(BUS_COMPONENT, ComponentState::Running).await;

        let self_address = self.resolve_service(&self.config.worker.service_name).await?;
        let peer_address = self.resolve_service(&self.config.peer.service_name).await?;
        info!("Own address {}, peer address {}", self_address, peer_address);

        self.run_state.set(RunState::Init);
        info!("Initialized current state to: {}", RunState::Init);

        // Control surface
        self.components.set(CONTROL_COMPONENT, ComponentState::Starting).await;
        let control_state =
            ControlState::new(Arc::clone(&self.run_state), self.components.clone());
        let server = ControlServer::bind(&self.config.control, control_state)
            .await
            .map_err(|e| {
                error!("Failed to start control surface: {}", e);
                e
            })?;
        let control_addr = server.local_addr()?;
        self.control_addr = Some(control_addr);

        let control_token = self.cancellation_token.child_token();
        self.control_handle = Some(tokio::spawn(async move {
            let result = server.serve(control_token).await;
            if let Err(e) = &result {
                error!("Control surface error: {}", e);
            }
            result
        }));
        self.components.set(CONTROL_COMPONENT, ComponentState::Running).await;

        // Orchestration loop
        self.components.set(LOOP_COMPONENT, ComponentState::Starting).await;
        let invoker = PeerInvoker::new(
            Arc::clone(&self.dependencies.peer_client),
            Arc::clone(&publisher),
            self.config.peer.url(&peer_address),
            self.config.topics.log.clone(),
            self.timestamper.clone(),
        );
        let lifecycle = LifecycleManager::new(
            Arc::clone(&self.dependencies.runtime),
            self.config.lifecycle.self_name_pattern.clone(),
        );
        let worker_loop = WorkerLoop::new(
            Arc::clone(&self.run_state),
            publisher,
            invoker,
            lifecycle,
            Arc::clone(&self.event_bus),
            LoopSettings {
                topics: self.config.topics.clone(),
                schedule: self.config.schedule.clone(),
                timestamper: self.timestamper.clone(),
                self_endpoint: format!("{}:{}", self_address, control_addr.port()),
            },
        );

        let loop_token = self.cancellation_token.child_token();
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        let components = self.components.clone();
        self.components.set(LOOP_COMPONENT, ComponentState::Running).await;

        let loop_task = tokio::spawn(worker_loop.run(loop_token));
        self.loop_handle = Some(tokio::spawn(async move {
            match loop_task.await {
                Ok(Ok(report)) => {
                    if report.is_some() {
                        components.set(LOOP_COMPONENT, ComponentState::Stopped).await;
                    }
                    Ok(report)
                }
                // A failed fleet stop leaves the worker serving until it is terminated
                Ok(Err(e)) => {
                    error!("Orchestration loop ended with error: {}", e);
                    components.set(LOOP_COMPONENT, ComponentState::Failed).await;
                    Err(e)
                }
                Err(join_error) => {
                    error!("Orchestration loop task died: {}", join_error);
                    components.set(LOOP_COMPONENT, ComponentState::Failed).await;
                    if let Some(sender) = shutdown_sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Error(format!(
                            "orchestration loop died: {}",
                            join_error
                        )));
                    }
                    Err(WorkerError::component(LOOP_COMPONENT, join_error.to_string()))
                }
            }
        }));

        info!("Worker started successfully");
        Ok(())
    }

    async fn resolve_service(&self, service_name: &str) -> Result<String> {
        let policy = self
            .config
            .bus
            .connect_policy()
            .with_max_attempts(self.config.system.resolve_max_attempts.max(1));
        let resolver = self.dependencies.resolver.as_ref();

        retry_with_backoff(&policy, &format!("Resolve {}", service_name), |_| {
            resolver.resolve(service_name)
        })
        .await
        .map_err(WorkerError::from)
    }
}
