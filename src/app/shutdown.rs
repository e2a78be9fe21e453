use super::types::{BUS_COMPONENT, CONTROL_COMPONENT, LOOP_COMPONENT};
use super::{ComponentState, ShutdownReason, WorkerOrchestrator};
use crate::error::{Result, WorkerError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

const COMPONENT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl WorkerOrchestrator {
    /// Stop the loop, the control surface and the bus connection, in that order.
    ///
    /// The exit code comes from `reason`; component stop errors are logged
    /// but only turn a clean exit into a failed one.
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = reason.exit_code();

        if let Some(handle) = self.loop_handle.take() {
            if let Err(e) = self.stop_task(LOOP_COMPONENT, handle).await {
                error!("Error stopping {}: {}", LOOP_COMPONENT, e);
            }
        }

        if let Some(handle) = self.control_handle.take() {
            if let Err(e) = self.stop_task(CONTROL_COMPONENT, handle).await {
                error!("Error stopping {}: {}", CONTROL_COMPONENT, e);
                exit_code = exit_code.max(1);
            }
        }

        if let Err(e) = self.stop_bus().await {
            error!("Error stopping {}: {}", BUS_COMPONENT, e);
            exit_code = exit_code.max(1);
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_task<T>(&self, component: &str, mut handle: JoinHandle<Result<T>>) -> Result<()> {
        info!("Stopping {} component", component);
        self.components.set(component, ComponentState::Stopping).await;

        match timeout(COMPONENT_STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(Ok(_))) => {
                self.components.set(component, ComponentState::Stopped).await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.components.set(component, ComponentState::Failed).await;
                Err(e)
            }
            Ok(Err(join_error)) => {
                self.components.set(component, ComponentState::Failed).await;
                Err(WorkerError::component(component, join_error.to_string()))
            }
            Err(_) => {
                warn!("{} component stop timeout, aborting", component);
                handle.abort();
                self.components.set(component, ComponentState::Failed).await;
                Err(WorkerError::component(component, "stop timeout"))
            }
        }
    }

    async fn stop_bus(&mut self) -> Result<()> {
        let Some(publisher) = self.publisher.take() else {
            return Ok(());
        };

        info!("Stopping {} component", BUS_COMPONENT);
        self.components.set(BUS_COMPONENT, ComponentState::Stopping).await;

        let result = match timeout(COMPONENT_STOP_TIMEOUT, publisher.close()).await {
            Ok(result) => result.map_err(WorkerError::from),
            Err(_) => Err(WorkerError::component(BUS_COMPONENT, "close timeout")),
        };

        let state = if result.is_ok() {
            ComponentState::Stopped
        } else {
            ComponentState::Failed
        };
        self.components.set(BUS_COMPONENT, state).await;
        result
    }
}
