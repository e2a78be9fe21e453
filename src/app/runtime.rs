use super::orchestrator::SharedShutdownSender;
use super::{ShutdownReason, WorkerOrchestrator};
use crate::error::{Result, WorkerError};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

impl WorkerOrchestrator {
    /// Wait for a signal, or for the loop task to die, then shut down.
    ///
    /// A finished fleet stop does not end the run; the worker waits to be
    /// terminated like any other process in the fleet.
    ///
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Worker is running");

        let shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| WorkerError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver.await.map_err(|_| WorkerError::System {
            message: "Shutdown channel closed unexpectedly".to_string(),
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown(&shutdown_reason).await?;

        info!("Worker shutdown complete");
        Ok(exit_code)
    }

    /// Ask the running worker to shut down from elsewhere in the process
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (docker stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_reason(&shutdown_sender, "SIGTERM").await;
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    send_reason(&shutdown_sender, "SIGINT").await;
                }
                Err(e) => warn!("Failed to register SIGINT handler: {}", e),
            }
        });
    }
}

async fn send_reason(shutdown_sender: &SharedShutdownSender, signal_name: &str) {
    if let Some(sender) = shutdown_sender.lock().await.take() {
        let _ = sender.send(ShutdownReason::Signal(signal_name.to_string()));
    }
}
