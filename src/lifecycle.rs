use crate::error::LifecycleError;
use async_trait::async_trait;
use bollard::container::{ListContainersOptions, StopContainerOptions};
use bollard::Docker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A process as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: String,
    pub name: String,
}

impl ProcessInfo {
    pub fn new<S: Into<String>>(id: S, name: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A sibling (or this worker itself) that the lifecycle manager may stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    pub id: String,
    pub name: String,
    pub is_self: bool,
}

impl ManagedProcess {
    fn short_id(&self) -> &str {
        match self.id.char_indices().nth(12) {
            Some((end, _)) => &self.id[..end],
            None => &self.id,
        }
    }
}

/// Process/container runtime introspection and control
#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>, LifecycleError>;

    /// Stop one process using the runtime's default grace period
    async fn stop_process(&self, id: &str) -> Result<(), LifecycleError>;
}

/// Docker Engine runtime over the local socket
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect_local() -> Result<Self, LifecycleError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| LifecycleError::RuntimeUnavailable {
                details: e.to_string(),
            })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ProcessRuntime for DockerRuntime {
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>, LifecycleError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| LifecycleError::ListFailed {
                details: e.to_string(),
            })?;

        let processes = containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let name = container
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|name| name.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                Some(ProcessInfo { id, name })
            })
            .collect();

        Ok(processes)
    }

    async fn stop_process(&self, id: &str) -> Result<(), LifecycleError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(|e| LifecycleError::StopFailed {
                id: id.to_string(),
                name: String::new(),
                details: e.to_string(),
            })
    }
}

/// What a completed fleet stop touched, in stop order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<ManagedProcess>,
}

/// Tears the fleet down, stopping this worker's own process last
pub struct LifecycleManager {
    runtime: Arc<dyn ProcessRuntime>,
    self_name_pattern: String,
}

impl LifecycleManager {
    pub fn new<S: Into<String>>(runtime: Arc<dyn ProcessRuntime>, self_name_pattern: S) -> Self {
        Self {
            runtime,
            self_name_pattern: self_name_pattern.into(),
        }
    }

    /// Fresh listing of every managed process with its self flag
    pub async fn discover(&self) -> Result<Vec<ManagedProcess>, LifecycleError> {
        let processes = self.runtime.list_processes().await?;

        Ok(processes
            .into_iter()
            .map(|process| ManagedProcess {
                is_self: process.name.contains(&self.self_name_pattern),
                id: process.id,
                name: process.name,
            })
            .collect())
    }

    /// Stop all other processes in listing order, then this worker.
    ///
    /// The first failure aborts the sequence: later processes are not
    /// attempted and self processes are left running.
    pub async fn stop_all(&self) -> Result<StopReport, LifecycleError> {
        let processes = self.discover().await?;
        let (own, others): (Vec<_>, Vec<_>) =
            processes.into_iter().partition(|process| process.is_self);

        info!(
            "Stopping fleet: {} peer processes, {} self processes",
            others.len(),
            own.len()
        );
        if own.is_empty() {
            warn!(
                "No process matched self pattern '{}'",
                self.self_name_pattern
            );
        } else if own.len() > 1 {
            warn!(
                "{} processes matched self pattern '{}'; all are stopped last",
                own.len(),
                self.self_name_pattern
            );
        }

        let mut report = StopReport::default();

        for process in others.into_iter().chain(own) {
            self.stop_one(&process).await?;
            report.stopped.push(process);
        }

        Ok(report)
    }

    async fn stop_one(&self, process: &ManagedProcess) -> Result<(), LifecycleError> {
        info!("Stopping process {} ({})", process.short_id(), process.name);

        self.runtime
            .stop_process(&process.id)
            .await
            .map_err(|e| match e {
                LifecycleError::StopFailed { details, .. } => LifecycleError::StopFailed {
                    id: process.id.clone(),
                    name: process.name.clone(),
                    details,
                },
                other => other,
            })?;

        debug!("Process {} stopped", process.short_id());
        Ok(())
    }
}
