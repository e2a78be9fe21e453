use crate::bus::MessagePublisher;
use crate::clock::Timestamper;
use crate::config::{ScheduleConfig, TopicConfig};
use crate::error::{BusError, Result};
use crate::events::{EventBus, WorkerEvent};
use crate::lifecycle::{LifecycleManager, StopReport};
use crate::peer::PeerInvoker;
use crate::run_state::{RunState, RunStateStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// What the loop does after a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Sleep this long, then read the state again
    Continue(Duration),
    /// The fleet was stopped; the loop has nothing left to do
    Finished(StopReport),
}

/// Static inputs of the loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub topics: TopicConfig,
    pub schedule: ScheduleConfig,
    pub timestamper: Timestamper,
    /// `<host>:<port>` advertised in work messages
    pub self_endpoint: String,
}

/// The run-state machine.
///
/// Each tick reads the shared state once and performs that state's effect.
/// Publish and peer failures are logged and never end the loop; only a failed
/// fleet stop does.
pub struct WorkerLoop {
    run_state: Arc<RunStateStore>,
    publisher: Arc<dyn MessagePublisher>,
    invoker: PeerInvoker,
    lifecycle: LifecycleManager,
    event_bus: Arc<EventBus>,
    settings: LoopSettings,
    iteration: u64,
}

impl WorkerLoop {
    pub fn new(
        run_state: Arc<RunStateStore>,
        publisher: Arc<dyn MessagePublisher>,
        invoker: PeerInvoker,
        lifecycle: LifecycleManager,
        event_bus: Arc<EventBus>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            run_state,
            publisher,
            invoker,
            lifecycle,
            event_bus,
            settings,
            iteration: 1,
        }
    }

    /// Sequence number the next RUNNING tick will send
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Run ticks until the fleet is stopped, teardown fails, or `cancel` fires.
    ///
    /// Returns `Ok(None)` when cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Option<StopReport>> {
        info!("Orchestration loop started");

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Orchestration loop cancelled");
                    return Ok(None);
                }
                outcome = self.tick() => outcome?,
            };

            match outcome {
                TickOutcome::Continue(delay) if delay.is_zero() => {}
                TickOutcome::Continue(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Orchestration loop cancelled");
                            return Ok(None);
                        }
                        _ = sleep(delay) => {}
                    }
                }
                TickOutcome::Finished(report) => {
                    info!(
                        "Orchestration loop finished after stopping {} processes",
                        report.stopped.len()
                    );
                    return Ok(Some(report));
                }
            }
        }
    }

    /// Execute one state's effect and say what comes next
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        match self.run_state.get() {
            RunState::Init => {
                self.enter_running().await;
                Ok(TickOutcome::Continue(Duration::ZERO))
            }
            RunState::Running => {
                self.send_work().await;
                Ok(TickOutcome::Continue(self.settings.schedule.running_interval()))
            }
            RunState::Paused => {
                debug!("Loop paused");
                Ok(TickOutcome::Continue(self.settings.schedule.paused_interval()))
            }
            RunState::Shutdown => self.stop_fleet().await.map(TickOutcome::Finished),
            RunState::Unknown(raw) => {
                trace!("Idle in unrecognized state '{}'", raw);
                Ok(TickOutcome::Continue(self.settings.schedule.idle_interval()))
            }
        }
    }

    async fn enter_running(&mut self) {
        self.iteration = 1;

        if !self
            .run_state
            .compare_and_set(&RunState::Init, RunState::Running)
        {
            debug!("INIT was overwritten before the loop could leave it");
            return;
        }

        self.event_bus.publish(WorkerEvent::StateChanged {
            from: RunState::Init,
            to: RunState::Running,
            timestamp: SystemTime::now(),
        });

        let message = format!("{}: INIT->RUNNING", self.settings.timestamper.now());
        if let Err(e) = self
            .publisher
            .publish(&self.settings.topics.run_log, &message)
            .await
        {
            self.report_publish_failure(&self.settings.topics.run_log, &e);
        }
    }

    async fn send_work(&mut self) {
        let message = format!(
            "SND {} {} {}",
            self.iteration,
            self.settings.timestamper.now(),
            self.settings.self_endpoint
        );

        match self
            .publisher
            .publish(&self.settings.topics.work, &message)
            .await
        {
            Ok(()) => {
                self.event_bus.publish(WorkerEvent::WorkSent {
                    iteration: self.iteration,
                    timestamp: SystemTime::now(),
                });
            }
            Err(e) => self.report_publish_failure(&self.settings.topics.work, &e),
        }

        let invocation = self.invoker.invoke(&message).await;
        self.event_bus.publish(WorkerEvent::PeerResponded {
            status_code: invocation.status_code,
            timestamp: SystemTime::now(),
        });
        if let Some(e) = &invocation.report_error {
            self.report_publish_failure(&self.settings.topics.log, e);
        }

        self.iteration += 1;
    }

    async fn stop_fleet(&mut self) -> Result<StopReport> {
        info!("SHUTDOWN command received");
        self.event_bus.publish(WorkerEvent::FleetStopRequested {
            timestamp: SystemTime::now(),
        });

        // In-flight peer calls and publishes get this long to land
        sleep(self.settings.schedule.shutdown_grace()).await;

        match self.lifecycle.stop_all().await {
            Ok(report) => {
                self.event_bus.publish(WorkerEvent::FleetStopCompleted {
                    stopped: report.stopped.len(),
                });
                Ok(report)
            }
            Err(e) => {
                self.event_bus.publish(WorkerEvent::FleetStopFailed {
                    error: e.to_string(),
                });
                if let Err(publish_error) = self
                    .publisher
                    .publish(&self.settings.topics.log, &e.to_string())
                    .await
                {
                    self.report_publish_failure(&self.settings.topics.log, &publish_error);
                }
                Err(e.into())
            }
        }
    }

    fn report_publish_failure(&self, topic: &str, error: &BusError) {
        self.event_bus.publish(WorkerEvent::PublishFailed {
            topic: topic.to_string(),
            error: error.to_string(),
        });
    }
}
