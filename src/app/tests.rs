use super::*;
use crate::clock::Timestamper;
use crate::config::WorkerConfig;
use crate::error::{LifecycleError, WorkerError};
use crate::lifecycle::{ProcessInfo, ProcessRuntime};
use crate::mock::{FakeProcessRuntime, FlakyConnector, ScriptedPeerClient, StaticResolver};
use crate::run_state::RunState;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

struct Fixture {
    connector: Arc<FlakyConnector>,
    peer: Arc<ScriptedPeerClient>,
    runtime: Arc<FakeProcessRuntime>,
    orchestrator: WorkerOrchestrator,
}

fn create_test_config() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.control.ip = "127.0.0.1".to_string();
    config.control.port = 0;
    config.bus.connect_initial_backoff_ms = 1;
    config.bus.connect_max_backoff_ms = 4;
    config.schedule.running_interval_ms = 5;
    config.schedule.paused_interval_ms = 5;
    config.schedule.idle_interval_ms = 5;
    config.schedule.shutdown_grace_ms = 0;
    config.system.resolve_max_attempts = 2;
    config
}

fn fleet() -> Vec<ProcessInfo> {
    vec![
        ProcessInfo::new("aaa111", "/app_service1_1"),
        ProcessInfo::new("bbb222", "/app_service2_1"),
        ProcessInfo::new("ccc333", "/app_rabbitmq_1"),
    ]
}

fn fixture(bus_failures: u32, resolver: StaticResolver) -> Fixture {
    fixture_with_config(create_test_config(), bus_failures, resolver)
}

fn fixture_with_config(
    config: WorkerConfig,
    bus_failures: u32,
    resolver: StaticResolver,
) -> Fixture {
    let connector = Arc::new(FlakyConnector::failing_times(bus_failures));
    let peer = Arc::new(ScriptedPeerClient::always(200));
    let runtime = Arc::new(FakeProcessRuntime::new(fleet()));

    let dependencies = WorkerDependencies {
        connector: connector.clone(),
        resolver: Arc::new(resolver),
        peer_client: peer.clone(),
        runtime: runtime.clone(),
    };
    let mut orchestrator = WorkerOrchestrator::with_dependencies(config, dependencies);
    orchestrator.set_timestamper(Timestamper::fixed("TS"));

    Fixture {
        connector,
        peer,
        runtime,
        orchestrator,
    }
}

fn full_resolver() -> StaticResolver {
    StaticResolver::new()
        .with("rabbitmq", "10.0.0.2")
        .with("service1", "10.0.0.7")
        .with("service2", "10.0.0.8")
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_component(components: &ComponentRegistry, name: &str, state: ComponentState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while components.get(name).await != Some(state.clone()) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("component state not reached in time");
}

/// Runtime whose listing blows up, taking the loop task with it
struct ExplodingRuntime;

#[async_trait]
impl ProcessRuntime for ExplodingRuntime {
    async fn list_processes(&self) -> std::result::Result<Vec<ProcessInfo>, LifecycleError> {
        panic!("container listing exploded");
    }

    async fn stop_process(&self, _id: &str) -> std::result::Result<(), LifecycleError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_component_registry() {
    let fixture = fixture(0, full_resolver());
    let components = fixture.orchestrator.components();

    assert!(components.snapshot().await.is_empty());

    components.set("bus", ComponentState::Starting).await;
    assert_eq!(components.get("bus").await, Some(ComponentState::Starting));

    components.set("bus", ComponentState::Running).await;
    components.set("loop", ComponentState::Failed).await;

    let all_states = components.snapshot().await;
    assert_eq!(all_states.len(), 2);
    assert_eq!(all_states.get("bus"), Some(&ComponentState::Running));
    assert_eq!(all_states.get("loop"), Some(&ComponentState::Failed));
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let mut fixture = fixture(0, full_resolver());
    fixture.orchestrator.initialize().await.unwrap();

    let states = fixture.orchestrator.components().snapshot().await;
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_initialize_rejects_invalid_config() {
    let mut config = create_test_config();
    config.schedule.running_interval_ms = 0;
    let mut fixture = fixture_with_config(config, 0, full_resolver());

    let result = fixture.orchestrator.initialize().await;

    assert!(matches!(result, Err(WorkerError::Config(_))));
}

#[tokio::test]
async fn test_start_rejects_unrenderable_timestamp_format() {
    let mut config = create_test_config();
    config.schedule.timestamp_format = "%Y-%".to_string();
    let mut fixture = fixture_with_config(config, 0, full_resolver());

    let result = fixture.orchestrator.start().await;

    assert!(matches!(result, Err(WorkerError::Config(_))));
    assert_eq!(fixture.connector.attempts(), 0);
    assert!(fixture.orchestrator.control_addr().is_none());
}

#[tokio::test]
async fn test_nothing_served_while_bus_is_unreachable() {
    let connector = Arc::new(FlakyConnector::unreachable());
    let peer = Arc::new(ScriptedPeerClient::always(200));
    let runtime = Arc::new(FakeProcessRuntime::new(fleet()));
    let dependencies = WorkerDependencies {
        connector: connector.clone(),
        resolver: Arc::new(full_resolver()),
        peer_client: peer.clone(),
        runtime: runtime.clone(),
    };
    let mut orchestrator =
        WorkerOrchestrator::with_dependencies(create_test_config(), dependencies);
    orchestrator.initialize().await.unwrap();
    let run_state = orchestrator.run_state();
    run_state.set(RunState::Paused);

    let attempt = tokio::time::timeout(Duration::from_millis(100), orchestrator.start()).await;

    assert!(attempt.is_err(), "start returned while the bus was unreachable");
    assert!(connector.attempts() > 1);
    assert!(orchestrator.control_addr().is_none());
    assert_eq!(connector.publisher().total(), 0);
    assert!(peer.calls().is_empty());
    assert_eq!(run_state.get(), RunState::Paused);

    let components = orchestrator.components();
    assert_eq!(components.get("bus").await, Some(ComponentState::Starting));
    assert_eq!(components.get("control").await, Some(ComponentState::Stopped));
    assert_eq!(components.get("loop").await, Some(ComponentState::Stopped));
}

#[tokio::test]
async fn test_start_waits_for_bus_then_enters_running() {
    let mut fixture = fixture(3, full_resolver());
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();

    orchestrator.start().await.unwrap();

    assert_eq!(fixture.connector.attempts(), 4);
    assert!(fixture
        .connector
        .addresses()
        .iter()
        .all(|address| address == "10.0.0.2"));

    let control_addr = orchestrator.control_addr().unwrap();
    assert_ne!(control_addr.port(), 0);

    let components = orchestrator.components();
    for component in ["bus", "control", "loop"] {
        assert_eq!(
            components.get(component).await,
            Some(ComponentState::Running),
            "component {}",
            component
        );
    }

    let publisher = fixture.connector.publisher();
    wait_for(|| publisher.messages_for("work").len() >= 2).await;

    assert_eq!(
        publisher.messages_for("run-log"),
        vec!["TS: INIT->RUNNING".to_string()]
    );
    let work = publisher.messages_for("work");
    assert_eq!(
        work[0],
        format!("SND 1 TS 10.0.0.7:{}", control_addr.port())
    );
    assert!(work[1].starts_with("SND 2 TS "));

    let calls = fixture.peer.calls();
    assert!(!calls.is_empty());
    assert_eq!(calls[0].0, "http://10.0.0.8:8000/");
    assert_eq!(calls[0].1.message, work[0]);
    assert_eq!(orchestrator.run_state().get(), RunState::Running);

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::Signal("test".to_string()))
        .await
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_shutdown_closes_bus_and_stops_components() {
    let mut fixture = fixture(0, full_resolver());
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::Signal("SIGTERM".to_string()))
        .await
        .unwrap();

    assert_eq!(exit_code, 0);
    assert!(fixture.connector.publisher().is_closed());
    assert!(fixture.runtime.stop_attempts().is_empty());

    let components = orchestrator.components();
    for component in ["bus", "control", "loop"] {
        assert_eq!(
            components.get(component).await,
            Some(ComponentState::Stopped),
            "component {}",
            component
        );
    }
}

#[tokio::test]
async fn test_completed_fleet_stop_waits_for_termination() {
    let mut fixture = fixture(0, full_resolver());
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();
    let control_addr = orchestrator.control_addr().unwrap();
    let components = orchestrator.components();
    let shutdown_sender = Arc::clone(&orchestrator.shutdown_sender);

    orchestrator.run_state().set(RunState::Shutdown);
    wait_for_component(&components, "loop", ComponentState::Stopped).await;
    assert_eq!(
        fixture.runtime.stopped(),
        vec!["bbb222", "ccc333", "aaa111"]
    );

    let run = orchestrator.run();
    tokio::pin!(run);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut run)
            .await
            .is_err(),
        "run() returned after the fleet stop"
    );
    assert!(TcpStream::connect(control_addr).await.is_ok());
    assert!(!fixture.connector.publisher().is_closed());

    if let Some(sender) = shutdown_sender.lock().await.take() {
        sender
            .send(ShutdownReason::Signal("SIGTERM".to_string()))
            .unwrap();
    }
    let exit_code = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_failed_fleet_stop_keeps_worker_serving() {
    let mut fixture = fixture(0, full_resolver());
    fixture.runtime.fail_stop("bbb222");
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();
    let control_addr = orchestrator.control_addr().unwrap();
    let components = orchestrator.components();
    let shutdown_sender = Arc::clone(&orchestrator.shutdown_sender);

    orchestrator.run_state().set(RunState::Shutdown);
    wait_for_component(&components, "loop", ComponentState::Failed).await;

    assert_eq!(fixture.runtime.stop_attempts(), vec!["bbb222"]);
    assert!(fixture.runtime.stopped().is_empty());
    let publisher = fixture.connector.publisher();
    assert!(publisher
        .messages_for("log")
        .iter()
        .any(|line| line.contains("app_service2_1")));

    let run = orchestrator.run();
    tokio::pin!(run);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut run)
            .await
            .is_err(),
        "run() returned after the failed fleet stop"
    );
    assert!(TcpStream::connect(control_addr).await.is_ok());
    assert!(!publisher.is_closed());
    assert_eq!(components.get("control").await, Some(ComponentState::Running));
    assert_eq!(components.get("bus").await, Some(ComponentState::Running));

    if let Some(sender) = shutdown_sender.lock().await.take() {
        sender
            .send(ShutdownReason::Signal("SIGTERM".to_string()))
            .unwrap();
    }
    let exit_code = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
    assert!(publisher.is_closed());
}

#[tokio::test]
async fn test_dead_loop_task_ends_run_with_failure() {
    let connector = Arc::new(FlakyConnector::failing_times(0));
    let dependencies = WorkerDependencies {
        connector: connector.clone(),
        resolver: Arc::new(full_resolver()),
        peer_client: Arc::new(ScriptedPeerClient::always(200)),
        runtime: Arc::new(ExplodingRuntime),
    };
    let mut orchestrator =
        WorkerOrchestrator::with_dependencies(create_test_config(), dependencies);
    orchestrator.set_timestamper(Timestamper::fixed("TS"));
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    orchestrator.run_state().set(RunState::Shutdown);

    let exit_code = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exit_code, 1);
    assert!(connector.publisher().is_closed());
    assert_eq!(
        orchestrator.components().get("loop").await,
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_requested_shutdown_ends_run() {
    let mut fixture = fixture(0, full_resolver());
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert!(
        orchestrator
            .request_shutdown(ShutdownReason::Error("test".to_string()))
            .await
    );
    assert!(
        !orchestrator
            .request_shutdown(ShutdownReason::Error("again".to_string()))
            .await
    );

    let exit_code = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 1);
    assert!(fixture.runtime.stop_attempts().is_empty());
}

#[tokio::test]
async fn test_unresolvable_peer_fails_start() {
    let resolver = StaticResolver::new()
        .with("rabbitmq", "10.0.0.2")
        .with("service1", "10.0.0.7");
    let mut fixture = fixture(0, resolver);
    let orchestrator = &mut fixture.orchestrator;
    orchestrator.initialize().await.unwrap();

    let result = orchestrator.start().await;

    assert!(matches!(result, Err(WorkerError::Resolve(_))));
    assert!(orchestrator.control_addr().is_none());
    assert_eq!(
        orchestrator.components().get("loop").await,
        Some(ComponentState::Stopped)
    );
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::Signal("SIGINT".to_string()).exit_code(), 0);
    assert_eq!(ShutdownReason::Error("boom".to_string()).exit_code(), 1);
}
