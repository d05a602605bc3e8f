//! Reload coordinator tests.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use haproxy_manager::config::ManagerConfig;
use haproxy_manager::detector::Fingerprint;
use haproxy_manager::reload::{
    reload_channel, ReloadCoordinator, ReloadError, ReloadOutcome, ReloadRequest, ReloadTrigger,
};
use haproxy_manager::runtime::SignalKind;
use haproxy_manager::supervisor::{ManagedProcessSpec, Role};

mod common;
use common::{wait_until, Call, FakeRuntime};

const LB: &str = "opencopilot.lb";

fn coordinator(runtime: Arc<FakeRuntime>) -> ReloadCoordinator {
    let config = ManagerConfig::default();
    let specs = vec![
        Arc::new(ManagedProcessSpec::load_balancer(&config)),
        Arc::new(ManagedProcessSpec::config_renderer(&config)),
    ];
    ReloadCoordinator::new(runtime, specs)
}

fn detected(content: &[u8]) -> ReloadRequest {
    ReloadRequest::new(
        Role::LoadBalancer,
        ReloadTrigger::FileChanged { fingerprint: Some(Fingerprint::of(content)) },
    )
}

fn configured(content: &[u8]) -> ReloadRequest {
    ReloadRequest::new(
        Role::LoadBalancer,
        ReloadTrigger::Configure { fingerprint: Fingerprint::of(content) },
    )
}

fn file_changed() -> ReloadRequest {
    ReloadRequest::new(Role::LoadBalancer, ReloadTrigger::FileChanged { fingerprint: None })
}

#[tokio::test]
async fn test_signals_running_load_balancer() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    let coordinator = coordinator(runtime.clone());

    let outcome = coordinator.reload(&file_changed()).await.unwrap();

    assert_eq!(outcome, ReloadOutcome::Signalled { delivered: 1, failed: 0 });
    assert_eq!(runtime.calls(), vec![Call::Signal(LB.to_string(), SignalKind::Hangup)]);
    assert_eq!(coordinator.stats().signalled, 1);
}

#[tokio::test]
async fn test_nothing_running_is_not_an_error() {
    let runtime = FakeRuntime::new();
    let coordinator = coordinator(runtime.clone());

    let outcome = coordinator.reload(&file_changed()).await.unwrap();

    assert_eq!(outcome, ReloadOutcome::NotRunning);
    assert!(runtime.calls().is_empty());
    assert_eq!(coordinator.stats().not_running, 1);
}

#[tokio::test]
async fn test_reload_never_touches_lifecycle() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    let coordinator = coordinator(runtime.clone());

    coordinator.reload(&file_changed()).await.unwrap();
    coordinator.reload(&file_changed()).await.unwrap();

    assert_eq!(runtime.signals(LB), 2);
    assert!(runtime
        .calls()
        .iter()
        .all(|c| matches!(c, Call::Signal(..))));
    assert!(runtime.running(LB).is_some());
}

#[tokio::test]
async fn test_delivery_failure_is_reported() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    runtime.fail_signal(true);
    let coordinator = coordinator(runtime.clone());

    let outcome = coordinator.reload(&file_changed()).await.unwrap();

    assert_eq!(outcome, ReloadOutcome::Signalled { delivered: 0, failed: 1 });
    assert_eq!(coordinator.stats().failed, 1);
}

#[tokio::test]
async fn test_renderer_is_not_reloadable() {
    let runtime = FakeRuntime::new();
    let coordinator = coordinator(runtime.clone());

    let err = coordinator
        .reload(&ReloadRequest::new(Role::ConfigRenderer, ReloadTrigger::FileChanged { fingerprint: None }))
        .await
        .unwrap_err();

    assert!(matches!(err, ReloadError::NotReloadable(Role::ConfigRenderer)));
}

#[tokio::test]
async fn test_queued_requests_are_drained() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    let coordinator = Arc::new(coordinator(runtime.clone()));
    let (sender, rx) = reload_channel();
    let stop = CancellationToken::new();
    let task = tokio::spawn(coordinator.clone().run(rx, stop.clone()));

    for _ in 0..3 {
        sender.request(Role::LoadBalancer, ReloadTrigger::FileChanged { fingerprint: None });
    }
    wait_until(Duration::from_secs(2), || runtime.signals(LB) == 3).await;

    stop.cancel();
    task.await.unwrap();

    // Requests after shutdown go nowhere.
    sender.request(Role::LoadBalancer, ReloadTrigger::FileChanged { fingerprint: None });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runtime.signals(LB), 3);
}

#[tokio::test]
async fn test_detected_write_after_configure_is_not_resignalled() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    let coordinator = coordinator(runtime.clone());

    let first = coordinator.reload(&configured(b"global\n  maxconn 50\n")).await.unwrap();
    assert_eq!(first, ReloadOutcome::Signalled { delivered: 1, failed: 0 });

    // The detector then sees the same write.
    let second = coordinator.reload(&detected(b"global\n  maxconn 50\n")).await.unwrap();
    assert_eq!(second, ReloadOutcome::AlreadyApplied);
    assert_eq!(runtime.signals(LB), 1);
    assert_eq!(coordinator.stats().skipped, 1);

    // New content still reloads, and so does going back to older content.
    coordinator.reload(&detected(b"global\n  maxconn 60\n")).await.unwrap();
    coordinator.reload(&detected(b"global\n  maxconn 50\n")).await.unwrap();
    assert_eq!(runtime.signals(LB), 3);
}

#[tokio::test]
async fn test_configure_after_detected_write_is_not_resignalled() {
    let runtime = FakeRuntime::new();
    runtime.seed_running(LB);
    let coordinator = coordinator(runtime.clone());

    coordinator.reload(&detected(b"global\n")).await.unwrap();
    let outcome = coordinator.reload(&configured(b"global\n")).await.unwrap();

    assert_eq!(outcome, ReloadOutcome::AlreadyApplied);
    assert_eq!(runtime.signals(LB), 1);
}

#[tokio::test]
async fn test_undelivered_content_is_signalled_again() {
    let runtime = FakeRuntime::new();
    let coordinator = coordinator(runtime.clone());

    let outcome = coordinator.reload(&configured(b"global\n")).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::NotRunning);

    runtime.seed_running(LB);
    let outcome = coordinator.reload(&detected(b"global\n")).await.unwrap();
    assert_eq!(outcome, ReloadOutcome::Signalled { delivered: 1, failed: 0 });
}
