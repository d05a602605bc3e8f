//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use haproxy_manager::config::{DetectorStrategy, ManagerConfig};
use haproxy_manager::runtime::{
    ContainerHandle, ContainerRuntime, ExitStatus, Result, RuntimeError, SignalKind,
};
use haproxy_manager::supervisor::ManagedProcessSpec;

/// A runtime call, recorded by container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Start(String),
    Stop(String),
    Signal(String, SignalKind),
    Kill(String),
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    created: HashMap<String, ContainerHandle>,
    running: HashMap<String, ContainerHandle>,
    exited: HashMap<String, i64>,
    waiters: HashMap<String, Vec<oneshot::Sender<i64>>>,
    calls: Vec<Call>,
    fail_create: bool,
    fail_signal: bool,
    fail_wait: bool,
    wait_failures: usize,
    cancel_on_create: Option<CancellationToken>,
}

impl FakeState {
    fn new_handle(&mut self, name: &str) -> ContainerHandle {
        self.next_id += 1;
        ContainerHandle::new(format!("{:012x}{:04}", self.next_id, self.next_id), name)
    }

    fn finish(&mut self, id: &str, code: i64) {
        self.running.retain(|_, h| h.id != id);
        self.exited.insert(id.to_string(), code);
        for waiter in self.waiters.remove(id).unwrap_or_default() {
            let _ = waiter.send(code);
        }
    }
}

/// In-memory container runtime. Containers run until a test exits them
/// or the manager stops them.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    pub fn fail_signal(&self, fail: bool) {
        self.state.lock().unwrap().fail_signal = fail;
    }

    /// Make `wait_exit` fail with an API error instead of waiting.
    pub fn fail_wait(&self, fail: bool) {
        self.state.lock().unwrap().fail_wait = fail;
    }

    pub fn wait_failures(&self) -> usize {
        self.state.lock().unwrap().wait_failures
    }

    /// Cancel `token` from inside the next `create`, as if stop arrived
    /// while the container was being created.
    pub fn cancel_on_create(&self, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_create = Some(token);
    }

    /// A container that was running before the manager started.
    pub fn seed_running(&self, name: &str) -> ContainerHandle {
        let mut state = self.state.lock().unwrap();
        let handle = state.new_handle(name);
        state.running.insert(name.to_string(), handle.clone());
        handle
    }

    /// Make the running container named `name` exit with `code`.
    pub fn exit(&self, name: &str, code: i64) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(handle) = state.running.get(name).cloned() else {
            return false;
        };
        state.finish(&handle.id, code);
        true
    }

    pub fn running(&self, name: &str) -> Option<ContainerHandle> {
        self.state.lock().unwrap().running.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn creates(&self, name: &str) -> usize {
        self.count(|c| matches!(c, Call::Create(n) if n == name))
    }

    pub fn stops(&self, name: &str) -> usize {
        self.count(|c| matches!(c, Call::Stop(n) if n == name))
    }

    pub fn signals(&self, name: &str) -> usize {
        self.count(|c| matches!(c, Call::Signal(n, _) if n == name))
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_running(&self, name: &str) -> Result<Option<ContainerHandle>> {
        Ok(self.running(name))
    }

    async fn create(&self, spec: &ManagedProcessSpec) -> Result<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(RuntimeError::Create {
                name: spec.name.clone(),
                message: "injected failure".into(),
            });
        }
        state.calls.push(Call::Create(spec.name.clone()));
        if let Some(token) = state.cancel_on_create.take() {
            token.cancel();
        }
        let handle = state.new_handle(&spec.name);
        state.created.insert(handle.id.clone(), handle.clone());
        Ok(handle)
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(handle.name.clone()));
        let created = state
            .created
            .remove(&handle.id)
            .ok_or_else(|| RuntimeError::NotFound(handle.name.clone()))?;
        state.running.insert(created.name.clone(), created);
        Ok(())
    }

    async fn stop(&self, handle: &ContainerHandle, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Stop(handle.name.clone()));
        if state.running.values().any(|h| h.id == handle.id) {
            state.finish(&handle.id, 0);
        }
        Ok(())
    }

    async fn signal(&self, handle: &ContainerHandle, signal: SignalKind) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_signal {
            return Err(RuntimeError::Api("injected failure".into()));
        }
        if !state.running.values().any(|h| h.id == handle.id) {
            return Err(RuntimeError::NotFound(handle.name.clone()));
        }
        state.calls.push(Call::Signal(handle.name.clone(), signal));
        Ok(())
    }

    async fn kill(&self, handle: &ContainerHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Kill(handle.name.clone()));
        state.finish(&handle.id, 137);
        Ok(())
    }

    async fn wait_exit(&self, handle: &ContainerHandle) -> Result<ExitStatus> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if state.fail_wait {
                state.wait_failures += 1;
                return Err(RuntimeError::Api("injected failure".into()));
            }
            if let Some(code) = state.exited.get(&handle.id) {
                return Ok(ExitStatus { code: *code });
            }
            if !state.running.values().any(|h| h.id == handle.id) {
                return Err(RuntimeError::NotFound(handle.name.clone()));
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(handle.id.clone()).or_default().push(tx);
            rx
        };

        match rx.await {
            Ok(code) => Ok(ExitStatus { code }),
            Err(_) => Err(RuntimeError::NotFound(handle.name.clone())),
        }
    }

    async fn list_running(&self, name: &str) -> Result<Vec<ContainerHandle>> {
        Ok(self.running(name).into_iter().collect())
    }
}

/// Poll `cond` until it holds, failing the test after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A config rooted in `dir` with the control surface off and polling
/// fast enough for tests.
pub fn test_config(dir: &std::path::Path) -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.paths.config_dir = dir.to_path_buf();
    config.runtime.shutdown_grace_secs = 2;
    config.runtime.stop_timeout_secs = 1;
    config.control.enabled = false;
    config.detector.strategy = DetectorStrategy::Poll;
    config.detector.poll_interval_ms = 50;
    config
}
