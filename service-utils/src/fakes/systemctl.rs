// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::systemctl::ServiceManager;
use crate::ExecutionError;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One recorded call against a [FakeServiceManager].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    IsEnabled(String),
    Enable(String),
    IsActive(String),
    Start(String),
    Restart(String),
}

impl ServiceCall {
    pub fn service(&self) -> &str {
        match self {
            ServiceCall::IsEnabled(s)
            | ServiceCall::Enable(s)
            | ServiceCall::IsActive(s)
            | ServiceCall::Start(s)
            | ServiceCall::Restart(s) => s,
        }
    }
}

/// The simulated state and behavior of a single service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeService {
    pub enabled: bool,
    pub active: bool,
    /// Number of `is-enabled` queries after `enable` that still report
    /// false. `None` means the service never becomes enabled.
    pub enable_settles_after: Option<usize>,
    /// Number of `is-active` queries after `start` that still report false.
    /// `None` means the service never becomes active.
    pub start_settles_after: Option<usize>,
    pub fail_enable: bool,
    pub fail_start: bool,
    pub fail_restart: bool,
}

impl FakeService {
    /// A disabled, stopped service which comes up as soon as asked.
    pub fn stopped() -> Self {
        Self {
            enabled: false,
            active: false,
            enable_settles_after: Some(0),
            start_settles_after: Some(0),
            fail_enable: false,
            fail_start: false,
            fail_restart: false,
        }
    }

    /// An enabled service which is already running.
    pub fn running() -> Self {
        Self { enabled: true, active: true, ..Self::stopped() }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn enable_settles_after(mut self, polls: usize) -> Self {
        self.enable_settles_after = Some(polls);
        self
    }

    pub fn enable_never_settles(mut self) -> Self {
        self.enable_settles_after = None;
        self
    }

    pub fn start_settles_after(mut self, polls: usize) -> Self {
        self.start_settles_after = Some(polls);
        self
    }

    pub fn start_never_settles(mut self) -> Self {
        self.start_settles_after = None;
        self
    }

    pub fn failing_enable(mut self) -> Self {
        self.fail_enable = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_restart(mut self) -> Self {
        self.fail_restart = true;
        self
    }
}

#[derive(Debug)]
struct ServiceState {
    service: FakeService,
    // Remaining false answers before a requested transition lands.
    pending_enable: Option<Option<usize>>,
    pending_start: Option<Option<usize>>,
}

impl ServiceState {
    fn new(service: FakeService) -> Self {
        Self { service, pending_enable: None, pending_start: None }
    }
}

// Advances a pending transition by one query, returning true once it lands.
fn settle(pending: &mut Option<Option<usize>>) -> bool {
    match pending {
        None => false,
        Some(None) => false,
        Some(Some(0)) => {
            *pending = None;
            true
        }
        Some(Some(n)) => {
            *n -= 1;
            false
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    services: BTreeMap<String, ServiceState>,
    calls: Vec<ServiceCall>,
}

impl Inner {
    fn state(&mut self, service: &str) -> &mut ServiceState {
        self.services
            .entry(service.to_string())
            .or_insert_with(|| ServiceState::new(FakeService::stopped()))
    }
}

/// A fake implementation of [crate::systemctl::ServiceManager].
///
/// Services not registered up front behave like [FakeService::stopped].
/// Every call is recorded in order and can be inspected with
/// [FakeServiceManager::calls].
#[derive(Debug, Default)]
pub struct FakeServiceManager {
    inner: Mutex<Inner>,
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: &str, service: FakeService) -> Self {
        self.inner
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), ServiceState::new(service));
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Calls made so far against a single service, in order.
    pub fn calls_for(&self, service: &str) -> Vec<ServiceCall> {
        self.calls().into_iter().filter(|c| c.service() == service).collect()
    }

    /// The current simulated state of `service`, if it has been touched.
    pub fn service(&self, service: &str) -> Option<FakeService> {
        self.inner
            .lock()
            .unwrap()
            .services
            .get(service)
            .map(|s| s.service.clone())
    }
}

fn injected(verb: &str, service: &str) -> ExecutionError {
    ExecutionError::Injected { command: format!("systemctl {verb} {service}") }
}

#[async_trait::async_trait]
impl ServiceManager for FakeServiceManager {
    async fn is_enabled(&self, service: &str) -> Result<bool, ExecutionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ServiceCall::IsEnabled(service.to_string()));
        let state = inner.state(service);
        if settle(&mut state.pending_enable) {
            state.service.enabled = true;
        }
        Ok(state.service.enabled)
    }

    async fn enable(&self, service: &str) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ServiceCall::Enable(service.to_string()));
        let state = inner.state(service);
        if state.service.fail_enable {
            return Err(injected("enable", service));
        }
        if !state.service.enabled {
            state.pending_enable = Some(state.service.enable_settles_after);
        }
        Ok(())
    }

    async fn is_active(&self, service: &str) -> Result<bool, ExecutionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ServiceCall::IsActive(service.to_string()));
        let state = inner.state(service);
        if settle(&mut state.pending_start) {
            state.service.active = true;
        }
        Ok(state.service.active)
    }

    async fn start(&self, service: &str) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ServiceCall::Start(service.to_string()));
        let state = inner.state(service);
        if state.service.fail_start {
            return Err(injected("start", service));
        }
        if !state.service.active {
            state.pending_start = Some(state.service.start_settles_after);
        }
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ServiceCall::Restart(service.to_string()));
        let state = inner.state(service);
        if state.service.fail_restart {
            return Err(injected("restart", service));
        }
        state.service.active = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_enable_settles_after_polls() {
        let manager = FakeServiceManager::new()
            .with_service(
                "svc",
                FakeService::stopped().enable_settles_after(2),
            );

        assert!(!manager.is_enabled("svc").await.unwrap());
        manager.enable("svc").await.unwrap();
        assert!(!manager.is_enabled("svc").await.unwrap());
        assert!(!manager.is_enabled("svc").await.unwrap());
        assert!(manager.is_enabled("svc").await.unwrap());
        assert!(manager.service("svc").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_never_settling_start() {
        let manager = FakeServiceManager::new()
            .with_service("svc", FakeService::stopped().start_never_settles());
        manager.start("svc").await.unwrap();
        for _ in 0..10 {
            assert!(!manager.is_active("svc").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unknown_services_are_stopped_and_recorded() {
        let manager = FakeServiceManager::new();
        assert!(!manager.is_active("other").await.unwrap());
        manager.restart("other").await.unwrap();
        assert!(manager.is_active("other").await.unwrap());
        assert_eq!(
            manager.calls_for("other"),
            vec![
                ServiceCall::IsActive("other".to_string()),
                ServiceCall::Restart("other".to_string()),
                ServiceCall::IsActive("other".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let manager = FakeServiceManager::new()
            .with_service("svc", FakeService::stopped().failing_start());
        let err = manager.start("svc").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Injected { .. }));
        assert!(!manager.service("svc").unwrap().active);
    }
}
