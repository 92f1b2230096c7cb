// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The KV-gated bootstrap controller.
//!
//! The template renderer runs the controller whenever a daemon's key file
//! changes. Each invocation moves the daemon through
//!
//! ```text
//! Gated ──(all keys present)──> AwaitingInit ──(config written,
//!                                               service enabled and
//!                                               started)──> Initialized
//! ```
//!
//! where `Initialized` is recorded in the daemon's sentinel and makes every
//! later invocation a no-op. A failed invocation leaves the sentinel alone,
//! so the next one starts over from writing the config.

use crate::daemon::{DaemonSpec, RenderError, CONFIG_MODE};
use crate::files::{write_atomic, WriteError};
use crate::keys::{KeyValues, KeysError};
use crate::sentinel::{SentinelError, SentinelState};
use service_utils::ownership::{set_mode, Ownership, OwnershipError};
use service_utils::poll::{self, wait_for_condition, CondCheckError};
use service_utils::systemctl::ServiceManager;
use service_utils::ExecutionError;
use slog::{info, o, warn, Logger};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Sentinel(#[from] SentinelError),

    #[error(transparent)]
    Keys(#[from] KeysError),

    #[error("failed to render configuration for {service}")]
    Render {
        service: String,
        #[source]
        err: RenderError,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("failed to {intent} service {service}")]
    ServiceManager {
        intent: &'static str,
        service: String,
        #[source]
        err: ExecutionError,
    },

    #[error("service {service} was not enabled after {waited:?}")]
    EnableTimeout { service: String, waited: Duration },

    #[error("service {service} was not active after {waited:?}")]
    StartTimeout { service: String, waited: Duration },
}

/// How the daemon was brought to a running state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartAction {
    /// The daemon was stopped; it was started and confirmed active.
    Started,
    /// The daemon was already running; it was restarted to pick up the new
    /// configuration. Completion of the restart is not awaited.
    Restarted,
}

/// Result of one successful controller invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The sentinel says the daemon was bootstrapped before. Nothing was
    /// touched.
    AlreadyInitialized,
    /// Some watched keys are not available yet. Nothing was touched.
    Gated { missing: Vec<&'static str> },
    /// The daemon was configured and started during this invocation.
    Initialized { start: StartAction },
}

/// Bootstraps a single daemon.
///
/// Controllers for different daemons share no state and may run
/// concurrently. Concurrent runs for the same daemon are serialized by the
/// sentinel lock.
pub struct BootstrapController<'a> {
    log: Logger,
    spec: &'a DaemonSpec,
    manager: &'a dyn ServiceManager,
    ownership: &'a dyn Ownership,
    poll_interval: Duration,
}

impl<'a> BootstrapController<'a> {
    pub fn new(
        log: &Logger,
        spec: &'a DaemonSpec,
        manager: &'a dyn ServiceManager,
        ownership: &'a dyn Ownership,
        poll_interval: Duration,
    ) -> Self {
        let log = log.new(o!(
            "component" => "BootstrapController",
            "daemon" => spec.kind.name(),
        ));
        Self { log, spec, manager, ownership, poll_interval }
    }

    pub async fn run(&self) -> Result<Outcome, BootstrapError> {
        let sentinel = self.spec.sentinel();
        if sentinel.read()? == SentinelState::Initialized {
            info!(self.log, "Already initialized; nothing to do");
            return Ok(Outcome::AlreadyInitialized);
        }

        let keys = KeyValues::load(&self.spec.keys_path)?;
        let resolved = match keys.resolve(&self.spec.watched_keys()) {
            Ok(resolved) => resolved,
            Err(gated) => {
                warn!(
                    self.log,
                    "Not all key/value entries are available; \
                     will not start {}", self.spec.service;
                    "missing" => %gated,
                );
                return Ok(Outcome::Gated { missing: gated.missing });
            }
        };

        let guard = sentinel.lock()?;
        if guard.state()? == SentinelState::Initialized {
            info!(self.log, "Initialized by a concurrent invocation");
            return Ok(Outcome::AlreadyInitialized);
        }

        let contents = self.spec.render(&resolved).map_err(|err| {
            BootstrapError::Render { service: self.spec.service.clone(), err }
        })?;
        self.install_config(&contents)?;
        self.ensure_enabled().await?;
        let start = self.ensure_running().await?;

        guard.mark_initialized()?;
        info!(self.log, "Marked as initialized"; "start" => ?start);
        Ok(Outcome::Initialized { start })
    }

    fn install_config(&self, contents: &str) -> Result<(), BootstrapError> {
        let path = &self.spec.config_path;
        info!(self.log, "Writing configuration"; "path" => %path);
        write_atomic(path, contents)?;

        let account = &self.spec.account;
        info!(
            self.log, "Setting ownership and mode on configuration";
            "path" => %path,
            "owner" => format!("{}:{}", account.user, account.group),
            "mode" => format!("{CONFIG_MODE:o}"),
        );
        self.ownership.set_owner(path, &account.user, &account.group)?;
        set_mode(path, CONFIG_MODE)?;
        Ok(())
    }

    async fn ensure_enabled(&self) -> Result<(), BootstrapError> {
        let service = self.spec.service.as_str();
        if self
            .manager
            .is_enabled(service)
            .await
            .map_err(|err| self.manager_error("query", err))?
        {
            return Ok(());
        }

        info!(self.log, "Enabling service"; "service" => service);
        self.manager
            .enable(service)
            .await
            .map_err(|err| self.manager_error("enable", err))?;

        self.wait_until(|| self.manager.is_enabled(service)).await.map_err(
            |err| match err {
                poll::Error::TimedOut(waited) => BootstrapError::EnableTimeout {
                    service: service.to_string(),
                    waited,
                },
                poll::Error::PermanentError(err) => {
                    self.manager_error("query", err)
                }
            },
        )
    }

    async fn ensure_running(&self) -> Result<StartAction, BootstrapError> {
        let service = self.spec.service.as_str();
        let active = self
            .manager
            .is_active(service)
            .await
            .map_err(|err| self.manager_error("query", err))?;

        if active {
            info!(self.log, "Restarting running service"; "service" => service);
            self.manager
                .restart(service)
                .await
                .map_err(|err| self.manager_error("restart", err))?;
            return Ok(StartAction::Restarted);
        }

        info!(self.log, "Starting service"; "service" => service);
        self.manager
            .start(service)
            .await
            .map_err(|err| self.manager_error("start", err))?;

        self.wait_until(|| self.manager.is_active(service)).await.map_err(
            |err| match err {
                poll::Error::TimedOut(waited) => BootstrapError::StartTimeout {
                    service: service.to_string(),
                    waited,
                },
                poll::Error::PermanentError(err) => {
                    self.manager_error("query", err)
                }
            },
        )?;
        Ok(StartAction::Started)
    }

    /// Polls `query` until it reports true, within the daemon's
    /// convergence timeout.
    async fn wait_until<F, Fut>(
        &self,
        mut query: F,
    ) -> Result<(), poll::Error<ExecutionError>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<bool, ExecutionError>>,
    {
        wait_for_condition(
            || {
                let check = query();
                async move {
                    match check.await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(CondCheckError::NotYet),
                        Err(err) => Err(CondCheckError::Failed(err)),
                    }
                }
            },
            &self.poll_interval,
            self.spec.converge_timeout.as_ref(),
        )
        .await
    }

    fn manager_error(
        &self,
        intent: &'static str,
        err: ExecutionError,
    ) -> BootstrapError {
        BootstrapError::ServiceManager {
            intent,
            service: self.spec.service.clone(),
            err,
        }
    }
}
