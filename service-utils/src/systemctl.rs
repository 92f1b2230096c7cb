// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for querying and controlling systemd services.

use crate::{execute_async, status_async, ExecutionError, SYSTEMCTL};
use slog::{info, Logger};
use std::process::Stdio;
use tokio::process::Command;

/// The subset of a service manager used to bring a daemon up.
///
/// Implementations must treat `enable`, `start` and `restart` against a
/// service that is already in the requested state as benign.
#[async_trait::async_trait]
pub trait ServiceManager: Send + Sync {
    async fn is_enabled(&self, service: &str) -> Result<bool, ExecutionError>;
    async fn enable(&self, service: &str) -> Result<(), ExecutionError>;
    async fn is_active(&self, service: &str) -> Result<bool, ExecutionError>;
    async fn start(&self, service: &str) -> Result<(), ExecutionError>;
    async fn restart(&self, service: &str) -> Result<(), ExecutionError>;
}

/// Wraps `systemctl` for a single host.
pub struct Systemctl {
    log: Logger,
}

impl Systemctl {
    pub fn new(log: &Logger) -> Self {
        Self { log: log.new(slog::o!("component" => "Systemctl")) }
    }

    async fn query(
        &self,
        verb: &'static str,
        service: &str,
    ) -> Result<bool, ExecutionError> {
        let mut cmd = Command::new(SYSTEMCTL);
        cmd.args([verb, "--quiet", service])
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = status_async(&mut cmd).await?;
        info!(
            self.log, "queried service state";
            "service" => service,
            "query" => verb,
            "result" => status.success(),
        );
        Ok(status.success())
    }

    async fn control(
        &self,
        verb: &'static str,
        service: &str,
    ) -> Result<(), ExecutionError> {
        info!(
            self.log, "running systemctl";
            "service" => service,
            "verb" => verb,
        );
        let mut cmd = Command::new(SYSTEMCTL);
        cmd.args([verb, service]);
        execute_async(&mut cmd).await?;
        info!(
            self.log, "finished running systemctl";
            "service" => service,
            "verb" => verb,
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServiceManager for Systemctl {
    async fn is_enabled(&self, service: &str) -> Result<bool, ExecutionError> {
        self.query("is-enabled", service).await
    }

    async fn enable(&self, service: &str) -> Result<(), ExecutionError> {
        self.control("enable", service).await
    }

    async fn is_active(&self, service: &str) -> Result<bool, ExecutionError> {
        self.query("is-active", service).await
    }

    async fn start(&self, service: &str) -> Result<(), ExecutionError> {
        self.control("start", service).await
    }

    async fn restart(&self, service: &str) -> Result<(), ExecutionError> {
        self.control("restart", service).await
    }
}
