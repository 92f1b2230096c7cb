// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Unconditional refresh of Telegraf's Kapacitor inputs.
//!
//! Unlike the bootstrap controller this path has no sentinel and no gate:
//! every invocation rewrites the inputs file and restarts Telegraf. The
//! template renderer only invokes it when the rendered key file changed.

use crate::daemon::{ServiceAccount, CONFIG_MODE};
use crate::files::{write_atomic, WriteError};
use crate::keys::{KeyValues, KeysError};
use crate::render::telegraf::render_kapacitor_inputs;
use camino::{Utf8Path, Utf8PathBuf};
use service_utils::ownership::{set_mode, Ownership, OwnershipError};
use service_utils::systemctl::ServiceManager;
use service_utils::ExecutionError;
use slog::{info, Logger};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTarget {
    /// Service consuming the refreshed file, restarted on every refresh.
    pub consumer_service: String,
    pub account: ServiceAccount,
    pub output_path: Utf8PathBuf,
    pub keys_path: Utf8PathBuf,
    pub kapacitor_port: u16,
    pub command_timeout: Duration,
}

impl RefreshTarget {
    pub fn owned_paths(&self) -> Vec<Utf8PathBuf> {
        vec![self.output_path.clone(), self.keys_path.clone()]
    }

    pub fn render(&self, keys: &KeyValues) -> String {
        render_kapacitor_inputs(self.kapacitor_port, keys.services_database())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Keys(#[from] KeysError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("failed to restart {service}")]
    Restart {
        service: String,
        #[source]
        err: ExecutionError,
    },
}

/// Rewrites the inputs file and restarts its consumer.
pub async fn refresh(
    log: &Logger,
    target: &RefreshTarget,
    manager: &dyn ServiceManager,
    ownership: &dyn Ownership,
) -> Result<(), RefreshError> {
    let keys = KeyValues::load(&target.keys_path)?;
    let contents = target.render(&keys);

    info!(
        log, "Writing refreshed inputs";
        "path" => %target.output_path,
        "database" => keys.services_database(),
    );
    install(target, &target.output_path, &contents, ownership)?;

    info!(log, "Restarting consumer"; "service" => &target.consumer_service);
    manager.restart(&target.consumer_service).await.map_err(|err| {
        RefreshError::Restart { service: target.consumer_service.clone(), err }
    })?;
    Ok(())
}

fn install(
    target: &RefreshTarget,
    path: &Utf8Path,
    contents: &str,
    ownership: &dyn Ownership,
) -> Result<(), RefreshError> {
    write_atomic(path, contents)?;
    ownership.set_owner(path, &target.account.user, &target.account.group)?;
    set_mode(path, CONFIG_MODE)?;
    Ok(())
}
