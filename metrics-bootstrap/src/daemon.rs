// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The daemons managed by the bootstrap controller.

use crate::keys::{KeysError, ResolvedKeys, WatchedKeySet};
use crate::render::chronograf::ChronografSettings;
use crate::render::kapacitor::KapacitorSettings;
use crate::sentinel::SentinelStore;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Mode of a rendered daemon configuration: read and execute for the
/// daemon's account and group, nothing else.
pub const CONFIG_MODE: u32 = 0o550;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum,
)]
pub enum DaemonKind {
    Chronograf,
    Kapacitor,
}

impl DaemonKind {
    pub const ALL: [DaemonKind; 2] =
        [DaemonKind::Chronograf, DaemonKind::Kapacitor];

    pub fn name(&self) -> &'static str {
        match self {
            DaemonKind::Chronograf => "chronograf",
            DaemonKind::Kapacitor => "kapacitor",
        }
    }
}

impl fmt::Display for DaemonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The system account a daemon runs as.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ServiceAccount {
    pub user: String,
    pub group: String,
}

impl ServiceAccount {
    pub fn new(user: &str, group: &str) -> Self {
        Self { user: user.to_string(), group: group.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DaemonSettings {
    Chronograf(ChronografSettings),
    Kapacitor {
        settings: KapacitorSettings,
        /// File the node's hostname is read from at render time.
        hostname_path: Utf8PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Keys(#[from] KeysError),

    #[error("failed to read hostname from {path}")]
    Hostname {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Everything needed to bootstrap one daemon.
///
/// Two specs built from a validated [crate::config::Config] never share a
/// path, so their controllers can run concurrently without coordination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonSpec {
    pub kind: DaemonKind,
    /// systemd unit name.
    pub service: String,
    pub account: ServiceAccount,
    /// Where the rendered configuration is installed.
    pub config_path: Utf8PathBuf,
    pub sentinel_path: Utf8PathBuf,
    /// Key file written by the template renderer.
    pub keys_path: Utf8PathBuf,
    /// How long to wait for the daemon to become enabled, and again to
    /// become active. `None` waits forever.
    pub converge_timeout: Option<Duration>,
    /// The template renderer's budget for running the bootstrap command.
    pub command_timeout: Duration,
    pub settings: DaemonSettings,
}

impl DaemonSpec {
    /// Keys which must all exist before this daemon is configured.
    pub fn watched_keys(&self) -> WatchedKeySet {
        match self.kind {
            DaemonKind::Chronograf => WatchedKeySet::metrics(),
            DaemonKind::Kapacitor => WatchedKeySet::kapacitor(),
        }
    }

    pub fn sentinel(&self) -> SentinelStore {
        SentinelStore::new(self.sentinel_path.clone())
    }

    pub fn http_port(&self) -> u16 {
        match &self.settings {
            DaemonSettings::Chronograf(settings) => settings.http_port,
            DaemonSettings::Kapacitor { settings, .. } => settings.http_port,
        }
    }

    /// Every path this daemon's controller reads or writes.
    pub fn owned_paths(&self) -> Vec<Utf8PathBuf> {
        vec![
            self.config_path.clone(),
            self.sentinel_path.clone(),
            self.sentinel().lock_path(),
            self.keys_path.clone(),
        ]
    }

    /// Renders the daemon's configuration from resolved key values.
    pub fn render(&self, keys: &ResolvedKeys) -> Result<String, RenderError> {
        let endpoint = keys.endpoint()?;
        match &self.settings {
            DaemonSettings::Chronograf(settings) => {
                Ok(crate::render::chronograf::render(settings, &endpoint))
            }
            DaemonSettings::Kapacitor { settings, hostname_path } => {
                let hostname = read_hostname(hostname_path)?;
                Ok(crate::render::kapacitor::render(
                    settings,
                    &hostname,
                    &endpoint,
                    &keys.mail(),
                ))
            }
        }
    }
}

fn read_hostname(path: &Utf8Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|err| RenderError::Hostname { path: path.to_owned(), err })
}
