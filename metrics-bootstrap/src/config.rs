// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with metrics-bootstrap configuration

use crate::daemon::{DaemonKind, DaemonSettings, DaemonSpec, ServiceAccount};
use crate::refresh::RefreshTarget;
use crate::render::chronograf::ChronografSettings;
use crate::render::kapacitor::KapacitorSettings;
use camino::{Utf8Path, Utf8PathBuf};
use dropshot::{ConfigLogging, ConfigLoggingLevel};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/metrics-bootstrap/config.toml";

/// Configuration for metrics-bootstrap
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Where and how verbosely to log
    #[serde(default = "default_log")]
    pub log: ConfigLogging,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub chronograf: ChronografConfig,
    #[serde(default)]
    pub kapacitor: KapacitorConfig,
    #[serde(default)]
    pub telegraf: TelegrafConfig,
    #[serde(default)]
    pub consul: ConsulConfig,
    #[serde(default)]
    pub consul_template: ConsulTemplateConfig,
}

fn default_log() -> ConfigLogging {
    ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: default_log(),
            poll: PollConfig::default(),
            chronograf: ChronografConfig::default(),
            kapacitor: KapacitorConfig::default(),
            telegraf: TelegrafConfig::default(),
            consul: ConsulConfig::default(),
            consul_template: ConsulTemplateConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between `is-enabled` / `is-active` checks.
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChronografConfig {
    pub service: String,
    pub user: String,
    pub group: String,
    pub config_path: Utf8PathBuf,
    pub sentinel_path: Utf8PathBuf,
    pub keys_path: Utf8PathBuf,
    pub bind_host: String,
    pub http_port: u16,
    pub base_path: String,
    pub command_timeout_secs: u64,
    /// Zero waits forever.
    pub converge_timeout_secs: u64,
}

impl Default for ChronografConfig {
    fn default() -> Self {
        Self {
            service: "chronograf".to_string(),
            user: "chronograf".to_string(),
            group: "chronograf".to_string(),
            config_path: "/etc/default/chronograf".into(),
            sentinel_path: "/var/log/chronograf_default.log".into(),
            keys_path: "/etc/metrics-bootstrap/chronograf.keys.toml".into(),
            bind_host: "0.0.0.0".to_string(),
            http_port: 8888,
            base_path: "dashboards/monitoring".to_string(),
            command_timeout_secs: 60,
            converge_timeout_secs: 25,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KapacitorConfig {
    pub service: String,
    pub user: String,
    pub group: String,
    pub config_path: Utf8PathBuf,
    pub sentinel_path: Utf8PathBuf,
    pub keys_path: Utf8PathBuf,
    pub hostname_path: Utf8PathBuf,
    pub http_port: u16,
    pub data_dir: Utf8PathBuf,
    pub load_dir: Utf8PathBuf,
    pub replay_dir: Utf8PathBuf,
    pub stats_database: String,
    pub command_timeout_secs: u64,
    /// Zero waits forever.
    pub converge_timeout_secs: u64,
}

impl Default for KapacitorConfig {
    fn default() -> Self {
        Self {
            service: "kapacitor".to_string(),
            user: "kapacitor".to_string(),
            group: "kapacitor".to_string(),
            config_path: "/etc/kapacitor/kapacitor.conf".into(),
            sentinel_path: "/var/log/kapacitor_default.log".into(),
            keys_path: "/etc/metrics-bootstrap/kapacitor.keys.toml".into(),
            hostname_path: "/etc/hostname".into(),
            http_port: 9092,
            data_dir: "/var/lib/kapacitor".into(),
            load_dir: "/etc/kapacitor/load".into(),
            replay_dir: "/var/lib/kapacitor/replay".into(),
            stats_database: "services".to_string(),
            command_timeout_secs: 15,
            converge_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelegrafConfig {
    pub service: String,
    pub user: String,
    pub group: String,
    pub config_dir: Utf8PathBuf,
    pub keys_path: Utf8PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for TelegrafConfig {
    fn default() -> Self {
        Self {
            service: "telegraf".to_string(),
            user: "telegraf".to_string(),
            group: "telegraf".to_string(),
            config_dir: "/etc/telegraf/telegraf.d".into(),
            keys_path: "/etc/metrics-bootstrap/telegraf-kapacitor.keys.toml"
                .into(),
            command_timeout_secs: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsulConfig {
    /// Directory holding the service-catalog registrations.
    pub config_dir: Utf8PathBuf,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self { config_dir: "/etc/consul/conf.d".into() }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsulTemplateConfig {
    /// Directory holding `template { ... }` stanzas.
    pub config_path: Utf8PathBuf,
    /// Directory holding template sources.
    pub template_path: Utf8PathBuf,
}

impl Default for ConsulTemplateConfig {
    fn default() -> Self {
        Self {
            config_path: "/etc/consul-template.d/conf".into(),
            template_path: "/etc/consul-template.d/templates".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("Path {path} is used by both {first} and {second}")]
    OverlappingPaths { path: Utf8PathBuf, first: String, second: String },
    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error(
        "{daemon}: waiting up to {converge_secs}s to enable and again to \
         start does not fit the {command_secs}s command timeout"
    )]
    ConvergeExceedsCommandTimeout {
        daemon: DaemonKind,
        converge_secs: u64,
        command_secs: u64,
    },
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    pub fn from_file<P: AsRef<Utf8Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        let config: Config = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given. Otherwise loads [DEFAULT_CONFIG_PATH] if it
    /// exists, falling back to built-in defaults.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Utf8Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Checks that no two controllers touch the same file, and that each
    /// daemon's two convergence waits end before the renderer kills it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        for (daemon, converge_secs, command_secs) in [
            (
                DaemonKind::Chronograf,
                self.chronograf.converge_timeout_secs,
                self.chronograf.command_timeout_secs,
            ),
            (
                DaemonKind::Kapacitor,
                self.kapacitor.converge_timeout_secs,
                self.kapacitor.command_timeout_secs,
            ),
        ] {
            if converge_secs > 0
                && converge_secs.saturating_mul(2) >= command_secs
            {
                return Err(ConfigError::ConvergeExceedsCommandTimeout {
                    daemon,
                    converge_secs,
                    command_secs,
                });
            }
        }

        let mut owners: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();
        let mut claim = |path: Utf8PathBuf, owner: String| {
            if let Some(first) = owners.get(&path) {
                return Err(ConfigError::OverlappingPaths {
                    path,
                    first: first.clone(),
                    second: owner,
                });
            }
            owners.insert(path, owner);
            Ok(())
        };

        for kind in DaemonKind::ALL {
            for path in self.daemon(kind).owned_paths() {
                claim(path, kind.to_string())?;
            }
        }
        for path in self.refresh_target().owned_paths() {
            claim(path, self.telegraf.service.clone())?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn daemon(&self, kind: DaemonKind) -> DaemonSpec {
        match kind {
            DaemonKind::Chronograf => {
                let c = &self.chronograf;
                DaemonSpec {
                    kind,
                    service: c.service.clone(),
                    account: ServiceAccount::new(&c.user, &c.group),
                    config_path: c.config_path.clone(),
                    sentinel_path: c.sentinel_path.clone(),
                    keys_path: c.keys_path.clone(),
                    converge_timeout: timeout_from_secs(
                        c.converge_timeout_secs,
                    ),
                    command_timeout: Duration::from_secs(
                        c.command_timeout_secs,
                    ),
                    settings: DaemonSettings::Chronograf(ChronografSettings {
                        bind_host: c.bind_host.clone(),
                        http_port: c.http_port,
                        base_path: c.base_path.clone(),
                        kapacitor_url: format!(
                            "http://127.0.0.1:{}",
                            self.kapacitor.http_port
                        ),
                    }),
                }
            }
            DaemonKind::Kapacitor => {
                let k = &self.kapacitor;
                DaemonSpec {
                    kind,
                    service: k.service.clone(),
                    account: ServiceAccount::new(&k.user, &k.group),
                    config_path: k.config_path.clone(),
                    sentinel_path: k.sentinel_path.clone(),
                    keys_path: k.keys_path.clone(),
                    converge_timeout: timeout_from_secs(
                        k.converge_timeout_secs,
                    ),
                    command_timeout: Duration::from_secs(
                        k.command_timeout_secs,
                    ),
                    settings: DaemonSettings::Kapacitor {
                        settings: KapacitorSettings {
                            http_port: k.http_port,
                            data_dir: k.data_dir.clone(),
                            load_dir: k.load_dir.clone(),
                            replay_dir: k.replay_dir.clone(),
                            stats_database: k.stats_database.clone(),
                        },
                        hostname_path: k.hostname_path.clone(),
                    },
                }
            }
        }
    }

    /// The Telegraf inputs for Kapacitor, refreshed on every change.
    pub fn refresh_target(&self) -> RefreshTarget {
        let t = &self.telegraf;
        RefreshTarget {
            consumer_service: t.service.clone(),
            account: ServiceAccount::new(&t.user, &t.group),
            output_path: t.config_dir.join("inputs_kapacitor.conf"),
            keys_path: t.keys_path.clone(),
            kapacitor_port: self.kapacitor.http_port,
            command_timeout: Duration::from_secs(t.command_timeout_secs),
        }
    }
}
