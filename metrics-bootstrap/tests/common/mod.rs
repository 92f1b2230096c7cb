// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A throwaway host layout for integration tests.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use dropshot::test_util::LogContext;
use dropshot::{ConfigLogging, ConfigLoggingIfExists, ConfigLoggingLevel};
use metrics_bootstrap::config::Config;
use metrics_bootstrap::controller::{
    BootstrapController, BootstrapError, Outcome,
};
use metrics_bootstrap::daemon::{DaemonKind, DaemonSpec};
use metrics_bootstrap::keys::{
    CONSUL_DOMAIN, MAIL_SUFFIX, METRICS_HTTP_HOST, METRICS_HTTP_PORT,
};
use metrics_bootstrap::sentinel::SentinelState;
use service_utils::ownership::Ownership;
use service_utils::systemctl::ServiceManager;
use std::os::unix::fs::PermissionsExt;

pub const HOSTNAME: &str = "metrics-01";

pub fn test_setup_log(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Trace,
        path: "UNUSED".into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };
    LogContext::new(test_name, &log_config)
}

/// A configuration with every path under a temporary directory.
pub struct TestHost {
    pub logctx: LogContext,
    pub config: Config,
    dir: Utf8TempDir,
}

impl TestHost {
    pub fn new(test_name: &str) -> Self {
        let logctx = test_setup_log(test_name);
        let dir = Utf8TempDir::new().unwrap();
        let root = dir.path();

        let mut config = Config::default();
        config.poll.interval_ms = 10;

        let chronograf = &mut config.chronograf;
        chronograf.config_path = root.join("chronograf");
        chronograf.sentinel_path = root.join("chronograf_default.log");
        chronograf.keys_path = root.join("chronograf.keys.toml");
        chronograf.converge_timeout_secs = 1;

        let kapacitor = &mut config.kapacitor;
        kapacitor.config_path = root.join("kapacitor.conf");
        kapacitor.sentinel_path = root.join("kapacitor_default.log");
        kapacitor.keys_path = root.join("kapacitor.keys.toml");
        kapacitor.hostname_path = root.join("hostname");
        kapacitor.converge_timeout_secs = 1;

        let telegraf = &mut config.telegraf;
        telegraf.config_dir = root.join("telegraf.d");
        telegraf.keys_path = root.join("telegraf-kapacitor.keys.toml");

        config.consul.config_dir = root.join("consul.d");
        config.consul_template.config_path = root.join("consul-template.d");
        config.consul_template.template_path = root.join("templates");

        config.validate().unwrap();

        for path in [
            &config.telegraf.config_dir,
            &config.consul.config_dir,
            &config.consul_template.config_path,
            &config.consul_template.template_path,
        ] {
            std::fs::create_dir_all(path).unwrap();
        }
        std::fs::write(
            &config.kapacitor.hostname_path,
            format!("{HOSTNAME}\n"),
        )
        .unwrap();

        Self { logctx, config, dir }
    }

    pub fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub fn spec(&self, kind: DaemonKind) -> DaemonSpec {
        self.config.daemon(kind)
    }

    pub fn provision_sentinel(&self, kind: DaemonKind) {
        assert!(self.spec(kind).sentinel().provision().unwrap());
    }

    pub fn mark_initialized(&self, kind: DaemonKind) {
        let sentinel = self.spec(kind).sentinel();
        sentinel.lock().unwrap().mark_initialized().unwrap();
    }

    pub fn sentinel_state(&self, kind: DaemonKind) -> SentinelState {
        self.spec(kind).sentinel().read().unwrap()
    }

    pub fn write_keys(&self, kind: DaemonKind, entries: &[(&str, &str)]) {
        write_key_file(&self.spec(kind).keys_path, entries);
    }

    /// Writes every gate key for `kind`.
    pub fn write_complete_keys(&self, kind: DaemonKind) {
        let mut entries = vec![
            (CONSUL_DOMAIN, "consul"),
            (METRICS_HTTP_HOST, "influxdb"),
            (METRICS_HTTP_PORT, "8086"),
        ];
        if kind == DaemonKind::Kapacitor {
            entries.push((MAIL_SUFFIX, "example.net"));
        }
        self.write_keys(kind, &entries);
    }

    pub async fn bootstrap(
        &self,
        kind: DaemonKind,
        manager: &dyn ServiceManager,
        ownership: &dyn Ownership,
    ) -> Result<Outcome, BootstrapError> {
        let spec = self.spec(kind);
        BootstrapController::new(
            &self.logctx.log,
            &spec,
            manager,
            ownership,
            self.config.poll_interval(),
        )
        .run()
        .await
    }

    pub fn cleanup_successful(self) {
        self.logctx.cleanup_successful();
    }
}

/// Writes a key file the way consul-template renders it.
pub fn write_key_file(path: &Utf8Path, entries: &[(&str, &str)]) {
    let mut contents = String::new();
    for (key, value) in entries {
        contents.push_str(&format!("{key:?} = {value:?}\n"));
    }
    std::fs::write(path, contents).unwrap();
}

pub fn mode_of(path: &Utf8Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

pub fn read(path: impl AsRef<Utf8Path>) -> String {
    std::fs::read_to_string(path.as_ref()).unwrap()
}

pub fn exists(path: impl AsRef<Utf8Path>) -> bool {
    path.as_ref().exists()
}
