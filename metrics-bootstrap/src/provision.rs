// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot provisioning of a metrics host.
//!
//! Lays down everything the controllers expect to find when the renderer
//! first invokes them: sentinels, service-catalog registrations, and the
//! renderer's templates and stanzas. Safe to re-run; an existing sentinel is
//! never reset.

use crate::catalog::{self, ServiceDefinitions};
use crate::config::Config;
use crate::daemon::DaemonKind;
use crate::files::{write_atomic, WriteError};
use crate::keys::WatchedKeySet;
use crate::sentinel::SentinelError;
use crate::watch::{
    key_file_template, optional_keys, refresh_optional_keys, TemplateStanza,
    KEY_FILE_PERMS,
};
use camino::{Utf8Path, Utf8PathBuf};
use service_utils::ownership::{set_mode, OwnershipError};
use slog::{info, o, Logger};
use std::time::Duration;

pub const DEFAULT_BINARY_PATH: &str = "/usr/local/bin/metrics-bootstrap";

const REFRESH_ARTIFACT_NAME: &str = "telegraf-kapacitor";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Sentinel(#[from] SentinelError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),

    #[error("failed to serialize service definition for {0}")]
    Catalog(DaemonKind, #[source] serde_json::Error),
}

/// How the renderer should invoke this binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub binary: Utf8PathBuf,
    /// Passed through as `--config` when set; otherwise the binary falls back
    /// to its default config path.
    pub config_path: Option<Utf8PathBuf>,
}

impl Invocation {
    /// The command line for `args`, quoted for the renderer's shell.
    pub fn command(&self, args: &[&str]) -> String {
        let mut words = vec![self.binary.as_str()];
        if let Some(path) = &self.config_path {
            words.push("--config");
            words.push(path.as_str());
        }
        words.extend_from_slice(args);
        shell_words::join(words)
    }
}

/// What a provisioning run changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Daemons whose sentinel was created by this run.
    pub sentinels_created: Vec<DaemonKind>,
    /// Files (re)written by this run.
    pub written: Vec<Utf8PathBuf>,
}

pub struct Provisioner<'a> {
    log: Logger,
    config: &'a Config,
    invocation: Invocation,
    report: ProvisionReport,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        log: &Logger,
        config: &'a Config,
        invocation: Invocation,
    ) -> Self {
        let log = log.new(o!("component" => "Provisioner"));
        Self { log, config, invocation, report: ProvisionReport::default() }
    }

    pub fn run(mut self) -> Result<ProvisionReport, ProvisionError> {
        for kind in DaemonKind::ALL {
            self.provision_daemon(kind)?;
        }
        self.provision_refresh()?;
        Ok(self.report)
    }

    fn provision_daemon(
        &mut self,
        kind: DaemonKind,
    ) -> Result<(), ProvisionError> {
        let spec = self.config.daemon(kind);

        if spec.sentinel().provision()? {
            info!(
                self.log, "Created sentinel";
                "daemon" => kind.name(),
                "path" => %spec.sentinel_path,
            );
            self.report.sentinels_created.push(kind);
        }

        let registration = ServiceDefinitions::for_daemon(&spec)
            .to_json()
            .map_err(|err| ProvisionError::Catalog(kind, err))?;
        let path = self.config.consul.config_dir.join(catalog::file_name(kind));
        self.write(&path, &registration, None)?;

        let template =
            key_file_template(&spec.watched_keys(), &optional_keys(kind));
        self.write_watch(
            kind.name(),
            &template,
            &spec.keys_path,
            &["bootstrap", kind.name()],
            spec.command_timeout,
        )
    }

    fn provision_refresh(&mut self) -> Result<(), ProvisionError> {
        let target = self.config.refresh_target();
        let template = key_file_template(
            &WatchedKeySet::empty(),
            &refresh_optional_keys(),
        );
        self.write_watch(
            REFRESH_ARTIFACT_NAME,
            &template,
            &target.keys_path,
            &["refresh-inputs"],
            target.command_timeout,
        )
    }

    fn write_watch(
        &mut self,
        name: &str,
        template: &str,
        keys_path: &Utf8Path,
        args: &[&str],
        command_timeout: Duration,
    ) -> Result<(), ProvisionError> {
        let ct = &self.config.consul_template;
        let source = ct.template_path.join(format!("{name}.keys.ctmpl"));
        self.write(&source, template, Some(KEY_FILE_PERMS))?;

        let stanza = TemplateStanza {
            source: source.clone(),
            destination: keys_path.to_owned(),
            command: self.invocation.command(args),
            command_timeout,
        };
        let path = ct.config_path.join(format!("{name}.keys.hcl"));
        self.write(&path, &stanza.render(), Some(KEY_FILE_PERMS))
    }

    fn write(
        &mut self,
        path: &Utf8Path,
        contents: &str,
        mode: Option<u32>,
    ) -> Result<(), ProvisionError> {
        info!(self.log, "Writing"; "path" => %path);
        write_atomic(path, contents)?;
        if let Some(mode) = mode {
            set_mode(path, mode)?;
        }
        self.report.written.push(path.to_owned());
        Ok(())
    }
}
