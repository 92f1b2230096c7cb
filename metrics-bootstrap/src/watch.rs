// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Artifacts consumed by consul-template, the renderer that watches Consul
//! and invokes this binary.
//!
//! For every controller the renderer gets a template which writes the
//! watched key/value entries to a TOML key file, and a `template { ... }`
//! stanza which runs our command whenever that key file changes.

use crate::daemon::DaemonKind;
use crate::keys::{
    WatchedKeySet, DEFAULT_SERVICES_DATABASE, DEFAULT_SMTP_HOST,
    MAIL_SMTP_HOST, METRICS_SERVICES_DATABASE,
};
use camino::Utf8PathBuf;
use std::fmt::Write;
use std::time::Duration;

/// Mode of the rendered key file.
pub const KEY_FILE_PERMS: u32 = 0o550;

const WAIT_MIN: &str = "2s";
const WAIT_MAX: &str = "10s";

/// A key which is rendered with a fallback rather than gating the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionalKey {
    pub key: &'static str,
    pub default: &'static str,
}

/// Keys a daemon reads but does not wait for.
pub fn optional_keys(kind: DaemonKind) -> Vec<OptionalKey> {
    match kind {
        DaemonKind::Chronograf => vec![],
        DaemonKind::Kapacitor => vec![OptionalKey {
            key: MAIL_SMTP_HOST,
            default: DEFAULT_SMTP_HOST,
        }],
    }
}

/// Keys read by the Telegraf refresh, none of which gate it.
pub fn refresh_optional_keys() -> Vec<OptionalKey> {
    vec![OptionalKey {
        key: METRICS_SERVICES_DATABASE,
        default: DEFAULT_SERVICES_DATABASE,
    }]
}

/// Builds the consul-template source for a key file.
///
/// Every gate key gets a nested `keyExists` guard, so the rendered file is
/// empty until all of them exist. Values are emitted through `toJSON`,
/// which yields valid TOML basic strings.
pub fn key_file_template(
    gate: &WatchedKeySet,
    optional: &[OptionalKey],
) -> String {
    let mut out = String::new();
    for key in gate.iter() {
        let _ = writeln!(out, "{{{{ if keyExists \"{key}\" }}}}");
    }
    for key in gate.iter() {
        let _ = writeln!(out, "\"{key}\" = {{{{ key \"{key}\" | toJSON }}}}");
    }
    for OptionalKey { key, default } in optional {
        let _ = writeln!(
            out,
            "\"{key}\" = {{{{ keyOrDefault \"{key}\" \"{default}\" | toJSON }}}}"
        );
    }
    for _ in gate.iter() {
        out.push_str("{{ end }}\n");
    }
    out
}

/// A consul-template `template { ... }` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateStanza {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    /// Run each time the destination changes.
    pub command: String,
    pub command_timeout: Duration,
}

impl TemplateStanza {
    pub fn render(&self) -> String {
        format!(
            r#"template {{
  source = {source}
  destination = {destination}
  create_dest_dirs = false
  command = {command}
  command_timeout = "{timeout}s"
  error_on_missing_key = false
  perms = 0{perms:o}
  backup = true

  wait {{
    min = "{WAIT_MIN}"
    max = "{WAIT_MAX}"
  }}
}}
"#,
            source = hcl_quote(self.source.as_str()),
            destination = hcl_quote(self.destination.as_str()),
            command = hcl_quote(&self.command),
            timeout = self.command_timeout.as_secs(),
            perms = KEY_FILE_PERMS,
        )
    }
}

/// JSON string literals are valid HCL strings.
fn hcl_quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
