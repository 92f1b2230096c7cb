// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consul key/value entries consumed by the bootstrap controllers.
//!
//! The template renderer watches these keys and writes their values into a
//! small TOML "key file" (see [crate::watch]). The controllers never talk to
//! Consul themselves: they only ever see what the renderer last wrote.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;

pub const CONSUL_DOMAIN: &str = "config/services/consul/domain";
pub const METRICS_HTTP_HOST: &str =
    "config/services/metrics/protocols/http/host";
pub const METRICS_HTTP_PORT: &str =
    "config/services/metrics/protocols/http/port";
pub const METRICS_SERVICES_DATABASE: &str =
    "config/services/metrics/databases/services";
pub const MAIL_SMTP_HOST: &str = "config/environment/mail/smtp/host";
pub const MAIL_SUFFIX: &str = "config/environment/mail/suffix";

pub const DEFAULT_SMTP_HOST: &str = "smtp.example.com";
pub const DEFAULT_SERVICES_DATABASE: &str = "services";

#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("failed to read key file {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("failed to parse key file {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error("value {value:?} of key {key} is not a valid port")]
    InvalidPort {
        key: &'static str,
        value: String,
        #[source]
        err: std::num::ParseIntError,
    },

    #[error("value {value:?} of key {key} is not usable in a host name")]
    InvalidHostComponent { key: &'static str, value: String },
}

/// The ordered set of keys which must all exist before a daemon may be
/// configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedKeySet {
    keys: Vec<&'static str>,
}

impl WatchedKeySet {
    /// Keys needed to locate the metrics database through Consul DNS.
    pub fn metrics() -> Self {
        Self { keys: vec![CONSUL_DOMAIN, METRICS_HTTP_HOST, METRICS_HTTP_PORT] }
    }

    /// The metrics keys plus the domain alert mail is sent from.
    pub fn kapacitor() -> Self {
        let mut set = Self::metrics();
        set.keys.push(MAIL_SUFFIX);
        set
    }

    /// No gate at all.
    pub fn empty() -> Self {
        Self { keys: vec![] }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keys.iter().copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| *k == key)
    }
}

/// Returned when some watched keys have not been written yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gated {
    pub missing: Vec<&'static str>,
}

impl fmt::Display for Gated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing key/value entries: {}", self.missing.join(", "))
    }
}

/// Key/value entries as last written by the template renderer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyValues {
    values: BTreeMap<String, String>,
}

impl KeyValues {
    /// Loads the key file at `path`.
    ///
    /// A missing or empty file means the renderer's guarded template has not
    /// produced anything yet; that is an empty set, not an error.
    pub fn load(path: &Utf8Path) -> Result<Self, KeysError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(KeysError::Io { path: path.to_owned(), err })
            }
        };
        Self::parse(&contents)
            .map_err(|err| KeysError::Parse { path: path.to_owned(), err })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let values: BTreeMap<String, String> = toml::from_str(contents)?;
        // The renderer writes an empty string for a key it could not
        // resolve; treat those as absent.
        let values = values
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.trim())
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Checks that every key in `watched` is present.
    pub fn resolve(
        &self,
        watched: &WatchedKeySet,
    ) -> Result<ResolvedKeys, Gated> {
        let missing: Vec<_> =
            watched.iter().filter(|key| self.get(key).is_none()).collect();
        if missing.is_empty() {
            Ok(ResolvedKeys { values: self.clone() })
        } else {
            Err(Gated { missing })
        }
    }

    /// The InfluxDB database tagged onto Telegraf's Kapacitor metrics.
    pub fn services_database(&self) -> &str {
        self.get(METRICS_SERVICES_DATABASE).unwrap_or(DEFAULT_SERVICES_DATABASE)
    }
}

/// Key/values which passed the gate of a [WatchedKeySet].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKeys {
    values: KeyValues,
}

impl ResolvedKeys {
    fn required(&self, key: &'static str) -> &str {
        // Only reachable for gate keys, which `resolve` checked.
        self.values.get(key).unwrap_or_default()
    }

    /// A gate key whose value becomes part of a DNS name. Such values are
    /// interpolated into unquoted config lines, so they must be one word.
    fn host_component(&self, key: &'static str) -> Result<String, KeysError> {
        let value = self.required(key);
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(KeysError::InvalidHostComponent {
                key,
                value: value.to_string(),
            });
        }
        Ok(value.to_string())
    }

    /// Where the metrics database (InfluxDB) can be reached.
    pub fn endpoint(&self) -> Result<MetricsEndpoint, KeysError> {
        let port = self.required(METRICS_HTTP_PORT);
        let port = port.parse::<u16>().map_err(|err| KeysError::InvalidPort {
            key: METRICS_HTTP_PORT,
            value: port.to_string(),
            err,
        })?;
        Ok(MetricsEndpoint {
            consul_domain: self.host_component(CONSUL_DOMAIN)?,
            host: self.host_component(METRICS_HTTP_HOST)?,
            port,
        })
    }

    /// Only meaningful for keys resolved against [WatchedKeySet::kapacitor].
    pub fn mail(&self) -> MailSettings {
        MailSettings {
            smtp_host: self
                .values
                .get(MAIL_SMTP_HOST)
                .unwrap_or(DEFAULT_SMTP_HOST)
                .to_string(),
            suffix: self.required(MAIL_SUFFIX).to_string(),
        }
    }
}

/// The metrics database, addressed through Consul's service DNS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsEndpoint {
    pub consul_domain: String,
    pub host: String,
    pub port: u16,
}

impl MetricsEndpoint {
    pub fn url(&self) -> String {
        format!(
            "http://{}.service.{}:{}",
            self.host, self.consul_domain, self.port
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailSettings {
    pub smtp_host: String,
    pub suffix: String,
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;

    pub fn complete_keys() -> KeyValues {
        let mut keys = KeyValues::default();
        keys.insert(CONSUL_DOMAIN, "consul");
        keys.insert(METRICS_HTTP_HOST, "influxdb");
        keys.insert(METRICS_HTTP_PORT, "8086");
        keys
    }
}

#[cfg(test)]
mod test {
    use super::test_helpers::complete_keys;
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_resolve_reports_missing_keys_in_watch_order() {
        let mut keys = KeyValues::default();
        keys.insert(METRICS_HTTP_HOST, "influxdb");

        let gated = keys.resolve(&WatchedKeySet::metrics()).unwrap_err();
        assert_eq!(gated.missing, vec![CONSUL_DOMAIN, METRICS_HTTP_PORT]);
    }

    #[test]
    fn test_resolve_complete() {
        let resolved =
            complete_keys().resolve(&WatchedKeySet::metrics()).unwrap();
        let endpoint = resolved.endpoint().unwrap();
        assert_eq!(endpoint.url(), "http://influxdb.service.consul:8086");
    }

    #[test]
    fn test_invalid_port() {
        let mut keys = complete_keys();
        keys.insert(METRICS_HTTP_PORT, "eighty");
        let resolved = keys.resolve(&WatchedKeySet::metrics()).unwrap();
        let err = resolved.endpoint().unwrap_err();
        assert!(matches!(err, KeysError::InvalidPort { .. }), "{err}");
    }

    #[test]
    fn test_host_components_must_be_one_word() {
        let mut keys = complete_keys();
        keys.insert(CONSUL_DOMAIN, "consul\nINFLUXDB_URL=http://elsewhere");
        let resolved = keys.resolve(&WatchedKeySet::metrics()).unwrap();
        let err = resolved.endpoint().unwrap_err();
        match err {
            KeysError::InvalidHostComponent { key, .. } => {
                assert_eq!(key, CONSUL_DOMAIN)
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut keys = complete_keys();
        keys.insert(METRICS_HTTP_HOST, "influx db");
        let resolved = keys.resolve(&WatchedKeySet::metrics()).unwrap();
        assert!(matches!(
            resolved.endpoint(),
            Err(KeysError::InvalidHostComponent { key: METRICS_HTTP_HOST, .. })
        ));

        // Surrounding whitespace is trimmed, not rejected.
        let mut keys = complete_keys();
        keys.insert(METRICS_HTTP_HOST, " influxdb\n");
        let resolved = keys.resolve(&WatchedKeySet::metrics()).unwrap();
        assert_eq!(resolved.endpoint().unwrap().host, "influxdb");
    }

    #[test]
    fn test_optional_keys_fall_back_to_defaults() {
        let mut keys = complete_keys();
        keys.insert(MAIL_SUFFIX, "example.org");
        let resolved = keys.resolve(&WatchedKeySet::kapacitor()).unwrap();
        let mail = resolved.mail();
        assert_eq!(mail.smtp_host, DEFAULT_SMTP_HOST);
        assert_eq!(mail.suffix, "example.org");
        assert_eq!(complete_keys().services_database(), "services");
    }

    #[test]
    fn test_kapacitor_waits_for_mail_suffix() {
        let gated =
            complete_keys().resolve(&WatchedKeySet::kapacitor()).unwrap_err();
        assert_eq!(gated.missing, vec![MAIL_SUFFIX]);
        assert!(WatchedKeySet::kapacitor().contains(MAIL_SUFFIX));
        assert!(!WatchedKeySet::metrics().contains(MAIL_SUFFIX));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = Utf8TempDir::new().unwrap();
        let keys = KeyValues::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(keys, KeyValues::default());
    }

    #[test]
    fn test_load_treats_blank_values_as_absent() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("keys.toml");
        std::fs::write(
            &path,
            r#"
"config/services/consul/domain" = "consul"
"config/services/metrics/protocols/http/host" = "  "
"config/services/metrics/protocols/http/port" = "8086"
"#,
        )
        .unwrap();

        let keys = KeyValues::load(&path).unwrap();
        assert_eq!(keys.get(CONSUL_DOMAIN), Some("consul"));
        assert_eq!(keys.get(METRICS_HTTP_HOST), None);
        let gated = keys.resolve(&WatchedKeySet::metrics()).unwrap_err();
        assert_eq!(gated.missing, vec![METRICS_HTTP_HOST]);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("keys.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = KeyValues::load(&path).unwrap_err();
        assert!(matches!(err, KeysError::Parse { .. }));
    }
}
