// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Kapacitor daemon configuration (`kapacitor.conf`).

use super::toml_quote;
use crate::keys::{MailSettings, MetricsEndpoint};
use camino::Utf8PathBuf;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct KapacitorSettings {
    pub http_port: u16,
    /// Directory for Kapacitor's metadata and BoltDB store.
    pub data_dir: Utf8PathBuf,
    /// Directory tasks, templates and handlers are loaded from.
    pub load_dir: Utf8PathBuf,
    /// Directory holding replay recordings.
    pub replay_dir: Utf8PathBuf,
    /// InfluxDB database Kapacitor writes its own statistics to.
    pub stats_database: String,
}

pub fn render(
    settings: &KapacitorSettings,
    hostname: &str,
    endpoint: &MetricsEndpoint,
    mail: &MailSettings,
) -> String {
    format!(
        r#"# The hostname of this node.
# Must be resolvable by any configured InfluxDB hosts.
hostname = {hostname}
# Directory for storing a small amount of metadata about the server.
data_dir = {data_dir}

# Retention policy assigned to writes which do not name one.
default-retention-policy = ""

[http]
  # HTTP API server, serving both writes and all other API calls.
  bind-address = ":{http_port}"
  log-enabled = true
  write-tracing = false
  pprof-enabled = false
  https-enabled = false

[config-override]
  # Allow overriding configuration through the HTTP API.
  enabled = true

[logging]
  file = "STDOUT"
  level = "INFO"

[load]
  # Load tasks, templates and handlers from a directory.
  enabled = true
  dir = {load_dir}

[replay]
  # Where to store replay files, aka recordings.
  dir = {replay_dir}

[storage]
  # Where to store the Kapacitor boltdb database.
  boltdb = {boltdb}

[[influxdb]]
  # Exactly one InfluxDB cluster must be marked as the default.
  enabled = true
  default = true
  name = "InfluxDB"
  urls = [{influxdb_url}]
  username = ""
  password = ""
  timeout = 0

  # Do not verify the TLS/SSL certificate.
  insecure-skip-verify = true

  # Maximum time to try and connect to InfluxDB during startup.
  startup-timeout = "5m"

  disable-subscriptions = false
  subscription-mode = "cluster"
  subscription-protocol = "http"
  subscriptions-sync-interval = "1m0s"

  # Empty values fall back to the global hostname and the [http] port.
  kapacitor-hostname = ""
  http-port = 0

  udp-bind = ""
  udp-buffer = 1000
  udp-read-buffer = 0

  [influxdb.subscriptions]
  [influxdb.excluded-subscriptions]

[smtp]
  # Only needed for sending alert emails.
  enabled = false
  host = {smtp_host}
  port = 25
  username = ""
  password = ""
  from = {mail_from}
  no-verify = false
  idle-timeout = "30s"
  global = false
  state-changes-only = false

[reporting]
  # Do not send usage statistics.
  enabled = false

[stats]
  # Emit internal statistics about Kapacitor.
  enabled = true
  stats-interval = "10s"
  database = {stats_database}
  retention-policy = "autogen"

[udf]
[udf.functions]

[[mqtt]]
  enabled = false
  name = "localhost"
  default = true
  url = "tcp://localhost:1883"
  client-id = ""
  username = ""
  password = ""

[collectd]
  enabled = false
  bind-address = ":25826"
  database = "collectd"
  retention-policy = ""
  batch-size = 1000
  batch-pending = 5
  batch-timeout = "10s"
  typesdb = "/usr/share/collectd/types.db"

[opentsdb]
  enabled = false
  bind-address = ":4242"
  database = "opentsdb"
  retention-policy = ""
  consistency-level = "one"
  tls-enabled = false
  certificate = "/etc/ssl/influxdb.pem"
  batch-size = 1000
  batch-pending = 5
  batch-timeout = "1s"
"#,
        hostname = toml_quote(hostname.trim()),
        data_dir = toml_quote(settings.data_dir.as_str()),
        http_port = settings.http_port,
        load_dir = toml_quote(settings.load_dir.as_str()),
        replay_dir = toml_quote(settings.replay_dir.as_str()),
        boltdb = toml_quote(settings.data_dir.join("kapacitor.db").as_str()),
        influxdb_url = toml_quote(&endpoint.url()),
        smtp_host = toml_quote(&mail.smtp_host),
        mail_from = toml_quote(&format!("monitoring.metrics@{}", mail.suffix)),
        stats_database = toml_quote(&settings.stats_database),
    )
}
