// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Chronograf environment file (`/etc/default/chronograf`).

use crate::keys::MetricsEndpoint;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ChronografSettings {
    /// Address Chronograf binds its HTTP server to.
    pub bind_host: String,
    pub http_port: u16,
    /// Path prefix under which the edge proxy exposes the dashboards.
    pub base_path: String,
    /// Where Chronograf finds the local Kapacitor.
    pub kapacitor_url: String,
}

pub fn render(
    settings: &ChronografSettings,
    endpoint: &MetricsEndpoint,
) -> String {
    format!(
        "HOST={host}
PORT={port}
BASE_PATH={base_path}

INFLUXDB_URL={influxdb_url}

KAPACITOR_URL={kapacitor_url}
",
        host = settings.bind_host,
        port = settings.http_port,
        base_path = settings.base_path,
        influxdb_url = endpoint.url(),
        kapacitor_url = settings.kapacitor_url,
    )
}
