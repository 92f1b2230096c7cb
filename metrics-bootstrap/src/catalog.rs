// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consul service-catalog registrations for the daemons.

use crate::daemon::{DaemonKind, DaemonSettings, DaemonSpec};
use serde::Serialize;

/// Every daemon registers as an instance of this service.
pub const CATALOG_SERVICE_NAME: &str = "metrics";

const CHECK_INTERVAL: &str = "30s";
const CHECK_TIMEOUT: &str = "5s";

/// Top level of a Consul service definition file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceDefinitions {
    pub services: Vec<ServiceDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceDefinition {
    pub checks: Vec<HttpCheck>,
    pub enable_tag_override: bool,
    pub id: String,
    pub name: String,
    pub port: u16,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HttpCheck {
    pub http: String,
    pub id: String,
    pub interval: String,
    pub method: String,
    pub name: String,
    pub timeout: String,
}

impl ServiceDefinitions {
    pub fn for_daemon(spec: &DaemonSpec) -> Self {
        let port = spec.http_port();
        let (health_path, display, tags) = match &spec.settings {
            DaemonSettings::Chronograf(settings) => (
                "/api/health",
                "Chronograf",
                vec![
                    "admin".to_string(),
                    format!("edgeproxyprefix-/{}", settings.base_path),
                ],
            ),
            DaemonSettings::Kapacitor { .. } => (
                "/kapacitor/v1/ping",
                "Kapacitor",
                vec!["monitoring".to_string()],
            ),
        };

        let name = spec.kind.name();
        ServiceDefinitions {
            services: vec![ServiceDefinition {
                checks: vec![HttpCheck {
                    http: format!("http://localhost:{port}{health_path}"),
                    id: format!("{name}_http_health_check"),
                    interval: CHECK_INTERVAL.to_string(),
                    method: "GET".to_string(),
                    name: format!("{display} HTTP health check"),
                    timeout: CHECK_TIMEOUT.to_string(),
                }],
                enable_tag_override: false,
                id: format!("{name}_http"),
                name: CATALOG_SERVICE_NAME.to_string(),
                port,
                tags,
            }],
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// File name of a daemon's registration in Consul's config directory.
pub fn file_name(kind: DaemonKind) -> String {
    format!("{}-http.json", kind.name())
}
