// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Telegraf input plugin configuration for a local Kapacitor.

use super::toml_quote;

/// Telegraf `[[inputs.kapacitor]]` reading Kapacitor's debug variables and
/// tagging them with the InfluxDB `database` they should be written to.
pub fn render_kapacitor_inputs(kapacitor_port: u16, database: &str) -> String {
    format!(
        r#"# Telegraf Configuration

###############################################################################
#                            INPUT PLUGINS                                    #
###############################################################################

[[inputs.kapacitor]]
  ## Multiple URLs from which to read Kapacitor-formatted JSON
  urls = [
    "http://localhost:{kapacitor_port}/kapacitor/v1/debug/vars"
  ]

  ## Time limit for http requests
  timeout = "5s"

  [inputs.kapacitor.tags]
    influxdb_database = {database}
"#,
        database = toml_quote(database),
    )
}
