// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rendering of daemon configuration files.
//!
//! Every renderer is a pure function of its inputs: the same settings and
//! key values always produce byte-identical output, which the template
//! renderer relies on to decide whether anything changed.

pub mod chronograf;
pub mod kapacitor;
pub mod telegraf;

/// Quotes `value` as a TOML basic string, escaping as needed.
pub(crate) fn toml_quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_toml_quote_round_trips() {
        for value in ["plain", r#"a"b"#, "back\\slash", "it's"] {
            let doc = format!("v = {}", toml_quote(value));
            let parsed: toml::Table = toml::from_str(&doc).unwrap();
            assert_eq!(parsed["v"].as_str(), Some(value), "{doc}");
        }
    }
}
