// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bootstrap of the metrics alerting daemons (Chronograf and Kapacitor).
//!
//! consul-template watches a handful of Consul key/value entries and writes
//! them into per-daemon key files. Whenever a key file changes it invokes
//! this crate's binary, which renders the daemon's configuration and brings
//! the daemon up exactly once, recording that in a sentinel file.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod files;
pub mod keys;
pub mod provision;
pub mod refresh;
pub mod render;
pub mod sentinel;
pub mod watch;
