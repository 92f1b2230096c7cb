// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tests for one-shot host provisioning.

mod common;

use common::{mode_of, read, TestHost};
use metrics_bootstrap::catalog::{self, ServiceDefinitions};
use metrics_bootstrap::daemon::DaemonKind;
use metrics_bootstrap::provision::{Invocation, Provisioner};
use metrics_bootstrap::sentinel::SentinelState;
use metrics_bootstrap::watch::KEY_FILE_PERMS;
use pretty_assertions::assert_eq;

fn invocation() -> Invocation {
    Invocation {
        binary: "/opt/metrics/bin/metrics-bootstrap".into(),
        config_path: None,
    }
}

#[test]
fn test_provision_lays_down_artifacts() {
    let host = TestHost::new("test_provision_lays_down_artifacts");
    let report =
        Provisioner::new(&host.logctx.log, &host.config, invocation())
            .run()
            .unwrap();
    assert_eq!(report.sentinels_created, DaemonKind::ALL.to_vec());

    let ct = &host.config.consul_template;
    for kind in DaemonKind::ALL {
        let spec = host.spec(kind);
        assert_eq!(host.sentinel_state(kind), SentinelState::NotInitialized);

        let registration =
            read(host.config.consul.config_dir.join(catalog::file_name(kind)));
        assert_eq!(
            registration,
            ServiceDefinitions::for_daemon(&spec).to_json().unwrap()
        );

        let template = ct.template_path.join(format!("{kind}.keys.ctmpl"));
        assert!(read(&template).contains("{{ if keyExists"));
        assert_eq!(mode_of(&template), KEY_FILE_PERMS);

        let stanza = ct.config_path.join(format!("{kind}.keys.hcl"));
        let stanza_text = read(&stanza);
        assert!(stanza_text.contains(&format!(
            "command = \"/opt/metrics/bin/metrics-bootstrap bootstrap {kind}\""
        )));
        assert!(stanza_text
            .contains(&format!("destination = \"{}\"", spec.keys_path)));
        assert!(stanza_text.contains(&format!(
            "command_timeout = \"{}s\"",
            spec.command_timeout.as_secs()
        )));
        assert_eq!(mode_of(&stanza), KEY_FILE_PERMS);
    }

    let refresh_stanza =
        read(ct.config_path.join("telegraf-kapacitor.keys.hcl"));
    assert!(refresh_stanza.contains(
        "command = \"/opt/metrics/bin/metrics-bootstrap refresh-inputs\""
    ));
    assert!(refresh_stanza.contains("command_timeout = \"15s\""));
    let refresh_template =
        read(ct.template_path.join("telegraf-kapacitor.keys.ctmpl"));
    assert!(refresh_template.contains("keyOrDefault"));
    assert!(!refresh_template.contains("keyExists"));

    host.cleanup_successful();
}

#[test]
fn test_reprovision_keeps_sentinels() {
    let host = TestHost::new("test_reprovision_keeps_sentinels");
    Provisioner::new(&host.logctx.log, &host.config, invocation())
        .run()
        .unwrap();
    host.mark_initialized(DaemonKind::Chronograf);

    let report =
        Provisioner::new(&host.logctx.log, &host.config, invocation())
            .run()
            .unwrap();
    assert!(report.sentinels_created.is_empty());
    assert_eq!(
        host.sentinel_state(DaemonKind::Chronograf),
        SentinelState::Initialized
    );
    assert_eq!(
        host.sentinel_state(DaemonKind::Kapacitor),
        SentinelState::NotInitialized
    );

    host.cleanup_successful();
}

#[test]
fn test_explicit_config_is_passed_through() {
    let host = TestHost::new("test_explicit_config_is_passed_through");
    let config_path = host.root().join("config.toml");
    let invocation = Invocation {
        config_path: Some(config_path.clone()),
        ..invocation()
    };
    Provisioner::new(&host.logctx.log, &host.config, invocation)
        .run()
        .unwrap();

    let stanza = read(
        host.config.consul_template.config_path.join("kapacitor.keys.hcl"),
    );
    assert!(stanza.contains(&format!(
        "command = \"/opt/metrics/bin/metrics-bootstrap --config {config_path} \
         bootstrap kapacitor\""
    )));

    host.cleanup_successful();
}
