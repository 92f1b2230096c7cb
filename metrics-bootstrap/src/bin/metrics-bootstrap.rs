// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI invoked by consul-template to bootstrap the metrics daemons

use anyhow::{anyhow, Context};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use metrics_bootstrap::config::Config;
use metrics_bootstrap::controller::{BootstrapController, Outcome};
use metrics_bootstrap::daemon::DaemonKind;
use metrics_bootstrap::keys::KeyValues;
use metrics_bootstrap::provision::{
    Invocation, Provisioner, DEFAULT_BINARY_PATH,
};
use metrics_bootstrap::refresh::refresh;
use service_utils::ownership::HostOwnership;
use service_utils::systemctl::Systemctl;
use slog::{info, Logger};

#[derive(Debug, Parser)]
#[command(version)]
struct MetricsBootstrap {
    /// Configuration file; built-in defaults apply when omitted and the
    /// default path does not exist
    #[arg(long, global = true, env = "METRICS_BOOTSTRAP_CONFIG")]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: MetricsBootstrapCommand,
}

#[derive(Debug, Subcommand)]
enum MetricsBootstrapCommand {
    /// Configures and starts a daemon once its key/value entries exist
    Bootstrap(BootstrapArgs),
    /// Rewrites Telegraf's Kapacitor inputs and restarts Telegraf
    RefreshInputs,
    /// Prints the configuration rendered from the current key file
    Render(RenderArgs),
    /// Writes sentinels, service registrations and renderer templates
    Provision(ProvisionArgs),
}

#[derive(Debug, Args)]
struct BootstrapArgs {
    #[arg(value_enum)]
    daemon: DaemonKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RenderTarget {
    Chronograf,
    Kapacitor,
    Telegraf,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(value_enum)]
    target: RenderTarget,
}

#[derive(Debug, Args)]
struct ProvisionArgs {
    /// Path of this binary as the renderer should invoke it
    #[arg(long, default_value = DEFAULT_BINARY_PATH)]
    binary: Utf8PathBuf,
}

/// Prints the error chain and exits non-zero.
fn fatal(err: anyhow::Error) -> ! {
    let arg0 = std::env::args()
        .next()
        .unwrap_or_else(|| "metrics-bootstrap".to_string());
    eprintln!("{arg0}: {err:#}");
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = do_run().await {
        fatal(err);
    }
}

async fn do_run() -> anyhow::Result<()> {
    let args = MetricsBootstrap::parse();

    let config = Config::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let log = config
        .log
        .to_logger("metrics-bootstrap")
        .context("failed to construct logger")?;

    match args.command {
        MetricsBootstrapCommand::Bootstrap(BootstrapArgs { daemon }) => {
            bootstrap(&log, &config, daemon).await
        }
        MetricsBootstrapCommand::RefreshInputs => {
            refresh_inputs(&log, &config).await
        }
        MetricsBootstrapCommand::Render(RenderArgs { target }) => {
            render(&config, target)
        }
        MetricsBootstrapCommand::Provision(ProvisionArgs { binary }) => {
            provision(&log, &config, binary, args.config)
        }
    }
}

async fn bootstrap(
    log: &Logger,
    config: &Config,
    daemon: DaemonKind,
) -> anyhow::Result<()> {
    let spec = config.daemon(daemon);
    let manager = Systemctl::new(log);
    let ownership = HostOwnership::default();
    let controller = BootstrapController::new(
        log,
        &spec,
        &manager,
        &ownership,
        config.poll_interval(),
    );

    let outcome = controller
        .run()
        .await
        .with_context(|| format!("failed to bootstrap {daemon}"))?;
    match outcome {
        Outcome::AlreadyInitialized => {}
        Outcome::Gated { missing } => {
            println!(
                "Not all Consul K-V values are available. Will not start {}.",
                spec.service,
            );
            info!(log, "Gated"; "missing" => missing.join(", "));
        }
        Outcome::Initialized { start } => {
            info!(log, "Bootstrap complete"; "start" => ?start);
        }
    }
    Ok(())
}

async fn refresh_inputs(log: &Logger, config: &Config) -> anyhow::Result<()> {
    let target = config.refresh_target();
    let manager = Systemctl::new(log);
    let ownership = HostOwnership::default();
    refresh(log, &target, &manager, &ownership)
        .await
        .context("failed to refresh Telegraf inputs")
}

fn render(config: &Config, target: RenderTarget) -> anyhow::Result<()> {
    let contents = match target {
        RenderTarget::Chronograf => {
            render_daemon(config, DaemonKind::Chronograf)?
        }
        RenderTarget::Kapacitor => {
            render_daemon(config, DaemonKind::Kapacitor)?
        }
        RenderTarget::Telegraf => {
            let target = config.refresh_target();
            let keys = KeyValues::load(&target.keys_path)?;
            target.render(&keys)
        }
    };
    print!("{contents}");
    Ok(())
}

fn render_daemon(
    config: &Config,
    kind: DaemonKind,
) -> anyhow::Result<String> {
    let spec = config.daemon(kind);
    let keys = KeyValues::load(&spec.keys_path)?;
    let resolved = keys
        .resolve(&spec.watched_keys())
        .map_err(|gated| anyhow!("cannot render {kind}: {gated}"))?;
    spec.render(&resolved)
        .with_context(|| format!("failed to render configuration for {kind}"))
}

fn provision(
    log: &Logger,
    config: &Config,
    binary: Utf8PathBuf,
    config_path: Option<Utf8PathBuf>,
) -> anyhow::Result<()> {
    let invocation = Invocation { binary, config_path };
    let report = Provisioner::new(log, config, invocation)
        .run()
        .context("failed to provision")?;
    info!(
        log, "Provisioning complete";
        "sentinels_created" => report.sentinels_created.len(),
        "files_written" => report.written.len(),
    );
    Ok(())
}
