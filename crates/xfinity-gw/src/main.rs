mod cli;
mod error;
mod mqtt;

use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use xfinity_api::BoxConnection;
use xfinity_config::Config;
use xfinity_core::{Gateway, SessionToken};

use crate::cli::{Cli, LogFormat};
use crate::error::GwError;

/// How long shutdown waits for queued publishes to reach the broker.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), GwError> {
    let path = cli.config.unwrap_or_else(xfinity_config::config_path);
    let config = xfinity_config::load(&path).map_err(|source| GwError::Config {
        path: path.display().to_string(),
        source,
    })?;

    if cli.print_config {
        let rendered = config.to_redacted_toml().map_err(|source| GwError::Config {
            path: path.display().to_string(),
            source,
        })?;
        print!("{rendered}");
        return Ok(());
    }

    serve(&config).await;
    Ok(())
}

/// Run the gateway until Ctrl-C.
async fn serve(config: &Config) {
    let gateway_config = config.to_gateway_config();
    let topics = gateway_config.topics.clone();
    let token = SessionToken::generate();
    let cancel = CancellationToken::new();

    // ── Broker ───────────────────────────────────────────────────────
    let (client, eventloop) = mqtt::connect(mqtt::options(&config.mqtt, &topics.availability));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let mqtt_task = tokio::spawn(mqtt::drive(
        eventloop,
        client.clone(),
        vec![topics.control.clone(), topics.event.clone()],
        inbound_tx,
    ));
    let forward_task = tokio::spawn(mqtt::forward(client.clone(), outbound_rx));

    // ── Box ──────────────────────────────────────────────────────────
    let (conn, link_rx) = BoxConnection::new(config.to_connection_config());

    let receive_task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.receive_loop(cancel).await }
    });
    let keep_alive_task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.keep_alive(cancel).await }
    });

    // ── Gateway ──────────────────────────────────────────────────────
    let gateway = Gateway::new(gateway_config, token, conn, outbound_tx);
    let gateway_task = tokio::spawn(gateway.run(link_rx, inbound_rx, cancel.clone()));

    info!(
        box_host = %config.box_host,
        broker = %config.mqtt.host,
        control_topic = %topics.control,
        "xfinity-gw started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
    }
    info!("shutting down");

    // Gateway publishes `offline` on its way out, then drops its sender,
    // which ends the forwarder once the queue is drained.
    cancel.cancel();
    for (name, task) in [
        ("receive loop", receive_task),
        ("keep-alive", keep_alive_task),
        ("gateway", gateway_task),
    ] {
        join(name, task).await;
    }

    if tokio::time::timeout(DRAIN_TIMEOUT, join("publisher", forward_task))
        .await
        .is_err()
    {
        warn!("timed out publishing final state");
    }
    if let Err(e) = client.disconnect().await {
        debug!(error = %e, "broker disconnect request failed");
    }

    let abort = mqtt_task.abort_handle();
    if tokio::time::timeout(DRAIN_TIMEOUT, join("broker", mqtt_task))
        .await
        .is_err()
    {
        abort.abort();
    }
}

async fn join(name: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        warn!(task = name, error = %e, "task ended abnormally");
    }
}
