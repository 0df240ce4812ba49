//! eventwire CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: merge `eventwire.toml`, `EVENTWIRE_*`
//!    environment variables and flags into [`config::Settings`].
//! 2. **Wire observability**: install `tracing-subscriber` (pretty or JSON on
//!    stderr) and, when an endpoint is given, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure**: build a [`connector::Client`] with a
//!    [`sink::JsonLinesSink`] on stdout and run it to completion.
//! 4. **Apply retry policy**: a retryable `Failed` outcome starts a fresh
//!    client, up to `--retries` times. Anything else ends the process, with a
//!    non-zero exit code for failures.

mod config;
mod sink;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use connector::{Client, ClientOutcome};
use protocol::{decode, ConnectionError, Event, RetryPolicy};
use tracing::{info, warn};

use config::{Cli, FileConfig, Settings};
use sink::JsonLinesSink;

/// Pause before reconnecting when the failure gives no hint.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref())?;

    let file = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::merge(file, &cli);
    let outbound = parse_frames(&settings.send)?;

    info!(host = %settings.client.host, retries = settings.retries, "Starting eventwire");

    let mut attempt = 0;
    loop {
        let outcome = connect_once(&settings, &outbound).await?;
        let error = match outcome.into_result() {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };
        match next_delay(&error, attempt, settings.retries) {
            Some(delay) => {
                attempt += 1;
                warn!(
                    attempt,
                    max_attempts = settings.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Connection failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(anyhow::Error::new(error)
                    .context(format!("connection to {} failed", settings.client.host)))
            }
        }
    }
}

/// Runs one client until it closes or fails. Ctrl-C requests an orderly
/// close.
async fn connect_once(settings: &Settings, outbound: &[Event]) -> anyhow::Result<ClientOutcome> {
    let sink = Arc::new(JsonLinesSink::new(std::io::stdout(), settings.max_events));
    let client = Client::new(settings.client.clone(), sink.clone())
        .context("failed to construct client")?;
    let handle = client.handle();
    sink.attach(handle.clone());

    for event in outbound {
        handle
            .send(event.clone())
            .context("failed to queue outbound frame")?;
    }

    let interrupt = tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted; closing connection");
                handle.close();
            }
        }
    });
    let outcome = client.run().await;
    interrupt.abort();

    info!(
        connection_id = %outcome.connection_id,
        state = %outcome.state,
        forwarded = sink.forwarded(),
        "Connection finished"
    );
    Ok(outcome)
}

fn parse_frames(frames: &[String]) -> anyhow::Result<Vec<Event>> {
    frames
        .iter()
        .map(|frame| decode(frame).with_context(|| format!("invalid frame in --send: {frame}")))
        .collect()
}

/// Delay before the next attempt, or `None` when the failure is final.
fn next_delay(error: &ConnectionError, attempt: u32, retries: u32) -> Option<Duration> {
    if attempt >= retries {
        return None;
    }
    match error.retry_policy() {
        RetryPolicy::Retryable { after } => Some(after.unwrap_or(DEFAULT_RETRY_DELAY)),
        RetryPolicy::NonRetryable => None,
    }
}
