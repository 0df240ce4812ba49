//! Command line and configuration file handling.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `EVENTWIRE_*`
//! environment variables, flags.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use connector::ClientConfig;
use serde::Deserialize;

use crate::telemetry::LogFormat;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "eventwire.toml";

#[derive(Debug, Parser)]
#[command(name = "eventwire", version)]
#[command(about = "Connects to a real-time event endpoint and prints every forwarded event as a JSON line")]
pub struct Cli {
    /// Configuration file (TOML). Defaults to ./eventwire.toml when present.
    #[arg(short, long, env = "EVENTWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to connect to (`host` or `host:port`).
    #[arg(long, env = "EVENTWIRE_HOST")]
    pub host: Option<String>,

    /// Resource path prefix of the negotiation endpoint.
    #[arg(long, env = "EVENTWIRE_RESOURCE")]
    pub resource: Option<String>,

    /// Protocol version segment.
    #[arg(long, env = "EVENTWIRE_PROTOCOL")]
    pub protocol: Option<u32>,

    /// Handshake request timeout in seconds.
    #[arg(long, env = "EVENTWIRE_HANDSHAKE_TIMEOUT")]
    pub handshake_timeout_secs: Option<u64>,

    /// Outbound heartbeat interval in seconds.
    #[arg(long, env = "EVENTWIRE_HEARTBEAT_INTERVAL")]
    pub heartbeat_interval_secs: Option<u64>,

    /// Do not answer incoming heartbeats.
    #[arg(long)]
    pub no_echo_heartbeats: bool,

    /// Do not acknowledge message frames automatically.
    #[arg(long)]
    pub no_auto_ack: bool,

    /// Raw frame to send once the connection opens. Repeatable.
    #[arg(long = "send", value_name = "FRAME")]
    pub send: Vec<String>,

    /// Close after this many forwarded events.
    #[arg(long, env = "EVENTWIRE_MAX_EVENTS")]
    pub max_events: Option<usize>,

    /// Reconnect attempts after a retryable failure.
    #[arg(long, env = "EVENTWIRE_RETRIES")]
    pub retries: Option<u32>,

    /// Log output format (logs go to stderr).
    #[arg(long, value_enum, env = "EVENTWIRE_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// OTLP gRPC endpoint for span export (e.g. http://localhost:4317).
    #[arg(long, env = "EVENTWIRE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

/// Contents of the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub connection: ClientConfig,

    /// Raw frames sent once open.
    #[serde(default)]
    pub send: Vec<String>,

    #[serde(default)]
    pub max_events: Option<usize>,

    #[serde(default)]
    pub retries: Option<u32>,
}

/// Fully merged settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub client: ClientConfig,
    pub send: Vec<String>,
    pub max_events: Option<usize>,
    pub retries: u32,
}

impl FileConfig {
    /// Loads `path`, or the default file if it exists, or nothing.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl Settings {
    /// Applies flag and environment overrides on top of the file.
    pub fn merge(file: FileConfig, cli: &Cli) -> Self {
        let mut client = file.connection;
        if let Some(host) = &cli.host {
            client.host = host.clone();
        }
        if let Some(resource) = &cli.resource {
            client.resource = resource.clone();
        }
        if let Some(protocol) = cli.protocol {
            client.protocol = protocol;
        }
        if let Some(secs) = cli.handshake_timeout_secs {
            client.handshake_timeout_secs = secs;
        }
        if let Some(secs) = cli.heartbeat_interval_secs {
            client.heartbeat_interval_secs = Some(secs);
        }
        if cli.no_echo_heartbeats {
            client.echo_heartbeats = false;
        }
        if cli.no_auto_ack {
            client.auto_ack = false;
        }

        let send = if cli.send.is_empty() {
            file.send
        } else {
            cli.send.clone()
        };

        Self {
            client,
            send,
            max_events: cli.max_events.or(file.max_events),
            retries: cli.retries.or(file.retries).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("eventwire").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn file_sections_are_optional() {
        let file = FileConfig::parse("").unwrap();
        assert_eq!(file, FileConfig::default());
    }

    #[test]
    fn file_values_are_read() {
        let file = FileConfig::parse(
            r#"
            send = ["5:::{\"name\":\"hello\"}"]
            max_events = 3

            [connection]
            host = "events.internal:9000"
            auto_ack = false
            "#,
        )
        .unwrap();

        assert_eq!(file.connection.host, "events.internal:9000");
        assert!(!file.connection.auto_ack);
        assert_eq!(file.connection.resource, "socket.io");
        assert_eq!(file.send.len(), 1);
        assert_eq!(file.max_events, Some(3));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::parse("hots = \"typo\"").is_err());
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig {
            connection: ClientConfig {
                host: "from-file:1".into(),
                ..Default::default()
            },
            send: vec!["2::".into()],
            max_events: Some(10),
            retries: Some(2),
        };
        let settings = Settings::merge(
            file,
            &cli(&[
                "--host",
                "from-flag:2",
                "--send",
                "3:::a",
                "--send",
                "3:::b",
                "--no-auto-ack",
                "--heartbeat-interval-secs",
                "4",
            ]),
        );

        assert_eq!(settings.client.host, "from-flag:2");
        assert!(!settings.client.auto_ack);
        assert_eq!(settings.client.heartbeat_interval_secs, Some(4));
        assert_eq!(settings.send, vec!["3:::a", "3:::b"]);
        assert_eq!(settings.max_events, Some(10));
        assert_eq!(settings.retries, 2);
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let settings = Settings::merge(FileConfig::default(), &cli(&[]));
        assert_eq!(settings.client, ClientConfig::default());
        assert!(settings.send.is_empty());
        assert_eq!(settings.retries, 0);
    }

    #[test]
    fn log_format_flag_parses() {
        assert_eq!(cli(&["--log-format", "json"]).log_format, LogFormat::Json);
        assert_eq!(cli(&[]).log_format, LogFormat::Pretty);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(FileConfig::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
