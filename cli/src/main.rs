use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use sockmux::{
    BroadcastBus, BusEvent, ConnectionState, EncodingMode, Heartbeat, SOCKET_RECV_TOPIC, SocketClient, SocketConfig,
    StructCodec, TypeRegistry, heartbeat_interval,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// The socket task writes queued frames before honouring a close; give it a
/// moment to finish before the runtime shuts down.
const FLUSH_GRACE: Duration = Duration::from_millis(200);
const STATE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid client setup: {0}")]
    Config(#[from] sockmux::ConfigError),
    #[error("invalid type registry: {0}")]
    Registry(#[from] sockmux::RegistryError),
    #[error("heartbeat interval must be a positive number of seconds, got {0}")]
    InvalidHeartbeat(f64),
    #[error("socket {url} did not open")]
    NotOpen { url: String },
    #[error("call failed: {0}")]
    Call(#[from] sockmux::ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("event bus closed")]
    BusClosed,
}

#[derive(Parser, Debug)]
#[command(name = "sockmux", about = "Multiplexed request/response over one websocket")]
struct Cli {
    #[arg(long, env = "SOCKMUX_URL")]
    url: String,

    #[arg(long, env = "SOCKMUX_ENCODING", value_enum, default_value_t = Encoding::Text)]
    encoding: Encoding,

    /// Binary message type, repeatable. Payloads use the struct codec.
    #[arg(long = "type", value_name = "NAME=ID", value_parser = parse_type_entry)]
    types: Vec<(String, u32)>,

    #[arg(long, env = "SOCKMUX_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    connect_timeout_ms: u64,

    #[arg(long, env = "SOCKMUX_RESPONSE_TIMEOUT_MS")]
    response_timeout_ms: Option<u64>,

    #[arg(long, env = "SOCKMUX_HEARTBEAT_NAME", requires = "heartbeat_secs")]
    heartbeat_name: Option<String>,

    #[arg(long, env = "SOCKMUX_HEARTBEAT_SECS", requires = "heartbeat_name")]
    heartbeat_secs: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Encoding {
    #[value(alias = "json")]
    Text,
    #[value(alias = "protobuf")]
    Binary,
}

impl From<Encoding> for EncodingMode {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Text => Self::Text,
            Encoding::Binary => Self::Binary,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correlated call; prints the response.
    Call(CallArgs),
    /// Fire-and-forget message.
    Send(SendArgs),
    /// Print inbound envelopes until the deadline, Ctrl-C, or disconnect.
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct CallArgs {
    name: String,

    #[arg(long, default_value = "{}")]
    data: String,

    #[arg(long, default_value = "null", help = "Printed when the socket is unavailable")]
    default: String,
}

#[derive(Args, Debug)]
struct SendArgs {
    name: String,

    #[arg(long, default_value = "{}")]
    data: String,
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[arg(long, help = "Stop after this many seconds")]
    seconds: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let bus = Arc::new(BroadcastBus::default());
    let events = bus.subscribe();
    let client = build_client(&cli, &bus)?;

    match cli.command {
        Command::Call(args) => run_call(&client, args).await,
        Command::Send(args) => run_send(&client, args).await,
        Command::Listen(args) => run_listen(&client, events, args).await,
    }
}

fn build_client(cli: &Cli, bus: &Arc<BroadcastBus>) -> Result<SocketClient, CliError> {
    let mut config = SocketConfig::new(cli.url.clone(), cli.encoding.into())
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));
    if let Some(ms) = cli.response_timeout_ms {
        config = config.with_response_timeout(Duration::from_millis(ms));
    }
    if let (Some(name), Some(secs)) = (&cli.heartbeat_name, cli.heartbeat_secs) {
        let interval = heartbeat_interval(secs).ok_or(CliError::InvalidHeartbeat(secs))?;
        config = config.with_heartbeat(name.clone(), interval);
    }

    let mut builder = SocketClient::builder(config).event_bus(bus.clone());
    if !cli.types.is_empty() {
        let mut registry = TypeRegistry::default();
        for (name, id) in &cli.types {
            registry.register(*id, name.clone(), StructCodec)?;
        }
        builder = builder.registry(registry);
    }
    Ok(builder.build()?)
}

async fn run_call(client: &SocketClient, args: CallArgs) -> Result<(), CliError> {
    let data = serde_json::from_str::<Value>(&args.data)?;
    let default = serde_json::from_str::<Value>(&args.default)?;

    let response = client.call(&args.name, data, default).await?;
    print_json(&response)?;
    client.close();
    Ok(())
}

async fn run_send(client: &SocketClient, args: SendArgs) -> Result<(), CliError> {
    let data = serde_json::from_str::<Value>(&args.data)?;
    ensure_open(client).await?;

    client.send(&args.name, data);
    info!(name = %args.name, session = client.current_session(), "sent");

    client.close();
    tokio::time::sleep(FLUSH_GRACE).await;
    Ok(())
}

async fn run_listen(
    client: &SocketClient,
    mut events: broadcast::Receiver<BusEvent>,
    args: ListenArgs,
) -> Result<(), CliError> {
    ensure_open(client).await?;
    let _heartbeat = Heartbeat::spawn(client);

    let deadline = async {
        match args.seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut state_check = tokio::time::interval(STATE_CHECK_INTERVAL);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            _ = state_check.tick() => {
                if client.state() != ConnectionState::Open {
                    warn!(url = %client.config().url, "listen: socket closed");
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) if event.topic == SOCKET_RECV_TOPIC => print_json(&event.payload)?,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "listen: fell behind; events dropped"),
                Err(RecvError::Closed) => return Err(CliError::BusClosed),
            },
        }
    }

    client.close();
    Ok(())
}

async fn ensure_open(client: &SocketClient) -> Result<(), CliError> {
    if client.connect().await == ConnectionState::Open {
        return Ok(());
    }
    Err(CliError::NotOpen { url: client.config().url.clone() })
}

fn parse_type_entry(raw: &str) -> Result<(String, u32), String> {
    let (name, id) = raw.split_once('=').ok_or_else(|| format!("expected NAME=ID, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing message name in `{raw}`"));
    }
    let id = id.trim().parse::<u32>().map_err(|e| format!("invalid type id in `{raw}`: {e}"))?;
    Ok((name.to_owned(), id))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_entry_parses_name_and_id() {
        assert_eq!(parse_type_entry("ping=7"), Ok(("ping".to_owned(), 7)));
        assert_eq!(parse_type_entry(" pong = 8 "), Ok(("pong".to_owned(), 8)));
    }

    #[test]
    fn type_entry_rejects_malformed_input() {
        assert!(parse_type_entry("ping").is_err());
        assert!(parse_type_entry("=7").is_err());
        assert!(parse_type_entry("ping=-1").is_err());
    }

    #[test]
    fn binary_without_types_is_rejected() {
        let cli = Cli::parse_from(["sockmux", "--url", "ws://127.0.0.1:9", "--encoding", "binary", "call", "ping"]);
        let bus = Arc::new(BroadcastBus::default());
        assert!(matches!(build_client(&cli, &bus), Err(CliError::Config(_))));
    }

    #[test]
    fn type_entries_build_a_binary_client() {
        let cli = Cli::parse_from([
            "sockmux", "--url", "ws://127.0.0.1:9", "--encoding", "protobuf", "--type", "ping=7", "--type", "pong=8",
            "send", "ping",
        ]);
        let bus = Arc::new(BroadcastBus::default());
        let client = build_client(&cli, &bus).expect("client");
        assert_eq!(client.config().encoding, EncodingMode::Binary);
    }

    #[test]
    fn out_of_range_heartbeat_interval_is_rejected() {
        for secs in ["0", "1e300", "inf"] {
            let cli = Cli::parse_from([
                "sockmux", "--url", "ws://127.0.0.1:9", "--heartbeat-name", "hb", "--heartbeat-secs", secs, "listen",
            ]);
            let bus = Arc::new(BroadcastBus::default());
            assert!(matches!(build_client(&cli, &bus), Err(CliError::InvalidHeartbeat(_))), "secs {secs}");
        }
    }
}
