//! CLI for the telemetry bridge
//!
//! Subcommands:
//! - `serve` (default): run the MQTT -> WebSocket bridge
//! - `watch`: connect as a WebSocket client and print what the bridge sends

use clap::Parser;
use std::process::ExitCode;
use telemetry_bridge::config::{Settings, load_config};
use telemetry_bridge::relay::{ConnectionRegistry, Relay};
use telemetry_bridge::transport::{MqttSubscriber, WebSocketListener};
use telemetry_bridge::utils::{Result, logging};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "telemetry-bridge", about = "Relay MQTT telemetry to WebSocket clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the bridge
    Serve,
    /// Print every envelope received from a running bridge
    Watch {
        /// WebSocket URL of the bridge (default: ws://127.0.0.1:8080)
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let settings = match load_config() {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            logging::init(&settings.log.level);

            if let Err(e) = run_server(settings).await {
                error!("Bridge failed: {e}");
                return ExitCode::FAILURE;
            }
        }
        Command::Watch { url } => {
            logging::init("info");
            if let Err(e) = run_watch(&url).await {
                error!("Watch failed: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

async fn run_server(settings: Settings) -> Result<()> {
    info!("Configuration loaded");
    info!("MQTT broker: {}", settings.mqtt.broker_url);
    info!("MQTT topic: {}", settings.mqtt.topic_pattern);
    info!("WebSocket port: {}", settings.server.port);

    let registry = ConnectionRegistry::new_shared(settings.relay.max_connections);
    let relay = Relay::new(registry);

    let subscriber = MqttSubscriber::new(&settings.mqtt)?;
    let listener = WebSocketListener::bind(&settings.listen_addr(), relay.clone()).await?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    info!("MQTT -> WebSocket bridge operational");
    info!("MQTT: {}", settings.mqtt.broker_url);
    info!("WebSocket: ws://{}", listener.local_addr()?);
    info!("Press Ctrl+C to stop");

    tokio::select! {
        _ = subscriber.run(events_tx) => {
            error!("MQTT subscriber exited unexpectedly.");
        }
        _ = relay.run(events_rx) => {
            error!("Relay exited unexpectedly.");
        }
        _ = listener.run() => {
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting.");
        }
    }

    Ok(())
}

async fn run_watch(url: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {url}");

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => println!("{}", text.as_str()),
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Bridge closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
