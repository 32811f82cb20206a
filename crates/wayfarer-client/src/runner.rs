//! Interactive client loop.
//!
//! Stdin lines become user input; every logged event is printed to stdout.
//! End of input or Ctrl-C closes the connection and flushes the session.

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wayfarer_core::{hub_url, ConnectionManager, Event, FileStore};
use wayfarer_transport::{Transport, WebSocketTransport};

/// Input queue depth.
const INPUT_BUFFER: usize = 64;

/// Run the client until input ends or the transport gives up.
pub async fn run_client(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let identity = config.identity();
    let url = hub_url(&config.hub.base_url, &identity.user_id);
    let store = FileStore::new(config.storage_dir());

    info!(
        url = %url,
        user_id = %identity.user_id,
        storage = %store.dir().display(),
        "Starting Wayfarer client"
    );

    let mut transport = WebSocketTransport::connect(config.websocket_config(url));
    let mut manager = ConnectionManager::new(identity, store, transport.sink());

    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    let reader = tokio::spawn(read_input(input_tx));

    manager.run(&mut transport, input_rx, print_event).await;

    reader.abort();
    info!("Client stopped");
    Ok(())
}

/// Forward stdin lines until EOF or Ctrl-C. Dropping the sender ends the run.
async fn read_input(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Input closed");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
}

fn print_event(event: &Event) {
    println!("{}", render_event(event));
}

/// Render an event as `[id] username: content`.
fn render_event(event: &Event) -> String {
    let content = match &event.content {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };

    match &event.username {
        Some(name) => format!("[{}] {}: {}", event.id, name, content),
        None => format!("[{}] {}", event.id, content),
    }
}
