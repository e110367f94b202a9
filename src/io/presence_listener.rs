//! Presence TCP listener for the live session transport
//!
//! Listens for client connections speaking newline-delimited JSON.
//! Each connection gets a bounded outbound channel (registered with the
//! hub via `HubEvent::Connected`) and a writer task; inbound lines are
//! parsed, validated, and forwarded to the hub event channel.
//!
//! Routine inbound events are forwarded via try_send to keep a flooding
//! client from blocking the accept loop; connect and disconnect events use
//! an awaiting send because the hub must not miss lifecycle transitions.

use crate::domain::types::ConnId;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::messages::{InboundMessage, OutboundMessage};
use crate::services::hub::HubEvent;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Monotonic connection handle source; ids are never reused
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Start the presence TCP listener
///
/// Accepts client connections and bridges them to the hub event channel.
pub async fn start_presence_listener(
    config: Config,
    event_tx: mpsc::Sender<HubEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", config.presence_port());
    let listener = TcpListener::bind(&addr).await?;

    info!(port = %config.presence_port(), "presence_listener_started");

    loop {
        tokio::select! {
            // Check for shutdown
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("presence_listener_shutdown");
                    return Ok(());
                }
            }
            // Accept new connections
            result = listener.accept() => {
                match result {
                    Ok((socket, addr)) => {
                        let tx = event_tx.clone();
                        let m = metrics.clone();
                        let outbound_buffer = config.outbound_buffer();
                        tokio::spawn(async move {
                            handle_connection(socket, addr, outbound_buffer, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "presence_listener_accept_failed");
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    socket: tokio::net::TcpStream,
    addr: SocketAddr,
    outbound_buffer: usize,
    event_tx: mpsc::Sender<HubEvent>,
    metrics: Arc<Metrics>,
) {
    let conn = ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed));
    let peer = addr.to_string();
    debug!(conn = %conn, peer = %peer, "presence_connection_accepted");

    let (read_half, write_half) = socket.into_split();

    // Register the outbound channel with the hub before reading anything,
    // so replies to the first message have somewhere to go
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(outbound_buffer);
    if event_tx.send(HubEvent::Connected { conn, outbound: outbound_tx }).await.is_err() {
        warn!(conn = %conn, "hub_channel_closed_on_connect");
        return;
    }

    let writer = tokio::spawn(write_outbound(conn, write_half, outbound_rx));

    read_inbound(conn, &peer, read_half, &event_tx, &metrics).await;

    // EOF or read error: the hub unregisters the channel, which ends the
    // writer task by closing its receiver
    if event_tx.send(HubEvent::Disconnected { conn }).await.is_err() {
        writer.abort();
    }
    debug!(conn = %conn, peer = %peer, "presence_connection_closed");
}

/// Serialize outbound messages as JSON lines until the channel closes
async fn write_outbound(
    conn: ConnId,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = outbound_rx.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(e) => {
                error!(conn = %conn, error = %e, "outbound_serialize_failed");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = write_half.write_all(&line).await {
            debug!(conn = %conn, error = %e, "outbound_write_failed");
            break;
        }
    }
}

/// Parse and forward inbound lines until EOF or a fatal channel error
async fn read_inbound(
    conn: ConnId,
    peer: &str,
    read_half: tokio::net::tcp::OwnedReadHalf,
    event_tx: &mpsc::Sender<HubEvent>,
    metrics: &Metrics,
) {
    let reader = BufReader::new(read_half);
    let mut lines = reader.lines();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: InboundMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                metrics.record_inbound_rejected();
                warn!(conn = %conn, peer = %peer, error = %e, "inbound_parse_failed");
                continue;
            }
        };

        if let Err(reason) = message.validate() {
            metrics.record_inbound_rejected();
            warn!(
                conn = %conn,
                peer = %peer,
                message_type = %message.message_type(),
                reason = %reason,
                "inbound_rejected"
            );
            continue;
        }

        // Use try_send to never block the connection handler
        match event_tx.try_send(HubEvent::Message { conn, message }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_inbound_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(conn = %conn, peer = %peer, "inbound_dropped: hub channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(conn = %conn, peer = %peer, "hub_channel_closed");
                break;
            }
        }
    }
}
