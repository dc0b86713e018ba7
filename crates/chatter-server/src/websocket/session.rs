//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;

/// Timing knobs for one session.
#[derive(Clone, Copy, Debug)]
pub struct SessionTimings {
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which the peer is dropped.
    pub pong_timeout: Duration,
}

impl SessionTimings {
    /// Timings from the hub's settings.
    pub fn from_settings(settings: &chatter_settings::ChatterSettings) -> Self {
        Self {
            send_timeout: settings.dispatch.send_timeout(),
            ping_interval: settings.server.ping_interval(),
            pong_timeout: settings.server.pong_timeout(),
        }
    }
}

/// Run a session for an upgraded socket.
///
/// Inbound frames are dispatched one at a time, in arrival order. Outbound
/// frames go through the connection's queue and a writer task. The session
/// ends when the peer leaves, the connection is closed, or `shutdown`
/// fires; teardown then runs exactly once.
#[instrument(skip_all, fields(conn_id = %connection.id(), domain = connection.domain()))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: Arc<Connection>,
    outbound: mpsc::Receiver<Arc<String>>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) {
    let timings = SessionTimings::from_settings(dispatcher.hub().settings());
    let (ws_tx, mut ws_rx) = ws.split();

    if !dispatcher.open(&connection).await {
        warn!("connection id already in use, dropping socket");
        return;
    }

    let mut writer = tokio::spawn(write_loop(ws_tx, outbound, connection.clone(), timings));

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = connection.closed() => break,
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                connection.close();
                break;
            }
        };

        let text = match msg {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Binary(data))) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    s.to_owned()
                } else {
                    info!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                connection.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                info!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        let Some(outcome) = dispatcher.handle_message(&connection, &text).await else {
            break;
        };
        if !connection.send_response(&outcome.response) {
            warn!("failed to enqueue response (queue full or connection closed)");
        }
        if outcome.close {
            connection.close();
            break;
        }
    }

    dispatcher.teardown(&connection).await;

    // The writer flushes what was queued before close, bounded per frame.
    let grace = timings.send_timeout.saturating_mul(2);
    if tokio::time::timeout(grace, &mut writer).await.is_err() {
        warn!("writer did not finish in time, aborting");
        writer.abort();
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    connection: Arc<Connection>,
    timings: SessionTimings,
) {
    let mut ping = tokio::time::interval(timings.ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if !send_frame(&mut ws_tx, text_message(&frame), timings.send_timeout).await {
                    connection.close();
                    return;
                }
            }
            () = connection.closed() => {
                while let Ok(frame) = outbound.try_recv() {
                    if !send_frame(&mut ws_tx, text_message(&frame), timings.send_timeout).await {
                        return;
                    }
                }
                let _ = send_frame(&mut ws_tx, Message::Close(None), timings.send_timeout).await;
                return;
            }
            _ = ping.tick() => {
                if !connection.check_alive()
                    && connection.last_pong_elapsed() > timings.pong_timeout
                {
                    warn!("client unresponsive for {:?}, disconnecting", timings.pong_timeout);
                    connection.close();
                    return;
                }
                let ping = Message::Ping(Vec::new().into());
                if !send_frame(&mut ws_tx, ping, timings.send_timeout).await {
                    connection.close();
                    return;
                }
            }
        }
    }
}

fn text_message(frame: &Arc<String>) -> Message {
    Message::Text(String::clone(frame).into())
}

/// Write one frame within `timeout`. Returns `false` if the peer is gone
/// or too slow.
async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, ws_tx.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "websocket write failed");
            false
        }
        Err(_) => {
            warn!("websocket write timed out after {timeout:?}");
            false
        }
    }
}
