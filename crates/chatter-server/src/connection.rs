//! Per-client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatter_core::{ConnectionId, Response};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Dispatch state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport established, no identity yet.
    Open,
    /// Identity claimed and registered.
    Authorized,
    /// Terminal; no further messages are processed.
    Closed,
}

/// Source of per-process connection serials.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct SessionState {
    phase: ConnectionState,
    identity: Option<String>,
}

/// One live duplex channel to a client.
///
/// The outbound side is a bounded queue drained by the session's writer
/// task. Sends never block; once the connection goes offline they are
/// silently ignored.
pub struct Connection {
    id: ConnectionId,
    serial: u64,
    domain: String,
    remote: String,
    tx: mpsc::Sender<Arc<String>>,
    state: Mutex<SessionState>,
    online: AtomicBool,
    /// Whether the client has answered since the last ping check.
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
    closer: CancellationToken,
    /// When the transport opened.
    pub connected_at: Instant,
}

impl Connection {
    /// Create a connection writing into `tx`.
    pub fn new(
        id: ConnectionId,
        domain: impl Into<String>,
        remote: impl Into<String>,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            domain: domain.into(),
            remote: remote.into(),
            tx,
            state: Mutex::new(SessionState {
                phase: ConnectionState::Open,
                identity: None,
            }),
            online: AtomicBool::new(true),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closer: CancellationToken::new(),
            connected_at: now,
        }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(
        id: ConnectionId,
        domain: impl Into<String>,
        remote: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(id, domain, remote, tx)), rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Process-unique serial, distinct for every connection ever built.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Domain this connection was opened on.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Peer address.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Current dispatch state.
    pub fn state(&self) -> ConnectionState {
        self.state.lock().phase
    }

    /// Claimed identity, empty until authorized.
    pub fn identity(&self) -> Option<String> {
        self.state.lock().identity.clone()
    }

    /// Whether an identity has been claimed.
    pub fn is_authorized(&self) -> bool {
        self.state() == ConnectionState::Authorized
    }

    /// Move to `Authorized` under `identity`.
    ///
    /// Returns `false` if the connection is already closed.
    pub(crate) fn authorize(&self, identity: &str) -> bool {
        let mut state = self.state.lock();
        if state.phase == ConnectionState::Closed {
            return false;
        }
        state.phase = ConnectionState::Authorized;
        state.identity = Some(identity.to_owned());
        true
    }

    /// Whether the transport is still up.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Queue a text frame.
    ///
    /// Returns `false` when offline, or when the queue is full or closed; the
    /// latter two also count as a drop.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.is_online() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Encode and queue a response envelope.
    pub fn send_response(&self, response: &Response) -> bool {
        self.send(Arc::new(response.encode()))
    }

    /// Messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Go offline and ask the session to shut the transport.
    ///
    /// Frames queued before this call are still flushed by the writer.
    pub fn close(&self) {
        self.state.lock().phase = ConnectionState::Closed;
        self.online.store(false, Ordering::Release);
        self.closer.cancel();
    }

    /// Whether [`Connection::close`] has been called.
    pub fn is_closing(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Resolves once [`Connection::close`] is called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closer.cancelled()
    }

    /// Record a pong or any other sign of life.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Read and reset the alive flag.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Time since the transport opened.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether `other` is this very connection, not merely one with the same id.
    pub fn is_same(&self, other: &Connection) -> bool {
        self.serial == other.serial
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}
