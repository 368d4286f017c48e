use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::Mutex;

use crate::{
    errors::ConnectionError,
    ports::{Connection, Connector},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Connected,
    Stale,
    Failed,
}

struct Slot {
    state: SessionState,
    conn: Option<Arc<dyn Connection>>,
    last_error: Option<ConnectionError>,
    /// Highest arrival ticket issued before the last construction finished.
    covered: u64,
}

/// Owner of the single shared remote connection.
///
/// Every request goes through [`SessionHandle::ensure_connected`]. The lock is
/// held while deciding whether to (re)create the connection, never while a
/// request uses it. A failed construction is not retried here; the next
/// request starts a fresh attempt.
pub struct SessionHandle {
    connector: Arc<dyn Connector>,
    slot: Mutex<Slot>,
    /// One ticket per `ensure_connected` call, taken before queueing on the lock.
    arrivals: AtomicU64,
}

impl SessionHandle {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slot: Mutex::new(Slot {
                state: SessionState::Uninitialized,
                conn: None,
                last_error: None,
                covered: 0,
            }),
            arrivals: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    /// Return the live connection, constructing or replacing it as needed.
    ///
    /// Callers that arrived while a construction was running reuse its result:
    /// the winner's connection on success, the winner's error on failure.
    /// Arrival is decided by a ticket taken before waiting on the lock and
    /// compared under it, so a caller that shows up after the attempt ends
    /// always starts a fresh one.
    pub async fn ensure_connected(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        let ticket = self.arrivals.fetch_add(1, Ordering::SeqCst) + 1;
        let mut slot = self.slot.lock().await;

        if let Some(conn) = &slot.conn {
            if conn.is_alive() {
                return Ok(conn.clone());
            }
            tracing::warn!("telegram connection is no longer alive, reconnecting");
            slot.state = SessionState::Stale;
            if let Some(dead) = slot.conn.take() {
                if let Err(e) = dead.stop().await {
                    tracing::warn!(error = %e, "failed to stop stale connection");
                }
            }
        } else if slot.state == SessionState::Failed && ticket <= slot.covered {
            if let Some(err) = &slot.last_error {
                return Err(err.clone());
            }
        }

        let previous = slot.state;
        slot.state = SessionState::Starting;
        tracing::info!(from = ?previous, "connecting to telegram");

        let outcome = self.connector.connect().await;
        // Everyone who arrived while this attempt ran shares its outcome.
        slot.covered = self.arrivals.load(Ordering::SeqCst);

        match outcome {
            Ok(conn) => {
                slot.state = SessionState::Connected;
                slot.conn = Some(conn.clone());
                slot.last_error = None;
                tracing::info!("telegram session connected");
                Ok(conn)
            }
            Err(e) => {
                slot.state = SessionState::Failed;
                slot.conn = None;
                slot.last_error = Some(e.clone());
                tracing::error!(error = %e, "telegram session failed to start");
                Err(e)
            }
        }
    }

    /// Stop and drop the connection, if any. Later calls to
    /// `ensure_connected` build a new one.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        let Some(conn) = slot.conn.take() else {
            return;
        };
        if let Err(e) = conn.stop().await {
            tracing::warn!(error = %e, "failed to stop telegram connection");
        }
        slot.state = SessionState::Uninitialized;
        tracing::info!("telegram session closed");
    }
}
