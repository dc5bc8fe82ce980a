//! Downstream session registry
//!
//! A [`Session`] is the ephemeral state of one downstream SSE connection:
//! a UUID, the permission snapshot taken from the presented API key, and a
//! bounded outbound queue. The SSE handler owns the queue consumer; the
//! message-POST handler is a transient producer.
//!
//! The queue holds 10 messages. Producers never block: when the queue is
//! full the message is dropped silently (warn-logged and counted), which
//! keeps a stalled SSE consumer from backing up the dispatch path. The
//! registry is a `std::sync::RwLock` map so the SSE stream can deregister
//! itself from a synchronous `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use metrics::increment_counter;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::gateway::PermissionSet;

/// Outbound queue capacity per session.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 10;

/// One downstream SSE connection's state.
///
/// Created on SSE connect, removed when the stream drops. The permission
/// snapshot is fixed for the session's lifetime; key changes apply to new
/// sessions only.
#[derive(Debug)]
pub struct Session {
    /// Session identifier carried in the POST URL.
    pub id: Uuid,
    /// Permissions resolved from the API key at connect time.
    pub permissions: PermissionSet,
    /// Producer side of the outbound queue.
    outbound_tx: mpsc::Sender<String>,
}

impl Session {
    /// Enqueue one serialized response for the SSE writer.
    ///
    /// Non-blocking: a full queue drops the message silently and a closed
    /// queue (writer already gone) is ignored.
    pub fn enqueue(&self, message: String) {
        match self.outbound_tx.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                increment_counter!("one_mcp_session_messages_dropped_total");
                tracing::warn!(session = %self.id, "outbound queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session = %self.id, "outbound queue closed, dropping message");
            }
        }
    }
}

/// Process-wide registry of live sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session, returning it together with the
    /// consumer side of its outbound queue.
    pub fn register(&self, permissions: PermissionSet) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            permissions,
            outbound_tx,
        });

        let mut guard = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(session.id, Arc::clone(&session));
        drop(guard);

        tracing::debug!(session = %session.id, "session registered");
        (session, outbound_rx)
    }

    /// Look up a live session.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        let guard = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        guard.get(id).cloned()
    }

    /// Deregister a session; idempotent.
    pub fn remove(&self, id: &Uuid) {
        let mut guard = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if guard.remove(id).is_some() {
            tracing::debug!(session = %id, "session removed");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let guard = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        guard.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
