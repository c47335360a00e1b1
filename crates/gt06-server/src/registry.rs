use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Process-unique id of one TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Registry's reference to a live session.
///
/// The socket stays with the session task; this only holds the sending side
/// of its outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub imei: String,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<Bytes>,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        imei: String,
        peer: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            id,
            imei,
            peer,
            connected_at: Utc::now(),
            outbound,
        }
    }

    /// Queue a pre-built frame for the session task to write.
    ///
    /// Never waits; returns false if the session is gone or its queue is full.
    pub fn send(&self, frame: Bytes) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(imei = %self.imei, session = %self.id, "outbound queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            imei: self.imei.clone(),
            session: self.id,
            peer: self.peer,
            connected_at: self.connected_at,
        }
    }
}

/// Serializable view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub imei: String,
    pub session: SessionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// IMEI to live session.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handle`, returning the session it replaced.
    pub fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        self.lock().insert(handle.imei.clone(), handle)
    }

    /// Remove the registration for `imei` only if it still belongs to `id`.
    pub fn deregister(&self, imei: &str, id: SessionId) -> bool {
        let mut sessions = self.lock();
        match sessions.get(imei) {
            Some(current) if current.id == id => {
                sessions.remove(imei);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, imei: &str) -> Option<SessionHandle> {
        self.lock().get(imei).cloned()
    }

    pub fn imeis(&self) -> Vec<String> {
        let mut imeis: Vec<String> = self.lock().keys().cloned().collect();
        imeis.sort();
        imeis
    }

    /// Registered sessions sorted by IMEI.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self.lock().values().map(SessionHandle::info).collect();
        sessions.sort_by(|a, b| a.imei.cmp(&b.imei));
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
