//! Transport and discovery contracts.
//!
//! The protocol core never opens sockets. A [`Transport`] dials, a
//! [`Listener`] accepts, and both hand out [`Connection`] values: a pair of
//! frame channels plus a close handle. Each message on the channels is one
//! complete JSON frame body; implementations own the byte framing.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::{sync::mpsc, task::AbortHandle};

use crate::error::TransportError;

/// Capacity of the per-connection frame channels.
pub const CHANNEL_CAPACITY: usize = 64;

/// Discovery key for a topic name.
pub fn topic_key(topic: &str) -> [u8; 32] {
    Sha256::digest(topic.as_bytes()).into()
}

/// Stops the I/O task behind a connection when closed or dropped.
#[derive(Debug, Default)]
pub struct CloseHandle {
    abort: Option<AbortHandle>,
}

impl CloseHandle {
    /// Handle that aborts `task` on close.
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    /// Handle for connections without a background task.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Stop the I/O task.
    pub fn close(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }
}

impl Drop for CloseHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// One established connection.
///
/// Dropping `sender` signals end of stream to the peer; dropping `closer`
/// tears down the I/O task.
#[derive(Debug)]
pub struct Connection {
    /// Frames to the peer
    pub sender: mpsc::Sender<Bytes>,
    /// Frames from the peer
    pub receiver: mpsc::Receiver<Bytes>,
    /// Human readable peer address for logs
    pub peer: String,
    /// I/O task handle
    pub closer: CloseHandle,
}

/// Dials peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `target`.
    async fn connect(&self, target: &str) -> Result<Connection, TransportError>;
}

/// Accepts inbound connections.
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next inbound connection.
    ///
    /// Returns `Closed` once the listener can produce no more connections.
    async fn accept(&mut self) -> Result<Connection, TransportError>;

    /// Address peers should dial.
    fn local_addr(&self) -> String;
}

/// A node's entry under a discovery topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Address peers should dial
    pub addr: String,
    /// Public key of the announcing node; stable across restarts
    pub node_id: [u8; 32],
}

/// Locates servers by topic.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Announce a node under `topic`. A node announcing again replaces its
    /// previous entry.
    async fn advertise(
        &self,
        topic: &str,
        announcement: &Announcement,
    ) -> Result<(), TransportError>;

    /// Find an address announced under `topic`.
    async fn find(&self, topic: &str) -> Result<String, TransportError>;
}

/// Discovery that always answers with one configured address.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    addr: String,
}

impl StaticDiscovery {
    /// Answer every lookup with `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn advertise(
        &self,
        topic: &str,
        announcement: &Announcement,
    ) -> Result<(), TransportError> {
        tracing::debug!(topic, addr = %announcement.addr, "static discovery ignores announcements");
        Ok(())
    }

    async fn find(&self, _topic: &str) -> Result<String, TransportError> {
        Ok(self.addr.clone())
    }
}
