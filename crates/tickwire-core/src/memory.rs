//! In-memory transport and discovery.
//!
//! Connects endpoints in one process through channels. Used by integration
//! tests, with failure injection for connection retry scenarios.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::TransportError,
    transport::{
        Announcement, CHANNEL_CAPACITY, CloseHandle, Connection, Discovery, Listener, Transport,
        topic_key,
    },
};

#[derive(Debug, Default)]
struct NetworkInner {
    listeners: HashMap<String, mpsc::Sender<Connection>>,
    topics: HashMap<[u8; 32], Vec<Announcement>>,
    failures_remaining: u32,
    connect_attempts: u32,
}

/// Shared in-process network. Clones address the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

impl MemoryNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start accepting connections at `addr`.
    ///
    /// # Errors
    ///
    /// - `Connection` if another live listener holds `addr`
    pub fn listen(&self, addr: impl Into<String>) -> Result<MemoryListener, TransportError> {
        let addr = addr.into();
        let mut inner = self.lock();

        if inner.listeners.get(&addr).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::Connection(format!("address in use: {addr}")));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        inner.listeners.insert(addr.clone(), tx);
        Ok(MemoryListener { addr, incoming: rx })
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().failures_remaining = count;
    }

    /// Connection attempts made so far, failed ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Entries currently announced under `topic`, oldest node first.
    pub fn announced(&self, topic: &str) -> Vec<Announcement> {
        self.lock().topics.get(&topic_key(topic)).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn connect(&self, target: &str) -> Result<Connection, TransportError> {
        let listener = {
            let mut inner = self.lock();
            inner.connect_attempts += 1;

            if inner.failures_remaining > 0 {
                inner.failures_remaining -= 1;
                return Err(TransportError::Connection(format!("injected failure dialing {target}")));
            }

            inner
                .listeners
                .get(target)
                .cloned()
                .ok_or_else(|| TransportError::Connection(format!("no listener at {target}")))?
        };

        let (client_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_tx, client_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let server_side = Connection {
            sender: server_tx,
            receiver: server_rx,
            peer: format!("memory-client->{target}"),
            closer: CloseHandle::detached(),
        };
        listener
            .send(server_side)
            .await
            .map_err(|_| TransportError::Connection(format!("listener at {target} closed")))?;

        Ok(Connection {
            sender: client_tx,
            receiver: client_rx,
            peer: target.to_string(),
            closer: CloseHandle::detached(),
        })
    }
}

#[async_trait]
impl Discovery for MemoryNetwork {
    async fn advertise(
        &self,
        topic: &str,
        announcement: &Announcement,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let entries = inner.topics.entry(topic_key(topic)).or_default();
        match entries.iter_mut().find(|e| e.node_id == announcement.node_id) {
            Some(entry) => entry.addr.clone_from(&announcement.addr),
            None => entries.push(announcement.clone()),
        }
        Ok(())
    }

    async fn find(&self, topic: &str) -> Result<String, TransportError> {
        self.lock()
            .topics
            .get(&topic_key(topic))
            .and_then(|entries| entries.first().map(|e| e.addr.clone()))
            .ok_or_else(|| TransportError::Discovery(format!("no peers announced for '{topic}'")))
    }
}

/// Accepting end of a [`MemoryNetwork`] address.
#[derive(Debug)]
pub struct MemoryListener {
    addr: String,
    incoming: mpsc::Receiver<Connection>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> String {
        self.addr.clone()
    }
}
