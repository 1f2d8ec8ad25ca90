//! Session registry: client identity → established session.
//!
//! Owned by the server and handed to every connection task; there is no
//! process-global table. Entries are immutable once inserted and replaced
//! wholesale by a later handshake for the same client id (last handshake
//! wins). There is no expiry or revocation.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tickwire_core::ChannelCodec;
use tickwire_crypto::{PUBLIC_KEY_SIZE, SessionKey};

/// One client's established session.
#[derive(Debug)]
pub struct ClientSession {
    /// Identity the client registered under
    pub client_id: String,
    /// Client agreement public key from the handshake
    pub peer_public_key: [u8; PUBLIC_KEY_SIZE],
    /// Derived session key
    pub session_key: SessionKey,
    /// Wall clock (ms) when the handshake completed
    pub created_at_ms: u64,
    /// Codec bound to this session
    pub codec: ChannelCodec,
}

/// Shared table of established sessions.
///
/// Reads take a shared lock and clone an `Arc`, so request handling never
/// holds the lock across a network wait and only blocks for the instant a
/// handshake is inserting.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `session.client_id`.
    ///
    /// Returns the replaced session, if any.
    pub fn register(&self, session: ClientSession) -> Option<Arc<ClientSession>> {
        let client_id = session.client_id.clone();
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.clone(), Arc::new(session));

        if previous.is_some() {
            tracing::debug!(%client_id, "session replaced by newer handshake");
        }
        previous
    }

    /// Session for `client_id`; `None` means no handshake completed.
    pub fn lookup(&self, client_id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).get(client_id).cloned()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no client has completed a handshake.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
