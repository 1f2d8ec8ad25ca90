//! Client configuration.

use std::time::Duration;

use tickwire_core::{
    DEFAULT_MAX_AGE, ProtocolVariant,
    retry::{DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY, RetryPolicy},
};
use tickwire_proto::DEFAULT_TOPIC;

use crate::error::ClientError;

/// Default time to wait for a response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity the session is registered under
    pub client_id: String,
    /// Sealing scheme; must match the server
    pub variant: ProtocolVariant,
    /// Connection attempts including the first
    pub connect_attempts: u32,
    /// Delay between connection attempts
    pub retry_delay: Duration,
    /// Time to wait for each response
    pub call_timeout: Duration,
    /// Oldest signed response accepted
    pub replay_window: Duration,
    /// Discovery topic to look the server up under
    pub topic: String,
}

impl ClientConfig {
    /// Defaults for `client_id`.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            variant: ProtocolVariant::default(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay: DEFAULT_CONNECT_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            replay_window: DEFAULT_MAX_AGE,
            topic: DEFAULT_TOPIC.to_string(),
        }
    }

    /// Policy for the connect, handshake and ping sequence.
    ///
    /// Local faults end the sequence at once; see
    /// [`ClientError::is_retryable`].
    pub fn connect_policy(&self) -> RetryPolicy<ClientError> {
        RetryPolicy::fixed(self.connect_attempts, self.retry_delay)
            .retry_if(ClientError::is_retryable)
    }
}
