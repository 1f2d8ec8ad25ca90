//! Tickwire Protocol Core
//!
//! Sans-IO session logic shared by client and server:
//!
//! - [`handshake`]: unauthenticated X25519 key exchange producing a
//!   per-client session key
//! - [`codec`]: the two sealing variants behind one `seal`/`open` contract
//! - [`retry`]: retry policies and the combinator that runs them
//! - [`transport`]: transport and discovery contracts, with an in-memory
//!   implementation in [`memory`]
//!
//! Time, sleeping and randomness come from an [`Environment`], so every
//! delay and replay-window decision is testable without a real clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod env;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod identity;
pub mod memory;
pub mod retry;
mod system_env;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use codec::{ChannelCodec, DEFAULT_MAX_AGE, ProtocolVariant};
pub use env::Environment;
pub use error::{CodecError, HandshakeError, TransportError};
pub use identity::EndpointIdentity;
pub use system_env::SystemEnv;
