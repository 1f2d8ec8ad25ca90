//! Client
//!
//! Connects to a tickwire server, establishes a session key and makes
//! sealed price calls.
//!
//! # Components
//!
//! - [`Client`]: connect with retry, sealed calls, response correlation
//! - [`ClientConfig`]: identity, variant, retry and timeout settings
//! - [`ClientError`]: failure classes, keeping verification failures
//!   (`InvalidServerResponse`) apart from transport failures
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::QuinnTransport`], a QUIC implementation of
//! [`tickwire_core::transport::Transport`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod error;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_CALL_TIMEOUT};
pub use error::ClientError;
pub use tickwire_core::{Environment, ProtocolVariant, SystemEnv};
