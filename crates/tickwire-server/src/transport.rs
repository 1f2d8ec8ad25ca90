//! Quinn-based QUIC listener.
//!
//! Each client opens one bidirectional stream right after the QUIC
//! handshake. The listener bridges that stream to a [`Connection`] so the
//! server loop never sees QUIC types. TLS 1.3 comes from `rustls`; ALPN is
//! set to "tickwire". Self-signed certificates are for local use only.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use quinn::{Endpoint, ServerConfig};
use tickwire_core::{
    TransportError,
    framing::stream_connection,
    transport::{CHANNEL_CAPACITY, Connection, Listener},
};
use tickwire_proto::ALPN_PROTOCOL;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::ServerError;

/// QUIC endpoint accepting tickwire clients.
///
/// QUIC handshakes and stream setup run in background tasks, so one slow
/// client never delays the next accept.
pub struct QuinnListener {
    endpoint: Endpoint,
    ready: mpsc::Receiver<Connection>,
    acceptor: JoinHandle<()>,
}

impl QuinnListener {
    /// Bind a QUIC endpoint.
    ///
    /// If `cert_path` and `key_path` are provided, they will be used for TLS.
    /// Otherwise, a self-signed certificate is generated.
    pub fn bind(
        address: &str,
        cert_path: Option<&str>,
        key_path: Option<&str>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => generate_self_signed_config()?,
        };

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        let (tx, ready) = mpsc::channel(CHANNEL_CAPACITY);
        let acceptor = tokio::spawn(accept_loop(endpoint.clone(), tx));

        Ok(Self { endpoint, ready, acceptor })
    }

    /// Socket address the endpoint is bound to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

impl Drop for QuinnListener {
    fn drop(&mut self) {
        self.acceptor.abort();
        self.endpoint.close(0u32.into(), b"server shutdown");
    }
}

#[async_trait]
impl Listener for QuinnListener {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        self.ready.recv().await.ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> String {
        self.endpoint.local_addr().map(|a| a.to_string()).unwrap_or_default()
    }
}

async fn accept_loop(endpoint: Endpoint, ready: mpsc::Sender<Connection>) {
    while let Some(incoming) = endpoint.accept().await {
        let ready = ready.clone();
        tokio::spawn(async move {
            match establish(incoming).await {
                Ok(conn) => {
                    if ready.send(conn).await.is_err() {
                        tracing::debug!("listener dropped, discarding connection");
                    }
                },
                Err(e) => tracing::debug!(error = %e, "incoming connection failed"),
            }
        });
    }
    tracing::debug!("QUIC endpoint closed");
}

async fn establish(incoming: quinn::Incoming) -> Result<Connection, TransportError> {
    let connection =
        incoming.await.map_err(|e| TransportError::Connection(format!("handshake failed: {e}")))?;
    let peer = connection.remote_address().to_string();

    let (send, recv) = connection
        .accept_bi()
        .await
        .map_err(|e| TransportError::Stream(format!("accept_bi failed: {e}")))?;

    tracing::debug!(%peer, "client stream open");
    Ok(stream_connection(recv, send, peer))
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;

    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    quic_config(certs, key)
}

/// Generate a self-signed certificate for development.
fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    tracing::warn!("Using self-signed certificate - not for production use!");

    quic_config(vec![cert.cert.der().clone()], key.into())
}

fn quic_config(
    certs: Vec<rustls::pki_types::CertificateDer<'static>>,
    key: rustls::pki_types::PrivateKeyDer<'static>,
) -> Result<ServerConfig, ServerError> {
    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    Ok(ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_with_self_signed() {
        let listener = QuinnListener::bind("127.0.0.1:0", None, None).unwrap();
        let addr = listener.socket_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.local_addr(), addr.to_string());
    }

    #[tokio::test]
    async fn rejects_invalid_address() {
        assert!(matches!(
            QuinnListener::bind("invalid:address:format", None, None),
            Err(ServerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn missing_cert_file_is_config_error() {
        let result = QuinnListener::bind("127.0.0.1:0", Some("/nonexistent.pem"), Some("/k.pem"));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
