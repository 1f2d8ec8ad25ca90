//! QUIC transport for the client.
//!
//! Opens one bidirectional stream per connection and bridges it to
//! [`Connection`] channels. Protocol logic stays in [`Client`].
//!
//! [`Client`]: crate::Client

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use quinn::{ClientConfig, Endpoint};
use rustls::{
    DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use tickwire_core::{
    TransportError,
    framing::stream_connection,
    transport::{Connection, Transport},
};
use tickwire_proto::ALPN_PROTOCOL;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// QUIC dialer.
///
/// Accepts any server certificate. Session keys are negotiated by the
/// tickwire handshake on top, which is itself unauthenticated; do not rely
/// on this transport to authenticate the server.
#[derive(Debug, Clone)]
pub struct QuinnTransport {
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create a client endpoint on an ephemeral local port.
    pub fn new() -> Result<Self, TransportError> {
        let bind = SocketAddr::from(([0, 0, 0, 0], 0));
        let mut endpoint = Endpoint::client(bind)
            .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
        endpoint.set_default_client_config(insecure_client_config()?);
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl Transport for QuinnTransport {
    async fn connect(&self, target: &str) -> Result<Connection, TransportError> {
        let addr: SocketAddr = target
            .parse()
            .map_err(|e| TransportError::Connection(format!("invalid address '{target}': {e}")))?;

        let connection = self
            .endpoint
            .connect(addr, "localhost")
            .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
            .await
            .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(format!("open_bi failed: {e}")))?;

        Ok(stream_connection(recv, send, target))
    }
}

/// Create an insecure client config that accepts any certificate.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier::new()))
        .with_no_client_auth();

    // Must match server's ALPN protocol
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let mut config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::Connection(format!("QUIC config error: {e}")))?,
    ));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        IDLE_TIMEOUT
            .try_into()
            .map_err(|e| TransportError::Connection(format!("idle timeout: {e}")))?,
    ));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Verifier that skips certificate checks but still validates handshake
/// signatures with the ring provider's algorithms.
#[derive(Debug)]
struct InsecureCertVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl InsecureCertVerifier {
    fn new() -> Self {
        let provider = rustls::crypto::ring::default_provider();
        Self { algorithms: provider.signature_verification_algorithms }
    }
}

impl ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
