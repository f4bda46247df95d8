// Connection settings and TLS setup for the box WebSocket.
//
// The box serves a self-signed certificate on a static LAN address, so the
// default mode skips certificate and hostname verification entirely.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use secrecy::SecretString;
use tokio_tungstenite::Connector;
use url::Url;

use crate::error::Error;

/// Port the box listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 12345;

/// Path of the control endpoint on the box.
pub const CONTROL_PATH: &str = "/control4";

/// TLS verification mode for the box connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the bundled web PKI roots.
    System,
    /// Accept any certificate (the box's self-signed one).
    #[default]
    DangerAcceptInvalid,
    /// Plain `ws://`, no TLS at all. For local bridges and tests.
    Disabled,
}

/// Where and how to reach the box.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token sent on the WebSocket upgrade request.
    pub token: SecretString,
    pub tls: TlsMode,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, token: SecretString) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            token,
            tls: TlsMode::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Endpoint URL, e.g. `wss://192.168.1.20:12345/control4`.
    pub fn url(&self) -> Result<Url, Error> {
        let scheme = match self.tls {
            TlsMode::Disabled => "ws",
            TlsMode::System | TlsMode::DangerAcceptInvalid => "wss",
        };
        let url = Url::parse(&format!("{scheme}://{}:{}{CONTROL_PATH}", self.host, self.port))?;
        Ok(url)
    }

    /// TLS connector for this mode. `None` lets tungstenite pick its
    /// default (web PKI roots for `wss`, nothing for `ws`).
    pub(crate) fn connector(&self) -> Result<Option<Connector>, Error> {
        match self.tls {
            TlsMode::System | TlsMode::Disabled => Ok(None),
            TlsMode::DangerAcceptInvalid => {
                Ok(Some(Connector::Rustls(Arc::new(accept_any_cert_config()?))))
            }
        }
    }
}

/// rustls client config that trusts whatever certificate the box presents.
fn accept_any_cert_config() -> Result<ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("unsupported protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
        .with_no_client_auth();

    Ok(config)
}

/// Certificate verifier that skips chain and name checks but still
/// verifies handshake signatures, so the session keys are bound to the
/// certificate actually presented.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
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
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tls: TlsMode) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("192.168.1.20", SecretString::from("t0ken"));
        config.tls = tls;
        config
    }

    #[test]
    fn default_targets_secure_control_endpoint() {
        let config = config(TlsMode::default());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.url().unwrap().as_str(),
            "wss://192.168.1.20:12345/control4"
        );
    }

    #[test]
    fn disabled_tls_uses_plain_scheme() {
        let config = config(TlsMode::Disabled);
        assert_eq!(config.url().unwrap().scheme(), "ws");
        assert!(config.connector().unwrap().is_none());
    }

    #[test]
    fn accept_invalid_builds_a_rustls_connector() {
        let connector = config(TlsMode::DangerAcceptInvalid).connector().unwrap();
        assert!(matches!(connector, Some(Connector::Rustls(_))));
    }
}
