//! TLS transport and login
//!
//! Opens one authenticated IMAP session, either with implicit TLS or
//! by upgrading a clear connection with `STARTTLS`. The server
//! greeting is read off the wire before the IMAP client takes over so
//! it can be reported later.

use crate::config::{ImapConfig, Security};
use crate::error::{StoreError, StoreResult, TransportKind};
use async_imap::Session;
use rustls::RootCertStore;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<TlsStream<TcpStream>>>;

/// Build the TLS connector for `config`.
///
/// Certificates are verified against the bundled web PKI roots unless
/// the configuration explicitly accepts invalid ones.
fn tls_connector(config: &ImapConfig) -> StoreResult<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StoreError::transport(TransportKind::Socket, e.to_string()))?;

    let tls = if config.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(tls)))
}

/// Read the single greeting line the server sends on connect.
async fn read_greeting<S: AsyncRead + Unpin>(stream: S) -> StoreResult<(S, String)> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(StoreError::transport(
            TransportKind::Aborted,
            "connection closed before greeting",
        ));
    }
    let greeting = line.trim_end().to_string();
    debug!("Server greeting: {}", greeting);
    Ok((reader.into_inner(), greeting))
}

/// Open a fresh TLS-wrapped, logged-in IMAP session.
///
/// Returns the session together with the server greeting.
pub async fn connect(config: &ImapConfig) -> StoreResult<(ImapSession, String)> {
    let addr = format!("{}:{}", config.host, config.port);
    debug!("Connecting to IMAP server at {} ({})", addr, config.security);

    let connector = tls_connector(config)?;
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| StoreError::transport(TransportKind::Socket, format!("Invalid server name: {e}")))?;

    let tcp_stream = TcpStream::connect(&addr).await?;

    let (tls_stream, greeting) = match config.security {
        Security::Tls => {
            let tls_stream = connector.connect(server_name, tcp_stream).await?;
            read_greeting(tls_stream).await?
        }
        Security::StartTls => {
            let (tcp_stream, greeting) = read_greeting(tcp_stream).await?;
            let mut client = async_imap::Client::new(tcp_stream.compat());
            client.run_command_and_check_ok("STARTTLS", None).await?;

            let inner = client.into_inner().into_inner();
            (connector.connect(server_name, inner).await?, greeting)
        }
    };

    let tls_client = async_imap::Client::new(tls_stream.compat());
    let session = tls_client
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| StoreError::from(e))?;

    info!("Connected to IMAP server {}", addr);
    Ok((session, greeting))
}

/// Certificate verifier that accepts all certificates
/// (for self-signed bridges and test servers).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
