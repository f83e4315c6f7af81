//! Connection targets and the dial layer
//!
//! Every exchange dials its own connection: TCP, TLS over TCP, or a
//! Unix-domain socket. hyper handles the HTTP/1.1 framing over whatever
//! stream the dial produced, with its connection driver running as a
//! spawned task that is aborted as soon as the exchange ends, so a
//! connection never outlives its request.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// Where an exchange connects to. Exactly one target is active per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// TCP `host:port`, optionally wrapped in TLS.
    Tcp { host: String, port: u16, tls: bool },
    /// Unix-domain socket path.
    Unix(PathBuf),
}

impl Target {
    /// Value for the `Host` header on the wire. The port is elided when
    /// it is the scheme default; Unix sockets have no authority, so
    /// `localhost` stands in.
    pub(crate) fn host_header(&self) -> String {
        match self {
            Target::Tcp { host, port, tls } => {
                let default = if *tls { 443 } else { 80 };
                if *port == default {
                    host.clone()
                } else {
                    format!("{host}:{port}")
                }
            }
            Target::Unix(_) => "localhost".to_string(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp { host, port, .. } => write!(f, "{host}:{port}"),
            Target::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Aborts the hyper connection driver when dropped.
///
/// Held for the lifetime of one exchange. Normal completion, exchange
/// errors, and timeout cancellation all unwind through this drop.
#[derive(Debug)]
pub(crate) struct ConnGuard(tokio::task::JoinHandle<()>);

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Dial the target and issue one request over the fresh connection.
///
/// Returns the response head together with the guard keeping the
/// connection alive; the caller reads the body while holding the guard
/// and tears the connection down by dropping it.
pub(crate) async fn exchange(
    target: &Target,
    skip_verify: bool,
    request: http::Request<Full<Bytes>>,
) -> Result<(http::Response<Incoming>, ConnGuard)> {
    match target {
        Target::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| Error::Client(format!("connect to {}: {e}", path.display())))?;
            drive(stream, request).await
        }
        Target::Tcp { host, port, tls: false } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| Error::Client(format!("connect to {host}:{port}: {e}")))?;
            drive(stream, request).await
        }
        Target::Tcp { host, port, tls: true } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(|e| Error::Client(format!("connect to {host}:{port}: {e}")))?;
            let connector = TlsConnector::from(Arc::new(tls_config(skip_verify)?));
            let server_name = ServerName::try_from(host.clone())
                .map_err(|e| Error::Client(format!("invalid TLS server name {host:?}: {e}")))?;
            let stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| Error::Client(format!("TLS handshake with {host}:{port}: {e}")))?;
            drive(stream, request).await
        }
    }
}

async fn drive<S>(
    stream: S,
    request: http::Request<Full<Bytes>>,
) -> Result<(http::Response<Incoming>, ConnGuard)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::Client(format!("HTTP handshake: {e}")))?;

    let guard = ConnGuard(tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("connection closed: {e}");
        }
    }));

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| Error::Client(format!("send request: {e}")))?;

    Ok((response, guard))
}

fn tls_config(skip_verify: bool) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Client(format!("TLS configuration: {e}")))?;

    let config = if skip_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipVerify))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(config)
}

/// Certificate verifier that accepts any peer certificate.
///
/// Installed only when the caller opted out of verification with
/// `secure(false)`.
#[derive(Debug)]
struct SkipVerify;

impl ServerCertVerifier for SkipVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
