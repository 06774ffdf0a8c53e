use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use openssl::ssl::{SslConnector, SslFiletype, SslMethod, SslVerifyMode};
use tracing::debug;

use super::{CertificateSource, Credentials, DaemonLocation, DEFAULT_PORT};
use crate::error::FetchError;

static TIMEOUT: u64 = 30;

const CEDAR_HINT: &str =
    "the daemon may only offer TLS inside CEDAR, try --source command with a helper";

/// Probes the schedd with a TLS handshake, authenticating with the user
/// proxy, and returns the certificate the daemon presents.
///
/// The peer is not verified during the handshake; trust is decided later
/// by the chain verifier.
///
/// HTCondor negotiates SSL authentication inside its CEDAR protocol, so a
/// stock schedd does not answer a bare handshake on the collector port.
/// This source only works where the daemon is reachable over plain TLS,
/// e.g. behind a TLS terminating proxy or in tests. Use
/// [`CommandProbeSource`](super::CommandProbeSource) with a helper built on
/// an HTCondor client otherwise.
#[derive(Debug, Clone)]
pub struct TlsProbeSource {
    port: u16,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl TlsProbeSource {
    pub fn new(credentials: Option<Credentials>) -> Self {
        TlsProbeSource {
            port: DEFAULT_PORT,
            credentials,
            timeout: Duration::from_secs(TIMEOUT),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connector(&self) -> Result<SslConnector, FetchError> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_verify(SslVerifyMode::NONE);
        if let Some(credentials) = &self.credentials {
            let proxy = &credentials.user_proxy;
            let credentials_error = |e: openssl::error::ErrorStack| FetchError::Credentials {
                path: proxy.clone(),
                details: e.to_string(),
            };
            builder
                .set_certificate_chain_file(proxy)
                .map_err(credentials_error)?;
            builder
                .set_private_key_file(proxy, SslFiletype::PEM)
                .map_err(credentials_error)?;
        }
        Ok(builder.build())
    }
}

impl CertificateSource for TlsProbeSource {
    fn locate(&self, hostname: &str) -> Result<DaemonLocation, FetchError> {
        let pool = format!("{}:{}", hostname, self.port);
        let address = pool
            .to_socket_addrs()
            .map_err(|e| FetchError::Locate {
                name: hostname.to_string(),
                pool: pool.clone(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| FetchError::Locate {
                name: hostname.to_string(),
                pool: pool.clone(),
                reason: "no address found".to_string(),
            })?;

        Ok(DaemonLocation {
            name: hostname.to_string(),
            pool,
            address: Some(address),
        })
    }

    fn probe(&self, daemon: &DaemonLocation) -> Result<Option<String>, FetchError> {
        let address = daemon.address.ok_or_else(|| FetchError::Malformed {
            reason: format!("{} has no resolved address", daemon),
        })?;
        let connector = self.connector()?;

        let tcp_stream = TcpStream::connect_timeout(&address, self.timeout).map_err(|source| {
            FetchError::Unreachable {
                address: address.to_string(),
                source,
            }
        })?;
        tcp_stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| tcp_stream.set_write_timeout(Some(self.timeout)))
            .map_err(|source| FetchError::Unreachable {
                address: address.to_string(),
                source,
            })?;

        let stream = connector
            .configure()?
            .verify_hostname(false)
            .connect(&daemon.name, tcp_stream)
            .map_err(|e| FetchError::Handshake {
                address: address.to_string(),
                details: format!("{} ({})", e, CEDAR_HINT),
            })?;
        debug!(
            %address,
            version = stream.ssl().version_str(),
            "probe handshake completed"
        );

        match stream.ssl().peer_certificate() {
            Some(cert) => {
                let pem = cert.to_pem()?;
                let pem = String::from_utf8(pem).map_err(|e| FetchError::Malformed {
                    reason: e.to_string(),
                })?;
                Ok(Some(pem))
            }
            None => Ok(None),
        }
    }
}
