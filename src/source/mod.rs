//! Retrieval of the schedd's server certificate.
//!
//! # Submodules
//!
//! - `tls` - probe the daemon over TLS with the openssl crate
//! - `command` - delegate the probe to an external helper program

pub mod command;
pub mod tls;

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

use crate::certificate::CertificateMaterial;
use crate::error::FetchError;

pub use command::CommandProbeSource;
pub use tls::TlsProbeSource;

/// HTCondor-CE collector port.
pub const DEFAULT_PORT: u16 = 9619;

/// Wait between the first empty probe and the retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);

/// Client credentials presented to the schedd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Grid user proxy: certificate chain and private key in one PEM file
    pub user_proxy: PathBuf,
}

/// A schedd found through the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonLocation {
    /// Daemon name, the hostname under test
    pub name: String,
    /// Collector address as `host:port`
    pub pool: String,
    /// Resolved address, when the source resolves one
    pub address: Option<SocketAddr>,
}

impl fmt::Display for DaemonLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "schedd {} at {}", self.name, address),
            None => write!(f, "schedd {} via {}", self.name, self.pool),
        }
    }
}

/// Anything that can hand out the schedd's server certificate.
pub trait CertificateSource {
    /// Locates the schedd named `hostname` through the collector on that host.
    fn locate(&self, hostname: &str) -> Result<DaemonLocation, FetchError>;

    /// Runs the authenticated probe and returns the server certificate PEM.
    /// `None` or blank text means the daemon did not send one.
    fn probe(&self, daemon: &DaemonLocation) -> Result<Option<String>, FetchError>;
}

impl<S: CertificateSource + ?Sized> CertificateSource for Box<S> {
    fn locate(&self, hostname: &str) -> Result<DaemonLocation, FetchError> {
        (**self).locate(hostname)
    }

    fn probe(&self, daemon: &DaemonLocation) -> Result<Option<String>, FetchError> {
        (**self).probe(daemon)
    }
}

pub type BoxedSource = Box<dyn CertificateSource + Send>;

/// Which source implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Tls,
    Command,
}

type Sleeper = Box<dyn Fn(Duration) + Send>;

/// Fetches the certificate, retrying once after a fixed backoff when the
/// schedd answers without one.
pub struct Fetcher<S> {
    source: S,
    backoff: Duration,
    sleep: Sleeper,
}

impl<S: CertificateSource> Fetcher<S> {
    pub fn new(source: S) -> Self {
        Fetcher {
            source,
            backoff: DEFAULT_BACKOFF,
            sleep: Box::new(thread::sleep),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces `thread::sleep` for the backoff wait.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn fetch(&self, hostname: &str) -> Result<CertificateMaterial, FetchError> {
        let daemon = self.source.locate(hostname)?;
        debug!(%daemon, "located daemon");

        if let Some(material) = self.probe_once(&daemon)? {
            return Ok(material);
        }

        warn!(
            %daemon,
            backoff_secs = self.backoff.as_secs(),
            "no certificate in probe response, retrying"
        );
        (self.sleep)(self.backoff);

        self.probe_once(&daemon)?
            .ok_or(FetchError::Empty { attempts: 2 })
    }

    fn probe_once(&self, daemon: &DaemonLocation) -> Result<Option<CertificateMaterial>, FetchError> {
        let response = self.source.probe(daemon)?;
        Ok(response
            .filter(|pem| !pem.trim().is_empty())
            .map(CertificateMaterial::new))
    }
}

impl<S> fmt::Debug for Fetcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
