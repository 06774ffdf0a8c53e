//! Error types for certificate fetching and validation.
//!
//! Identity mismatches, untrusted chains and expiry are not errors: they are
//! verdicts and are reported through [`ValidationOutcome`]. Everything here
//! means the check could not reach a verdict and ends up as UNKNOWN.
//!
//! [`ValidationOutcome`]: crate::ValidationOutcome

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::outcome::ValidationOutcome;

/// Failure to obtain the server certificate from the certificate source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The schedd could not be located through the collector
    #[error("cannot locate schedd {name} via collector {pool}: {reason}")]
    Locate {
        /// Daemon name that was looked up
        name: String,
        /// Collector address (host:port)
        pool: String,
        /// Why the lookup failed
        reason: String,
    },

    /// TCP connection to the daemon failed
    #[error("connection to {address} failed: {source}")]
    Unreachable {
        /// The address (host:port) that could not be reached
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The probe handshake was rejected, usually an authentication problem
    #[error("handshake with {address} failed: {details}")]
    Handshake {
        /// The address of the daemon
        address: String,
        /// Details reported by the TLS layer
        details: String,
    },

    /// Loading the client credentials failed
    #[error("cannot use credentials {path}: {details}")]
    Credentials {
        /// Path to the user proxy
        path: PathBuf,
        /// Details about the failure
        details: String,
    },

    /// The external probe helper failed
    #[error("probe command {program} failed: {details}")]
    Probe {
        /// Program that was executed
        program: String,
        /// Exit status or spawn error
        details: String,
    },

    /// The response could not be understood
    #[error("malformed probe response: {reason}")]
    Malformed {
        /// Description of what went wrong
        reason: String,
    },

    /// No certificate in any response
    #[error("no certificate returned after {attempts} attempts")]
    Empty {
        /// Number of probes performed
        attempts: u32,
    },

    /// OpenSSL error while setting up the probe
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

/// Error type for a certificate check that could not produce a verdict.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Invalid input provided to the API
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// The certificate could not be fetched
    #[error("Unable to fetch certificate: {0}")]
    Fetch(#[from] FetchError),

    /// The fetched material is not a usable certificate
    #[error("Unable to parse certificate: {reason}")]
    Parse {
        /// Description of what went wrong
        reason: String,
    },

    /// Writing the certificate artifact failed
    #[error("Unable to write {path}: {source}")]
    Artifact {
        /// Artifact path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The chain verifier could not run
    #[error("Unable to verify CA chain: {details}")]
    Verify {
        /// Why verification could not run
        details: String,
    },

    /// The whole check exceeded its deadline
    #[error("Timeout: certificate check did not finish within {seconds} seconds")]
    Timeout {
        /// Deadline in seconds
        seconds: u64,
    },

    /// The check worker stopped without a result
    #[error("certificate check aborted: {reason}")]
    Aborted {
        /// Description of the failure
        reason: String,
    },
}

impl From<CheckError> for ValidationOutcome {
    fn from(err: CheckError) -> Self {
        ValidationOutcome::unknown(err.to_string())
    }
}
