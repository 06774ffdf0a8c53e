//! Certificate validity probe for HTCondor-CE.
//!
//! Fetches the server certificate of the schedd running on a host, checks
//! that it was issued for that host and chains to a trusted CA, and grades
//! its remaining lifetime as OK, WARNING or CRITICAL. Anything that keeps the
//! check from reaching a verdict is UNKNOWN.
//!
//! ```no_run
//! use condor_certcheck::source::{Credentials, TlsProbeSource};
//! use condor_certcheck::{Checker, Target};
//! use std::time::Duration;
//!
//! let credentials = Credentials { user_proxy: "/etc/sensu/certs/userproxy.pem".into() };
//! let target = Target::new(
//!     "ce.example.org",
//!     "/etc/pki/tls/certs/ca-bundle.crt",
//!     credentials.clone(),
//! )?;
//! let outcome = Checker::new(target, TlsProbeSource::new(Some(credentials)))
//!     .validate_within(Duration::from_secs(60));
//! println!("{}", outcome);
//! std::process::exit(outcome.exit_code());
//! # Ok::<(), condor_certcheck::CheckError>(())
//! ```

pub mod artifact;
pub mod certificate;
pub mod chain;
pub mod config;
pub mod error;
pub mod expiry;
pub mod identity;
pub mod outcome;
pub mod source;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub use certificate::{CertificateMaterial, ParsedCertificate};
pub use chain::{ChainVerifier, OpensslChainVerifier};
pub use error::{CheckError, FetchError};
pub use expiry::ExpiryPolicy;
pub use outcome::{Severity, ValidationOutcome};
pub use source::{BoxedSource, CertificateSource, Credentials, Fetcher};

use artifact::CertificateArtifact;

/// The host under test and what is needed to check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    hostname: String,
    ca_bundle: PathBuf,
    credentials: Credentials,
}

impl Target {
    /// The hostname names the certificate artifact, so it is restricted to
    /// `[A-Za-z0-9._-]` and may not start with a dot.
    pub fn new(
        hostname: impl Into<String>,
        ca_bundle: impl Into<PathBuf>,
        credentials: Credentials,
    ) -> Result<Target, CheckError> {
        let hostname = hostname.into();
        let invalid = |reason: &str| CheckError::InvalidInput {
            field: "hostname".to_string(),
            reason: reason.to_string(),
        };
        if hostname.is_empty() {
            return Err(invalid("cannot be empty"));
        }
        if hostname.starts_with('.') {
            return Err(invalid("cannot start with '.'"));
        }
        if !hostname
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        {
            return Err(invalid("may only contain letters, digits, '.', '-' and '_'"));
        }

        Ok(Target {
            hostname,
            ca_bundle: ca_bundle.into(),
            credentials,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn ca_bundle(&self) -> &Path {
        &self.ca_bundle
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// One certificate check against one target.
pub struct Checker {
    target: Target,
    fetcher: Fetcher<BoxedSource>,
    verifier: Box<dyn ChainVerifier + Send>,
    policy: ExpiryPolicy,
    artifact_dir: PathBuf,
    /// Set once the caller has given up on the check. Held while the
    /// artifact is written.
    cancelled: Arc<Mutex<bool>>,
}

impl Checker {
    /// Uses the in-process chain verifier, the default expiry policy and the
    /// system temporary directory for the artifact.
    pub fn new(target: Target, source: impl CertificateSource + Send + 'static) -> Self {
        let source: BoxedSource = Box::new(source);
        Checker {
            target,
            fetcher: Fetcher::new(source),
            verifier: Box::new(OpensslChainVerifier),
            policy: ExpiryPolicy::default(),
            artifact_dir: std::env::temp_dir(),
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_verifier(mut self, verifier: impl ChainVerifier + Send + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn with_boxed_verifier(mut self, verifier: Box<dyn ChainVerifier + Send>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Adjusts the fetcher, e.g. its backoff.
    pub fn map_fetcher(
        mut self,
        f: impl FnOnce(Fetcher<BoxedSource>) -> Fetcher<BoxedSource>,
    ) -> Self {
        self.fetcher = f(self.fetcher);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Where the certificate artifact of this check is written.
    pub fn artifact_path(&self) -> PathBuf {
        artifact::artifact_path(&self.artifact_dir, &self.target.hostname)
    }

    pub fn validate(&self) -> ValidationOutcome {
        self.validate_at(Utc::now())
    }

    /// Runs the check with `now` as the current time.
    pub fn validate_at(&self, now: DateTime<Utc>) -> ValidationOutcome {
        let outcome = self.run(now).unwrap_or_else(ValidationOutcome::from);
        // the guard has already gone; this also clears a leftover file
        // when the check failed before writing one
        artifact::discard(&self.artifact_path());
        info!(
            hostname = self.target.hostname.as_str(),
            severity = %outcome.severity,
            "certificate check finished"
        );
        outcome
    }

    /// Runs the check on a worker thread and gives up after `timeout`.
    pub fn validate_within(self, timeout: Duration) -> ValidationOutcome {
        let artifact_path = self.artifact_path();
        let cancelled = Arc::clone(&self.cancelled);
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let _ = sender.send(self.validate());
        });

        let result = receiver.recv_timeout(timeout);
        if result.is_err() {
            // the worker may still be running; once the flag is set it
            // cannot write the artifact any more
            cancel(&cancelled);
            artifact::discard(&artifact_path);
        }
        match result {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => CheckError::Timeout {
                seconds: timeout.as_secs(),
            }
            .into(),
            Err(RecvTimeoutError::Disconnected) => CheckError::Aborted {
                reason: "check worker stopped without a result".to_string(),
            }
            .into(),
        }
    }

    fn run(&self, now: DateTime<Utc>) -> Result<ValidationOutcome, CheckError> {
        let hostname = self.target.hostname.as_str();
        let material = self.fetcher.fetch(hostname)?;
        let cert = ParsedCertificate::from_pem(material.as_bytes())?;
        debug!(
            cn = cert.common_name.as_deref().unwrap_or(""),
            sans = ?cert.sans,
            not_after = %cert.not_after,
            "parsed server certificate"
        );

        let artifact = {
            let cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
            if *cancelled {
                return Err(CheckError::Aborted {
                    reason: "check was cancelled".to_string(),
                });
            }
            CertificateArtifact::persist(&self.artifact_dir, hostname, &material)?
        };
        let identity_ok = identity::matches(&cert, hostname);
        let chain_ok = self
            .verifier
            .verify(artifact.path(), &self.target.ca_bundle)?;
        drop(artifact);
        debug!(identity_ok, chain_ok, "certificate checks done");

        let outcome = if !identity_ok {
            ValidationOutcome::critical(format!(
                "invalid CN ({} does not match {})",
                hostname,
                cert.common_name.as_deref().unwrap_or("<none>")
            ))
        } else if !chain_ok {
            ValidationOutcome::critical("invalid CA chain")
        } else {
            self.policy.classify(cert.not_after, now)
        };
        Ok(outcome)
    }
}

fn cancel(flag: &Mutex<bool>) {
    *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
}
