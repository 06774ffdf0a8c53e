//! Chain-of-trust verification of the certificate artifact.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509VerifyResult, X509};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

use crate::error::CheckError;

/// Decides whether a certificate file chains to a root in the CA bundle.
///
/// `Ok(false)` is a verdict; `Err` means the verifier itself could not run.
pub trait ChainVerifier {
    fn verify(&self, certificate: &Path, ca_bundle: &Path) -> Result<bool, CheckError>;
}

/// Which verifier implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// In-process verification with the openssl crate
    Library,
    /// `openssl verify` subprocess
    Openssl,
}

impl VerifierKind {
    pub fn build(self) -> Box<dyn ChainVerifier + Send> {
        match self {
            VerifierKind::Library => Box::new(OpensslChainVerifier),
            VerifierKind::Openssl => Box::new(CommandChainVerifier::default()),
        }
    }
}

fn verify_error(details: impl Into<String>) -> CheckError {
    CheckError::Verify {
        details: details.into(),
    }
}

/// Verifies with an in-process X509 store built from the bundle.
///
/// The first certificate of the artifact is the leaf, any further ones are
/// untrusted intermediates. Validity periods are enforced for every
/// certificate except an expired leaf, whose expiry gets its own verdict.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpensslChainVerifier;

impl ChainVerifier for OpensslChainVerifier {
    fn verify(&self, certificate: &Path, ca_bundle: &Path) -> Result<bool, CheckError> {
        let bundle = fs::read(ca_bundle)
            .map_err(|e| verify_error(format!("cannot read {}: {}", ca_bundle.display(), e)))?;
        let anchors = X509::stack_from_pem(&bundle).map_err(|e| {
            verify_error(format!("cannot load {}: {}", ca_bundle.display(), e))
        })?;
        if anchors.is_empty() {
            return Err(verify_error(format!(
                "no certificates in {}",
                ca_bundle.display()
            )));
        }

        let pem = fs::read(certificate)
            .map_err(|e| verify_error(format!("cannot read {}: {}", certificate.display(), e)))?;
        let mut presented = X509::stack_from_pem(&pem)
            .map_err(|e| verify_error(e.to_string()))?
            .into_iter();
        let leaf = match presented.next() {
            Some(leaf) => leaf,
            None => return Ok(false),
        };

        let openssl_error = |e: openssl::error::ErrorStack| verify_error(e.to_string());
        let mut store = X509StoreBuilder::new().map_err(openssl_error)?;
        for anchor in anchors {
            store.add_cert(anchor).map_err(openssl_error)?;
        }
        let store = store.build();

        let mut chain = Stack::new().map_err(openssl_error)?;
        for intermediate in presented {
            chain.push(intermediate).map_err(openssl_error)?;
        }

        let mut context = X509StoreContext::new().map_err(openssl_error)?;
        let (verified, result, depth) = context
            .init(&store, &leaf, &chain, |ctx| {
                let verified = ctx.verify_cert()?;
                Ok((verified, ctx.error(), ctx.error_depth()))
            })
            .map_err(openssl_error)?;
        Ok(verified || leaf_expired_only(result, depth))
    }
}

/// `X509_V_ERR_CERT_HAS_EXPIRED`
const CERT_HAS_EXPIRED: i32 = 10;

/// The leaf is verified last, after every signature and validity check up
/// the chain, so its expiry at depth 0 means the rest of the chain held.
fn leaf_expired_only(result: X509VerifyResult, depth: u32) -> bool {
    if result.as_raw() == CERT_HAS_EXPIRED && depth == 0 {
        debug!("chain trusted apart from leaf expiry");
        return true;
    }
    info!(
        reason = result.error_string(),
        depth, "chain verification failed"
    );
    false
}

/// Runs `openssl verify -verbose -CAfile <bundle> <certificate>`.
///
/// The command line tool also enforces validity periods, so an expired
/// certificate is reported as an invalid chain with this verifier.
#[derive(Debug, Clone)]
pub struct CommandChainVerifier {
    program: String,
}

impl Default for CommandChainVerifier {
    fn default() -> Self {
        CommandChainVerifier {
            program: "openssl".to_string(),
        }
    }
}

impl CommandChainVerifier {
    pub fn with_program(program: impl Into<String>) -> Self {
        CommandChainVerifier {
            program: program.into(),
        }
    }
}

impl ChainVerifier for CommandChainVerifier {
    fn verify(&self, certificate: &Path, ca_bundle: &Path) -> Result<bool, CheckError> {
        let output = Command::new(&self.program)
            .arg("verify")
            .arg("-verbose")
            .arg("-CAfile")
            .arg(ca_bundle)
            .arg(certificate)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| verify_error(format!("cannot run {}: {}", self.program, e)))?;
        debug!(
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "openssl verify finished"
        );
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_verifier_kind_parsing() {
        assert_eq!(VerifierKind::from_str("library").unwrap(), VerifierKind::Library);
        assert_eq!(VerifierKind::from_str("openssl").unwrap(), VerifierKind::Openssl);
        assert!(VerifierKind::from_str("gnutls").is_err());
    }

    #[test]
    fn test_missing_bundle_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        fs::write(&cert, "").unwrap();
        let result = OpensslChainVerifier.verify(&cert, &dir.path().join("bundle.pem"));
        assert!(matches!(result, Err(CheckError::Verify { .. })));
    }

    #[test]
    fn test_missing_program_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = CommandChainVerifier::with_program("/nonexistent/openssl");
        let result = verifier.verify(&dir.path().join("a.pem"), &dir.path().join("b.pem"));
        assert!(result.is_err());
    }
}
