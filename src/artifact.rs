//! The on-disk copy of the fetched certificate.
//!
//! The chain verifier needs a file path, so the material is written to
//! `<dir>/<hostname>.pem` for the duration of the check. Checks against the
//! same hostname at the same time share that path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::certificate::CertificateMaterial;
use crate::error::CheckError;

/// Deterministic artifact location for `hostname`.
pub fn artifact_path(dir: &Path, hostname: &str) -> PathBuf {
    dir.join(format!("{}.pem", hostname))
}

/// Removes `path` if it exists. Never fails.
pub fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed certificate artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "cannot remove certificate artifact"),
    }
}

/// Certificate file that is deleted when dropped.
#[derive(Debug)]
pub struct CertificateArtifact {
    path: PathBuf,
}

impl CertificateArtifact {
    pub fn persist(
        dir: &Path,
        hostname: &str,
        material: &CertificateMaterial,
    ) -> Result<CertificateArtifact, CheckError> {
        let path = artifact_path(dir, hostname);
        // own the path before writing so a partial write is cleaned up too
        let artifact = CertificateArtifact { path };
        fs::write(&artifact.path, material.as_bytes()).map_err(|source| {
            CheckError::Artifact {
                path: artifact.path.clone(),
                source,
            }
        })?;
        debug!(path = %artifact.path.display(), "wrote certificate artifact");
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CertificateArtifact {
    fn drop(&mut self) {
        discard(&self.path);
    }
}
