use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{CertificateSource, Credentials, DaemonLocation, DEFAULT_PORT};
use crate::error::FetchError;

/// Environment variable the HTCondor client reads the user proxy from.
pub const PROXY_ENV: &str = "X509_USER_PROXY";

/// Delegates the probe to an external helper.
///
/// The helper is run as `<program> --pool <host:port> --name <host>` and must
/// print the schedd's server certificate as PEM on stdout. Empty stdout means
/// no certificate was returned. The user proxy is handed over through
/// `X509_USER_PROXY` in the helper's environment only.
#[derive(Debug, Clone)]
pub struct CommandProbeSource {
    program: PathBuf,
    port: u16,
    credentials: Option<Credentials>,
}

impl CommandProbeSource {
    pub fn new(program: impl Into<PathBuf>, credentials: Option<Credentials>) -> Self {
        CommandProbeSource {
            program: program.into(),
            port: DEFAULT_PORT,
            credentials,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl CertificateSource for CommandProbeSource {
    /// The helper does the collector query itself, so this only names it.
    fn locate(&self, hostname: &str) -> Result<DaemonLocation, FetchError> {
        Ok(DaemonLocation {
            name: hostname.to_string(),
            pool: format!("{}:{}", hostname, self.port),
            address: None,
        })
    }

    fn probe(&self, daemon: &DaemonLocation) -> Result<Option<String>, FetchError> {
        let mut command = Command::new(&self.program);
        command
            .arg("--pool")
            .arg(&daemon.pool)
            .arg("--name")
            .arg(&daemon.name)
            .stdin(Stdio::null());
        if let Some(credentials) = &self.credentials {
            command.env(PROXY_ENV, &credentials.user_proxy);
        }

        let output = command.output().map_err(|e| FetchError::Probe {
            program: self.program_name(),
            details: e.to_string(),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Probe {
                program: self.program_name(),
                details: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| FetchError::Malformed {
            reason: e.to_string(),
        })?;
        debug!(%daemon, bytes = stdout.len(), "probe helper finished");
        Ok(Some(stdout).filter(|pem| !pem.trim().is_empty()))
    }
}
