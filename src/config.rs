//! Configuration file management for the probe.
//!
//! Settings come from three places, later ones winning:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (given with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! hostname = "ce.example.org"
//! ca_bundle = "/etc/pki/tls/certs/ca-bundle.crt"
//! user_proxy = "/etc/sensu/certs/userproxy.pem"
//! timeout = 60
//! warning_days = 30
//! source = "tls"
//! verifier = "library"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::chain::VerifierKind;
use crate::expiry::{ExpiryPolicy, DEFAULT_WARNING_DAYS};
use crate::source::{
    BoxedSource, CommandProbeSource, Credentials, SourceKind, TlsProbeSource, DEFAULT_BACKOFF,
    DEFAULT_PORT,
};
use crate::{CheckError, Checker, Target};

pub const DEFAULT_CA_BUNDLE: &str = "/etc/pki/tls/certs/ca-bundle.crt";
pub const DEFAULT_USER_PROXY: &str = "/etc/sensu/certs/userproxy.pem";
pub const DEFAULT_TIMEOUT: u64 = 60;

/// How the single result line is printed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

/// Probe configuration as read from a file or the command line.
///
/// All fields are optional to support partial configuration and merging.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Host running the HTCondor-CE
    pub hostname: Option<String>,
    /// Trust anchors for chain verification
    pub ca_bundle: Option<PathBuf>,
    /// User proxy used to authenticate the probe
    pub user_proxy: Option<PathBuf>,
    /// Collector port
    pub port: Option<u16>,
    /// Deadline for the whole check, in seconds
    pub timeout: Option<u64>,
    /// Wait before the single retry, in seconds
    pub backoff: Option<u64>,
    /// WARNING below this many days of validity
    pub warning_days: Option<i64>,
    /// Directory for the temporary certificate file
    pub artifact_dir: Option<PathBuf>,
    /// Certificate source: tls, command
    pub source: Option<SourceKind>,
    /// Helper program for the command source
    pub probe_command: Option<PathBuf>,
    /// Chain verifier: library, openssl
    pub verifier: Option<VerifierKind>,
    /// Output format: text, json
    pub output: Option<OutputFormat>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub hostname: String,
    pub ca_bundle: PathBuf,
    pub user_proxy: PathBuf,
    pub port: u16,
    pub timeout: Duration,
    pub backoff: Duration,
    pub warning_days: i64,
    pub artifact_dir: PathBuf,
    pub source: SourceKind,
    pub probe_command: Option<PathBuf>,
    pub verifier: VerifierKind,
    pub output: OutputFormat,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Creates a configuration holding every default value.
    ///
    /// The hostname has no default and must be provided.
    pub fn defaults() -> Self {
        Config {
            hostname: None,
            ca_bundle: Some(PathBuf::from(DEFAULT_CA_BUNDLE)),
            user_proxy: Some(PathBuf::from(DEFAULT_USER_PROXY)),
            port: Some(DEFAULT_PORT),
            timeout: Some(DEFAULT_TIMEOUT),
            backoff: Some(DEFAULT_BACKOFF.as_secs()),
            warning_days: Some(DEFAULT_WARNING_DAYS),
            artifact_dir: Some(std::env::temp_dir()),
            source: Some(SourceKind::Tls),
            probe_command: None,
            verifier: Some(VerifierKind::Library),
            output: Some(OutputFormat::Text),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value.
    pub fn merge_with(self, other: Config) -> Self {
        Config {
            hostname: other.hostname.or(self.hostname),
            ca_bundle: other.ca_bundle.or(self.ca_bundle),
            user_proxy: other.user_proxy.or(self.user_proxy),
            port: other.port.or(self.port),
            timeout: other.timeout.or(self.timeout),
            backoff: other.backoff.or(self.backoff),
            warning_days: other.warning_days.or(self.warning_days),
            artifact_dir: other.artifact_dir.or(self.artifact_dir),
            source: other.source.or(self.source),
            probe_command: other.probe_command.or(self.probe_command),
            verifier: other.verifier.or(self.verifier),
            output: other.output.or(self.output),
        }
    }

    /// Checks the merged configuration and fills the gaps with defaults.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let config = Config::defaults().merge_with(self);
        let required = |field: &str| ConfigError::Validation(format!("{} is required", field));

        let hostname = config.hostname.ok_or_else(|| required("hostname"))?;
        let source = config.source.unwrap_or(SourceKind::Tls);
        if source == SourceKind::Command && config.probe_command.is_none() {
            return Err(ConfigError::Validation(
                "probe_command is required for the command source".to_string(),
            ));
        }
        let timeout = config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout == 0 {
            return Err(ConfigError::Validation(
                "timeout must be greater than 0".to_string(),
            ));
        }
        let warning_days = config.warning_days.unwrap_or(DEFAULT_WARNING_DAYS);
        if warning_days < 0 {
            return Err(ConfigError::Validation(
                "warning_days cannot be negative".to_string(),
            ));
        }

        Ok(Settings {
            hostname,
            ca_bundle: config.ca_bundle.ok_or_else(|| required("ca_bundle"))?,
            user_proxy: config.user_proxy.ok_or_else(|| required("user_proxy"))?,
            port: config.port.unwrap_or(DEFAULT_PORT),
            timeout: Duration::from_secs(timeout),
            backoff: Duration::from_secs(config.backoff.unwrap_or(DEFAULT_BACKOFF.as_secs())),
            warning_days,
            artifact_dir: config.artifact_dir.unwrap_or_else(std::env::temp_dir),
            source,
            probe_command: config.probe_command,
            verifier: config.verifier.unwrap_or(VerifierKind::Library),
            output: config.output.unwrap_or(OutputFormat::Text),
        })
    }

    /// Generates an example configuration file in TOML format.
    pub fn example_toml() -> String {
        let example = Config {
            hostname: Some("ce.example.org".to_string()),
            probe_command: Some(PathBuf::from("/usr/libexec/argo/probes/htcondorce/fetch-cert")),
            ..Config::defaults()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

impl Settings {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user_proxy: self.user_proxy.clone(),
        }
    }

    /// Builds the certificate source selected by `source`.
    pub fn certificate_source(&self) -> BoxedSource {
        let credentials = Some(self.credentials());
        match (self.source, &self.probe_command) {
            (SourceKind::Command, Some(program)) => Box::new(
                CommandProbeSource::new(program.clone(), credentials).with_port(self.port),
            ),
            _ => Box::new(
                TlsProbeSource::new(credentials)
                    .with_port(self.port)
                    .with_timeout(self.timeout),
            ),
        }
    }

    /// Builds the checker for these settings.
    pub fn checker(&self) -> Result<Checker, CheckError> {
        let target = Target::new(
            self.hostname.clone(),
            self.ca_bundle.clone(),
            self.credentials(),
        )?;
        let backoff = self.backoff;
        Ok(Checker::new(target, self.certificate_source())
            .with_boxed_verifier(self.verifier.build())
            .with_policy(ExpiryPolicy {
                warning_days: self.warning_days,
            })
            .with_artifact_dir(self.artifact_dir.clone())
            .map_fetcher(|fetcher| fetcher.with_backoff(backoff)))
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    #[error("IO Error: {0}")]
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    #[error("Parse Error: {0}")]
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    #[error("Validation Error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
            hostname = "ce.example.org"
            ca_bundle = "/etc/grid-security/bundle.pem"
            timeout = 120
            warning_days = 14
            source = "command"
            probe_command = "/usr/bin/fetch-cert"
            verifier = "openssl"
            output = "json"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.hostname, Some("ce.example.org".to_string()));
        assert_eq!(
            config.ca_bundle,
            Some(PathBuf::from("/etc/grid-security/bundle.pem"))
        );
        assert_eq!(config.timeout, Some(120));
        assert_eq!(config.warning_days, Some(14));
        assert_eq!(config.source, Some(SourceKind::Command));
        assert_eq!(config.verifier, Some(VerifierKind::Openssl));
        assert_eq!(config.output, Some(OutputFormat::Json));
        assert_eq!(config.user_proxy, None);
    }

    #[test]
    fn test_config_merge() {
        let file_config = Config {
            hostname: Some("file.example.org".to_string()),
            timeout: Some(30),
            warning_days: Some(10),
            ..Config::default()
        };
        let cli_config = Config {
            hostname: Some("cli.example.org".to_string()),
            output: Some(OutputFormat::Json),
            ..Config::default()
        };

        let merged = Config::defaults()
            .merge_with(file_config)
            .merge_with(cli_config);

        assert_eq!(merged.hostname, Some("cli.example.org".to_string()));
        assert_eq!(merged.timeout, Some(30)); // from file
        assert_eq!(merged.warning_days, Some(10)); // from file
        assert_eq!(merged.output, Some(OutputFormat::Json)); // from cli
        assert_eq!(merged.port, Some(DEFAULT_PORT)); // default
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Config {
            hostname: Some("ce.example.org".to_string()),
            ..Config::default()
        }
        .resolve()
        .unwrap();

        assert_eq!(settings.ca_bundle, PathBuf::from(DEFAULT_CA_BUNDLE));
        assert_eq!(settings.user_proxy, PathBuf::from(DEFAULT_USER_PROXY));
        assert_eq!(settings.port, 9619);
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.backoff, Duration::from_secs(30));
        assert_eq!(settings.warning_days, 30);
        assert_eq!(settings.source, SourceKind::Tls);
        assert_eq!(settings.verifier, VerifierKind::Library);
        assert_eq!(settings.output, OutputFormat::Text);
    }

    #[test]
    fn test_resolve_requires_hostname() {
        match Config::default().resolve() {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("hostname")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_command_source_requires_program() {
        let config = Config {
            hostname: Some("ce.example.org".to_string()),
            source: Some(SourceKind::Command),
            ..Config::default()
        };
        assert!(matches!(config.resolve(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_settings_build_checker() {
        let settings = Config {
            hostname: Some("ce.example.org".to_string()),
            artifact_dir: Some(PathBuf::from("/var/tmp")),
            ..Config::default()
        }
        .resolve()
        .unwrap();

        let checker = settings.checker().unwrap();
        assert_eq!(checker.target().hostname(), "ce.example.org");
        assert_eq!(
            checker.artifact_path(),
            PathBuf::from("/var/tmp/ce.example.org.pem")
        );
    }

    #[test]
    fn test_invalid_toml() {
        let invalid_toml = "hostname = [invalid toml";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::from_file(temp_file.path());
        assert!(result.is_err());

        match result.unwrap_err() {
            ConfigError::Parse(_) => {} // Expected
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_verifier_is_parse_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"verifier = \"gnutls\"").unwrap();
        assert!(matches!(
            Config::from_file(temp_file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_error_messages() {
        let missing = Config::from_file("/nonexistent/condor-certcheck.toml").unwrap_err();
        assert!(missing.to_string().starts_with("IO Error: "));
        assert_eq!(
            ConfigError::Validation("hostname is required".to_string()).to_string(),
            "Validation Error: hostname is required"
        );
        let source: &dyn std::error::Error = &missing;
        assert!(source.source().is_none());
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml();

        // Should be valid TOML
        let parsed: Config = toml::from_str(&example).unwrap();

        assert_eq!(parsed.hostname, Some("ce.example.org".to_string()));
        assert!(parsed.resolve().is_ok());
    }
}
