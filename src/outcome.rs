//! Probe result vocabulary shared with the monitoring framework.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// Monitoring severity of a check result.
///
/// The exit codes follow the Nagios plugin convention and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    /// Process exit code for this severity.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }
}

/// The single terminal result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub severity: Severity,
    pub message: String,
}

impl ValidationOutcome {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        ValidationOutcome {
            severity,
            message: message.into(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Severity::Unknown, message)
    }

    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }

    /// Renders the outcome as a single-line JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"severity\":\"{}\",\"message\":\"unserializable\"}}",
                self.severity
            )
        })
    }
}

/// `SEVERITY - message`, with line breaks flattened so the output stays on
/// one line.
impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message.replace(['\r', '\n'], " ");
        write!(f, "{} - {}", self.severity, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Severity::Ok.exit_code(), 0);
        assert_eq!(Severity::Warning.exit_code(), 1);
        assert_eq!(Severity::Critical.exit_code(), 2);
        assert_eq!(Severity::Unknown.exit_code(), 3);
    }

    #[test]
    fn test_severity_labels() {
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::from_str("critical").unwrap(), Severity::Critical);
    }

    #[test]
    fn test_outcome_is_single_line() {
        let outcome = ValidationOutcome::unknown("first\nsecond");
        assert_eq!(outcome.to_string(), "UNKNOWN - first second");
    }

    #[test]
    fn test_outcome_json() {
        let outcome = ValidationOutcome::critical("invalid CA chain");
        assert_eq!(
            outcome.to_json(),
            r#"{"severity":"CRITICAL","message":"invalid CA chain"}"#
        );
    }
}
