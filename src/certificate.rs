use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1StringRef, Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::x509::X509;

use crate::error::CheckError;

/// Raw PEM text of the server certificate as returned by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    pem: String,
}

impl CertificateMaterial {
    pub fn new(pem: impl Into<String>) -> Self {
        CertificateMaterial { pem: pem.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.pem
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.pem.as_bytes()
    }
}

/// The parts of the server certificate the check looks at.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub common_name: Option<String>,
    pub sans: Vec<String>,
    pub not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    /// Decodes the first certificate found in `pem`.
    pub fn from_pem(pem: &[u8]) -> Result<ParsedCertificate, CheckError> {
        let cert = X509::from_pem(pem).map_err(|e| CheckError::Parse {
            reason: e.to_string(),
        })?;
        Self::from_x509(&cert)
    }

    pub fn from_x509(cert: &X509) -> Result<ParsedCertificate, CheckError> {
        let common_name = cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .map(|entry| decode_common_name(entry.data()))
            .transpose()?;

        let sans = cert
            .subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.dnsname().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ParsedCertificate {
            common_name,
            sans,
            not_after: to_utc(cert.not_after())?,
        })
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_after
    }
}

/// `as_utf8` stops at the first NUL, so a CN such as `host\0.evil` would
/// otherwise be read as `host`.
fn decode_common_name(data: &Asn1StringRef) -> Result<String, CheckError> {
    let decoded = data
        .as_utf8()
        .map_err(|e| CheckError::Parse {
            reason: format!("cannot decode CN: {}", e),
        })?
        .to_string();
    if let Ok(raw) = std::str::from_utf8(data.as_slice()) {
        if raw.len() > decoded.len() && raw.starts_with(decoded.as_str()) {
            return Err(CheckError::Parse {
                reason: "CN contains a NUL byte".to_string(),
            });
        }
    }
    Ok(decoded)
}

fn to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CheckError> {
    let parse_error = |reason: String| CheckError::Parse { reason };
    let epoch = Asn1Time::from_unix(0).map_err(|e| parse_error(e.to_string()))?;
    let diff = epoch.diff(time).map_err(|e| parse_error(e.to_string()))?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| parse_error(format!("notAfter {} is out of range", time)))
}
