//! Certificates and fakes shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use condor_certcheck::source::DaemonLocation;
use condor_certcheck::{CertificateSource, FetchError};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Authority {
    pub cert: X509,
    pub key: PKey<Private>,
}

fn key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn builder_name(cn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    name.build()
}

fn builder(cn: &str, key: &PKey<Private>, not_before: i64, not_after: i64) -> X509Builder {
    let name = builder_name(cn);

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(not_before).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    builder
}

impl Authority {
    pub fn new(cn: &str) -> Authority {
        let now = Utc::now();
        Authority::valid_between(cn, now - ChronoDuration::days(1), now + ChronoDuration::days(3650))
    }

    /// Self-signed CA with the given validity period.
    pub fn valid_between(cn: &str, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Authority {
        let key = key();
        let mut builder = builder(cn, &key, not_before.timestamp(), not_after.timestamp());
        let subject = builder_name(cn);
        builder.set_issuer_name(&subject).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        Authority {
            cert: builder.build(),
            key,
        }
    }

    /// Leaf certificate for `cn` and `sans`, valid until `not_after`.
    pub fn issue(&self, cn: &str, sans: &[&str], not_after: DateTime<Utc>) -> X509 {
        let not_before = not_after.min(Utc::now()) - ChronoDuration::days(1);
        self.issue_between(cn, sans, not_before, not_after)
    }

    pub fn issue_between(
        &self,
        cn: &str,
        sans: &[&str],
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> X509 {
        let key = key();
        let mut builder = builder(cn, &key, not_before.timestamp(), not_after.timestamp());
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        if !sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for name in sans {
                san.dns(name);
            }
            let extension = san
                .build(&builder.x509v3_context(Some(&*self.cert), None))
                .unwrap();
            builder.append_extension(extension).unwrap();
        }
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    pub fn write_bundle(&self, dir: &Path) -> PathBuf {
        let path = dir.join("ca-bundle.pem");
        fs::write(&path, self.cert.to_pem().unwrap()).unwrap();
        path
    }
}

pub fn pem(cert: &X509) -> String {
    String::from_utf8(cert.to_pem().unwrap()).unwrap()
}

/// Source replaying canned probe responses.
#[derive(Clone)]
pub struct FakeSource {
    responses: Arc<Mutex<Vec<Result<Option<String>, String>>>>,
    pub probes: Arc<AtomicUsize>,
    delay: Duration,
}

impl FakeSource {
    pub fn new(responses: Vec<Result<Option<String>, String>>) -> FakeSource {
        FakeSource {
            responses: Arc::new(Mutex::new(responses)),
            probes: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn returning(pem: String) -> FakeSource {
        FakeSource::new(vec![Ok(Some(pem))])
    }

    pub fn with_delay(mut self, delay: Duration) -> FakeSource {
        self.delay = delay;
        self
    }
}

impl CertificateSource for FakeSource {
    fn locate(&self, hostname: &str) -> Result<DaemonLocation, FetchError> {
        Ok(DaemonLocation {
            name: hostname.to_string(),
            pool: format!("{}:9619", hostname),
            address: None,
        })
    }

    fn probe(&self, _daemon: &DaemonLocation) -> Result<Option<String>, FetchError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(None);
        }
        responses.remove(0).map_err(|reason| FetchError::Handshake {
            address: "127.0.0.1:9619".to_string(),
            details: reason,
        })
    }
}
