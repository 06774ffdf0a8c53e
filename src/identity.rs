//! Hostname matching against the certificate's CN and SAN entries.
//!
//! Names are treated as glob patterns in which every `*` stands for one or
//! more characters of `[A-Za-z0-9_-]` and everything else is literal. A name
//! matches when the hostname *starts with* something the pattern accepts, so
//! CN `ce.example.org` also accepts `ce.example.org.local`.

use tracing::debug;

use crate::certificate::ParsedCertificate;

/// A compiled CN/SAN name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    // literal pieces between wildcards; `n` pieces means `n - 1` wildcards
    segments: Vec<String>,
}

impl WildcardPattern {
    pub fn new(name: &str) -> Self {
        WildcardPattern {
            segments: name.split('*').map(String::from).collect(),
        }
    }

    /// True when a prefix of `hostname` is accepted by the pattern.
    pub fn matches_prefix(&self, hostname: &str) -> bool {
        let (head, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return false,
        };
        match hostname.strip_prefix(head.as_str()) {
            Some(remaining) => match_after_wildcard(remaining, rest),
            None => false,
        }
    }
}

fn is_wildcard_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Each entry of `segments` is preceded by a wildcard.
fn match_after_wildcard(input: &str, segments: &[String]) -> bool {
    let (literal, rest) = match segments.split_first() {
        Some(split) => split,
        None => return true,
    };
    let run = input.bytes().take_while(|b| is_wildcard_char(*b)).count();
    // the run is ASCII, so every index up to it is a char boundary
    (1..=run).any(|taken| {
        input[taken..]
            .strip_prefix(literal.as_str())
            .is_some_and(|after| match_after_wildcard(after, rest))
    })
}

/// Checks the CN first, then every SAN DNS entry.
///
/// An absent or empty CN never matches; it would otherwise accept any host.
pub fn matches(cert: &ParsedCertificate, hostname: &str) -> bool {
    if let Some(cn) = cert.common_name.as_deref().filter(|cn| !cn.is_empty()) {
        if WildcardPattern::new(cn).matches_prefix(hostname) {
            debug!(cn, hostname, "hostname matches CN");
            return true;
        }
    }

    let san = cert
        .sans
        .iter()
        .filter(|san| !san.is_empty())
        .find(|san| WildcardPattern::new(san).matches_prefix(hostname));
    match san {
        Some(san) => {
            debug!(san = san.as_str(), hostname, "hostname matches SAN");
            true
        }
        None => false,
    }
}
