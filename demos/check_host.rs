//! Checks the schedd certificate of one CE from library code.
//!
//! Run with: cargo run --example check_host -- ce.example.org /path/to/userproxy.pem

use condor_certcheck::config::DEFAULT_CA_BUNDLE;
use condor_certcheck::source::{Credentials, TlsProbeSource};
use condor_certcheck::{Checker, Target};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let hostname = args.next().unwrap_or_else(|| "ce.example.org".to_string());
    let proxy = args
        .next()
        .unwrap_or_else(|| "/etc/sensu/certs/userproxy.pem".to_string());

    let credentials = Credentials {
        user_proxy: proxy.into(),
    };
    let target = Target::new(hostname, DEFAULT_CA_BUNDLE, credentials.clone())?;
    let source = TlsProbeSource::new(Some(credentials)).with_timeout(Duration::from_secs(10));

    let outcome = Checker::new(target, source).validate_within(Duration::from_secs(60));

    println!("Severity: {}", outcome.severity);
    println!("Message: {}", outcome.message);
    println!("Exit code: {}", outcome.exit_code());

    Ok(())
}
