use chrono::{DateTime, Utc};

use crate::outcome::ValidationOutcome;

pub const DEFAULT_WARNING_DAYS: i64 = 30;

/// Expiry thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// WARNING when fewer whole days than this remain
    pub warning_days: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        ExpiryPolicy {
            warning_days: DEFAULT_WARNING_DAYS,
        }
    }
}

impl ExpiryPolicy {
    /// Classifies `not_after` relative to `now`.
    ///
    /// Remaining days are floored, so 29 days and 23 hours count as 29.
    pub fn classify(&self, not_after: DateTime<Utc>, now: DateTime<Utc>) -> ValidationOutcome {
        let expires = format_timestamp(not_after);
        if now >= not_after {
            return ValidationOutcome::critical(format!(
                "HTCondorCE certificate expired (was valid until {})!",
                expires
            ));
        }

        // positive here, so truncation is the floor
        let days = (not_after - now).num_days();
        if days < self.warning_days {
            ValidationOutcome::warning(format!(
                "HTCondorCE certificate will expire in {} day(s) on {}!",
                days, expires
            ))
        } else {
            ValidationOutcome::ok(format!(
                "HTCondorCE certificate valid until {} (expires in {} days)",
                expires, days
            ))
        }
    }
}

/// `Mar 7 12:00:00 2027 UTC`
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.format("%b %-d %H:%M:%S %Y UTC").to_string()
}
