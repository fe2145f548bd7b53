//! Certificate expiry evaluation
//!
//! Turns a peer certificate's not-after time into a monitoring verdict.
//! Days left are whole seconds divided by 86400, truncated toward zero, so
//! anything expiring within the next day reports in hours or minutes.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::cert::PeerCertificate;
use super::config::ProbeError;
use super::timestamp::CalendarMoment;
use super::zone::render_utc;
use crate::severity::Severity;

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;

/// Warning and critical thresholds, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryThresholds {
    pub warn_days: i64,
    pub crit_days: i64,
}

impl ExpiryThresholds {
    pub fn new(warn_days: i64, crit_days: i64) -> Self {
        ExpiryThresholds { warn_days, crit_days }
    }
}

/// Outcome of an expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryVerdict {
    pub severity: Severity,
    pub message: String,
    pub days_left: i64,
    pub seconds_left: i64,
}

impl fmt::Display for ExpiryVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.severity, self.message)
    }
}

/// Evaluate how close `cert` is to expiry at `now`
pub fn evaluate(
    cert: Option<&PeerCertificate>,
    now: DateTime<Utc>,
    thresholds: ExpiryThresholds,
) -> Result<ExpiryVerdict, ProbeError> {
    let cert = cert.ok_or(ProbeError::NoCertificate)?;
    let cn = cert.display_name();

    let expiry = CalendarMoment::decode(&cert.not_after)?.to_instant()?;
    let seconds_left = expiry.timestamp() - now.timestamp();
    let days_left = seconds_left / SECONDS_PER_DAY;
    let timestamp = render_utc(&expiry);

    // Within the warning window, the critical threshold decides
    let approaching = if days_left > thresholds.crit_days {
        Severity::Warning
    } else {
        Severity::Critical
    };

    let (severity, message) = if days_left > 0 && days_left <= thresholds.warn_days {
        (
            approaching,
            format!("Certificate '{}' expires in {} day(s) ({}).", cn, days_left, timestamp),
        )
    } else if days_left == 0 && seconds_left > 0 {
        let (remaining, unit) = if seconds_left >= SECONDS_PER_HOUR {
            (seconds_left / SECONDS_PER_HOUR, "hours")
        } else {
            (seconds_left / 60, "minutes")
        };
        (
            approaching,
            format!("Certificate '{}' expires in {} {} ({}).", cn, remaining, unit, timestamp),
        )
    } else if seconds_left < 0 {
        (
            Severity::Critical,
            format!("Certificate '{}' expired on {}.", cn, timestamp),
        )
    } else if days_left == 0 {
        (
            approaching,
            format!("Certificate '{}' just expired ({}).", cn, timestamp),
        )
    } else {
        (
            Severity::Ok,
            format!("Certificate '{}' will expire on {}.", cn, timestamp),
        )
    };

    debug!(cn, days_left, seconds_left, %severity, "evaluated certificate expiry");

    Ok(ExpiryVerdict {
        severity,
        message,
        days_left,
        seconds_left,
    })
}
