//! Monitoring status vocabulary
//!
//! Every probe operation reports one of four states, following the
//! monitoring plugin conventions (the numeric value is the plugin exit code).

use std::fmt;

/// Probe result state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Certificate is safely beyond the warning threshold
    Ok,
    /// Certificate expiry is approaching
    Warning,
    /// Expiry is imminent or has happened, or the handshake failed
    Critical,
    /// Configuration or library capability mismatch
    Unknown,
}

impl Severity {
    /// Exit code a plugin shell reports for this state
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }

    /// Get state as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
