//! sslcheck - TLS probing for monitoring plugins
//!
//! This crate opens TLS sessions for service checks and turns the peer
//! certificate's expiry date into an OK / WARNING / CRITICAL / UNKNOWN
//! verdict.

pub mod severity;
pub mod tls;

pub use severity::Severity;
