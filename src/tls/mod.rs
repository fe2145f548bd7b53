//! TLS session setup and certificate expiry checks
//!
//! This module lets a monitoring probe open a TLS session over a socket it
//! already connected, and grade the server certificate by how soon it
//! expires.
//!
//! # Architecture
//!
//! 1. `policy::resolve` turns a `ProtocolRequest` into a
//!    `NegotiationDirective` for the linked OpenSSL build
//! 2. `ProbeConfig` builds the SSL context from that directive
//! 3. `ProbeSession` owns one handshaken connection; read, write, check the
//!    certificate, clean up
//! 4. `expiry::evaluate` grades a `PeerCertificate` into an `ExpiryVerdict`
//!
//! # Examples
//!
//! ```no_run
//! use sslcheck::tls::{ExpiryThresholds, ProbeConfig, ProtocolRequest};
//! use std::net::TcpStream;
//!
//! let config = ProbeConfig::builder()
//!     .protocol(ProtocolRequest::Tls12OrNewer)
//!     .servername("example.com")
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let mut session = config.connect(tcp_stream).unwrap();
//! let verdict = session.check_certificate(ExpiryThresholds::new(30, 14)).unwrap();
//! println!("{}", verdict);
//! session.cleanup();
//! ```

pub mod cert;
pub mod config;
pub mod expiry;
pub mod policy;
pub mod session;
pub mod timestamp;
pub mod zone;

pub use cert::PeerCertificate;
pub use config::{
    ProbeConfig, ProbeConfigBuilder, ProbeError, ProtocolRequest, ProtocolVersion, Unsupported,
};
pub use expiry::{evaluate, ExpiryThresholds, ExpiryVerdict};
pub use policy::{resolve, Capabilities, Method, NegotiationDirective};
pub use session::ProbeSession;
pub use timestamp::{CalendarMoment, RawCertificateTimestamp, TimestampEncoding};

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
