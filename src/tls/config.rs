//! Probe configuration
//!
//! This module provides the protocol vocabulary, the probe error type and
//! the client configuration builder.

use std::fmt;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use openssl::error::ErrorStack;
use openssl::ssl::{SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode, SslVersion};
use tracing::debug;

use super::policy::{resolve, Capabilities, NegotiationDirective};
use super::session::ProbeSession;
use crate::severity::Severity;

/// Concrete SSL/TLS protocol version, ordered oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// SSL 2.0
    Ssl2,
    /// SSL 3.0
    Ssl3,
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
}

impl ProtocolVersion {
    /// All versions, oldest first
    pub const ALL: [ProtocolVersion; 5] = [
        ProtocolVersion::Ssl2,
        ProtocolVersion::Ssl3,
        ProtocolVersion::Tls10,
        ProtocolVersion::Tls11,
        ProtocolVersion::Tls12,
    ];

    /// Get version as string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Ssl2 => "SSLv2",
            ProtocolVersion::Ssl3 => "SSLv3",
            ProtocolVersion::Tls10 => "TLSv1",
            ProtocolVersion::Tls11 => "TLSv1.1",
            ProtocolVersion::Tls12 => "TLSv1.2",
        }
    }

    fn protocol_phrase(&self) -> &'static str {
        match self {
            ProtocolVersion::Ssl2 => "SSL protocol version 2",
            ProtocolVersion::Ssl3 => "SSL protocol version 3",
            ProtocolVersion::Tls10 => "TLS protocol version 1",
            ProtocolVersion::Tls11 => "TLS protocol version 1.1",
            ProtocolVersion::Tls12 => "TLS protocol version 1.2",
        }
    }

    /// Get OpenSSL protocol version constant
    ///
    /// SSLv2 has no constant in any OpenSSL the `openssl` crate links against.
    pub fn to_openssl_version(&self) -> Option<SslVersion> {
        match self {
            ProtocolVersion::Ssl2 => None,
            ProtocolVersion::Ssl3 => Some(SslVersion::SSL3),
            ProtocolVersion::Tls10 => Some(SslVersion::TLS1),
            ProtocolVersion::Tls11 => Some(SslVersion::TLS1_1),
            ProtocolVersion::Tls12 => Some(SslVersion::TLS1_2),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested protocol: a pinned version, a version floor, or auto negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolRequest {
    /// Negotiate the highest version both sides support
    #[default]
    Auto,
    Ssl2,
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Ssl2OrNewer,
    Ssl3OrNewer,
    Tls10OrNewer,
    Tls11OrNewer,
    Tls12OrNewer,
}

impl ProtocolRequest {
    /// Request exactly `version`
    pub fn exact(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Ssl2 => ProtocolRequest::Ssl2,
            ProtocolVersion::Ssl3 => ProtocolRequest::Ssl3,
            ProtocolVersion::Tls10 => ProtocolRequest::Tls10,
            ProtocolVersion::Tls11 => ProtocolRequest::Tls11,
            ProtocolVersion::Tls12 => ProtocolRequest::Tls12,
        }
    }

    /// Request `version` or anything newer
    pub fn or_newer(version: ProtocolVersion) -> Self {
        match version {
            ProtocolVersion::Ssl2 => ProtocolRequest::Ssl2OrNewer,
            ProtocolVersion::Ssl3 => ProtocolRequest::Ssl3OrNewer,
            ProtocolVersion::Tls10 => ProtocolRequest::Tls10OrNewer,
            ProtocolVersion::Tls11 => ProtocolRequest::Tls11OrNewer,
            ProtocolVersion::Tls12 => ProtocolRequest::Tls12OrNewer,
        }
    }

    /// Version pinned by an exact request
    pub fn exact_version(&self) -> Option<ProtocolVersion> {
        match self {
            ProtocolRequest::Ssl2 => Some(ProtocolVersion::Ssl2),
            ProtocolRequest::Ssl3 => Some(ProtocolVersion::Ssl3),
            ProtocolRequest::Tls10 => Some(ProtocolVersion::Tls10),
            ProtocolRequest::Tls11 => Some(ProtocolVersion::Tls11),
            ProtocolRequest::Tls12 => Some(ProtocolVersion::Tls12),
            _ => None,
        }
    }

    /// Lowest acceptable version of an "-or-newer" request
    pub fn floor(&self) -> Option<ProtocolVersion> {
        match self {
            ProtocolRequest::Ssl2OrNewer => Some(ProtocolVersion::Ssl2),
            ProtocolRequest::Ssl3OrNewer => Some(ProtocolVersion::Ssl3),
            ProtocolRequest::Tls10OrNewer => Some(ProtocolVersion::Tls10),
            ProtocolRequest::Tls11OrNewer => Some(ProtocolVersion::Tls11),
            ProtocolRequest::Tls12OrNewer => Some(ProtocolVersion::Tls12),
            _ => None,
        }
    }
}

impl FromStr for ProtocolRequest {
    type Err = ProbeError;

    /// Parse a protocol request (case-insensitive, trailing `+` means "or newer")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "auto" {
            return Ok(ProtocolRequest::Auto);
        }

        let (base, or_newer) = match lower.strip_suffix('+') {
            Some(base) => (base, true),
            None => (lower.as_str(), false),
        };

        let version = match base {
            "sslv2" | "ssl2" | "2" => ProtocolVersion::Ssl2,
            "sslv3" | "ssl3" | "3" => ProtocolVersion::Ssl3,
            "tlsv1" | "tlsv1.0" | "tls1" | "tls1.0" | "1" | "1.0" => ProtocolVersion::Tls10,
            "tlsv1.1" | "tls1.1" | "1.1" => ProtocolVersion::Tls11,
            "tlsv1.2" | "tls1.2" | "1.2" => ProtocolVersion::Tls12,
            _ => return Err(ProbeError::InvalidProtocol(s.to_string())),
        };

        Ok(if or_newer {
            ProtocolRequest::or_newer(version)
        } else {
            ProtocolRequest::exact(version)
        })
    }
}

impl fmt::Display for ProtocolRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(version) = self.exact_version() {
            f.write_str(version.as_str())
        } else if let Some(floor) = self.floor() {
            write!(f, "{}+", floor)
        } else {
            f.write_str("auto")
        }
    }
}

/// What the linked SSL library cannot do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    /// The protocol version itself is not compiled in
    Version(ProtocolVersion),
    /// The version cannot be switched off
    Disabling(ProtocolVersion),
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::Version(v) => write!(
                f,
                "{} is not supported by your SSL library.",
                v.protocol_phrase()
            ),
            Unsupported::Disabling(v) => {
                write!(f, "Disabling {} is not supported by your SSL library.", v)
            }
        }
    }
}

/// Probe errors
///
/// The `Display` text of each variant is the single line a monitoring
/// plugin prints for it.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{0}")]
    UnsupportedProtocol(Unsupported),

    #[error("Invalid SSL/TLS protocol version: {0}")]
    InvalidProtocol(String),

    #[error("Cannot create SSL context.")]
    ContextCreationFailed(#[source] ErrorStack),

    #[error("Cannot load client certificate or key from {}.", .path.display())]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: ErrorStack,
    },

    #[error("Private key does not seem to match certificate!")]
    PrivateKeyMismatch,

    #[error("Cannot initiate SSL handshake.")]
    SessionSetup(#[source] ErrorStack),

    #[error("Cannot make SSL connection.")]
    HandshakeFailed(String),

    #[error("Cannot retrieve server certificate.")]
    NoCertificate,

    #[error("Cannot retrieve certificate subject.")]
    NoSubject,

    #[error("Wrong time format in certificate.")]
    MalformedTimestamp,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Monitoring state this failure reports
    ///
    /// Capability and configuration mismatches are UNKNOWN, everything else
    /// is CRITICAL.
    pub fn severity(&self) -> Severity {
        match self {
            ProbeError::UnsupportedProtocol(_) | ProbeError::InvalidProtocol(_) => Severity::Unknown,
            _ => Severity::Critical,
        }
    }
}

/// Probe configuration (immutable after building)
#[derive(Clone)]
pub struct ProbeConfig {
    pub(crate) ctx: SslContext,
    pub(crate) request: ProtocolRequest,
    pub(crate) directive: NegotiationDirective,
    pub(crate) servername: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl ProbeConfig {
    /// Create a new configuration builder
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::new()
    }

    /// Requested protocol
    pub fn request(&self) -> ProtocolRequest {
        self.request
    }

    /// Directive the context was built from
    pub fn directive(&self) -> &NegotiationDirective {
        &self.directive
    }

    /// SNI servername, if any
    pub fn servername(&self) -> Option<&str> {
        self.servername.as_deref()
    }

    /// Socket timeout applied before the handshake
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Perform the TLS handshake over an already connected socket
    pub fn connect(&self, stream: impl Into<TcpStream>) -> Result<ProbeSession, ProbeError> {
        ProbeSession::connect(stream.into(), self.clone())
    }
}

/// Probe configuration builder
pub struct ProbeConfigBuilder {
    request: ProtocolRequest,
    servername: Option<String>,
    client_cert: Option<(PathBuf, PathBuf)>,
    timeout: Option<Duration>,
    capabilities: Capabilities,
}

impl ProbeConfigBuilder {
    fn new() -> Self {
        ProbeConfigBuilder {
            request: ProtocolRequest::Auto,
            servername: None,
            client_cert: None,
            timeout: None,
            capabilities: Capabilities::linked(),
        }
    }

    /// Set the requested protocol
    pub fn protocol(mut self, request: ProtocolRequest) -> Self {
        self.request = request;
        self
    }

    /// Set SNI servername
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Present a client certificate (both files PEM)
    pub fn client_cert<P: AsRef<Path>, K: AsRef<Path>>(mut self, cert: P, key: K) -> Self {
        self.client_cert = Some((cert.as_ref().to_path_buf(), key.as_ref().to_path_buf()));
        self
    }

    /// Set read/write timeout on the socket, covering the handshake
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the library capabilities the protocol request is resolved against
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Resolve the protocol request and build the SSL context
    pub fn build(self) -> Result<ProbeConfig, ProbeError> {
        let directive = resolve(self.request, &self.capabilities)?;

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())
            .map_err(ProbeError::ContextCreationFailed)?;

        // Trust validation is not a probe concern
        ctx_builder.set_verify(SslVerifyMode::NONE);

        directive.apply(&mut ctx_builder)?;

        if let Some((cert, key)) = &self.client_cert {
            // Key first: loading a mismatched key after the certificate fails
            // outright, while loading the certificate after it only drops the key
            ctx_builder
                .set_private_key_file(key, SslFiletype::PEM)
                .map_err(|source| ProbeError::CertificateLoad {
                    path: key.clone(),
                    source,
                })?;
            ctx_builder
                .set_certificate_file(cert, SslFiletype::PEM)
                .map_err(|source| ProbeError::CertificateLoad {
                    path: cert.clone(),
                    source,
                })?;
            ctx_builder
                .check_private_key()
                .map_err(|_| ProbeError::PrivateKeyMismatch)?;
        }

        debug!(
            request = %self.request,
            method = ?directive.method,
            disabled = ?directive.disabled,
            "built probe context"
        );

        Ok(ProbeConfig {
            ctx: ctx_builder.build(),
            request: self.request,
            directive,
            servername: self.servername,
            timeout: self.timeout,
        })
    }
}
