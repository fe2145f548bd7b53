//! TLS probe session
//!
//! A session is created by [`ProbeConfig::connect`] over a socket the caller
//! already connected, and owns the TLS state until it is cleaned up or
//! dropped. Each session is independent; nothing is shared between them.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use chrono::{DateTime, Utc};
use openssl::ssl::{Ssl, SslStream};
use socket2::SockRef;
use tracing::{debug, warn};

use super::cert::PeerCertificate;
use super::config::{ProbeConfig, ProbeError};
use super::expiry::{evaluate, ExpiryThresholds, ExpiryVerdict};

/// Live TLS session to the probed host
pub struct ProbeSession {
    stream: SslStream<TcpStream>,
    config: ProbeConfig,
    failed: bool,
    shut_down: bool,
}

impl ProbeSession {
    /// Create a client TLS connection (perform handshake)
    pub(crate) fn connect(tcp_stream: TcpStream, config: ProbeConfig) -> Result<Self, ProbeError> {
        if let Some(timeout) = config.timeout {
            let socket = SockRef::from(&tcp_stream);
            socket.set_read_timeout(Some(timeout))?;
            socket.set_write_timeout(Some(timeout))?;
        }

        let mut ssl = Ssl::new(&config.ctx).map_err(ProbeError::SessionSetup)?;

        if let Some(ref servername) = config.servername {
            ssl.set_hostname(servername).map_err(ProbeError::SessionSetup)?;
        }

        // Blocking handshake; the socket stays in blocking mode
        let stream = match ssl.connect(tcp_stream) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(request = %config.request, error = %e, "TLS handshake failed");
                return Err(ProbeError::HandshakeFailed(e.to_string()));
            }
        };

        debug!(
            version = stream.ssl().version_str(),
            cipher = stream.ssl().current_cipher().map(|c| c.name()),
            servername = config.servername.as_deref(),
            "TLS session established"
        );

        Ok(ProbeSession {
            stream,
            config,
            failed: false,
            shut_down: false,
        })
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Negotiated protocol version (e.g. "TLSv1.2")
    pub fn protocol_version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    /// Negotiated cipher suite
    pub fn cipher(&self) -> Option<&'static str> {
        self.stream.ssl().current_cipher().map(|c| c.name())
    }

    /// Check if an I/O operation failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Check if the session has been cleaned up
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Get reference to underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }

    /// Read decrypted data
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError> {
        self.ensure_open()?;
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            ProbeError::Io(e)
        })
    }

    /// Write data to be encrypted
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, ProbeError> {
        self.ensure_open()?;
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            ProbeError::Io(e)
        })
    }

    /// The server's certificate, if it sent one
    pub fn peer_certificate(&self) -> Option<PeerCertificate> {
        self.stream
            .ssl()
            .peer_certificate()
            .map(|cert| PeerCertificate::from_x509(&cert))
    }

    /// Evaluate the server certificate's expiry against the current time
    pub fn check_certificate(&self, thresholds: ExpiryThresholds) -> Result<ExpiryVerdict, ProbeError> {
        self.check_certificate_at(Utc::now(), thresholds)
    }

    /// Evaluate the server certificate's expiry against `now`
    pub fn check_certificate_at(
        &self,
        now: DateTime<Utc>,
        thresholds: ExpiryThresholds,
    ) -> Result<ExpiryVerdict, ProbeError> {
        evaluate(self.peer_certificate().as_ref(), now, thresholds)
    }

    /// Shut the TLS layer down
    ///
    /// Safe to call any number of times; only the first call does anything.
    /// The socket itself is closed when the session is dropped.
    pub fn cleanup(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        // A failed connection cannot send close_notify
        if !self.failed {
            if let Err(e) = self.stream.shutdown() {
                debug!(error = %e, "TLS shutdown incomplete");
            }
        }
        debug!("TLS session cleaned up");
    }

    fn ensure_open(&self) -> Result<(), ProbeError> {
        if self.shut_down {
            return Err(ProbeError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "TLS session already cleaned up",
            )));
        }
        Ok(())
    }
}

impl Drop for ProbeSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}
