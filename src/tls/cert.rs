//! Peer certificate facts
//!
//! This module extracts what the expiry check needs from an X.509
//! certificate: the subject common name and the raw not-after timestamp.

use foreign_types::ForeignTypeRef;
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use tracing::debug;

use super::config::ProbeError;
use super::timestamp::{RawCertificateTimestamp, TimestampEncoding};

/// Display name used when the subject carries no readable common name
pub const UNKNOWN_CN: &str = "Unknown CN";

const V_ASN1_UTCTIME: libc::c_int = 23;

extern "C" {
    fn ASN1_STRING_type(x: *const openssl_sys::ASN1_STRING) -> libc::c_int;
}

/// Certificate information used by the expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Whether the certificate has a subject at all
    pub has_subject: bool,
    /// Subject common name
    pub common_name: Option<String>,
    /// Not-after timestamp as stored in the certificate
    pub not_after: RawCertificateTimestamp,
}

impl PeerCertificate {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        let subject = cert.subject_name();
        PeerCertificate {
            has_subject: subject.entries().next().is_some(),
            common_name: get_cn(subject),
            not_after: raw_not_after(cert),
        }
    }

    /// Subject common name
    ///
    /// `Ok(None)` means the subject exists but has no readable CN.
    pub fn subject_cn(&self) -> Result<Option<&str>, ProbeError> {
        if !self.has_subject {
            return Err(ProbeError::NoSubject);
        }
        Ok(self.common_name.as_deref())
    }

    /// Name to report the certificate under
    pub fn display_name(&self) -> &str {
        match self.subject_cn() {
            Ok(Some(cn)) => cn,
            Ok(None) => UNKNOWN_CN,
            Err(e) => {
                debug!(error = %e, "certificate has no subject");
                UNKNOWN_CN
            }
        }
    }
}

fn get_cn(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
}

/// Read the not-after ASN1_TIME bytes and their encoding tag
fn raw_not_after(cert: &X509Ref) -> RawCertificateTimestamp {
    let time = cert.not_after().as_ptr() as *const openssl_sys::ASN1_STRING;

    // SAFETY: an ASN1_TIME is an ASN1_STRING; it is owned by `cert`, which
    // outlives this function, and the bytes are copied out before returning.
    unsafe {
        let encoding = if ASN1_STRING_type(time) == V_ASN1_UTCTIME {
            TimestampEncoding::UtcTime
        } else {
            TimestampEncoding::GeneralizedTime
        };

        let len = usize::try_from(openssl_sys::ASN1_STRING_length(time)).unwrap_or(0);
        let data = openssl_sys::ASN1_STRING_get0_data(time);
        let digits = if data.is_null() || len == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(data, len).to_vec()
        };

        RawCertificateTimestamp { encoding, digits }
    }
}
