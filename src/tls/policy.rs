//! Protocol version policy
//!
//! Maps a [`ProtocolRequest`] to the negotiation directive applied to the
//! SSL context: either a pinned method, or auto negotiation with every
//! version older than the requested floor switched off.

use std::collections::BTreeSet;

use openssl::ssl::{SslContextBuilder, SslMode, SslOptions};
use tracing::debug;

use super::config::{ProbeError, ProtocolRequest, ProtocolVersion, Unsupported};

/// Older versions switched off by an "-or-newer" request, newest first.
///
/// Entries marked required must be disabled for the floor to hold; the
/// others are dropped silently when the library cannot disable them.
const DISABLE_CASCADE: [(ProtocolVersion, bool); 4] = [
    (ProtocolVersion::Tls11, true),
    (ProtocolVersion::Tls10, true),
    (ProtocolVersion::Ssl3, false),
    (ProtocolVersion::Ssl2, false),
];

/// What the linked SSL library build can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub ssl2: bool,
    pub ssl3: bool,
    pub tls1_0: bool,
    pub tls1_1: bool,
    pub tls1_2: bool,
    pub disable_ssl2: bool,
    pub disable_ssl3: bool,
    pub disable_tls1_0: bool,
    pub disable_tls1_1: bool,
    pub disable_ticket: bool,
}

impl Capabilities {
    /// Every protocol and control available
    pub fn all() -> Self {
        Capabilities {
            ssl2: true,
            ssl3: true,
            tls1_0: true,
            tls1_1: true,
            tls1_2: true,
            disable_ssl2: true,
            disable_ssl3: true,
            disable_tls1_0: true,
            disable_tls1_1: true,
            disable_ticket: true,
        }
    }

    /// Nothing available
    pub fn none() -> Self {
        Capabilities {
            ssl2: false,
            ssl3: false,
            tls1_0: false,
            tls1_1: false,
            tls1_2: false,
            disable_ssl2: false,
            disable_ssl3: false,
            disable_tls1_0: false,
            disable_tls1_1: false,
            disable_ticket: false,
        }
    }

    /// Capabilities of the OpenSSL build this crate is linked against
    ///
    /// OpenSSL 1.1.0 removed SSLv2 and builds without SSLv3 by default.
    pub fn linked() -> Self {
        let legacy = openssl::version::number() < 0x1010_0000;
        Capabilities {
            ssl2: false,
            ssl3: legacy,
            disable_ssl2: false,
            ..Capabilities::all()
        }
    }

    /// Whether `version` can be pinned as the only protocol
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        match version {
            ProtocolVersion::Ssl2 => self.ssl2,
            ProtocolVersion::Ssl3 => self.ssl3,
            ProtocolVersion::Tls10 => self.tls1_0,
            ProtocolVersion::Tls11 => self.tls1_1,
            ProtocolVersion::Tls12 => self.tls1_2,
        }
    }

    /// Whether `version` can be switched off
    pub fn can_disable(&self, version: ProtocolVersion) -> bool {
        match version {
            ProtocolVersion::Ssl2 => self.disable_ssl2,
            ProtocolVersion::Ssl3 => self.disable_ssl3,
            ProtocolVersion::Tls10 => self.disable_tls1_0,
            ProtocolVersion::Tls11 => self.disable_tls1_1,
            // Nothing newer is ever disabled
            ProtocolVersion::Tls12 => false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::linked()
    }
}

/// Negotiation method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Only this version is offered
    Exact(ProtocolVersion),
    /// Highest mutually supported version
    Negotiate,
}

/// Resolved negotiation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationDirective {
    pub method: Method,
    pub disabled: BTreeSet<ProtocolVersion>,
    pub disable_tickets: bool,
}

impl NegotiationDirective {
    /// Apply the directive to a client context
    pub fn apply(&self, ctx_builder: &mut SslContextBuilder) -> Result<(), ProbeError> {
        if let Method::Exact(version) = self.method {
            let pinned = version
                .to_openssl_version()
                .ok_or(ProbeError::UnsupportedProtocol(Unsupported::Version(version)))?;
            ctx_builder
                .set_min_proto_version(Some(pinned))
                .map_err(ProbeError::ContextCreationFailed)?;
            ctx_builder
                .set_max_proto_version(Some(pinned))
                .map_err(ProbeError::ContextCreationFailed)?;
        }

        let mut options = SslOptions::empty();
        for version in &self.disabled {
            match version {
                ProtocolVersion::Ssl3 => options |= SslOptions::NO_SSLV3,
                ProtocolVersion::Tls10 => options |= SslOptions::NO_TLSV1,
                ProtocolVersion::Tls11 => options |= SslOptions::NO_TLSV1_1,
                ProtocolVersion::Tls12 => options |= SslOptions::NO_TLSV1_2,
                ProtocolVersion::Ssl2 => debug!("SSLv2 is not compiled in, nothing to disable"),
            }
        }
        if self.disable_tickets {
            options |= SslOptions::NO_TICKET;
        }

        ctx_builder.set_options(options);
        ctx_builder.set_mode(SslMode::AUTO_RETRY);
        Ok(())
    }
}

/// Resolve a protocol request against the library capabilities
pub fn resolve(
    request: ProtocolRequest,
    capabilities: &Capabilities,
) -> Result<NegotiationDirective, ProbeError> {
    let mut directive = NegotiationDirective {
        method: Method::Negotiate,
        disabled: BTreeSet::new(),
        disable_tickets: capabilities.disable_ticket,
    };

    if let Some(version) = request.exact_version() {
        if !capabilities.supports(version) {
            return Err(ProbeError::UnsupportedProtocol(Unsupported::Version(version)));
        }
        directive.method = Method::Exact(version);
    } else if let Some(floor) = request.floor() {
        for (version, required) in DISABLE_CASCADE.iter().filter(|(v, _)| *v < floor) {
            if capabilities.can_disable(*version) {
                directive.disabled.insert(*version);
            } else if *required {
                return Err(ProbeError::UnsupportedProtocol(Unsupported::Disabling(*version)));
            }
        }
    }

    debug!(%request, ?directive, "resolved protocol request");
    Ok(directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTS: [ProtocolRequest; 11] = [
        ProtocolRequest::Auto,
        ProtocolRequest::Ssl2,
        ProtocolRequest::Ssl3,
        ProtocolRequest::Tls10,
        ProtocolRequest::Tls11,
        ProtocolRequest::Tls12,
        ProtocolRequest::Ssl2OrNewer,
        ProtocolRequest::Ssl3OrNewer,
        ProtocolRequest::Tls10OrNewer,
        ProtocolRequest::Tls11OrNewer,
        ProtocolRequest::Tls12OrNewer,
    ];

    fn disabled(versions: &[ProtocolVersion]) -> BTreeSet<ProtocolVersion> {
        versions.iter().copied().collect()
    }

    // All 1024 combinations of the ten flags
    fn capability_sets() -> Vec<Capabilities> {
        (0u16..1024)
            .map(|bits| {
                let flag = |n: u16| bits & (1 << n) != 0;
                Capabilities {
                    ssl2: flag(0),
                    ssl3: flag(1),
                    tls1_0: flag(2),
                    tls1_1: flag(3),
                    tls1_2: flag(4),
                    disable_ssl2: flag(5),
                    disable_ssl3: flag(6),
                    disable_tls1_0: flag(7),
                    disable_tls1_1: flag(8),
                    disable_ticket: flag(9),
                }
            })
            .collect()
    }

    #[test]
    fn test_exact_versions() {
        let caps = Capabilities::all();
        for version in ProtocolVersion::ALL {
            let directive = resolve(ProtocolRequest::exact(version), &caps).unwrap();
            assert_eq!(directive.method, Method::Exact(version));
            assert!(directive.disabled.is_empty());
            assert!(directive.disable_tickets);
        }
    }

    #[test]
    fn test_exact_version_not_compiled_in() {
        let caps = Capabilities {
            tls1_1: false,
            ..Capabilities::all()
        };
        let err = resolve(ProtocolRequest::Tls11, &caps).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::UnsupportedProtocol(Unsupported::Version(ProtocolVersion::Tls11))
        ));
        assert_eq!(
            err.to_string(),
            "TLS protocol version 1.1 is not supported by your SSL library."
        );
    }

    #[test]
    fn test_or_newer_cascade() {
        let caps = Capabilities::all();
        let cases = [
            (ProtocolRequest::Ssl2OrNewer, disabled(&[])),
            (ProtocolRequest::Ssl3OrNewer, disabled(&[ProtocolVersion::Ssl2])),
            (
                ProtocolRequest::Tls10OrNewer,
                disabled(&[ProtocolVersion::Ssl2, ProtocolVersion::Ssl3]),
            ),
            (
                ProtocolRequest::Tls11OrNewer,
                disabled(&[ProtocolVersion::Ssl2, ProtocolVersion::Ssl3, ProtocolVersion::Tls10]),
            ),
            (
                ProtocolRequest::Tls12OrNewer,
                disabled(&[
                    ProtocolVersion::Ssl2,
                    ProtocolVersion::Ssl3,
                    ProtocolVersion::Tls10,
                    ProtocolVersion::Tls11,
                ]),
            ),
        ];

        for (request, expected) in cases {
            let directive = resolve(request, &caps).unwrap();
            assert_eq!(directive.method, Method::Negotiate, "{}", request);
            assert_eq!(directive.disabled, expected, "{}", request);
        }
    }

    #[test]
    fn test_optional_disables_are_skipped() {
        let caps = Capabilities {
            disable_ssl2: false,
            disable_ssl3: false,
            ..Capabilities::all()
        };
        let directive = resolve(ProtocolRequest::Tls12OrNewer, &caps).unwrap();
        assert_eq!(
            directive.disabled,
            disabled(&[ProtocolVersion::Tls10, ProtocolVersion::Tls11])
        );
    }

    #[test]
    fn test_required_disable_missing() {
        let caps = Capabilities {
            disable_tls1_1: false,
            ..Capabilities::all()
        };
        let err = resolve(ProtocolRequest::Tls12OrNewer, &caps).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Disabling TLSv1.1 is not supported by your SSL library."
        );
        // TLSv1.1-or-newer never needs to disable TLSv1.1
        assert!(resolve(ProtocolRequest::Tls11OrNewer, &caps).is_ok());

        let caps = Capabilities {
            disable_tls1_0: false,
            ..Capabilities::all()
        };
        for request in [ProtocolRequest::Tls11OrNewer, ProtocolRequest::Tls12OrNewer] {
            let err = resolve(request, &caps).unwrap_err();
            assert!(matches!(
                err,
                ProbeError::UnsupportedProtocol(Unsupported::Disabling(ProtocolVersion::Tls10))
            ));
        }
    }

    #[test]
    fn test_auto_negotiates() {
        let directive = resolve(ProtocolRequest::Auto, &Capabilities::none()).unwrap();
        assert_eq!(directive.method, Method::Negotiate);
        assert!(directive.disabled.is_empty());
        assert!(!directive.disable_tickets);
    }

    #[test]
    fn test_cascade_invariant_over_all_capabilities() {
        for caps in capability_sets() {
            for request in REQUESTS {
                match resolve(request, &caps) {
                    Ok(directive) => {
                        assert_eq!(directive.disable_tickets, caps.disable_ticket);
                        match request.floor() {
                            Some(floor) => {
                                assert_eq!(directive.method, Method::Negotiate);
                                for version in &directive.disabled {
                                    assert!(*version < floor);
                                    assert!(caps.can_disable(*version));
                                }
                                // Every disableable older version is disabled
                                for (version, _) in DISABLE_CASCADE {
                                    if version < floor && caps.can_disable(version) {
                                        assert!(directive.disabled.contains(&version));
                                    }
                                }
                            }
                            None => {
                                assert!(directive.disabled.is_empty());
                                let expected = request
                                    .exact_version()
                                    .map_or(Method::Negotiate, Method::Exact);
                                assert_eq!(directive.method, expected);
                            }
                        }
                    }
                    Err(ProbeError::UnsupportedProtocol(Unsupported::Version(v))) => {
                        assert_eq!(request.exact_version(), Some(v));
                        assert!(!caps.supports(v));
                    }
                    Err(ProbeError::UnsupportedProtocol(Unsupported::Disabling(v))) => {
                        let floor = request.floor().unwrap();
                        assert!(v < floor);
                        assert!(matches!(v, ProtocolVersion::Tls10 | ProtocolVersion::Tls11));
                        assert!(!caps.can_disable(v));
                        // The newest missing required disable is the one reported
                        if v == ProtocolVersion::Tls10 && floor > ProtocolVersion::Tls11 {
                            assert!(caps.can_disable(ProtocolVersion::Tls11));
                        }
                    }
                    Err(other) => panic!("unexpected error {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_apply_to_context() {
        use openssl::ssl::SslMethod;

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client()).unwrap();
        let directive = resolve(ProtocolRequest::Tls12OrNewer, &Capabilities::all()).unwrap();
        directive.apply(&mut ctx_builder).unwrap();

        let options = ctx_builder.options();
        assert!(options.contains(SslOptions::NO_TLSV1));
        assert!(options.contains(SslOptions::NO_TLSV1_1));
        assert!(options.contains(SslOptions::NO_TICKET));
        assert!(!options.contains(SslOptions::NO_TLSV1_2));
    }

    #[test]
    fn test_apply_exact_sslv2() {
        use openssl::ssl::SslMethod;

        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client()).unwrap();
        let directive = resolve(ProtocolRequest::Ssl2, &Capabilities::all()).unwrap();
        assert!(matches!(
            directive.apply(&mut ctx_builder),
            Err(ProbeError::UnsupportedProtocol(Unsupported::Version(ProtocolVersion::Ssl2)))
        ));
    }

    #[test]
    fn test_linked_capabilities() {
        let caps = Capabilities::linked();
        assert!(!caps.ssl2);
        assert!(caps.tls1_2);
        assert!(resolve(ProtocolRequest::Tls12OrNewer, &caps).is_ok());
    }
}
