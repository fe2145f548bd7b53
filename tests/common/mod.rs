//! Shared helpers for integration tests
//!
//! Generates throwaway certificates and runs a one-shot TLS server on a
//! loopback port.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{Ssl, SslContextBuilder, SslMethod, SslVersion};
use openssl::x509::{X509Name, X509};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// Self-signed certificate for `cn`, valid until `not_after` (ASN.1 time string)
pub fn generate_cert(cn: &str, not_after: &str) -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509Name::builder().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::from_unix(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::from_str(not_after).unwrap()).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// One-shot TLS server
pub struct TestServer {
    pub addr: SocketAddr,
    handle: JoinHandle<Option<String>>,
}

impl TestServer {
    /// Serve one connection, echoing everything back until the client closes
    ///
    /// `min_version` restricts what the server accepts.
    pub fn echo(cert: X509, key: PKey<Private>, min_version: Option<SslVersion>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut ctx = SslContextBuilder::new(SslMethod::tls_server()).unwrap();
        ctx.set_certificate(&cert).unwrap();
        ctx.set_private_key(&key).unwrap();
        ctx.set_min_proto_version(min_version).unwrap();
        let ctx = ctx.build();

        let handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            let ssl = Ssl::new(&ctx).unwrap();
            // Handshake failures are part of some tests
            let mut tls = ssl.accept(tcp_stream).ok()?;
            let servername = tls
                .ssl()
                .servername(openssl::ssl::NameType::HOST_NAME)
                .map(str::to_string);

            let mut buf = [0u8; 1024];
            loop {
                match tls.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tls.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = tls.shutdown();
            servername
        });

        TestServer { addr, handle }
    }

    /// Open a plain TCP connection to the server
    pub fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).unwrap()
    }

    /// Wait for the server; returns the SNI name it saw, if the handshake succeeded
    pub fn join(self) -> Option<String> {
        self.handle.join().unwrap()
    }
}
