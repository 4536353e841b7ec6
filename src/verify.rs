//! Path validation of issued certificates against a root.
//!
//! Uses the same WebPKI verifiers a rustls client or server would, so a
//! certificate that passes here is accepted by real TLS peers trusting the root.

use crate::cert::SignedCertificate;
use crate::error::{Error, Result};
use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::sync::Arc;
use x509_parser::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    ServerAuth,
    ClientAuth,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn root_store(root: &SignedCertificate) -> Result<Arc<RootCertStore>> {
    let mut roots = RootCertStore::empty();
    roots.add(root.to_certificate_der())?;
    Ok(Arc::new(roots))
}

/// Validates `leaf` against `root` at the current time. For server auth the
/// certificate must also be valid for `hostname` (a DNS name or IP address).
pub fn verify_leaf(
    root: &SignedCertificate,
    leaf: &SignedCertificate,
    hostname: &str,
    purpose: Purpose,
) -> Result<()> {
    verify_leaf_at(root, leaf, hostname, purpose, UnixTime::now())
}

pub fn verify_leaf_at(
    root: &SignedCertificate,
    leaf: &SignedCertificate,
    hostname: &str,
    purpose: Purpose,
    now: UnixTime,
) -> Result<()> {
    let roots = root_store(root)?;
    let end_entity = leaf.to_certificate_der();

    match purpose {
        Purpose::ServerAuth => {
            let server_name = ServerName::try_from(hostname)
                .map_err(|e| Error::InvalidInput(format!("invalid hostname '{}': {}", hostname, e)))?;

            let verifier = WebPkiServerVerifier::builder_with_provider(roots, provider())
                .build()
                .map_err(|e| Error::Verification(e.to_string()))?;
            verifier.verify_server_cert(&end_entity, &[], &server_name, &[], now)?;
        }
        Purpose::ClientAuth => {
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider())
                .build()
                .map_err(|e| Error::Verification(e.to_string()))?;
            verifier.verify_client_cert(&end_entity, &[], now)?;
        }
    }

    tracing::debug!(hostname, ?purpose, "certificate verified against root");
    Ok(())
}

/// Checks the signature on `cert` with the public key of `issuer`.
pub fn verify_signature(cert: &SignedCertificate, issuer: &SignedCertificate) -> Result<()> {
    let (_, cert) = X509Certificate::from_der(cert.der())?;
    let (_, issuer) = X509Certificate::from_der(issuer.der())?;

    cert.verify_signature(Some(issuer.public_key()))
        .map_err(|e| Error::Verification(format!("signature check failed: {}", e)))
}
