use crate::cert::{CertificateBuilder, CertificateTemplate, SignedCertificate};
use crate::error::{Error, Result};
use crate::keys::{self, EcSigningKey, PublicKey};
use crate::types::{KeyCurve, SignatureDigest, SubjectName};
use rcgen::string::{Ia5String, PrintableString, TeletexString};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, DnValue, Issuer, KeyIdMethod, KeyPair,
    PublicKeyData, SignatureAlgorithm, SigningKey,
};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;
use x509_parser::prelude::*;

pub const ROOT_COMMON_NAME: &str = "PicoCA Root Certificate Authority";
pub const ROOT_ORGANIZATION: &str = "PicoCA";
pub const ROOT_ORGANIZATIONAL_UNIT: &str = "PicoCA";
/// Twenty years.
pub const ROOT_LIFESPAN_DAYS: i64 = 7304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOrigin {
    /// Read from an existing certificate/key pair.
    Loaded,
    /// Freshly generated and not yet written anywhere.
    Bootstrapped,
}

/// A root identity: private key plus self-signed certificate. Immutable once
/// created, so a single instance can be shared by reference.
pub struct CertificateAuthority {
    key_pair: KeyPair,
    signing_key: EcSigningKey,
    public_key: PublicKey,
    certificate: SignedCertificate,
    subject_name: DistinguishedName,
    key_id: Vec<u8>,
    origin: RootOrigin,
}

impl CertificateAuthority {
    /// Loads the root from `cert_path`/`key_path` when both exist, otherwise
    /// generates a new one. A bootstrapped root is only held in memory.
    pub fn load_or_bootstrap(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        if cert_path.exists() && key_path.exists() {
            Self::load(cert_path, key_path)
        } else {
            tracing::info!(
                cert = %cert_path.display(),
                key = %key_path.display(),
                "root identity not found, bootstrapping a new one"
            );
            Self::bootstrap()
        }
    }

    pub fn bootstrap() -> Result<Self> {
        let key_pair = keys::generate_key(KeyCurve::P384)?;
        let public_key = PublicKey::from_key_pair(&key_pair)?;
        let signing_key = EcSigningKey::from_key_pair(&key_pair)?;

        let template = CertificateBuilder::ca(ROOT_COMMON_NAME)
            .with_organizational_unit(ROOT_ORGANIZATIONAL_UNIT)
            .with_organization(ROOT_ORGANIZATION)
            .with_lifespan_days(ROOT_LIFESPAN_DAYS)
            .build(&public_key, None)?;

        // Self-signature: the issuer is the certificate's own subject.
        let subject_name = template.subject().to_rcgen();
        let key_id = public_key.key_identifier();
        let certificate = sign_template(
            template,
            subject_name.clone(),
            &key_id,
            &signing_key,
            &public_key,
        )?;

        tracing::info!(subject = ROOT_COMMON_NAME, "bootstrapped root certificate authority");

        Ok(Self {
            key_pair,
            signing_key,
            public_key,
            certificate,
            subject_name,
            key_id,
            origin: RootOrigin::Bootstrapped,
        })
    }

    pub fn load(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let cert_pem = fs::read_to_string(cert_path).map_err(|e| {
            Error::InvalidRootIdentity(format!("cannot read {}: {}", cert_path.display(), e))
        })?;
        let key_pem = fs::read_to_string(key_path).map_err(|e| {
            Error::InvalidRootIdentity(format!("cannot read {}: {}", key_path.display(), e))
        })?;

        let ca = Self::from_pem(&cert_pem, &key_pem).map_err(|e| match e {
            Error::InvalidRootIdentity(reason) => Error::InvalidRootIdentity(format!(
                "{} ({} / {})",
                reason,
                cert_path.display(),
                key_path.display()
            )),
            other => other,
        })?;

        tracing::info!(cert = %cert_path.display(), "loaded root certificate authority");
        Ok(ca)
    }

    /// Loads a root from PEM text. The certificate's public key must be the
    /// private key's public key.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let invalid = |what: &str, e: Error| Error::InvalidRootIdentity(format!("{}: {}", what, e));

        let certificate = SignedCertificate::from_pem(cert_pem)
            .map_err(|e| invalid("unreadable root certificate", e))?;
        let key_pair = keys::load_private_key(key_pem)
            .map_err(|e| invalid("unreadable root private key", e))?;
        let public_key = PublicKey::from_key_pair(&key_pair)
            .map_err(|e| invalid("unusable root private key", e))?;

        let (_, x509) = X509Certificate::from_der(certificate.der())
            .map_err(|e| invalid("unreadable root certificate", e.into()))?;
        if x509.public_key().raw != public_key.spki_der() {
            return Err(Error::InvalidRootIdentity(
                "root certificate public key does not match the root private key".to_string(),
            ));
        }

        // Leaves must point at the identifier the root actually carries.
        let key_id = x509
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => Some(id.0.to_vec()),
                _ => None,
            })
            .unwrap_or_else(|| public_key.key_identifier());

        let subject_name = distinguished_name_from(x509.subject())
            .map_err(|e| invalid("unusable root certificate", e))?;
        let signing_key = EcSigningKey::from_key_pair(&key_pair)
            .map_err(|e| invalid("unusable root private key", e))?;

        Ok(Self {
            key_pair,
            signing_key,
            public_key,
            certificate,
            subject_name,
            key_id,
            origin: RootOrigin::Loaded,
        })
    }

    /// Builds an unsigned template whose authority key identifier points at
    /// this authority.
    pub fn construct(
        &self,
        public_key: &PublicKey,
        builder: &CertificateBuilder,
    ) -> Result<CertificateTemplate> {
        Ok(builder
            .build(public_key, Some(&self.public_key))?
            .with_authority_key_id(&self.key_id))
    }

    /// Signs `template` with the root key. The issuer is this authority's
    /// subject unless `issuer_override` is given.
    pub fn sign(
        &self,
        template: CertificateTemplate,
        issuer_override: Option<&SubjectName>,
    ) -> Result<SignedCertificate> {
        let issuer_name = issuer_override
            .map(SubjectName::to_rcgen)
            .unwrap_or_else(|| self.subject_name.clone());

        sign_template(
            template,
            issuer_name,
            &self.key_id,
            &self.signing_key,
            &self.public_key,
        )
    }

    /// Generates a P-256 leaf key and a certificate for `hostnames`.
    pub fn issue<I, S>(&self, hostnames: I, lifespan_days: i64) -> Result<IssuedCertificate>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_pair = keys::generate_leaf_key()?;
        let public_key = PublicKey::from_key_pair(&key_pair)?;

        let builder = CertificateBuilder::leaf(hostnames).with_lifespan_days(lifespan_days);
        let template = self.construct(&public_key, &builder)?;
        let certificate = self.sign(template, None)?;

        Ok(IssuedCertificate {
            certificate,
            key_pair,
        })
    }

    pub fn save_pem(&self, cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<()> {
        fs::write(cert_path, self.certificate.pem())?;
        fs::write(key_path, self.key_pem())?;
        Ok(())
    }

    pub fn certificate(&self) -> &SignedCertificate {
        &self.certificate
    }

    pub fn cert_pem(&self) -> &str {
        self.certificate.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn subject_name(&self) -> &DistinguishedName {
        &self.subject_name
    }

    /// Subject key identifier of the root certificate.
    pub fn key_id(&self) -> &[u8] {
        &self.key_id
    }

    pub fn origin(&self) -> RootOrigin {
        self.origin
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.origin == RootOrigin::Bootstrapped
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("curve", &self.public_key.curve())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

// Rebuilds a parsed name attribute by attribute, keeping each value's string
// type so the issuer written into leaves is byte-identical to the root's subject.
fn distinguished_name_from(name: &X509Name) -> Result<DistinguishedName> {
    let mut dn = DistinguishedName::new();

    for attr in name.iter_attributes() {
        let oid = attr.attr_type();
        let arcs: Vec<u64> = oid
            .iter()
            .map(|arcs| arcs.collect())
            .ok_or_else(|| Error::CertParse(format!("unsupported name attribute {}", oid)))?;

        let value = attr.attr_value();
        let text = value.as_str().map_err(|e| {
            Error::CertParse(format!("unreadable value for name attribute {}: {}", oid, e))
        })?;
        let unsupported =
            |e: rcgen::Error| Error::CertParse(format!("name attribute {}: {}", oid, e));

        let value = match value.header.tag().0 {
            TAG_PRINTABLE_STRING => {
                DnValue::PrintableString(PrintableString::try_from(text).map_err(unsupported)?)
            }
            TAG_IA5_STRING => DnValue::Ia5String(Ia5String::try_from(text).map_err(unsupported)?),
            TAG_TELETEX_STRING => {
                DnValue::TeletexString(TeletexString::try_from(text).map_err(unsupported)?)
            }
            _ => DnValue::Utf8String(text.to_string()),
        };

        // A custom type writes the same OID as the named variants.
        dn.push(DnType::CustomDnType(arcs), value);
    }

    Ok(dn)
}

const TAG_PRINTABLE_STRING: u32 = 19;
const TAG_TELETEX_STRING: u32 = 20;
const TAG_IA5_STRING: u32 = 22;

/// Signs with an EC key using a digest picked per certificate rather than
/// the one tied to the key's curve. rcgen only carries a generic error out of
/// `sign`, so the real cause is kept in `failure`.
struct DigestSigner<'a> {
    key: &'a EcSigningKey,
    public_key: &'a PublicKey,
    digest: SignatureDigest,
    failure: &'a RefCell<Option<String>>,
}

impl DigestSigner<'_> {
    fn finish(&self, signed: Result<Vec<u8>>) -> std::result::Result<Vec<u8>, rcgen::Error> {
        signed.map_err(|e| {
            tracing::error!(error = %e, digest = self.digest.name(), "ECDSA signing failed");
            let cause = match e {
                Error::SigningFailure(cause) => cause,
                other => other.to_string(),
            };
            *self.failure.borrow_mut() = Some(cause);
            rcgen::Error::RemoteKeyError
        })
    }
}

impl PublicKeyData for DigestSigner<'_> {
    fn subject_public_key_info(&self) -> Vec<u8> {
        self.public_key.spki_der().to_vec()
    }

    fn der_bytes(&self) -> &[u8] {
        self.public_key.point()
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        self.digest.signature_algorithm()
    }
}

impl SigningKey for DigestSigner<'_> {
    fn sign(&self, msg: &[u8]) -> std::result::Result<Vec<u8>, rcgen::Error> {
        self.finish(self.key.sign_prehash(&self.digest.hash(msg)))
    }
}

fn signing_failure(err: rcgen::Error, cause: Option<String>) -> Error {
    Error::SigningFailure(cause.unwrap_or_else(|| err.to_string()))
}

fn sign_template(
    template: CertificateTemplate,
    issuer_name: DistinguishedName,
    issuer_key_id: &[u8],
    signing_key: &EcSigningKey,
    signer_public_key: &PublicKey,
) -> Result<SignedCertificate> {
    let digest = SignatureDigest::for_key_size(template.public_key().key_size_bits());
    let subject_key = template.public_key().clone();
    let key_id = template.authority_key_id().unwrap_or(issuer_key_id).to_vec();

    let mut issuer_params = CertificateParams::default();
    issuer_params.distinguished_name = issuer_name;
    issuer_params.key_identifier_method = KeyIdMethod::PreSpecified(key_id);

    let failure = RefCell::new(None);
    let issuer = Issuer::new(
        issuer_params,
        DigestSigner {
            key: signing_key,
            public_key: signer_public_key,
            digest,
            failure: &failure,
        },
    );

    let certificate = template
        .params
        .signed_by(&subject_key, &issuer)
        .map_err(|e| signing_failure(e, failure.borrow_mut().take()))?;

    tracing::debug!(digest = digest.name(), "signed certificate");

    Ok(SignedCertificate::new(
        certificate.der().to_vec(),
        certificate.pem(),
        digest,
    ))
}

/// A signed leaf certificate and the private key it was issued for.
pub struct IssuedCertificate {
    pub certificate: SignedCertificate,
    pub key_pair: KeyPair,
}

impl IssuedCertificate {
    pub fn cert_pem(&self) -> &str {
        self.certificate.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn save_pem(&self, cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<()> {
        fs::write(cert_path, self.cert_pem())?;
        fs::write(key_path, self.key_pem())?;
        Ok(())
    }
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{format_hex, CertificateInfo};
    use crate::types::Role;
    use crate::verify::verify_signature;

    const ROOT_SUBJECT: &str = "CN=PicoCA Root Certificate Authority, OU=PicoCA, O=PicoCA";

    #[test]
    fn test_bootstrap_root_is_self_consistent() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        assert!(ca.is_bootstrapped());
        assert_eq!(ca.public_key().curve(), KeyCurve::P384);

        let info = ca.certificate().info().unwrap();
        assert_eq!(info.subject, ROOT_SUBJECT);
        assert_eq!(info.issuer, info.subject);
        assert!(info.is_ca);
        assert_eq!(info.path_len, Some(0));
        assert_eq!(info.key_usage, vec!["Digital Signature", "Certificate Sign"]);
        assert!(info.subject_alt_names.is_empty());
        assert!(info.extended_key_usage.is_empty());
        assert!(info.authority_key_id.is_none());
        assert_eq!(
            info.subject_key_id,
            Some(format_hex(&ca.public_key().key_identifier()))
        );
        assert_eq!(info.public_key_size, Some(384));
        assert_eq!(ca.certificate().digest(), SignatureDigest::Sha384);

        let (_, x509) = X509Certificate::from_der(ca.certificate().der()).unwrap();
        assert_eq!(x509.public_key().raw, ca.public_key().spki_der());

        verify_signature(ca.certificate(), ca.certificate()).unwrap();
    }

    #[test]
    fn test_root_lifespan_is_twenty_years() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let info = ca.certificate().info().unwrap();
        let now = chrono::Utc::now().timestamp();

        let days_left = (info.not_after - now) / 86_400;
        assert!((7303..=7304).contains(&days_left));
        assert!(info.not_before <= now - 86_000);
    }

    #[test]
    fn test_leaf_extensions() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let issued = ca.issue(["foo.com", "bar.baz", "127.0.0.1"], 366).unwrap();
        let info = issued.certificate.info().unwrap();

        assert_eq!(info.subject, "CN=foo.com");
        assert_eq!(info.issuer, ROOT_SUBJECT);
        assert!(!info.is_ca);
        assert_eq!(
            info.subject_alt_names,
            vec!["DNS:bar.baz", "DNS:foo.com", "IP:127.0.0.1"]
        );
        assert_eq!(info.key_usage, vec!["Digital Signature", "Key Encipherment"]);
        assert_eq!(
            info.extended_key_usage,
            vec!["TLS Web Server Authentication", "TLS Web Client Authentication"]
        );
        assert_eq!(
            info.authority_key_id,
            Some(format_hex(&ca.public_key().key_identifier()))
        );
        let leaf_key = PublicKey::from_key_pair(&issued.key_pair).unwrap();
        assert_eq!(info.subject_key_id, Some(format_hex(&leaf_key.key_identifier())));

        for critical in ["Basic Constraints", "Key Usage"] {
            assert!(info.critical_extensions.iter().any(|name| name == critical));
        }
        for non_critical in [
            "Subject Alternative Name",
            "Extended Key Usage",
            "Subject Key Identifier",
            "Authority Key Identifier",
        ] {
            assert!(!info.critical_extensions.iter().any(|name| name == non_critical));
        }

        verify_signature(&issued.certificate, ca.certificate()).unwrap();
    }

    #[test]
    fn test_digest_follows_subject_key() {
        let ca = CertificateAuthority::bootstrap().unwrap();

        for (curve, expected) in [
            (KeyCurve::P256, SignatureDigest::Sha256),
            (KeyCurve::P384, SignatureDigest::Sha384),
        ] {
            let key = PublicKey::from_key_pair(&keys::generate_key(curve).unwrap()).unwrap();
            let template = ca
                .construct(&key, &CertificateBuilder::leaf(["foo.com"]))
                .unwrap();
            let signed = ca.sign(template, None).unwrap();

            assert_eq!(signed.digest(), expected);
            let info = signed.info().unwrap();
            assert_eq!(info.signature_algorithm, expected.name());
            verify_signature(&signed, ca.certificate()).unwrap();
        }
    }

    #[test]
    fn test_issuer_override() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let key = PublicKey::from_key_pair(&keys::generate_leaf_key().unwrap()).unwrap();
        let template = ca
            .construct(&key, &CertificateBuilder::new(Role::Ca).with_common_name("Other"))
            .unwrap();

        let issuer = SubjectName::new("Someone Else").with_organization("Elsewhere");
        let signed = ca.sign(template, Some(&issuer)).unwrap();
        assert_eq!(signed.info().unwrap().issuer, "CN=Someone Else, O=Elsewhere");
    }

    #[test]
    fn test_pem_roundtrip() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let issued = ca.issue(["foo.com", "127.0.0.1"], 30).unwrap();

        let decoded = SignedCertificate::from_pem(issued.cert_pem()).unwrap();
        assert_eq!(decoded, issued.certificate);
        assert_eq!(decoded.info().unwrap(), issued.certificate.info().unwrap());
        verify_signature(&decoded, ca.certificate()).unwrap();
    }

    #[test]
    fn test_serial_matches_template() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let key = PublicKey::from_key_pair(&keys::generate_leaf_key().unwrap()).unwrap();
        let template = ca
            .construct(&key, &CertificateBuilder::leaf(["foo.com"]))
            .unwrap();

        let serial = template.serial().to_vec();
        let first_significant = serial.iter().position(|b| *b != 0).unwrap();
        let signed = ca.sign(template, None).unwrap();

        assert_eq!(
            signed.info().unwrap().serial_number,
            format_hex(&serial[first_significant..])
        );
    }

    #[test]
    fn test_reload_from_pem() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let reloaded = CertificateAuthority::from_pem(ca.cert_pem(), &ca.key_pem()).unwrap();

        assert_eq!(reloaded.origin(), RootOrigin::Loaded);
        assert_eq!(reloaded.public_key(), ca.public_key());
        assert_eq!(reloaded.certificate(), ca.certificate());

        // Leaves from the reloaded root chain to the original certificate.
        let issued = reloaded.issue(["foo.com"], 10).unwrap();
        let info = issued.certificate.info().unwrap();
        assert_eq!(info.issuer, ROOT_SUBJECT);
        verify_signature(&issued.certificate, ca.certificate()).unwrap();
    }

    #[test]
    fn test_mismatched_pair_is_rejected() {
        let a = CertificateAuthority::bootstrap().unwrap();
        let b = CertificateAuthority::bootstrap().unwrap();

        let result = CertificateAuthority::from_pem(a.cert_pem(), &b.key_pem());
        assert!(matches!(result, Err(Error::InvalidRootIdentity(_))));
    }

    #[test]
    fn test_corrupt_root_is_rejected() {
        let ca = CertificateAuthority::bootstrap().unwrap();

        let bad_cert = CertificateAuthority::from_pem("garbage", &ca.key_pem());
        assert!(matches!(bad_cert, Err(Error::InvalidRootIdentity(_))));

        let bad_key = CertificateAuthority::from_pem(ca.cert_pem(), "garbage");
        assert!(matches!(bad_key, Err(Error::InvalidRootIdentity(_))));
    }

    #[test]
    fn test_missing_identity_propagates() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        let hostnames: Vec<String> = Vec::new();
        assert!(matches!(
            ca.issue(hostnames, 366),
            Err(Error::MissingSubjectIdentity)
        ));
    }

    const FOREIGN_ROOT_PEM: &str = include_str!("../tests/fixtures/foreign_root.pem");
    const FOREIGN_ROOT_KEY: &str = include_str!("../tests/fixtures/foreign_root.key");

    #[test]
    fn test_foreign_root_issuer_bytes_match() {
        let ca = CertificateAuthority::from_pem(FOREIGN_ROOT_PEM, FOREIGN_ROOT_KEY).unwrap();
        assert_eq!(ca.origin(), RootOrigin::Loaded);

        let issued = ca.issue(["foo.com"], 30).unwrap();
        let (_, root) = X509Certificate::from_der(ca.certificate().der()).unwrap();
        let (_, leaf) = X509Certificate::from_der(issued.certificate.der()).unwrap();

        // PrintableString country and UTF8String attributes survive the reload.
        assert_eq!(leaf.issuer().as_raw(), root.subject().as_raw());
        assert_eq!(
            issued.certificate.info().unwrap().authority_key_id,
            ca.certificate().info().unwrap().subject_key_id
        );
        verify_signature(&issued.certificate, ca.certificate()).unwrap();
    }

    #[test]
    fn test_signing_failure_keeps_cause() {
        let key = keys::generate_key(KeyCurve::P384).unwrap();
        let signing_key = EcSigningKey::from_key_pair(&key).unwrap();
        let public_key = PublicKey::from_key_pair(&key).unwrap();
        let failure = RefCell::new(None);
        let signer = DigestSigner {
            key: &signing_key,
            public_key: &public_key,
            digest: SignatureDigest::Sha384,
            failure: &failure,
        };

        // An empty prehash is shorter than any curve accepts.
        let err = signer.finish(signing_key.sign_prehash(&[])).unwrap_err();
        assert!(matches!(err, rcgen::Error::RemoteKeyError));

        let cause = failure.borrow_mut().take();
        assert!(cause.is_some());
        match signing_failure(err, cause) {
            Error::SigningFailure(message) => {
                assert_ne!(message, rcgen::Error::RemoteKeyError.to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_authority_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CertificateAuthority>();
    }

    #[test]
    fn test_info_from_pem_matches_der() {
        let ca = CertificateAuthority::bootstrap().unwrap();
        assert_eq!(
            CertificateInfo::from_pem(ca.cert_pem()).unwrap(),
            ca.certificate().info().unwrap()
        );
    }
}
