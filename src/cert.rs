use crate::error::{Error, Result};
use crate::keys::PublicKey;
use crate::types::{sort_hostnames, Role, SanEntry, SignatureDigest, SubjectName};
use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyIdMethod,
    KeyUsagePurpose, SerialNumber,
};
use uuid::Uuid;
use x509_parser::prelude::{FromDer, X509Certificate};

pub const DEFAULT_LEAF_LIFESPAN_DAYS: i64 = 366;

/// Describes the certificate to construct: role, subject attributes and
/// hostnames. Turned into a [`CertificateTemplate`] by [`CertificateBuilder::build`].
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    role: Role,
    hostnames: Vec<String>,
    common_name: Option<String>,
    organizational_unit: Option<String>,
    organization: Option<String>,
    lifespan_days: i64,
}

impl CertificateBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            hostnames: Vec::new(),
            common_name: None,
            organizational_unit: None,
            organization: None,
            lifespan_days: DEFAULT_LEAF_LIFESPAN_DAYS,
        }
    }

    pub fn leaf<I, S>(hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = Self::new(Role::Leaf);
        builder.hostnames = hostnames.into_iter().map(Into::into).collect();
        builder
    }

    pub fn ca(common_name: impl Into<String>) -> Self {
        Self::new(Role::Ca).with_common_name(common_name)
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostnames.push(hostname.into());
        self
    }

    pub fn with_common_name(mut self, cn: impl Into<String>) -> Self {
        self.common_name = Some(cn.into());
        self
    }

    pub fn with_organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.organizational_unit = Some(ou.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_lifespan_days(mut self, days: i64) -> Self {
        self.lifespan_days = days;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// CN is the explicit common name, else the first hostname as given.
    pub fn subject(&self) -> Result<SubjectName> {
        let cn = self
            .common_name
            .clone()
            .or_else(|| self.hostnames.first().cloned())
            .ok_or(Error::MissingSubjectIdentity)?;

        let mut subject = SubjectName::new(cn);
        subject.organizational_unit = self.organizational_unit.clone();
        subject.organization = self.organization.clone();
        Ok(subject)
    }

    /// Builds the unsigned template for `public_key`. Leaf templates record
    /// `authority_key` as their authority key identifier.
    pub fn build(
        &self,
        public_key: &PublicKey,
        authority_key: Option<&PublicKey>,
    ) -> Result<CertificateTemplate> {
        let subject = self.subject()?;

        if self.lifespan_days <= 0 {
            return Err(Error::InvalidInput(format!(
                "lifespan must be a positive number of days, got {}",
                self.lifespan_days
            )));
        }

        let now = Utc::now();
        let not_before = now - Duration::days(1);
        let not_after = Duration::try_days(self.lifespan_days)
            .and_then(|lifespan| now.checked_add_signed(lifespan))
            .ok_or_else(|| {
                Error::InvalidInput(format!("lifespan of {} days is too long", self.lifespan_days))
            })?;

        let serial = Uuid::new_v4().as_bytes().to_vec();

        let mut params = CertificateParams::default();
        params.distinguished_name = subject.to_rcgen();
        params.not_before = to_offset_date_time(not_before)?;
        params.not_after = to_offset_date_time(not_after)?;
        params.serial_number = Some(SerialNumber::from_slice(&serial));
        params.key_identifier_method = KeyIdMethod::PreSpecified(public_key.key_identifier());

        let mut subject_alt_names = Vec::new();
        let mut authority_key_id = None;

        match self.role {
            Role::Ca => {
                params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
                params.key_usages = vec![
                    KeyUsagePurpose::DigitalSignature,
                    KeyUsagePurpose::KeyCertSign,
                ];
            }
            Role::Leaf => {
                let authority_key = authority_key.ok_or_else(|| {
                    Error::InvalidInput(
                        "leaf certificates need the issuing authority's public key".to_string(),
                    )
                })?;

                params.is_ca = IsCa::ExplicitNoCa;
                params.key_usages = vec![
                    KeyUsagePurpose::DigitalSignature,
                    KeyUsagePurpose::KeyEncipherment,
                ];
                params.extended_key_usages = vec![
                    ExtendedKeyUsagePurpose::ServerAuth,
                    ExtendedKeyUsagePurpose::ClientAuth,
                ];

                subject_alt_names = sort_hostnames(&self.hostnames)
                    .iter()
                    .map(|hostname| SanEntry::classify(hostname))
                    .collect::<Vec<_>>();
                params.subject_alt_names = subject_alt_names
                    .iter()
                    .map(SanEntry::to_rcgen)
                    .collect::<Result<Vec<_>>>()?;

                params.use_authority_key_identifier_extension = true;
                authority_key_id = Some(authority_key.key_identifier());
            }
        }

        tracing::debug!(
            subject = %subject,
            role = ?self.role,
            lifespan_days = self.lifespan_days,
            sans = subject_alt_names.len(),
            "constructed certificate template"
        );

        Ok(CertificateTemplate {
            params,
            subject,
            public_key: public_key.clone(),
            role: self.role,
            serial,
            not_before,
            not_after,
            subject_alt_names,
            authority_key_id,
        })
    }
}

fn to_offset_date_time(at: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp: {}", e)))
}

/// An unsigned certificate body.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub(crate) params: CertificateParams,
    subject: SubjectName,
    public_key: PublicKey,
    role: Role,
    serial: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject_alt_names: Vec<SanEntry>,
    authority_key_id: Option<Vec<u8>>,
}

impl CertificateTemplate {
    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_ca(&self) -> bool {
        self.role == Role::Ca
    }

    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn subject_alt_names(&self) -> &[SanEntry] {
        &self.subject_alt_names
    }

    pub fn subject_key_id(&self) -> Vec<u8> {
        self.public_key.key_identifier()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    /// Replaces the authority key identifier of a leaf template. CA templates
    /// carry none and are left untouched.
    pub(crate) fn with_authority_key_id(mut self, key_id: &[u8]) -> Self {
        if self.authority_key_id.is_some() {
            self.authority_key_id = Some(key_id.to_vec());
        }
        self
    }

    pub fn extended_key_usages(&self) -> &[ExtendedKeyUsagePurpose] {
        &self.params.extended_key_usages
    }

    pub fn key_usages(&self) -> &[KeyUsagePurpose] {
        &self.params.key_usages
    }
}

/// A finished certificate in both encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    der: Vec<u8>,
    pem: String,
    digest: SignatureDigest,
}

impl SignedCertificate {
    pub(crate) fn new(der: Vec<u8>, pem: String, digest: SignatureDigest) -> Self {
        Self { der, pem, digest }
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes())?;
        if parsed.label != "CERTIFICATE" {
            return Err(Error::CertParse(format!(
                "expected a CERTIFICATE PEM block, found {}",
                parsed.label
            )));
        }

        let (_, x509) = X509Certificate::from_der(&parsed.contents)?;
        let oid = x509.signature_algorithm.algorithm.to_id_string();
        let digest = SignatureDigest::from_oid(&oid)
            .ok_or_else(|| Error::CertParse(format!("unsupported signature algorithm {}", oid)))?;

        Ok(Self {
            der: parsed.contents.clone(),
            pem: pem.to_string(),
            digest,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn digest(&self) -> SignatureDigest {
        self.digest
    }

    pub fn to_certificate_der(&self) -> rustls::pki_types::CertificateDer<'static> {
        rustls::pki_types::CertificateDer::from(self.der.clone())
    }

    pub fn info(&self) -> Result<crate::inspect::CertificateInfo> {
        crate::inspect::CertificateInfo::from_der(&self.der)
    }
}
