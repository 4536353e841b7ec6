use std::fmt;
use std::net::IpAddr;

use rcgen::{DistinguishedName, DnType, SignatureAlgorithm};
use sha2::Digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCurve {
    /// SECP256R1, the default for leaf certificates.
    P256,
    /// SECP384R1, used for the root.
    P384,
}

impl KeyCurve {
    pub fn key_size_bits(&self) -> u32 {
        match self {
            KeyCurve::P256 => 256,
            KeyCurve::P384 => 384,
        }
    }

    pub fn to_rcgen(&self) -> &'static SignatureAlgorithm {
        match self {
            KeyCurve::P256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            KeyCurve::P384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }

    pub(crate) fn from_rcgen(alg: &SignatureAlgorithm) -> Option<Self> {
        if *alg == rcgen::PKCS_ECDSA_P256_SHA256 {
            Some(KeyCurve::P256)
        } else if *alg == rcgen::PKCS_ECDSA_P384_SHA384 {
            Some(KeyCurve::P384)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyCurve::P256 => "ECDSA P-256",
            KeyCurve::P384 => "ECDSA P-384",
        }
    }
}

impl std::str::FromStr for KeyCurve {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "p256" | "p-256" | "secp256r1" | "prime256v1" => Ok(KeyCurve::P256),
            "p384" | "p-384" | "secp384r1" => Ok(KeyCurve::P384),
            _ => Err(crate::Error::InvalidInput(format!("unsupported curve: {}", s))),
        }
    }
}

/// Digest used for the certificate signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureDigest {
    Sha256,
    Sha384,
}

impl SignatureDigest {
    /// A 384-bit subject key gets SHA-384, everything else SHA-256.
    pub fn for_key_size(bits: u32) -> Self {
        if bits == 384 {
            SignatureDigest::Sha384
        } else {
            SignatureDigest::Sha256
        }
    }

    // Only the ecdsa-with-SHAxxx identifier of these is ever written.
    pub(crate) fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
        match self {
            SignatureDigest::Sha256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            SignatureDigest::Sha384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        }
    }

    pub fn oid(&self) -> &'static str {
        match self {
            SignatureDigest::Sha256 => "1.2.840.10045.4.3.2",
            SignatureDigest::Sha384 => "1.2.840.10045.4.3.3",
        }
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        match oid {
            "1.2.840.10045.4.3.2" => Some(SignatureDigest::Sha256),
            "1.2.840.10045.4.3.3" => Some(SignatureDigest::Sha384),
            _ => None,
        }
    }

    pub fn hash(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            SignatureDigest::Sha256 => sha2::Sha256::digest(msg).to_vec(),
            SignatureDigest::Sha384 => sha2::Sha384::digest(msg).to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureDigest::Sha256 => "ecdsa-with-SHA256",
            SignatureDigest::Sha384 => "ecdsa-with-SHA384",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ca,
    Leaf,
}

/// Subject name: CN first, then OU and O when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectName {
    pub common_name: String,
    pub organizational_unit: Option<String>,
    pub organization: Option<String>,
}

impl SubjectName {
    pub fn new(cn: impl Into<String>) -> Self {
        Self {
            common_name: cn.into(),
            organizational_unit: None,
            organization: None,
        }
    }

    pub fn with_organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.organizational_unit = Some(ou.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn to_rcgen(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());

        if let Some(ref ou) = self.organizational_unit {
            dn.push(DnType::OrganizationalUnitName, ou.as_str());
        }
        if let Some(ref org) = self.organization {
            dn.push(DnType::OrganizationName, org.as_str());
        }

        dn
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CN={}", self.common_name)?;
        if let Some(ref ou) = self.organizational_unit {
            write!(f, ", OU={}", ou)?;
        }
        if let Some(ref org) = self.organization {
            write!(f, ", O={}", org)?;
        }
        Ok(())
    }
}

/// A single subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
}

impl SanEntry {
    /// IP address if the name parses as one, DNS name otherwise.
    pub fn classify(hostname: &str) -> Self {
        match hostname.parse::<IpAddr>() {
            Ok(ip) => SanEntry::Ip(ip),
            Err(_) => SanEntry::Dns(hostname.to_string()),
        }
    }

    pub fn to_rcgen(&self) -> crate::Result<rcgen::SanType> {
        match self {
            SanEntry::Dns(name) => {
                let name = rcgen::string::Ia5String::try_from(name.as_str()).map_err(|e| {
                    crate::Error::InvalidInput(format!("invalid DNS name '{}': {}", name, e))
                })?;
                Ok(rcgen::SanType::DnsName(name))
            }
            SanEntry::Ip(ip) => Ok(rcgen::SanType::IpAddress(*ip)),
        }
    }
}

impl fmt::Display for SanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanEntry::Dns(name) => write!(f, "DNS:{}", name),
            SanEntry::Ip(ip) => write!(f, "IP:{}", ip),
        }
    }
}

/// Ordering key for SAN entries: names starting with a digit or holding a
/// colon go after the rest. Display order only.
pub fn san_sort_key(hostname: &str) -> (bool, &str) {
    let ip_like = hostname
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
        || hostname.contains(':');
    (ip_like, hostname)
}

pub fn sort_hostnames(hostnames: &[String]) -> Vec<String> {
    let mut sorted = hostnames.to_vec();
    sorted.sort_by(|a, b| san_sort_key(a).cmp(&san_sort_key(b)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_follows_key_size() {
        assert_eq!(SignatureDigest::for_key_size(384), SignatureDigest::Sha384);
        assert_eq!(SignatureDigest::for_key_size(256), SignatureDigest::Sha256);
        assert_eq!(SignatureDigest::for_key_size(521), SignatureDigest::Sha256);
        assert_eq!(
            SignatureDigest::for_key_size(KeyCurve::P384.key_size_bits()),
            SignatureDigest::Sha384
        );
    }

    #[test]
    fn test_digest_oid_lookup() {
        assert_eq!(
            SignatureDigest::from_oid(SignatureDigest::Sha384.oid()),
            Some(SignatureDigest::Sha384)
        );
        assert_eq!(SignatureDigest::from_oid("1.2.840.113549.1.1.11"), None);
        assert_eq!(SignatureDigest::Sha384.hash(b"abc").len(), 48);
    }

    #[test]
    fn test_classify_hostnames() {
        assert_eq!(SanEntry::classify("foo.com"), SanEntry::Dns("foo.com".into()));
        assert_eq!(
            SanEntry::classify("127.0.0.1"),
            SanEntry::Ip("127.0.0.1".parse().unwrap())
        );
        assert_eq!(SanEntry::classify("::1"), SanEntry::Ip("::1".parse().unwrap()));
        // digit-leading but not an address
        assert_eq!(SanEntry::classify("1password.com"), SanEntry::Dns("1password.com".into()));
    }

    #[test]
    fn test_sort_puts_ip_like_names_last() {
        let hostnames: Vec<String> = ["127.0.0.1", "foo.com", "::1", "bar.baz", "10.0.0.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            sort_hostnames(&hostnames),
            vec!["bar.baz", "foo.com", "10.0.0.1", "127.0.0.1", "::1"]
        );
    }

    #[test]
    fn test_subject_name_order() {
        let subject = SubjectName::new("PicoCA Root Certificate Authority")
            .with_organization("PicoCA")
            .with_organizational_unit("PicoCA");

        assert_eq!(
            subject.to_string(),
            "CN=PicoCA Root Certificate Authority, OU=PicoCA, O=PicoCA"
        );

        let types: Vec<DnType> = subject
            .to_rcgen()
            .iter()
            .map(|(ty, _)| ty.clone())
            .collect();
        assert_eq!(
            types,
            vec![
                DnType::CommonName,
                DnType::OrganizationalUnitName,
                DnType::OrganizationName
            ]
        );
    }

    #[test]
    fn test_curve_parsing() {
        assert!(matches!("p256".parse::<KeyCurve>(), Ok(KeyCurve::P256)));
        assert!(matches!("secp384r1".parse::<KeyCurve>(), Ok(KeyCurve::P384)));
        assert!(matches!(
            "ed25519".parse::<KeyCurve>(),
            Err(crate::Error::InvalidInput(_))
        ));
    }
}
