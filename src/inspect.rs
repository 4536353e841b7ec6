use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: i64,
    pub not_after: i64,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
    pub public_key_size: Option<usize>,
    pub subject_alt_names: Vec<String>,
    pub is_ca: bool,
    pub path_len: Option<u32>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub subject_key_id: Option<String>,
    pub authority_key_id: Option<String>,
    pub critical_extensions: Vec<String>,
}

impl CertificateInfo {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes())?;
        Self::from_der(&parsed.contents)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, x509) = X509Certificate::from_der(der)
            .map_err(|e| Error::CertParse(format!("Failed to parse certificate: {}", e)))?;

        let signature_oid = x509.signature_algorithm.algorithm.to_id_string();
        let signature_algorithm = crate::types::SignatureDigest::from_oid(&signature_oid)
            .map(|digest| digest.name().to_string())
            .unwrap_or(signature_oid);

        let (public_key_algorithm, public_key_size) = match x509.public_key().parsed() {
            Ok(key @ x509_parser::public_key::PublicKey::EC(_)) => {
                ("EC".to_string(), Some(key.key_size()))
            }
            Ok(key @ x509_parser::public_key::PublicKey::RSA(_)) => {
                ("RSA".to_string(), Some(key.key_size()))
            }
            _ => ("Unknown".to_string(), None),
        };

        let mut subject_alt_names = Vec::new();
        if let Ok(Some(san_ext)) = x509.subject_alternative_name() {
            for san in &san_ext.value.general_names {
                match san {
                    GeneralName::DNSName(name) => {
                        subject_alt_names.push(format!("DNS:{}", name));
                    }
                    GeneralName::IPAddress(ip) => {
                        subject_alt_names.push(format!("IP:{}", format_ip(ip)));
                    }
                    _ => {}
                }
            }
        }

        let basic_constraints = x509.basic_constraints().ok().flatten();
        let is_ca = basic_constraints.as_ref().map(|bc| bc.value.ca).unwrap_or(false);
        let path_len = basic_constraints.and_then(|bc| bc.value.path_len_constraint);

        let mut key_usage = Vec::new();
        if let Ok(Some(ku_ext)) = x509.key_usage() {
            let ku = &ku_ext.value;
            if ku.digital_signature() {
                key_usage.push("Digital Signature".to_string());
            }
            if ku.key_encipherment() {
                key_usage.push("Key Encipherment".to_string());
            }
            if ku.key_agreement() {
                key_usage.push("Key Agreement".to_string());
            }
            if ku.key_cert_sign() {
                key_usage.push("Certificate Sign".to_string());
            }
            if ku.crl_sign() {
                key_usage.push("CRL Sign".to_string());
            }
        }

        let mut extended_key_usage = Vec::new();
        if let Ok(Some(eku_ext)) = x509.extended_key_usage() {
            if eku_ext.value.server_auth {
                extended_key_usage.push("TLS Web Server Authentication".to_string());
            }
            if eku_ext.value.client_auth {
                extended_key_usage.push("TLS Web Client Authentication".to_string());
            }
        }

        let mut subject_key_id = None;
        let mut authority_key_id = None;
        let mut critical_extensions = Vec::new();
        for ext in x509.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    subject_key_id = Some(format_hex(id.0));
                }
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    authority_key_id = aki.key_identifier.as_ref().map(|id| format_hex(id.0));
                }
                _ => {}
            }
            if ext.critical {
                critical_extensions.push(extension_name(&ext.oid.to_id_string()));
            }
        }

        Ok(CertificateInfo {
            subject: format_dn(x509.subject()),
            issuer: format_dn(x509.issuer()),
            serial_number: format_hex(&x509.serial.to_bytes_be()),
            not_before: x509.validity().not_before.timestamp(),
            not_after: x509.validity().not_after.timestamp(),
            signature_algorithm,
            public_key_algorithm,
            public_key_size,
            subject_alt_names,
            is_ca,
            path_len,
            key_usage,
            extended_key_usage,
            subject_key_id,
            authority_key_id,
            critical_extensions,
        })
    }

    pub fn is_valid_at(&self, timestamp: i64) -> bool {
        timestamp >= self.not_before && timestamp <= self.not_after
    }
}

fn extension_name(oid: &str) -> String {
    match oid {
        "2.5.29.14" => "Subject Key Identifier",
        "2.5.29.15" => "Key Usage",
        "2.5.29.17" => "Subject Alternative Name",
        "2.5.29.19" => "Basic Constraints",
        "2.5.29.35" => "Authority Key Identifier",
        "2.5.29.37" => "Extended Key Usage",
        other => other,
    }
    .to_string()
}

pub(crate) fn format_dn(dn: &X509Name) -> String {
    let mut parts = Vec::new();

    for rdn in dn.iter() {
        for attr in rdn.iter() {
            let attr_value = attr.attr_value().as_str().unwrap_or("?");

            let name = match attr.attr_type().to_id_string().as_str() {
                "2.5.4.3" => "CN",
                "2.5.4.10" => "O",
                "2.5.4.11" => "OU",
                "2.5.4.6" => "C",
                "2.5.4.7" => "L",
                "2.5.4.8" => "ST",
                _ => continue,
            };

            parts.push(format!("{}={}", name, attr_value));
        }
    }

    parts.join(", ")
}

pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn format_ip(ip_bytes: &[u8]) -> String {
    match ip_bytes.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(ip_bytes);
            IpAddr::V4(Ipv4Addr::from(octets)).to_string()
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(ip_bytes);
            IpAddr::V6(Ipv6Addr::from(octets)).to_string()
        }
        _ => format!("{:?}", ip_bytes),
    }
}

pub enum OutputFormat {
    Pretty,
    #[cfg(feature = "json")]
    Json,
}

pub fn display_certificate(info: &CertificateInfo, format: OutputFormat) -> Result<String> {
    match format {
        #[cfg(feature = "cli")]
        OutputFormat::Pretty => Ok(display_pretty(info)),
        #[cfg(not(feature = "cli"))]
        OutputFormat::Pretty => Ok(format!("{:#?}", info)),
        #[cfg(feature = "json")]
        OutputFormat::Json => display_json(info),
    }
}

#[cfg(feature = "cli")]
fn display_pretty(cert: &CertificateInfo) -> String {
    use colored::Colorize;

    let mut output = String::new();
    let now = chrono::Utc::now().timestamp();

    output.push_str(&format!("\n{}\n", "Certificate".bold().cyan()));
    output.push_str(&format!("{}\n", "=".repeat(80)));

    output.push_str(&format!("  {}: {}\n", "Subject".bold().yellow(), cert.subject));
    output.push_str(&format!("  {}: {}\n", "Issuer".bold().yellow(), cert.issuer));
    output.push_str(&format!(
        "  {}: {}\n",
        "Serial Number".bold().yellow(),
        cert.serial_number
    ));

    let validity_status = if now < cert.not_before {
        "Not yet valid".red()
    } else if now > cert.not_after {
        "Expired".red()
    } else {
        "Valid".green()
    };
    output.push_str(&format!(
        "  {}: {}\n",
        "Validity Status".bold().yellow(),
        validity_status
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Not Before".bold().yellow(),
        format_timestamp(cert.not_before).dimmed()
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Not After".bold().yellow(),
        format_timestamp(cert.not_after).dimmed()
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Signature Algorithm".bold().yellow(),
        cert.signature_algorithm.dimmed()
    ));

    let pk_info = if let Some(size) = cert.public_key_size {
        format!("{} ({} bits)", cert.public_key_algorithm, size)
    } else {
        cert.public_key_algorithm.clone()
    };
    output.push_str(&format!(
        "  {}: {}\n",
        "Public Key".bold().yellow(),
        pk_info.dimmed()
    ));

    if cert.is_ca {
        let path_len = cert
            .path_len
            .map(|len| format!(" (path length {})", len))
            .unwrap_or_default();
        output.push_str(&format!(
            "  {}: {}{}\n",
            "CA Certificate".bold().yellow(),
            "Yes".green(),
            path_len
        ));
    }

    if !cert.subject_alt_names.is_empty() {
        output.push_str(&format!(
            "  {}:\n",
            "Subject Alternative Names".bold().yellow()
        ));
        for san in &cert.subject_alt_names {
            output.push_str(&format!("    - {}\n", san.cyan()));
        }
    }

    if !cert.key_usage.is_empty() {
        output.push_str(&format!(
            "  {}: {}\n",
            "Key Usage".bold().yellow(),
            cert.key_usage.join(", ").dimmed()
        ));
    }

    if !cert.extended_key_usage.is_empty() {
        output.push_str(&format!(
            "  {}: {}\n",
            "Extended Key Usage".bold().yellow(),
            cert.extended_key_usage.join(", ").dimmed()
        ));
    }

    if let Some(ref skid) = cert.subject_key_id {
        output.push_str(&format!(
            "  {}: {}\n",
            "Subject Key ID".bold().yellow(),
            skid.dimmed()
        ));
    }

    if let Some(ref akid) = cert.authority_key_id {
        output.push_str(&format!(
            "  {}: {}\n",
            "Authority Key ID".bold().yellow(),
            akid.dimmed()
        ));
    }

    output.push_str(&format!("{}\n", "=".repeat(80)));
    output
}

#[cfg(feature = "cli")]
fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|at| at.to_rfc2822())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(feature = "json")]
fn display_json(cert: &CertificateInfo) -> Result<String> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct JsonCertificate<'a> {
        subject: &'a str,
        issuer: &'a str,
        serial_number: &'a str,
        not_before: i64,
        not_after: i64,
        signature_algorithm: &'a str,
        public_key_algorithm: &'a str,
        public_key_size: Option<usize>,
        subject_alt_names: &'a [String],
        is_ca: bool,
        path_len: Option<u32>,
        key_usage: &'a [String],
        extended_key_usage: &'a [String],
        subject_key_id: Option<&'a str>,
        authority_key_id: Option<&'a str>,
    }

    let json_cert = JsonCertificate {
        subject: &cert.subject,
        issuer: &cert.issuer,
        serial_number: &cert.serial_number,
        not_before: cert.not_before,
        not_after: cert.not_after,
        signature_algorithm: &cert.signature_algorithm,
        public_key_algorithm: &cert.public_key_algorithm,
        public_key_size: cert.public_key_size,
        subject_alt_names: &cert.subject_alt_names,
        is_ca: cert.is_ca,
        path_len: cert.path_len,
        key_usage: &cert.key_usage,
        extended_key_usage: &cert.extended_key_usage,
        subject_key_id: cert.subject_key_id.as_deref(),
        authority_key_id: cert.authority_key_id.as_deref(),
    };

    Ok(serde_json::to_string_pretty(&json_cert)?)
}
