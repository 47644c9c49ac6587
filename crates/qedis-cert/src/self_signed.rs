//! Self-signed certificate generation
//!
//! Provides a zero-config server identity so the proxy can terminate QUIC without any
//! certificate material on disk.

use crate::{CertError, Certificate};
use rcgen::{CertificateParams, DistinguishedName, DnType, Ia5String, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

/// Validity window of generated certificates
const VALIDITY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Names every generated certificate is valid for
const DEFAULT_DNS_NAMES: &[&str] = &["localhost", "*.localhost"];

/// Generate a self-signed certificate valid for localhost
///
/// # Example
/// ```no_run
/// use qedis_cert::generate_self_signed_cert;
///
/// let cert = generate_self_signed_cert().unwrap();
/// assert!(cert.pem_cert.contains("BEGIN CERTIFICATE"));
/// ```
pub fn generate_self_signed_cert() -> Result<SelfSignedCertificate, CertError> {
    generate_self_signed_cert_with_names(&[])
}

/// Generate a self-signed certificate valid for localhost plus `extra_names`
///
/// Each extra name is added as an IP SAN if it parses as an address, otherwise as a DNS SAN.
///
/// - Valid for 90 days
/// - Always includes localhost, *.localhost, 127.0.0.1 and ::1
/// - Random serial number to avoid collisions between restarts
pub fn generate_self_signed_cert_with_names(
    extra_names: &[String],
) -> Result<SelfSignedCertificate, CertError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "Qedis Proxy Certificate");
    dn.push(DnType::OrganizationName, "Qedis");
    params.distinguished_name = dn;

    let mut sans = vec![
        SanType::IpAddress(IpAddr::from([127, 0, 0, 1])),
        SanType::IpAddress(IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1])),
    ];
    for name in DEFAULT_DNS_NAMES
        .iter()
        .map(|n| n.to_string())
        .chain(extra_names.iter().cloned())
    {
        let san = match name.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(
                Ia5String::try_from(name.as_str())
                    .map_err(|e| CertError::Generation(format!("Invalid name {}: {}", name, e)))?,
            ),
        };
        if !sans.contains(&san) {
            sans.push(san);
        }
    }
    params.subject_alt_names = sans;

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    params.not_before = time::OffsetDateTime::from_unix_timestamp(now.as_secs() as i64)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    params.not_after = time::OffsetDateTime::from_unix_timestamp((now + VALIDITY).as_secs() as i64)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    params.serial_number = Some(rcgen::SerialNumber::from(rand::random::<u64>()));

    let key_pair = rcgen::KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(SelfSignedCertificate {
        cert_der: CertificateDer::from(cert.der().to_vec()),
        key_der: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        pem_cert: cert.pem(),
        pem_key: key_pair.serialize_pem(),
    })
}

/// A self-signed certificate with its private key
#[derive(Debug)]
pub struct SelfSignedCertificate {
    /// Certificate in DER format
    pub cert_der: CertificateDer<'static>,

    /// Private key in DER format
    pub key_der: PrivateKeyDer<'static>,

    /// Certificate in PEM format
    pub pem_cert: String,

    /// Private key in PEM format
    pub pem_key: String,
}

impl SelfSignedCertificate {
    /// Save certificate and key to PEM files
    pub fn save_to_files(&self, cert_path: &str, key_path: &str) -> std::io::Result<()> {
        std::fs::write(cert_path, &self.pem_cert)?;
        std::fs::write(key_path, &self.pem_key)?;
        Ok(())
    }

    /// Convert into the identity handed to the listener
    pub fn into_certificate(self) -> Certificate {
        Certificate::new(vec![self.cert_der], self.key_der)
    }
}
