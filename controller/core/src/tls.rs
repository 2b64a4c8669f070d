use rustls_pemfile::Item;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Certificate and key material for a set of SNI hostnames.
///
/// The fingerprint is derived from the raw certificate and key bytes, so two
/// bundles with equal fingerprints are interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TlsBundle {
    /// `<namespace>/<secret name>`.
    pub name: String,
    pub sni: Vec<String>,
    #[serde(skip)]
    pub cert_pem: Vec<u8>,
    #[serde(skip)]
    pub key_pem: Vec<u8>,
    /// The certificate's `NotAfter`, in seconds since the epoch.
    pub not_after: i64,
    pub fingerprint: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("missing certificate data")]
    MissingCertificate,

    #[error("missing private key data")]
    MissingKey,

    #[error("certificate data is not PEM-encoded")]
    NoPem,

    #[error("failed to decode PEM certificate: {0}")]
    InvalidPem(#[source] std::io::Error),

    #[error("leading PEM block is not a certificate")]
    NotACertificate,

    #[error("failed to parse certificate: {0}")]
    InvalidCertificate(String),
}

// === impl TlsBundle ===

impl TlsBundle {
    /// Builds a bundle from PEM-encoded certificate and key bytes.
    ///
    /// Only the leading PEM block of `cert_pem` is parsed; it must be an X.509
    /// certificate.
    pub fn build(
        name: impl Into<String>,
        sni: Vec<String>,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, TlsError> {
        if cert_pem.is_empty() {
            return Err(TlsError::MissingCertificate);
        }
        if key_pem.is_empty() {
            return Err(TlsError::MissingKey);
        }

        let not_after = not_after(cert_pem)?;
        Ok(Self {
            name: name.into(),
            sni,
            cert_pem: cert_pem.to_vec(),
            key_pem: key_pem.to_vec(),
            not_after,
            fingerprint: fingerprint(cert_pem, key_pem),
        })
    }
}

/// Hex-encoded SHA-256 over the certificate bytes followed by the key bytes.
pub fn fingerprint(cert_pem: &[u8], key_pem: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert_pem);
    hasher.update(key_pem);
    hex::encode(hasher.finalize())
}

fn not_after(cert_pem: &[u8]) -> Result<i64, TlsError> {
    let der = match rustls_pemfile::read_one(&mut &*cert_pem) {
        Ok(Some(Item::X509Certificate(der))) => der,
        Ok(Some(_)) => return Err(TlsError::NotACertificate),
        Ok(None) => return Err(TlsError::NoPem),
        Err(error) => return Err(TlsError::InvalidPem(error)),
    };
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|error| TlsError::InvalidCertificate(error.to_string()))?;
    Ok(cert.validity().not_after.timestamp())
}
