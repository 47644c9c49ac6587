//! PEM certificate and key loading

use crate::CertError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load every certificate from a PEM file, leaf first
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertError> {
    let file = File::open(path).map_err(|source| CertError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertError::Parse(format!("{}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(CertError::Parse(format!(
            "{}: no certificates found",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CertError> {
    let file = File::open(path).map_err(|source| CertError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CertError::Parse(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| CertError::Parse(format!("{}: no private key found", path.display())))
}
