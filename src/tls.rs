//! Mutual TLS towards the FURS endpoints
//!
//! FURS servers present certificates issued by the tax authority's own CA,
//! which is not in any public root store. The CA certificates shipped in the
//! client bundle are trusted instead, plus any extra roots from configuration.

use std::path::Path;
use std::time::Duration;

use der::Encode;
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use sha2::{Digest, Sha256};

use crate::bundle::{parse_pem, ClientIdentity, PemBundle, PemObject};
use crate::error::{Error, Result};

/// SHA-256 fingerprint of a certificate's public key
///
/// Hashes the DER encoding of the full SubjectPublicKeyInfo, which is what
/// `openssl pkey -pubin -outform DER | sha256sum` prints.
pub fn cert_pubkey_fingerprint(cert_der: &CertificateDer<'_>) -> Result<String> {
    use der::Decode;
    use x509_cert::Certificate;

    let cert = Certificate::from_der(cert_der.as_ref())
        .map_err(|e| Error::Tls(format!("Failed to parse certificate: {}", e)))?;

    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Tls(format!("Failed to encode SPKI: {}", e)))?;

    Ok(hex::encode(Sha256::digest(&spki_der)))
}

/// Certificates from a PEM file of extra trust roots
pub fn load_trust_roots(path: impl AsRef<Path>) -> Result<Vec<CertificateDer<'static>>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        Error::Config(format!("Failed to read trust roots {}: {}", path.display(), e))
    })?;

    let roots: Vec<_> = parse_pem(&bytes)?
        .into_iter()
        .filter_map(|obj| match obj {
            PemObject::Certificate(cert) => Some(cert.der),
            _ => None,
        })
        .collect();

    if roots.is_empty() {
        return Err(Error::Config(format!(
            "No certificates in trust root file {}",
            path.display()
        )));
    }
    Ok(roots)
}

/// Trust every certificate of the bundle plus `extra_roots`
pub fn root_store(bundle: &PemBundle, extra_roots: &[CertificateDer<'static>]) -> Result<RootCertStore> {
    let mut store = RootCertStore::empty();
    let candidates = bundle
        .certificates()
        .map(|cert| cert.der.clone())
        .chain(extra_roots.iter().cloned());

    let (added, ignored) = store.add_parsable_certificates(candidates);
    tracing::debug!(added, ignored, "built TLS root store");

    if added == 0 {
        return Err(Error::Tls("No usable trust roots".into()));
    }
    Ok(store)
}

/// rustls configuration presenting the client certificate
pub fn client_config(identity: &ClientIdentity, roots: RootCertStore) -> Result<rustls::ClientConfig> {
    // Ensure crypto provider is installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(identity.cert_chain.clone(), identity.private_key_der())
        .map_err(|e| Error::Tls(format!("Failed to configure client certificate: {}", e)))
}

/// Create a reqwest client that authenticates with the client certificate
pub fn create_mtls_client(
    identity: &ClientIdentity,
    roots: RootCertStore,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let config = client_config(identity, roots)?;

    reqwest::Client::builder()
        .use_preconfigured_tls(config)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Tls(format!("Failed to build HTTP client: {}", e)))
}
