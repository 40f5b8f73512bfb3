//! PEM bundle loading
//!
//! FURS issues the client certificate as a PKCS#12 file. After conversion to
//! PEM the bundle holds the client certificate, the issuing CA certificates
//! and one (usually encrypted) private key, in no particular order.

use std::fmt;
use std::path::Path;

use der::{Decode, Encode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use x509_cert::Certificate;

use crate::error::{Error, Result};
use crate::identity::{has_organizational_unit, Identity, RsaSigner};
use crate::tls::cert_pubkey_fingerprint;

/// A certificate from the bundle, raw and parsed
#[derive(Debug, Clone)]
pub struct BundleCertificate {
    pub der: CertificateDer<'static>,
    pub parsed: Certificate,
}

/// Encoding of an unencrypted private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `PRIVATE KEY`
    Pkcs8,
    /// `RSA PRIVATE KEY`
    Pkcs1,
}

/// One PEM block, classified by its label
#[derive(Clone)]
pub enum PemObject {
    Certificate(Box<BundleCertificate>),
    EncryptedPrivateKey(Vec<u8>),
    PrivateKey { format: KeyFormat, der: Vec<u8> },
    Other { label: String },
}

impl PemObject {
    fn is_private_key(&self) -> bool {
        matches!(
            self,
            PemObject::EncryptedPrivateKey(_) | PemObject::PrivateKey { .. }
        )
    }
}

impl fmt::Debug for PemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemObject::Certificate(cert) => f
                .debug_tuple("Certificate")
                .field(&cert.parsed.tbs_certificate.subject.to_string())
                .finish(),
            PemObject::EncryptedPrivateKey(_) => f.write_str("EncryptedPrivateKey"),
            PemObject::PrivateKey { format, .. } => {
                f.debug_struct("PrivateKey").field("format", format).finish_non_exhaustive()
            }
            PemObject::Other { label } => f.debug_struct("Other").field("label", label).finish(),
        }
    }
}

/// Split a PEM file into classified objects
pub fn parse_pem(bytes: &[u8]) -> Result<Vec<PemObject>> {
    let blocks = pem::parse_many(bytes).map_err(|e| Error::Pem(e.to_string()))?;

    blocks
        .into_iter()
        .map(|block| match block.tag() {
            "CERTIFICATE" => {
                let parsed = Certificate::from_der(block.contents())
                    .map_err(|e| Error::Certificate(format!("Failed to parse certificate: {}", e)))?;
                Ok(PemObject::Certificate(Box::new(BundleCertificate {
                    der: CertificateDer::from(block.contents().to_vec()),
                    parsed,
                })))
            }
            "ENCRYPTED PRIVATE KEY" => Ok(PemObject::EncryptedPrivateKey(block.contents().to_vec())),
            "PRIVATE KEY" => Ok(PemObject::PrivateKey {
                format: KeyFormat::Pkcs8,
                der: block.contents().to_vec(),
            }),
            "RSA PRIVATE KEY" if block.headers().get("Proc-Type").is_some() => {
                Err(Error::PrivateKey(
                    "legacy OpenSSL-encrypted RSA keys are not supported, convert to PKCS#8".into(),
                ))
            }
            "RSA PRIVATE KEY" => Ok(PemObject::PrivateKey {
                format: KeyFormat::Pkcs1,
                der: block.contents().to_vec(),
            }),
            other => Ok(PemObject::Other {
                label: other.to_string(),
            }),
        })
        .collect()
}

/// Parsed contents of a client PEM bundle
#[derive(Debug, Clone)]
pub struct PemBundle {
    objects: Vec<PemObject>,
}

impl PemBundle {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let objects = parse_pem(bytes)?;
        tracing::debug!(objects = objects.len(), "parsed PEM bundle");
        Ok(Self { objects })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Config(format!("Failed to read PEM bundle {}: {}", path.display(), e))
        })?;
        Self::parse(&bytes)
    }

    pub fn objects(&self) -> &[PemObject] {
        &self.objects
    }

    pub fn certificates(&self) -> impl Iterator<Item = &BundleCertificate> {
        self.objects.iter().filter_map(|obj| match obj {
            PemObject::Certificate(cert) => Some(cert.as_ref()),
            _ => None,
        })
    }

    /// The single certificate whose subject carries `OU=<ou_marker>`
    pub fn client_certificate(&self, ou_marker: &str) -> Result<&BundleCertificate> {
        let mut matching = self
            .certificates()
            .filter(|cert| has_organizational_unit(&cert.parsed.tbs_certificate.subject, ou_marker));

        match (matching.next(), matching.count()) {
            (None, _) => Err(Error::NoClientCertificate(ou_marker.to_string())),
            (Some(cert), 0) => Ok(cert),
            (Some(_), rest) => Err(Error::MultipleClientCertificates {
                ou: ou_marker.to_string(),
                count: rest + 1,
            }),
        }
    }

    /// The single private key of the bundle, decrypted with `password` if needed
    pub fn private_key(&self, password: Option<&str>) -> Result<RsaPrivateKey> {
        let mut keys = self.objects.iter().filter(|obj| obj.is_private_key());

        let key = match (keys.next(), keys.count()) {
            (None, _) => return Err(Error::NoPrivateKey),
            (Some(key), 0) => key,
            (Some(_), rest) => return Err(Error::MultiplePrivateKeys(rest + 1)),
        };

        match key {
            PemObject::EncryptedPrivateKey(der) => {
                let password = password.ok_or_else(|| {
                    Error::PrivateKey("private key is encrypted but no password was given".into())
                })?;
                decrypt_pkcs8(der, password)
            }
            PemObject::PrivateKey {
                format: KeyFormat::Pkcs8,
                der,
            } => RsaPrivateKey::from_pkcs8_der(der)
                .map_err(|e| Error::PrivateKey(format!("Failed to parse PKCS#8 key: {}", e))),
            PemObject::PrivateKey {
                format: KeyFormat::Pkcs1,
                der,
            } => RsaPrivateKey::from_pkcs1_der(der)
                .map_err(|e| Error::PrivateKey(format!("Failed to parse PKCS#1 key: {}", e))),
            PemObject::Certificate(_) | PemObject::Other { .. } => Err(Error::NoPrivateKey),
        }
    }

    /// Select the client certificate and key and derive the signing identity
    pub fn client_identity(&self, ou_marker: &str, password: Option<&str>) -> Result<ClientIdentity> {
        let client = self.client_certificate(ou_marker)?;
        let private_key = self.private_key(password)?;

        check_key_matches(&client.parsed, &private_key)?;

        let key_der = private_key
            .to_pkcs8_der()
            .map_err(|e| Error::PrivateKey(format!("Failed to encode PKCS#8 key: {}", e)))?;

        let mut cert_chain = vec![client.der.clone()];
        cert_chain.extend(
            self.certificates()
                .filter(|cert| cert.der != client.der)
                .map(|cert| cert.der.clone()),
        );

        let identity = Identity::from_certificate(&client.parsed);
        let fingerprint = cert_pubkey_fingerprint(&client.der)?;
        tracing::info!(
            subject = %identity.subject_name,
            issuer = %identity.issuer_name,
            serial = %identity.serial,
            fingerprint = %fingerprint,
            "loaded client certificate"
        );

        Ok(ClientIdentity {
            identity,
            signer: RsaSigner::new(private_key)?,
            cert_chain,
            key_der: PrivatePkcs8KeyDer::from(key_der.as_bytes().to_vec()),
            fingerprint,
        })
    }
}

fn decrypt_pkcs8(der: &[u8], password: &str) -> Result<RsaPrivateKey> {
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| Error::PrivateKey(format!("Failed to parse encrypted key: {}", e)))?;
    let document = info
        .decrypt(password)
        .map_err(|e| Error::PrivateKey(format!("Failed to decrypt private key: {}", e)))?;
    RsaPrivateKey::from_pkcs8_der(document.as_bytes())
        .map_err(|e| Error::PrivateKey(format!("Decrypted key is not an RSA key: {}", e)))
}

fn check_key_matches(cert: &Certificate, key: &RsaPrivateKey) -> Result<()> {
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("Failed to encode SPKI: {}", e)))?;
    let cert_key = RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| Error::Certificate(format!("Client certificate key is not RSA: {}", e)))?;

    if cert_key != key.to_public_key() {
        return Err(Error::PrivateKey(
            "private key does not match the client certificate".into(),
        ));
    }
    Ok(())
}

/// Everything needed to authenticate and sign as the cash register operator
pub struct ClientIdentity {
    pub identity: Identity,
    pub signer: RsaSigner,
    /// Client certificate first, then the rest of the bundle
    pub cert_chain: Vec<CertificateDer<'static>>,
    key_der: PrivatePkcs8KeyDer<'static>,
    /// SHA-256 of the client certificate's SPKI, hex
    pub fingerprint: String,
}

impl ClientIdentity {
    /// Private key in the form rustls expects
    pub fn private_key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key_der.clone_key())
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("identity", &self.identity)
            .field("chain_len", &self.cert_chain.len())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::BigUint;

    const BUNDLE: &[u8] = include_bytes!("../tests/fixtures/bundle-test.pem");
    const CA: &[u8] = include_bytes!("../tests/fixtures/ca.pem");
    const CLIENT: &[u8] = include_bytes!("../tests/fixtures/client.pem");
    const ENCRYPTED_KEY: &[u8] = include_bytes!("../tests/fixtures/client-encrypted.key");
    const PLAIN_KEY: &[u8] = include_bytes!("../tests/fixtures/client-unencrypted.key");
    const PASSWORD: &str = "Geslo123";

    fn concat(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    #[test]
    fn test_parse_classifies_objects() {
        let objects = parse_pem(BUNDLE).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(matches!(objects[0], PemObject::Certificate(_)));
        assert!(matches!(objects[1], PemObject::Certificate(_)));
        assert!(matches!(objects[2], PemObject::EncryptedPrivateKey(_)));

        let plain = parse_pem(PLAIN_KEY).unwrap();
        assert!(matches!(
            plain[0],
            PemObject::PrivateKey {
                format: KeyFormat::Pkcs8,
                ..
            }
        ));

        let other = parse_pem(b"-----BEGIN X509 CRL-----\nAAAA\n-----END X509 CRL-----\n").unwrap();
        assert!(matches!(&other[0], PemObject::Other { label } if label == "X509 CRL"));
    }

    #[test]
    fn test_client_certificate_by_ou() {
        let bundle = PemBundle::parse(BUNDLE).unwrap();
        let cert = bundle.client_certificate("DavPotRacTEST").unwrap();
        assert!(has_organizational_unit(
            &cert.parsed.tbs_certificate.subject,
            "12345678"
        ));

        assert!(matches!(
            bundle.client_certificate("DavPotRac"),
            Err(Error::NoClientCertificate(ou)) if ou == "DavPotRac"
        ));
    }

    #[test]
    fn test_multiple_client_certificates_and_keys() {
        let bundle = PemBundle::parse(&concat(&[
            CLIENT,
            CLIENT,
            CA,
            ENCRYPTED_KEY,
            PLAIN_KEY,
        ]))
        .unwrap();

        assert!(matches!(
            bundle.client_certificate("DavPotRacTEST"),
            Err(Error::MultipleClientCertificates { count: 2, .. })
        ));
        assert!(matches!(
            bundle.private_key(Some(PASSWORD)),
            Err(Error::MultiplePrivateKeys(2))
        ));
    }

    #[test]
    fn test_private_key_selection() {
        let no_key = PemBundle::parse(CA).unwrap();
        assert!(matches!(no_key.private_key(None), Err(Error::NoPrivateKey)));

        let bundle = PemBundle::parse(BUNDLE).unwrap();
        assert!(matches!(bundle.private_key(None), Err(Error::PrivateKey(_))));
        assert!(matches!(
            bundle.private_key(Some("wrong")),
            Err(Error::PrivateKey(_))
        ));

        let decrypted = bundle.private_key(Some(PASSWORD)).unwrap();
        let plain = PemBundle::parse(PLAIN_KEY).unwrap().private_key(None).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_client_identity() {
        let bundle = PemBundle::parse(BUNDLE).unwrap();
        let client = bundle.client_identity("DavPotRacTEST", Some(PASSWORD)).unwrap();

        assert_eq!(
            client.identity.subject_name,
            "SERIALNUMBER=1, CN=TESTNO PODJETJE 1, OU=12345678, OU=DavPotRacTEST, O=state-institutions, C=SI"
        );
        assert_eq!(
            client.identity.issuer_name,
            "CN=Test CA, O=state-institutions, C=SI"
        );
        assert_eq!(
            client.identity.serial,
            "506179927174465497198103308".parse::<BigUint>().unwrap()
        );
        assert_eq!(client.cert_chain.len(), 2);
        assert_eq!(client.cert_chain[0].as_ref(), bundle.client_certificate("DavPotRacTEST").unwrap().der.as_ref());
        assert_eq!(
            client.fingerprint,
            "4c629e15efb17a5ef96054512868d9731b73a5bb686acf6d17052e601682303d"
        );
        assert!(matches!(client.private_key_der(), PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_key_must_match_certificate() {
        let other_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let other_pem = other_key.to_pkcs8_pem(Default::default()).unwrap();

        let bundle = PemBundle::parse(&concat(&[CLIENT, CA, other_pem.as_bytes()])).unwrap();
        assert!(matches!(
            bundle.client_identity("DavPotRacTEST", None),
            Err(Error::PrivateKey(_))
        ));
    }
}
