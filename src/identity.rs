//! Client identity: certificate-derived names plus an RS256 signer
//!
//! FURS binds every signed request to the client certificate through three
//! header claims: the subject name, the issuer name and the serial number.
//! The names are rendered the way FURS expects them (most specific RDN
//! first, `", "` between RDNs), and the serial number is kept as an
//! unbounded integer.

use std::fmt;

use der::{Encode, Tag, Tagged};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::{BigUint, RsaPrivateKey};
use sha2::Sha256;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{Error, Result};

/// The only signing scheme FURS accepts
pub const RS256: &str = "RS256";

/// Certificate-derived identity of the cash register operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_name: String,
    pub issuer_name: String,
    pub serial: BigUint,
}

impl Identity {
    pub fn new(
        subject_name: impl Into<String>,
        issuer_name: impl Into<String>,
        serial: impl Into<BigUint>,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            issuer_name: issuer_name.into(),
            serial: serial.into(),
        }
    }

    /// Derive the identity from a parsed X.509 certificate
    pub fn from_certificate(cert: &Certificate) -> Self {
        let tbs = &cert.tbs_certificate;
        Self {
            subject_name: distinguished_name(&tbs.subject),
            issuer_name: distinguished_name(&tbs.issuer),
            serial: BigUint::from_bytes_be(tbs.serial_number.as_bytes()),
        }
    }
}

/// Anything that can produce a signature over raw bytes
///
/// `algorithm` is the JWS label of the scheme `sign` actually runs.
pub trait Signer: Send + Sync {
    fn algorithm(&self) -> &str;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// RSASSA-PKCS1-v1_5 with SHA-256
#[derive(Clone)]
pub struct RsaSigner {
    key: SigningKey<Sha256>,
}

impl RsaSigner {
    /// Wrap a private key, failing early if the key cannot sign
    pub fn new(private_key: RsaPrivateKey) -> Result<Self> {
        let signer = Self {
            key: SigningKey::<Sha256>::new(private_key),
        };
        signer.sign(&[1, 2, 3])?;
        Ok(signer)
    }
}

impl Signer for RsaSigner {
    fn algorithm(&self) -> &str {
        RS256
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.key
            .try_sign(message)
            .map(|sig| sig.to_vec())
            .map_err(|e| Error::Signing(e.to_string()))
    }
}

impl fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigner").field("alg", &RS256).finish_non_exhaustive()
    }
}

/// Keywords for the attribute types that appear in FURS certificates
const KEYWORDS: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.4", "SURNAME"),
    ("2.5.4.5", "SERIALNUMBER"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.12", "T"),
    ("2.5.4.42", "GIVENNAME"),
    ("2.5.4.43", "INITIALS"),
    ("2.5.4.44", "GENERATION"),
    ("2.5.4.46", "DNQ"),
    ("0.9.2342.19200300.100.1.1", "UID"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.2.840.113549.1.9.1", "EMAILADDRESS"),
];

const OU_OID: &str = "2.5.4.11";

/// Render a distinguished name as FURS expects it in the JWS header
///
/// RDNs are emitted in reverse DER order joined by `", "`; multi-valued RDNs
/// join their attributes with `" + "`.
pub fn distinguished_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(|atv| {
                    let oid = atv.oid.to_string();
                    let keyword = KEYWORDS
                        .iter()
                        .find(|(dotted, _)| *dotted == oid)
                        .map(|(_, kw)| (*kw).to_string())
                        .unwrap_or_else(|| format!("OID.{}", oid));
                    format!("{}={}", keyword, render_value(&atv.value))
                })
                .collect::<Vec<_>>()
                .join(" + ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether any `OU` attribute of the name equals `expected`
pub fn has_organizational_unit(name: &Name, expected: &str) -> bool {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .filter(|atv| atv.oid.to_string() == OU_OID)
        .any(|atv| attribute_string(&atv.value).as_deref() == Some(expected))
}

fn attribute_string(value: &der::Any) -> Option<String> {
    let bytes = value.value();
    match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => Some(String::from_utf8_lossy(bytes).into_owned()),
        Tag::BmpString => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        }
        _ => None,
    }
}

fn render_value(value: &der::Any) -> String {
    match attribute_string(value) {
        Some(s) => quote_if_needed(&s),
        None => {
            let der = value.to_der().unwrap_or_else(|_| value.value().to_vec());
            format!("#{}", hex::encode(der))
        }
    }
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.starts_with(' ')
        || value.ends_with(' ')
        || value.contains("  ")
        || value.chars().any(|c| ",+=\n<>#;\\\"".contains(c));

    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
