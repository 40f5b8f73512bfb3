//! Signed request envelopes
//!
//! FURS wraps every signed request in a compact JWS-like token:
//!
//! ```text
//! base64url(header) "." base64url(payload) "." base64url(RS256(first two segments))
//! ```
//!
//! The header is not a general JOSE header. It carries the algorithm label
//! plus the subject name, issuer name and serial number of the client
//! certificate, which is how FURS finds the key to verify with.
//!
//! Decoding only extracts the payload segment. Server signatures are not
//! verified; the server is authenticated by TLS alone.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rsa::BigUint;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{Identity, Signer, RS256};
use crate::json::JsonCodec;

/// URL-safe alphabet; encodes without padding, decodes with or without it
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// JWS header bound to the client certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub alg: String,
    pub subject_name: String,
    pub issuer_name: String,
    #[serde(with = "decimal_serial")]
    pub serial: BigUint,
}

/// Build the header for `identity`, labelled with `alg`
///
/// The label is copied as given. It does not select the signing scheme;
/// that is whatever the signer passed to [`encode`] implements.
pub fn build_header(identity: &Identity, alg: &str) -> Header {
    Header {
        alg: alg.to_string(),
        subject_name: identity.subject_name.clone(),
        issuer_name: identity.issuer_name.clone(),
        serial: identity.serial.clone(),
    }
}

impl Identity {
    /// Header with the default `RS256` label
    pub fn header(&self) -> Header {
        build_header(self, RS256)
    }
}

/// A `header.payload.signature` token, as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactToken(String);

impl CompactToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The three raw segments, in order
    pub fn segments(&self) -> (&str, &str, &str) {
        let mut parts = self.0.splitn(3, '.');
        let header = parts.next().unwrap_or_default();
        let payload = parts.next().unwrap_or_default();
        let signature = parts.next().unwrap_or_default();
        (header, payload, signature)
    }
}

impl fmt::Display for CompactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON body carrying a token in both directions: `{"token": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEnvelope {
    pub token: String,
}

impl From<CompactToken> for TokenEnvelope {
    fn from(token: CompactToken) -> Self {
        Self {
            token: token.into_string(),
        }
    }
}

/// Sign `payload` under `header` and produce the compact token
pub fn encode<P: Serialize + ?Sized>(
    header: &Header,
    payload: &P,
    signer: &dyn Signer,
    json: &JsonCodec,
) -> Result<CompactToken> {
    if header.alg != signer.algorithm() {
        tracing::warn!(
            declared = %header.alg,
            actual = %signer.algorithm(),
            "header alg does not match the signing scheme"
        );
    }

    let header_segment = URL_SAFE.encode(json.to_vec(header)?);
    let payload_segment = URL_SAFE.encode(json.to_vec(payload)?);

    let mut token = String::with_capacity(header_segment.len() + payload_segment.len() + 350);
    token.push_str(&header_segment);
    token.push('.');
    token.push_str(&payload_segment);

    let signature = signer.sign(token.as_bytes())?;
    token.push('.');
    token.push_str(&URL_SAFE.encode(signature));

    Ok(CompactToken(token))
}

/// Decode the payload segment of `token`, without checking its signature
pub fn decode<P: DeserializeOwned>(token: &str, json: &JsonCodec) -> Result<P> {
    let bytes = decode_payload_bytes(token)?;
    json.from_slice(&bytes)
}

/// Raw payload bytes of a token
pub fn decode_payload_bytes(token: &str) -> Result<Vec<u8>> {
    let first_dot = token
        .find('.')
        .ok_or_else(|| Error::MalformedToken("no '.' separator".into()))?;
    let second_dot = token[first_dot + 1..]
        .find('.')
        .map(|offset| first_dot + 1 + offset)
        .ok_or_else(|| Error::MalformedToken("only one '.' separator".into()))?;

    URL_SAFE
        .decode(&token[first_dot + 1..second_dot])
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {}", e)))
}

/// `serial` is a JSON integer literal of any size, never a string
mod decimal_serial {
    use std::str::FromStr;

    use rsa::BigUint;
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(serial: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serde_json::Number::from_str(&serial.to_string())
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let number = serde_json::Number::deserialize(deserializer)?;
        BigUint::from_str(&number.to_string())
            .map_err(|_| D::Error::custom(format!("serial must be a non-negative integer, got {}", number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Returns the same bytes for any input
    struct FixedSigner(&'static [u8]);

    impl Signer for FixedSigner {
        fn algorithm(&self) -> &str {
            RS256
        }

        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }
    }

    /// "Signature" is the message itself, so it covers every input byte
    struct EchoSigner;

    impl Signer for EchoSigner {
        fn algorithm(&self) -> &str {
            RS256
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
            Ok(message.to_vec())
        }
    }

    struct FailingSigner;

    impl Signer for FailingSigner {
        fn algorithm(&self) -> &str {
            RS256
        }

        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
            Err(Error::Signing("key unavailable".into()))
        }
    }

    fn test_identity() -> Identity {
        Identity::new("CN=Test", "CN=TestCA", 12345u64)
    }

    fn is_base64url_unpadded(segment: &str) -> bool {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_header_json() {
        let header = build_header(&test_identity(), "RS256");
        let bytes = JsonCodec::compact().to_vec(&header).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alg":"RS256","subject_name":"CN=Test","issuer_name":"CN=TestCA","serial":12345}"#
        );
    }

    #[test]
    fn test_header_serial_beyond_u64() {
        let serial: BigUint = "340282366920938463463374607431768211457".parse().unwrap();
        let header = build_header(&Identity::new("CN=A", "CN=B", serial.clone()), RS256);
        let json = JsonCodec::compact();

        let text = String::from_utf8(json.to_vec(&header).unwrap()).unwrap();
        assert!(text.ends_with(r#""serial":340282366920938463463374607431768211457}"#));

        let back: Header = json.from_slice(text.as_bytes()).unwrap();
        assert_eq!(back.serial, serial);
    }

    #[test]
    fn test_build_header_keeps_custom_alg() {
        let header = build_header(&test_identity(), "PS256");
        assert_eq!(header.alg, "PS256");
        assert_eq!(test_identity().header().alg, "RS256");
    }

    #[test]
    fn test_encode_end_to_end() {
        let json = JsonCodec::compact();
        let header = build_header(&test_identity(), "RS256");
        let payload = json!({"EchoRequest": "hello"});

        let token = encode(&header, &payload, &FixedSigner(b"sig"), &json).unwrap();
        let (h, p, s) = token.segments();

        assert_eq!(
            URL_SAFE.decode(h).unwrap(),
            br#"{"alg":"RS256","subject_name":"CN=Test","issuer_name":"CN=TestCA","serial":12345}"#
        );
        assert_eq!(URL_SAFE.decode(p).unwrap(), br#"{"EchoRequest":"hello"}"#);
        assert_eq!(URL_SAFE.decode(s).unwrap(), b"sig");
    }

    #[test]
    fn test_encode_with_mismatched_alg_label() {
        let json = JsonCodec::compact();
        let header = build_header(&test_identity(), "PS256");

        let token = encode(&header, &json!({"x": 1}), &EchoSigner, &json).unwrap();
        let (h, p, s) = token.segments();

        let sent: Header = json.from_slice(&URL_SAFE.decode(h).unwrap()).unwrap();
        assert_eq!(sent.alg, "PS256");
        assert_eq!(URL_SAFE.decode(s).unwrap(), format!("{}.{}", h, p).into_bytes());
    }

    #[test]
    fn test_segment_structure() {
        let json = JsonCodec::compact();
        let header = test_identity().header();
        for payload in [json!({}), json!({"EchoRequest": "?>?>"}), json!({"a": [1, 2, 3]})] {
            let token = encode(&header, &payload, &EchoSigner, &json).unwrap();
            assert_eq!(token.as_str().matches('.').count(), 2);
            let (h, p, s) = token.segments();
            assert!(is_base64url_unpadded(h));
            assert!(is_base64url_unpadded(p));
            assert!(is_base64url_unpadded(s));
        }
    }

    #[test]
    fn test_signature_covers_exact_signing_input() {
        let json = JsonCodec::compact();
        let token = encode(&test_identity().header(), &json!({"x": 1}), &EchoSigner, &json).unwrap();
        let (h, p, s) = token.segments();
        assert_eq!(URL_SAFE.decode(s).unwrap(), format!("{}.{}", h, p).into_bytes());
    }

    #[test]
    fn test_header_change_changes_signature() {
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let signer = crate::identity::RsaSigner::new(key).unwrap();
        let json = JsonCodec::compact();
        let payload = json!({"EchoRequest": "hello"});

        let a = encode(&build_header(&test_identity(), RS256), &payload, &signer, &json).unwrap();
        let other = Identity::new("CN=Tesu", "CN=TestCA", 12345u64);
        let b = encode(&build_header(&other, RS256), &payload, &signer, &json).unwrap();

        assert_eq!(a.segments().1, b.segments().1);
        assert_ne!(a.segments().2, b.segments().2);
    }

    #[test]
    fn test_round_trip() {
        let json = JsonCodec::compact();
        let payload = json!({"InvoiceRequest": {"Header": {"MessageID": "x"}, "Invoice": {"TaxNumber": 12345678}}});
        let token = encode(&test_identity().header(), &payload, &FixedSigner(b"\x00\xff"), &json).unwrap();
        let back: serde_json::Value = decode(token.as_str(), &json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_signer_failure_propagates() {
        let json = JsonCodec::compact();
        let err = encode(&test_identity().header(), &json!({}), &FailingSigner, &json).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn test_decode_without_dots() {
        let err = decode::<serde_json::Value>("abc", &JsonCodec::compact()).unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
    }

    #[test]
    fn test_decode_with_one_dot() {
        let err = decode::<serde_json::Value>("abc.def", &JsonCodec::compact()).unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = decode::<serde_json::Value>("abc.!!!.def", &JsonCodec::compact()).unwrap_err();
        assert!(matches!(err, Error::MalformedToken(_)));
    }

    #[test]
    fn test_decode_non_json_payload() {
        let token = format!("e30.{}.c2ln", URL_SAFE.encode("not json"));
        let err = decode::<serde_json::Value>(&token, &JsonCodec::compact()).unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode(r#"{"a":1}"#);
        assert!(padded.ends_with('='));
        let token = format!("e30.{}.", padded);
        let value: serde_json::Value = decode(&token, &JsonCodec::compact()).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_token_envelope_json() {
        let envelope = TokenEnvelope::from(CompactToken("a.b.c".into()));
        let bytes = JsonCodec::compact().to_vec(&envelope).unwrap();
        assert_eq!(bytes, br#"{"token":"a.b.c"}"#);
    }
}
