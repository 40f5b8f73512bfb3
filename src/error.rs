//! Error types for the FURS client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("JSON deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Error object returned by FURS itself
    #[error("FURS error {}: {message}", .code.as_deref().unwrap_or("????"))]
    Domain {
        code: Option<String>,
        message: String,
    },

    /// Neither the expected success field nor an error object was present
    #[error("Incomplete response: {0}")]
    IncompleteResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("PEM parsing failed: {0}")]
    Pem(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Private key error: {0}")]
    PrivateKey(String),

    #[error("No private key in PEM bundle")]
    NoPrivateKey,

    #[error("PEM bundle contains {0} private keys, expected exactly one")]
    MultiplePrivateKeys(usize),

    #[error("No client certificate with OU={0} in PEM bundle")]
    NoClientCertificate(String),

    #[error("PEM bundle contains {count} client certificates with OU={ou}, expected exactly one")]
    MultipleClientCertificates { ou: String, count: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The FURS error code, if this is an error returned by FURS
    pub fn furs_code(&self) -> Option<&str> {
        match self {
            Error::Domain { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
