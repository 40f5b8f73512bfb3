//! # FURS Rust Client
//!
//! Client for the Slovenian tax authority's fiscal cash register API (FURS).
//!
//! ## Signed Envelopes
//!
//! Invoice and business premise requests are sent as a compact JWS-like token:
//! - The header names the client certificate (`subject_name`, `issuer_name`,
//!   `serial`) so FURS can find the verification key
//! - The payload is the request record as JSON
//! - The signature is RS256 over `header.payload`, exactly as transmitted
//!
//! Replies are either a token of the same shape (only the payload is read;
//! the server is authenticated by TLS) or plain JSON.
//!
//! ## Mutual TLS
//!
//! The client certificate bundle (certificate, CA chain, encrypted PKCS#8 key)
//! authenticates the connection. The bundle's CA certificates are also the
//! trust roots for the FURS servers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use furs::{ClientConfig, Environment, FursClient, Invoice, InvoiceIdentifier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new(Environment::Test, "bundle.pem")
//!         .with_password("secret");
//!     let client = FursClient::from_config(&config)?;
//!
//!     println!("{}", client.echo("ping").await?);
//!
//!     let invoice = Invoice::new(
//!         12345678,
//!         chrono::Local::now().naive_local(),
//!         InvoiceIdentifier::new("TRGOVINA1", "BLAG2", "1"),
//!         "12.20".parse()?,
//!     );
//!     let eor = client.invoice(invoice).await?;
//!     println!("EOR: {}", eor);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bundle;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod json;
pub mod tls;
pub mod transport;
pub mod validation;

pub use api::{
    BusinessPremise, FursRequest, FursResponse, Invoice, InvoiceIdentifier, MessageHeader,
    TaxesPerSeller, Vat,
};
pub use client::FursClient;
pub use config::{ClientConfig, Environment, FursEnv};
pub use envelope::{build_header, decode, encode, CompactToken, Header};
pub use error::{Error, Result};
pub use identity::{Identity, RsaSigner, Signer};
pub use json::JsonCodec;
pub use transport::{HttpsTransport, Transport};
pub use validation::{Amount, TaxRate};
