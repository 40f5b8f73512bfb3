//! Transport abstraction for FURS requests
//!
//! A transport posts one JSON body to one URL and returns the response body.
//! It knows nothing about tokens or signatures.

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};

/// Content type FURS expects on every request
pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Delivery of request bodies to FURS
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` and return the response body of a 2xx reply.
    async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Reject anything but `https` before a request leaves the process
pub fn require_https(url: &Url) -> Result<()> {
    if url.scheme() != "https" {
        return Err(Error::InvalidInput(format!(
            "refusing to send to non-https URL {}",
            url
        )));
    }
    Ok(())
}

/// HTTPS transport over a mutual-TLS reqwest client
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>> {
        require_https(url)?;

        tracing::debug!(url = %url, bytes = body.len(), "sending FURS request");

        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(url = %url, status = status.as_u16(), "FURS replied");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// In-memory transport for tests and offline use
///
/// Every request is recorded; replies come from a caller-supplied handler.
pub mod memory {
    use std::sync::Mutex;

    use super::*;

    type Handler = Box<dyn Fn(&Url, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

    /// A request as seen by [`MemoryTransport`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedRequest {
        pub url: Url,
        pub body: Vec<u8>,
    }

    pub struct MemoryTransport {
        handler: Handler,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MemoryTransport {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&Url, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Always reply with the same body
        pub fn replying(body: impl Into<Vec<u8>>) -> Self {
            let body = body.into();
            Self::new(move |_, _| Ok(body.clone()))
        }

        /// Requests sent so far, oldest first
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Vec<u8>> {
            require_https(url)?;
            let reply = (self.handler)(url, &body);
            self.requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(RecordedRequest {
                    url: url.clone(),
                    body,
                });
            reply
        }
    }

}
