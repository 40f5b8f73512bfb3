//! JSON encoding of request and response records
//!
//! The codec is an ordinary value chosen at startup and handed to the client;
//! there is no process-wide mapper to configure.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Immutable JSON serializer configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact output, the default
    pub const fn compact() -> Self {
        Self { pretty: false }
    }

    /// Indented output, easier to read in request logs
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        bytes.map_err(Error::Serialization)
    }

    /// Unknown fields are ignored, missing optional fields become `None`.
    pub fn from_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(Error::Deserialization)
    }
}
