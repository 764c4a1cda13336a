//! # Transport-neutral message wrapper.
//!
//! An [`Envelope`] separates routing metadata (headers) from the resource
//! content (message), so every broker backend shares one wire shape:
//!
//! ```text
//! {
//!   "header":  { "headers": { "event_type": "added", "resource_kind": "Fleet" } },
//!   "message": { ...resource snapshot... }
//! }
//! ```
//!
//! The header container is allocated on the first [`Envelope::add_header`]
//! call; an envelope without headers encodes `"header": null`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EncodeError;

/// Header key holding the event type token.
pub const EVENT_TYPE_HEADER: &str = "event_type";
/// Header key holding the resource kind, when known.
pub const RESOURCE_KIND_HEADER: &str = "resource_kind";
/// Header key holding the destination topic for topic-routed brokers.
pub const TOPIC_HEADER: &str = "topic";

/// Header container of an [`Envelope`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub headers: BTreeMap<String, String>,
}

/// Wire-level wrapper sent to a broker backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Option<Header>,
    pub message: Value,
}

impl Envelope {
    /// Creates an envelope without headers.
    pub fn new(message: Value) -> Self {
        Self {
            header: None,
            message,
        }
    }

    /// Inserts or replaces a header; the last value written for a key wins.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header
            .get_or_insert_with(Header::default)
            .headers
            .insert(key.into(), value.into());
    }

    /// Looks up a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.header
            .as_ref()
            .and_then(|h| h.headers.get(key))
            .map(String::as_str)
    }

    /// Number of headers set so far.
    pub fn header_len(&self) -> usize {
        self.header.as_ref().map_or(0, |h| h.headers.len())
    }

    /// Serializes the envelope as a JSON document.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope previously produced by [`Envelope::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
