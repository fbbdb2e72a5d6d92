//! Metadata for an object held in the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the store tells us about a single object.
///
/// The store owns the payload and enforces key uniqueness; the gateway
/// only ever sees this metadata view plus a byte stream.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectMeta {
    /// Unique key, derived from the (possibly disambiguated) original filename.
    pub key: String,

    /// Size in bytes as reported by the store.
    pub size: i64,

    /// Last-modified timestamp, normalized to UTC at the store boundary.
    pub last_modified: DateTime<Utc>,

    /// Content type, when the store reports one. Listings leave this empty.
    pub content_type: Option<String>,
}
