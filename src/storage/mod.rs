pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::core::error::StoreError;

// ---------------------------------------------------------------------------
// ObjectStore trait
// ---------------------------------------------------------------------------

/// Read-only abstraction over the object-storage backend.
///
/// Trait-based so tests run against [`memory::InMemoryStore`] while the
/// production build talks to S3-compatible storage. The gateway never
/// writes or deletes; this trait has no mutation surface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's attributes without its body.
    async fn get_attributes(&self, bucket: &str, key: &str) -> Result<ObjectAttrs, StoreError>;

    /// Open a bounded read over an object.
    ///
    /// `length == -1` reads from `offset` to the end of the object. A
    /// bounded read past the end is clamped; the reader reports how many
    /// bytes it will actually yield.
    async fn read_range(
        &self,
        bucket: &str,
        key: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader, StoreError>;

    /// List objects under `prefix`, treating `delimiter` as a directory
    /// boundary (non-recursive).
    ///
    /// The listing is produced lazily; the stream ending is the
    /// end-of-listing signal, distinct from item-level errors.
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> BoxStream<'static, Result<ObjectRef, StoreError>>;
}

// ---------------------------------------------------------------------------
// Store types
// ---------------------------------------------------------------------------

/// Object metadata, as returned by an attribute lookup.
#[derive(Debug, Clone)]
pub struct ObjectAttrs {
    pub size: i64,
    pub content_type: String,
    pub cache_control: String,
    pub updated: DateTime<Utc>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// An open bounded read over one object.
///
/// `size` is the total object size, `remain` the number of bytes this reader
/// will yield — the range proxy writes both into response headers before
/// streaming the body.
pub struct ObjectReader {
    pub size: i64,
    pub remain: i64,
    pub stream: BoxStream<'static, Result<Bytes, StoreError>>,
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("size", &self.size)
            .field("remain", &self.remain)
            .finish_non_exhaustive()
    }
}
