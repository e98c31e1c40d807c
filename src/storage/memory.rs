use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};

use crate::core::error::StoreError;

use super::{ObjectAttrs, ObjectReader, ObjectRef, ObjectStore};

// ---------------------------------------------------------------------------
// InMemoryStore — for tests and local development
// ---------------------------------------------------------------------------

/// In-memory store backend.
///
/// Buckets map to a `BTreeMap` so listings come back in stable lexicographic
/// key order, matching the ordering guarantee of the real backend. No
/// external dependencies required.
pub struct InMemoryStore {
    buckets: Arc<RwLock<HashMap<String, BTreeMap<String, StoredObject>>>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    cache_control: String,
    updated: DateTime<Utc>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed an object, creating the bucket if needed.
    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>, content_type: &str) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
                cache_control: String::new(),
                updated: Utc::now(),
            },
        );
    }

    /// Seed an object carrying an upstream `Cache-Control` value.
    pub fn put_object_with_cache_control(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: &str,
        cache_control: &str,
    ) {
        self.put_object(bucket, key, data, content_type);
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        if let Some(obj) = buckets.get_mut(bucket).and_then(|b| b.get_mut(key)) {
            obj.cache_control = cache_control.to_string();
        }
    }

    /// Create an empty bucket so listings under it succeed with no items.
    pub fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        buckets.entry(bucket.to_string()).or_default();
    }

    fn lookup(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_attributes(&self, bucket: &str, key: &str) -> Result<ObjectAttrs, StoreError> {
        let obj = self.lookup(bucket, key)?;
        Ok(ObjectAttrs {
            size: obj.data.len() as i64,
            content_type: obj.content_type,
            cache_control: obj.cache_control,
            updated: obj.updated,
        })
    }

    async fn read_range(
        &self,
        bucket: &str,
        key: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader, StoreError> {
        let obj = self.lookup(bucket, key)?;
        let size = obj.data.len() as i64;

        if offset < 0 || offset > size {
            return Err(StoreError::Transient {
                reason: format!("range offset {offset} outside object of {size} bytes"),
            });
        }

        let remain = if length < 0 {
            size - offset
        } else {
            length.min(size - offset)
        };

        let slice = obj
            .data
            .slice(offset as usize..(offset + remain) as usize);
        let stream = if slice.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(slice) }).boxed()
        };

        Ok(ObjectReader {
            size,
            remain,
            stream,
        })
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> BoxStream<'static, Result<ObjectRef, StoreError>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        let Some(objects) = buckets.get(bucket) else {
            let bucket = bucket.to_string();
            return stream::once(async move { Err(StoreError::BucketNotFound { bucket }) }).boxed();
        };

        let bucket = bucket.to_string();
        let delimiter = delimiter.to_string();
        let prefix = prefix.to_string();
        let items: Vec<ObjectRef> = objects
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| {
                // With a delimiter, only direct children of the prefix are
                // objects; deeper keys belong to sub-"directories".
                delimiter.is_empty() || !key[prefix.len()..].contains(&delimiter)
            })
            .map(|(key, _)| ObjectRef {
                bucket: bucket.clone(),
                key: key.clone(),
            })
            .collect();

        stream::iter(items.into_iter().map(Ok)).boxed()
    }
}
