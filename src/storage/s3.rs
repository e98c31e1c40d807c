use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};

use crate::core::config::StoreConfig;
use crate::core::error::StoreError;

use super::{ObjectAttrs, ObjectReader, ObjectRef, ObjectStore};

// ---------------------------------------------------------------------------
// S3ObjectStore — production backend
// ---------------------------------------------------------------------------

/// Production store backend wrapping `aws-sdk-s3`.
///
/// Works against AWS S3 and S3-compatible stores (MinIO, GCS interop mode)
/// via configurable endpoint and path-style addressing. The client tuning
/// values from [`StoreConfig`] are consumed here and nowhere else.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vodgate-config",
        );

        let timeouts = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_secs))
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(timeouts)
            .force_path_style(config.path_style);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Classify an SDK error string into the store taxonomy. Classification
/// happens once here; callers only inspect the variant.
fn classify(err: String, bucket: &str, key: &str) -> StoreError {
    if err.contains("NoSuchBucket") {
        StoreError::BucketNotFound {
            bucket: bucket.to_string(),
        }
    } else if err.contains("NoSuchKey") || err.contains("NotFound") || err.contains("404") {
        StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else if err.contains("timeout") || err.contains("timed out") {
        StoreError::DeadlineExceeded
    } else if err.contains("canceled") || err.contains("cancelled") {
        StoreError::Cancelled
    } else {
        StoreError::Transient { reason: err }
    }
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_else(Utc::now)
}

/// Parse the total size out of a `Content-Range: bytes a-b/total` value.
fn content_range_total(value: &str) -> Option<i64> {
    value.rsplit_once('/')?.1.parse().ok()
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_attributes(&self, bucket: &str, key: &str) -> Result<ObjectAttrs, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e.to_string(), bucket, key))?;

        Ok(ObjectAttrs {
            size: output.content_length().unwrap_or(0),
            content_type: output
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            cache_control: output.cache_control().unwrap_or_default().to_string(),
            updated: output.last_modified().map(to_utc).unwrap_or_else(Utc::now),
        })
    }

    async fn read_range(
        &self,
        bucket: &str,
        key: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader, StoreError> {
        let range = if length < 0 {
            format!("bytes={offset}-")
        } else {
            format!("bytes={}-{}", offset, offset + length - 1)
        };

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(range)
            .send()
            .await
            .map_err(|e| classify(e.to_string(), bucket, key))?;

        let remain = output.content_length().unwrap_or(0);
        let size = output
            .content_range()
            .and_then(content_range_total)
            .unwrap_or(remain);

        let bucket = bucket.to_string();
        let key = key.to_string();
        let stream = futures::stream::try_unfold(output.body, move |mut body| {
            let bucket = bucket.clone();
            let key = key.clone();
            async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(classify(e.to_string(), &bucket, &key)),
                }
            }
        })
        .boxed();

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
        let client = self.client.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();

        // One page per unfold step; the page's items are flattened into the
        // stream so the listing stays lazy across continuation tokens.
        enum PageState {
            Start,
            Next(String),
            Done,
        }

        futures::stream::try_unfold(PageState::Start, move |state| {
            let client = client.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let delimiter = delimiter.clone();
            async move {
                let token = match state {
                    PageState::Start => None,
                    PageState::Next(token) => Some(token),
                    PageState::Done => return Ok(None),
                };

                let mut req = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix)
                    .delimiter(&delimiter);
                if let Some(token) = token {
                    req = req.continuation_token(token);
                }

                let output = req
                    .send()
                    .await
                    .map_err(|e| classify(e.to_string(), &bucket, &prefix))?;

                let items: Vec<ObjectRef> = output
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .map(|key| ObjectRef {
                        bucket: bucket.clone(),
                        key: key.to_string(),
                    })
                    .collect();

                let next = match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        PageState::Next(token.to_string())
                    }
                    _ => PageState::Done,
                };
                Ok(Some((futures::stream::iter(items.into_iter().map(Ok)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}
