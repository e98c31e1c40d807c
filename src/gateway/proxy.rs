use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::core::config::AppConfig;
use crate::core::error::{plain_error, StoreError};
use crate::storage::ObjectAttrs;

use super::router::AppState;

// ---------------------------------------------------------------------------
// Range proxy
// ---------------------------------------------------------------------------

/// Byte range requested by the client, in the store's terms.
///
/// `length == -1` means no usable range was supplied: serve the whole object
/// from offset 0. A component that fails to parse leaves its side at 0,
/// favoring robustness over rejecting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub offset: i64,
    pub end: i64,
    pub length: i64,
}

impl RangeSpec {
    fn whole() -> Self {
        Self {
            offset: 0,
            end: 0,
            length: -1,
        }
    }

    fn is_ranged(&self) -> bool {
        self.length != -1
    }
}

/// Parse the inbound `Range` header (`bytes=<start>-<end>`).
pub fn parse_range(headers: &HeaderMap) -> RangeSpec {
    let mut spec = RangeSpec::whole();
    let Some(value) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return spec;
    };
    let Some((_, ranges)) = value.split_once('=') else {
        return spec;
    };
    let Some((start, end)) = ranges.split_once('-') else {
        return spec;
    };
    if let Ok(n) = start.trim().parse() {
        spec.offset = n;
    }
    if let Ok(n) = end.trim().parse::<i64>() {
        spec.end = n;
        spec.length = spec.end - spec.offset + 1;
    }
    spec
}

/// Serve one proxied request and emit its structured log record.
pub async fn handle(state: &AppState, req: &Request<()>, path: &str) -> Response {
    let start = std::time::Instant::now();
    let (response, error) = match serve(state, req, path).await {
        Ok(response) => (response, None),
        Err(err) => (plain_error(err.proxy_status(), &err.to_string()), Some(err)),
    };
    log_request(state, req, start.elapsed(), response.status(), error.as_ref());
    response
}

async fn serve(state: &AppState, req: &Request<()>, path: &str) -> Result<Response, StoreError> {
    let method = req.method();
    if method != Method::GET && method != Method::HEAD {
        return Ok(plain_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed",
        ));
    }
    // The proxy's own root is a health check and never touches the store.
    if path == "/" {
        return Ok(StatusCode::OK.into_response());
    }

    let (bucket, key) = resolve_object(&state.config, path);
    let deadline = Instant::now() + Duration::from_secs(state.config.proxy.timeout_secs);

    if method == Method::HEAD {
        let attrs = with_deadline(deadline, async {
            state
                .retry
                .run(|| state.store.get_attributes(&bucket, &key))
                .await
        })
        .await?;
        let headers = object_headers(&attrs, attrs.size);
        return Ok((StatusCode::OK, headers).into_response());
    }

    let spec = parse_range(req.headers());
    let reader = with_deadline(deadline, async {
        state
            .retry
            .run(|| state.store.read_range(&bucket, &key, spec.offset, spec.length))
            .await
    })
    .await?;
    let attrs = with_deadline(deadline, async {
        state
            .retry
            .run(|| state.store.get_attributes(&bucket, &key))
            .await
    })
    .await?;

    let mut headers = object_headers(&attrs, reader.remain);
    let status = if spec.is_ranged() {
        let served_end = if reader.remain > 0 {
            spec.offset + reader.remain - 1
        } else {
            spec.end
        };
        let content_range = format!("bytes {}-{}/{}", spec.offset, served_end, reader.size);
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            headers.insert(header::CONTENT_RANGE, value);
        }
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let body = object_body(reader.stream, deadline, bucket, key);
    Ok((status, headers, body).into_response())
}

/// Resolve the target object from the rewritten request path: fixed bucket
/// from configuration, or bucket-on-path where the first segment names the
/// bucket.
fn resolve_object(config: &AppConfig, path: &str) -> (String, String) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if config.proxy.bucket_on_path {
        match trimmed.split_once('/') {
            Some((bucket, key)) => (bucket.to_string(), key.to_string()),
            None => (trimmed.to_string(), String::new()),
        }
    } else {
        (config.bucket_name.clone(), trimmed.to_string())
    }
}

/// Response headers shared by HEAD and GET. `content_length` is the number
/// of bytes this response will actually transfer.
fn object_headers(attrs: &ObjectAttrs, content_length: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !attrs.cache_control.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&attrs.cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&content_length.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&attrs.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(Utc::now())) {
        headers.insert(header::DATE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(attrs.updated)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers
}

fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Stream the object body under the request deadline.
///
/// Headers are already committed when this body is polled, so a mid-stream
/// store failure can only be logged and abort the connection — it never
/// rewrites the status line.
fn object_body(
    stream: BoxStream<'static, Result<Bytes, StoreError>>,
    deadline: Instant,
    bucket: String,
    key: String,
) -> Body {
    let bounded = futures::stream::try_unfold(stream, move |mut inner| async move {
        match tokio::time::timeout_at(deadline, inner.next()).await {
            Ok(Some(Ok(chunk))) => Ok(Some((chunk, inner))),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) => Ok(None),
            Err(_) => Err(StoreError::DeadlineExceeded),
        }
    })
    .inspect_err(move |err| {
        error!(bucket = %bucket, key = %key, error = %err, "object body stream failed mid-transfer");
    });
    Body::from_stream(bounded)
}

async fn with_deadline<T>(
    deadline: Instant,
    fut: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::DeadlineExceeded),
    }
}

/// One structured record per proxied request: unconditional on error,
/// debug-level otherwise. Allow-listed request headers ride along when
/// present.
fn log_request(
    state: &AppState,
    req: &Request<()>,
    elapsed: Duration,
    status: StatusCode,
    err: Option<&StoreError>,
) {
    let mut request_headers: Vec<(String, String)> = Vec::new();
    for name in &state.config.proxy.log_headers {
        if let Some(value) = req.headers().get(name.as_str()).and_then(|v| v.to_str().ok()) {
            request_headers.push((name.clone(), value.to_string()));
        }
    }

    match err {
        Some(err) => {
            error!(
                method = %req.method(),
                elapsed_ms = elapsed.as_millis() as u64,
                uri = %req.uri(),
                proxy_endpoint = %state.config.proxy.endpoint,
                status = status.as_u16(),
                request_headers = ?request_headers,
                error = %err,
                "failed to handle proxy request"
            );
        }
        None => {
            debug!(
                method = %req.method(),
                elapsed_ms = elapsed.as_millis() as u64,
                uri = %req.uri(),
                proxy_endpoint = %state.config.proxy.endpoint,
                status = status.as_u16(),
                request_headers = ?request_headers,
                "finished handling proxy request"
            );
        }
    }
}
