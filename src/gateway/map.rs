use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::core::error::plain_error;
use crate::vod::mapper::MapRequest;
use crate::vod::{Clip, Manifest, Sequence};

use super::router::AppState;

// ---------------------------------------------------------------------------
// Manifest mapper — HTTP surface
// ---------------------------------------------------------------------------

/// Serve one mapping request.
pub async fn handle(state: &AppState, req: &Request<()>, path: &str) -> Response {
    if req.method() != Method::GET {
        return plain_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    let mut prefix = path.strip_prefix('/').unwrap_or(path).to_string();
    let mut ext = String::new();
    if state.config.map.extension_split {
        if let Some(idx) = extension_start(&prefix) {
            ext = prefix[idx..].to_string();
            prefix.truncate(idx);
        }
    }
    if prefix.is_empty() {
        return plain_error(StatusCode::BAD_REQUEST, "prefix cannot be empty");
    }

    let query = parse_query(req.uri().query().unwrap_or(""));
    let chapter_breaks = query_value(&query, &state.config.map.chapter_breaks_token)
        // The downstream assembly module sends "_" when no breaks apply.
        .filter(|value| value != "_");

    let request = MapRequest {
        prefix,
        ext,
        chapter_breaks,
    };

    match state.mapper.map(&request).await {
        Ok(mut manifest) => {
            append_extra_resources(state, &query, &mut manifest);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                serde_json::to_string(&manifest).unwrap_or_else(|_| r#"{"sequences":[]}"#.to_string()),
            )
                .into_response()
        }
        Err(err) => {
            error!(prefix = %request.prefix, error = %err, "failed to map request");
            plain_error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

/// Append caller-supplied literal paths, each as its own sequence, after the
/// listing-derived ones. No store lookup is involved.
fn append_extra_resources(state: &AppState, query: &[(String, String)], manifest: &mut Manifest) {
    let token = &state.config.map.extra_resources_token;
    if token.is_empty() {
        return;
    }
    let Some(resources) = query_value(query, token) else {
        return;
    };
    for resource in resources.split(',') {
        if resource.is_empty() {
            continue;
        }
        manifest.sequences.push(Sequence {
            clips: vec![Clip::source(resource)],
        });
    }
}

/// Start of the trailing filename extension (including the dot) in the final
/// path segment, if any.
fn extension_start(prefix: &str) -> Option<usize> {
    let base_start = prefix.rfind('/').map(|i| i + 1).unwrap_or(0);
    let rel = prefix[base_start..].rfind('.')?;
    Some(base_start + rel)
}

fn query_value(query: &[(String, String)], name: &str) -> Option<String> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| {
                    std::str::from_utf8(h)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                });
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
