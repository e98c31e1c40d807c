use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::core::config::AppConfig;
use crate::core::error::plain_error;
use crate::core::pattern::PatternCache;
use crate::core::retry::RetryPolicy;
use crate::storage::ObjectStore;
use crate::vod::chapters::MediaDurationProbe;
use crate::vod::mapper::Mapper;

use super::middleware::RequestIdLayer;
use super::{map, proxy};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// State shared across all requests.
///
/// The pattern cache is the only mutable shared piece; everything else is
/// read-only after construction.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ObjectStore>,
    pub patterns: Arc<PatternCache>,
    pub retry: RetryPolicy,
    pub mapper: Arc<Mapper>,
}

impl AppState {
    /// Build the shared state, pre-compiling every configured filter pattern.
    ///
    /// An invalid pattern fails construction — and with it process startup —
    /// so pattern compilation can never fail a request.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        probe: Option<Arc<dyn MediaDurationProbe>>,
    ) -> anyhow::Result<Self> {
        let patterns = Arc::new(PatternCache::new());
        config.validate(&patterns)?;

        let retry = RetryPolicy::new(config.retry.max_attempts);
        let mapper = Arc::new(Mapper::new(
            store.clone(),
            patterns.clone(),
            retry,
            probe,
            config.bucket_name.clone(),
            config.map.clone(),
            config.proxy.endpoint.clone(),
            config.listen.clone(),
        ));

        Ok(Self {
            config,
            store,
            patterns,
            retry,
            mapper,
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

enum RouteTarget {
    Proxy,
    Map,
}

/// Build the router: one fallback dispatcher so the routed prefixes can stay
/// plain configuration values, plus the request-id layer.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(RequestIdLayer)
        .with_state(state)
}

/// Route by path prefix, first match wins: the proxy endpoint, then the map
/// endpoint. The matched prefix is stripped exactly once, preserving a
/// single leading slash. `/` answers the health check without touching the
/// store; anything unrouted is a plain 404.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    // The handlers only read the request head (method, uri, headers); drop the
    // body so the reference held across the awaited handler stays `Send`
    // (axum's `Body` is `!Sync`).
    let (parts, _body) = req.into_parts();
    let req = Request::from_parts(parts, ());
    let path = req.uri().path().to_string();
    if path == "/" {
        return StatusCode::OK.into_response();
    }

    let routes = [
        (&state.config.proxy.endpoint, RouteTarget::Proxy),
        (&state.config.map.endpoint, RouteTarget::Map),
    ];
    for (endpoint, target) in routes {
        if endpoint.is_empty() {
            continue;
        }
        if let Some(stripped) = strip_route_prefix(endpoint, &path) {
            return match target {
                RouteTarget::Proxy => proxy::handle(&state, &req, &stripped).await,
                RouteTarget::Map => map::handle(&state, &req, &stripped).await,
            };
        }
    }

    plain_error(StatusCode::NOT_FOUND, "not found")
}

/// Strip `endpoint` off the front of `path`, normalizing the remainder to a
/// single leading slash. Returns `None` when the endpoint does not own the
/// path.
fn strip_route_prefix(endpoint: &str, path: &str) -> Option<String> {
    let normalized = endpoint.trim_end_matches('/');
    if normalized.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(normalized)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_route_prefix_subtree() {
        assert_eq!(
            strip_route_prefix("/proxy/", "/proxy/musics/music1.txt"),
            Some("/musics/music1.txt".to_string())
        );
        assert_eq!(
            strip_route_prefix("/proxy", "/proxy/musics/music1.txt"),
            Some("/musics/music1.txt".to_string())
        );
    }

    #[test]
    fn test_strip_route_prefix_exact_match_is_root() {
        assert_eq!(strip_route_prefix("/map/", "/map/"), Some("/".to_string()));
        assert_eq!(strip_route_prefix("/map", "/map"), Some("/".to_string()));
    }

    #[test]
    fn test_strip_route_prefix_rejects_sibling_paths() {
        assert_eq!(strip_route_prefix("/map", "/mapfoo"), None);
        assert_eq!(strip_route_prefix("/proxy", "/map/x"), None);
    }

    #[test]
    fn test_strip_route_prefix_strips_exactly_once() {
        assert_eq!(
            strip_route_prefix("/proxy", "/proxy/proxy/key"),
            Some("/proxy/key".to_string())
        );
    }
}
