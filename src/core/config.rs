use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::pattern::PatternCache;

/// Top-level gateway configuration, loaded from `VODGATE_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listen address for the HTTP server.
    pub listen: String,
    /// Name of the bucket served by both engines (unless bucket-on-path).
    pub bucket_name: String,
    pub log_level: String,
    pub log_format: String,
    pub proxy: ProxyConfig,
    pub map: MapConfig,
    pub store: StoreConfig,
    pub retry: RetryConfig,
}

/// Configuration for the range-proxy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Path prefix the dispatcher routes to the proxy. Empty disables it.
    pub endpoint: String,
    /// Request headers copied into the per-request log record when present.
    pub log_headers: Vec<String>,
    /// Deadline applied to the whole store interaction of one request.
    pub timeout_secs: u64,
    /// When set, the first path segment names the bucket.
    pub bucket_on_path: bool,
}

/// Configuration for the manifest-mapper endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Path prefix the dispatcher routes to the mapper. Empty disables it.
    pub endpoint: String,
    /// Suffix fragment → filter pattern. The empty fragment is the fallback
    /// rule; the longest fragment that suffixes the request prefix wins.
    pub regex_filters: HashMap<String, String>,
    /// Literal marker token selecting the HD filter when present in a prefix.
    pub hd_token: String,
    /// Filter pattern used when the HD token is present.
    pub hd_filter: String,
    /// Fallback listing prefixes, each combined with the request prefix's
    /// final path segment and listed after the original prefix.
    pub extra_prefixes: Vec<String>,
    /// When set, a trailing filename extension on the request prefix is
    /// split off and used as an exact-suffix filter.
    pub extension_split: bool,
    /// Query parameter naming literal extra clip paths. Empty disables it.
    pub extra_resources_token: String,
    /// Query parameter carrying chapter-break timestamps.
    pub chapter_breaks_token: String,
    /// Emit proxy-relative clip paths instead of absolute `/bucket/key`.
    pub proxy_clip_paths: bool,
}

/// Store backend selection and client tuning.
///
/// The tuning values are consumed by client construction only; the engines
/// never read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `memory` or `s3`.
    pub backend: String,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub path_style: bool,
    pub timeout_secs: u64,
    pub idle_conn_timeout_secs: u64,
    pub max_idle_conns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            bucket_name: String::new(),
            log_level: "debug".to_string(),
            log_format: "text".to_string(),
            proxy: ProxyConfig {
                endpoint: String::new(),
                log_headers: Vec::new(),
                timeout_secs: 10,
                bucket_on_path: false,
            },
            map: MapConfig {
                endpoint: String::new(),
                regex_filters: HashMap::new(),
                hd_token: String::new(),
                hd_filter: String::new(),
                extra_prefixes: Vec::new(),
                extension_split: false,
                extra_resources_token: String::new(),
                chapter_breaks_token: "breaks".to_string(),
                proxy_clip_paths: false,
            },
            store: StoreConfig {
                backend: "memory".to_string(),
                endpoint: String::new(),
                region: "us-east-1".to_string(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                path_style: false,
                timeout_secs: 2,
                idle_conn_timeout_secs: 120,
                max_idle_conns: 10,
            },
            retry: RetryConfig { max_attempts: 5 },
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment on top of the defaults.
    ///
    /// `VODGATE_BUCKET_NAME` is required; everything else falls back to a
    /// default. Filter patterns are validated separately by [`Self::validate`]
    /// so that an invalid pattern aborts startup rather than a request.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = AppConfig::default();
        Self::apply_env_overrides(&mut config);

        if config.bucket_name.is_empty() {
            anyhow::bail!("VODGATE_BUCKET_NAME is required");
        }
        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("VODGATE_LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("VODGATE_BUCKET_NAME") {
            config.bucket_name = v;
        }
        if let Ok(v) = std::env::var("VODGATE_LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("VODGATE_LOG_FORMAT") {
            config.log_format = v;
        }
        if let Ok(v) = std::env::var("VODGATE_PROXY_PREFIX") {
            config.proxy.endpoint = v;
        }
        if let Ok(v) = std::env::var("VODGATE_PROXY_LOG_HEADERS") {
            config.proxy.log_headers = split_list(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_PROXY_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.proxy.timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("VODGATE_PROXY_BUCKET_ON_PATH") {
            config.proxy.bucket_on_path = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_PREFIX") {
            config.map.endpoint = v;
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_REGEX_FILTERS") {
            config.map.regex_filters = parse_filter_rules(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_HD_TOKEN") {
            config.map.hd_token = v;
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_HD_FILTER") {
            config.map.hd_filter = v;
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_EXTRA_PREFIXES") {
            config.map.extra_prefixes = split_list(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_EXTENSION_SPLIT") {
            config.map.extension_split = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_EXTRA_RESOURCES_TOKEN") {
            config.map.extra_resources_token = v;
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_CHAPTER_BREAKS_TOKEN") {
            config.map.chapter_breaks_token = v;
        }
        if let Ok(v) = std::env::var("VODGATE_MAP_PROXY_CLIP_PATHS") {
            config.map.proxy_clip_paths = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_BACKEND") {
            config.store.backend = v;
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_ENDPOINT") {
            config.store.endpoint = v;
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_REGION") {
            config.store.region = v;
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_ACCESS_KEY_ID") {
            config.store.access_key_id = v;
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_SECRET_ACCESS_KEY") {
            config.store.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_PATH_STYLE") {
            config.store.path_style = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.store.timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_IDLE_CONN_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                config.store.idle_conn_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("VODGATE_STORE_MAX_IDLE_CONNS") {
            if let Ok(n) = v.parse() {
                config.store.max_idle_conns = n;
            }
        }
        if let Ok(v) = std::env::var("VODGATE_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                if n > 0 {
                    config.retry.max_attempts = n;
                }
            }
        }
    }

    /// Compile every configured filter pattern through the shared cache.
    ///
    /// An invalid pattern is fatal here, at startup, so request handling can
    /// treat cache lookups for configured patterns as infallible.
    pub fn validate(&self, patterns: &PatternCache) -> anyhow::Result<()> {
        for (fragment, pattern) in &self.map.regex_filters {
            patterns.get(pattern).map_err(|e| {
                anyhow::anyhow!("invalid filter pattern for fragment {fragment:?}: {e}")
            })?;
        }
        if !self.map.hd_filter.is_empty() {
            patterns
                .get(&self.map.hd_filter)
                .map_err(|e| anyhow::anyhow!("invalid HD filter pattern: {e}"))?;
        }
        Ok(())
    }
}

/// Parse `fragment:pattern` rules from a comma-separated list. An entry
/// without a colon is a pattern for the empty (fallback) fragment.
fn parse_filter_rules(value: &str) -> HashMap<String, String> {
    let mut rules = HashMap::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.split_once(':') {
            Some((fragment, pattern)) => {
                rules.insert(fragment.to_string(), pattern.to_string());
            }
            None => {
                rules.insert(String::new(), entry.to_string());
            }
        }
    }
    rules
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "yes" | "on")
}
