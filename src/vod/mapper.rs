use std::sync::Arc;

use futures::StreamExt;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::config::MapConfig;
use crate::core::error::StoreError;
use crate::core::pattern::PatternCache;
use crate::core::retry::RetryPolicy;
use crate::storage::{ObjectRef, ObjectStore};
use crate::vod::chapters::{self, MediaDurationProbe};
use crate::vod::{Clip, Manifest, Sequence};

// ---------------------------------------------------------------------------
// Manifest mapper
// ---------------------------------------------------------------------------

/// Turns a key prefix into the manifest describing matching objects.
///
/// The mapper only lists the store — it never fetches object bytes. Filter
/// patterns are resolved through the shared [`PatternCache`], and every
/// per-prefix listing runs under the shared [`RetryPolicy`].
pub struct Mapper {
    store: Arc<dyn ObjectStore>,
    patterns: Arc<PatternCache>,
    retry: RetryPolicy,
    probe: Option<Arc<dyn MediaDurationProbe>>,
    bucket: String,
    config: MapConfig,
    proxy_endpoint: String,
    listen: String,
}

/// One mapping request, extracted from the HTTP surface.
#[derive(Debug, Clone, Default)]
pub struct MapRequest {
    /// Request prefix with the leading slash already stripped.
    pub prefix: String,
    /// Trailing extension split off the prefix (including the dot), when
    /// extension-split mode is active.
    pub ext: String,
    /// Raw chapter-break list from the configured query parameter.
    pub chapter_breaks: Option<String>,
}

impl Mapper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        patterns: Arc<PatternCache>,
        retry: RetryPolicy,
        probe: Option<Arc<dyn MediaDurationProbe>>,
        bucket: String,
        config: MapConfig,
        proxy_endpoint: String,
        listen: String,
    ) -> Self {
        Self {
            store,
            patterns,
            retry,
            probe,
            bucket,
            config,
            proxy_endpoint,
            listen,
        }
    }

    /// Map a request prefix to its manifest.
    ///
    /// Any store failure aborts the whole mapping — the caller receives
    /// either a complete manifest or an error, never a truncated one.
    pub async fn map(&self, request: &MapRequest) -> Result<Manifest, StoreError> {
        let (prefix, filter) = self.resolve_filter(&request.prefix, &request.ext)?;

        let mut sequences = Vec::new();
        let mut representative: Option<ObjectRef> = None;
        for candidate in self.expand_prefixes(&prefix) {
            let matched = self
                .retry
                .run(|| self.list_matches(&candidate, &filter))
                .await?;
            if representative.is_none() {
                representative = matched.first().cloned();
            }
            sequences.extend(matched.into_iter().map(|obj| Sequence {
                clips: vec![Clip::source(self.clip_path(&obj))],
            }));
        }

        if let Some(raw_breaks) = request.chapter_breaks.as_deref() {
            let breaks_ms = chapters::parse_chapter_breaks(raw_breaks);
            if !breaks_ms.is_empty() {
                self.check_total_duration(representative.as_ref(), &breaks_ms)
                    .await;
                for sequence in &mut sequences {
                    let path = match sequence.clips.first() {
                        Some(clip) => clip.path.clone(),
                        None => continue,
                    };
                    sequence.clips = chaptered_clips(&path, &breaks_ms);
                }
            }
        }

        Ok(Manifest { sequences })
    }

    /// One listing attempt over a candidate prefix.
    ///
    /// A transient failure mid-enumeration surfaces here and makes the retry
    /// wrapper restart the whole listing; the result set is rebuilt from
    /// scratch on every attempt, so retries never duplicate output.
    async fn list_matches(
        &self,
        prefix: &str,
        filter: &Regex,
    ) -> Result<Vec<ObjectRef>, StoreError> {
        let mut listing = self.store.list(&self.bucket, prefix, "/");
        let mut matched = Vec::new();
        while let Some(item) = listing.next().await {
            let obj = item?;
            if filter.is_match(basename(&obj.key)) {
                matched.push(obj);
            }
        }
        Ok(matched)
    }

    /// Pick the filter for a request and strip whatever selected it from the
    /// listing prefix.
    ///
    /// Precedence: extension split, then the HD marker token, then the rule
    /// whose fragment is the longest suffix of the prefix (the empty
    /// fragment matches every prefix and is the fallback).
    fn resolve_filter(&self, prefix: &str, ext: &str) -> Result<(String, Arc<Regex>), StoreError> {
        if !ext.is_empty() {
            let pattern = format!("{}$", regex::escape(ext));
            return Ok((prefix.to_string(), self.compile(&pattern)?));
        }

        if !self.config.hd_token.is_empty()
            && !self.config.hd_filter.is_empty()
            && prefix.contains(&self.config.hd_token)
        {
            let stripped = prefix.replacen(&self.config.hd_token, "", 1);
            return Ok((stripped, self.compile(&self.config.hd_filter)?));
        }

        let mut best_fragment = "";
        let mut best_pattern = "";
        for (fragment, pattern) in &self.config.regex_filters {
            if prefix.ends_with(fragment.as_str()) && fragment.len() >= best_fragment.len() {
                best_fragment = fragment;
                best_pattern = pattern;
            }
        }
        let stripped = prefix
            .strip_suffix(best_fragment)
            .unwrap_or(prefix)
            .to_string();
        Ok((stripped, self.compile(best_pattern)?))
    }

    fn compile(&self, pattern: &str) -> Result<Arc<Regex>, StoreError> {
        // Configured patterns were compiled at startup; extension-derived
        // patterns are escaped. A failure here means a config regression.
        self.patterns.get(pattern).map_err(|e| StoreError::Transient {
            reason: format!("filter pattern failed to compile: {e}"),
        })
    }

    /// Candidate listing prefixes: the resolved prefix itself, then one per
    /// configured extra prefix combined with the resolved prefix's final
    /// path segment, in configured order.
    fn expand_prefixes(&self, prefix: &str) -> Vec<String> {
        let mut prefixes = vec![prefix.to_string()];
        let last_segment = prefix.rsplit('/').next().unwrap_or("");
        for extra in &self.config.extra_prefixes {
            prefixes.push(join_path(extra, last_segment));
        }
        prefixes
    }

    fn clip_path(&self, obj: &ObjectRef) -> String {
        if self.config.proxy_clip_paths {
            format!("{}/{}", self.proxy_endpoint.trim_end_matches('/'), obj.key)
        } else {
            format!("/{}/{}", obj.bucket, obj.key)
        }
    }

    /// Probe the representative object's total duration and warn when the
    /// caller's break list runs past it.
    ///
    /// The chaptered intervals come from the break list alone, with the last
    /// clip open-ended, so the probe cannot change the output — its result
    /// is a consistency check against the one object standing in for all
    /// sequences.
    async fn check_total_duration(&self, representative: Option<&ObjectRef>, breaks_ms: &[i64]) {
        let Some(probe) = self.probe.as_ref() else {
            return;
        };
        let Some(obj) = representative else {
            return;
        };
        if self.proxy_endpoint.is_empty() {
            return;
        }

        let url = self.local_proxy_url(&obj.key);
        match probe.total_duration_ms(&url).await {
            Ok(total) if total > 0 => {
                let last_break = breaks_ms.last().copied().unwrap_or(0);
                if last_break >= total {
                    warn!(
                        key = %obj.key,
                        total_ms = total,
                        last_break_ms = last_break,
                        "chapter breaks run past the measured duration"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(key = %obj.key, error = %e, "media duration probe failed");
            }
        }
    }

    /// URL under which this process's own proxy endpoint serves a key.
    fn local_proxy_url(&self, key: &str) -> String {
        let port = self.listen.rsplit(':').next().unwrap_or("8080");
        format!(
            "http://127.0.0.1:{}{}/{}",
            port,
            self.proxy_endpoint.trim_end_matches('/'),
            key
        )
    }
}

/// Rewrite one whole-file clip into one clip per chapter interval. The last
/// interval stays open-ended to cover any trailing remainder.
fn chaptered_clips(path: &str, breaks_ms: &[i64]) -> Vec<Clip> {
    let mut clips = Vec::with_capacity(breaks_ms.len() + 1);
    let mut previous = 0;
    for &break_ms in breaks_ms {
        clips.push(Clip {
            clip_from: Some(previous),
            clip_to: Some(break_ms),
            ..Clip::source(path)
        });
        previous = break_ms;
    }
    clips.push(Clip {
        clip_from: Some(previous),
        clip_to: None,
        ..Clip::source(path)
    });
    clips
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Join two path segments the way the original prefix expansion does:
/// collapse the boundary slash and drop a trailing one.
fn join_path(a: &str, b: &str) -> String {
    let a = a.trim_end_matches('/');
    if b.is_empty() {
        a.to_string()
    } else if a.is_empty() {
        b.to_string()
    } else {
        format!("{a}/{b}")
    }
}
