use async_trait::async_trait;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Chapter-break timestamps
// ---------------------------------------------------------------------------

/// Parse a comma-separated list of `HH:MM:SS` / `MM:SS` timestamps into
/// millisecond offsets from the start.
///
/// Entries that do not strictly increase are dropped so every derived clip
/// interval keeps `clip_to > clip_from`. Unparsable components count as 0.
pub fn parse_chapter_breaks(value: &str) -> Vec<i64> {
    let mut breaks = Vec::new();
    let mut previous = 0;
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some(ms) = timestamp_ms(entry) else {
            tracing::debug!(entry, "skipping malformed chapter break");
            continue;
        };
        if ms <= previous {
            tracing::debug!(entry, "skipping non-increasing chapter break");
            continue;
        }
        breaks.push(ms);
        previous = ms;
    }
    breaks
}

fn timestamp_ms(entry: &str) -> Option<i64> {
    let parts: Vec<&str> = entry.split(':').collect();
    let (hrs, mins, secs) = match parts.as_slice() {
        [m, s] => (0, component(m), component(s)),
        [h, m, s] => (component(h), component(m), component(s)),
        _ => return None,
    };
    Some(hrs * 3_600_000 + mins * 60_000 + secs * 1_000)
}

fn component(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Media-duration collaborator
// ---------------------------------------------------------------------------

/// External collaborator that measures the total duration of a media file
/// reachable over HTTP.
///
/// Only the chapter-break path consults it, and a failure degrades that
/// feature alone — the mapper never fails a request on a probe error.
#[async_trait]
pub trait MediaDurationProbe: Send + Sync {
    async fn total_duration_ms(&self, url: &str) -> anyhow::Result<i64>;
}

/// Probe implementation shelling out to `ffprobe`.
pub struct FfprobeDurationProbe;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[async_trait]
impl MediaDurationProbe for FfprobeDurationProbe {
    async fn total_duration_ms(&self, url: &str) -> anyhow::Result<i64> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        let duration_secs: f64 = parsed
            .format
            .and_then(|f| f.duration)
            .ok_or_else(|| anyhow::anyhow!("ffprobe output carried no duration"))?
            .parse()?;

        Ok((duration_secs * 1000.0) as i64)
    }
}
