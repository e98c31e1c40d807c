pub mod chapters;
pub mod mapper;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Manifest document
// ---------------------------------------------------------------------------

/// The JSON document returned by the mapper and consumed by the downstream
/// stream-assembly module.
///
/// Built once per request, immutable after construction, discarded after
/// serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub sequences: Vec<Sequence>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            sequences: Vec::new(),
        }
    }
}

/// One logical segment of the assembled output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub clips: Vec<Clip>,
}

/// One source reference contributing to a sequence.
///
/// `clip_from`/`clip_to` are millisecond offsets; both absent means "the
/// whole file", and an absent `clip_to` leaves the clip open-ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    #[serde(rename = "type")]
    pub clip_type: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_to: Option<i64>,
}

impl Clip {
    /// A whole-file source clip.
    pub fn source(path: impl Into<String>) -> Self {
        Self {
            clip_type: "source".to_string(),
            path: path.into(),
            clip_from: None,
            clip_to: None,
        }
    }
}
