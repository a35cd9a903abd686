//! Shared primitive types used across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The canonical customer identity (`customer_unique_id` in the source data).
pub type CustomerId = String;

/// Identifier of an order in the source data.
pub type OrderId = String;

/// Monotonic sequence number assigned to every triggered engine run.
/// Cache writes carrying a lower sequence than the stored entry are rejected.
pub type RunSeq = u64;

/// The three artifacts the pipeline produces and caches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Segments,
    Cohort,
    Timeline,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Segments, Self::Cohort, Self::Timeline];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Segments => "segments",
            Self::Cohort => "cohort",
            Self::Timeline => "timeline",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "segments" => Ok(Self::Segments),
            "cohort" => Ok(Self::Cohort),
            "timeline" => Ok(Self::Timeline),
            other => Err(format!("unknown artifact kind '{other}'")),
        }
    }
}
