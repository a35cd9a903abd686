//! Artifact cache: latest artifact per kind, with freshness metadata.
//!
//! Layout in the key-value store, per kind:
//!   cached_<kind>              → JSON envelope { run_seq, updated_at, payload }
//!   meta:<kind>_updated_at     → RFC 3339 production timestamp
//!   meta:<kind>_run_seq        → run sequence of the stored envelope
//!
//! RULES:
//!   - All three keys are written in one `set_many`, so a reader sees the
//!     previous artifact or the new one, never a mix.
//!   - Reads go straight to the store. They never wait for a write and
//!     never trigger a computation.
//!   - A write carrying an older run sequence than the stored entry is
//!     dropped: an overlapping run that started earlier cannot clobber a
//!     newer result.

use crate::{
    cohort::{validate_cohort, CohortArtifact},
    error::{AnalyticsError, AnalyticsResult},
    segmentation::{validate_segments, SegmentRecord},
    store::KeyValueStore,
    timeline::{validate_timeline, TimelineArtifact},
    types::{ArtifactKind, RunSeq},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// The segments artifact is the full per-customer table.
pub type SegmentsArtifact = Vec<SegmentRecord>;

/// Anything the cache can hold. Validation runs at the write boundary.
pub trait Artifact: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ArtifactKind;

    fn validate(&self) -> AnalyticsResult<()>;
}

impl Artifact for SegmentsArtifact {
    const KIND: ArtifactKind = ArtifactKind::Segments;

    fn validate(&self) -> AnalyticsResult<()> {
        validate_segments(self)
    }
}

impl Artifact for CohortArtifact {
    const KIND: ArtifactKind = ArtifactKind::Cohort;

    fn validate(&self) -> AnalyticsResult<()> {
        validate_cohort(self)
    }
}

impl Artifact for TimelineArtifact {
    const KIND: ArtifactKind = ArtifactKind::Timeline;

    fn validate(&self) -> AnalyticsResult<()> {
        validate_timeline(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub run_seq: RunSeq,
    pub updated_at: DateTime<Utc>,
    pub payload: T,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    run_seq: RunSeq,
    updated_at: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    /// A newer run already wrote this kind; the write was dropped.
    Superseded { current: RunSeq },
}

pub struct ArtifactCache {
    kv: Arc<dyn KeyValueStore>,
    /// Serializes check-and-set on the write path only.
    write_lock: Mutex<()>,
}

impl ArtifactCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv, write_lock: Mutex::new(()) }
    }

    pub fn write<A: Artifact>(
        &self,
        payload: &A,
        run_seq: RunSeq,
        updated_at: DateTime<Utc>,
    ) -> AnalyticsResult<WriteOutcome> {
        payload.validate()?;
        let envelope = serde_json::to_string(&EnvelopeRef { run_seq, updated_at, payload })?;
        let timestamp = updated_at.to_rfc3339();
        let seq = run_seq.to_string();

        let _guard = self.write_lock.lock();
        if let Some(current) = self.stored_seq(A::KIND)? {
            if current > run_seq {
                log::warn!(
                    "run={run_seq} cache: {} write dropped, run {current} already stored",
                    A::KIND
                );
                return Ok(WriteOutcome::Superseded { current });
            }
        }

        let (entry, meta, seq_meta) = (entry_key(A::KIND), updated_at_key(A::KIND), seq_key(A::KIND));
        self.kv.set_many(&[
            (entry.as_str(), envelope.as_str()),
            (meta.as_str(), timestamp.as_str()),
            (seq_meta.as_str(), seq.as_str()),
        ])?;
        log::info!(
            "run={run_seq} cache: stored {} ({} bytes, updated_at {timestamp})",
            A::KIND,
            envelope.len()
        );
        Ok(WriteOutcome::Stored)
    }

    /// Latest complete artifact, or `NotComputed` when none was ever stored.
    pub fn read<A: Artifact>(&self) -> AnalyticsResult<CacheEntry<A>> {
        let raw = self
            .kv
            .get(&entry_key(A::KIND))?
            .ok_or(AnalyticsError::NotComputed { kind: A::KIND })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn read_timestamp(&self, kind: ArtifactKind) -> AnalyticsResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.kv.get(&updated_at_key(kind))? else {
            return Ok(None);
        };
        let ts = DateTime::parse_from_rfc3339(&raw).map_err(|e| {
            AnalyticsError::DataQuality(format!("bad {kind} timestamp '{raw}': {e}"))
        })?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    pub fn contains(&self, kind: ArtifactKind) -> AnalyticsResult<bool> {
        Ok(self.kv.get(&entry_key(kind))?.is_some())
    }

    /// Highest run sequence stored for any kind, 0 for an empty cache.
    pub fn max_stored_seq(&self) -> AnalyticsResult<RunSeq> {
        let mut max = 0;
        for kind in ArtifactKind::ALL {
            max = max.max(self.stored_seq(kind)?.unwrap_or(0));
        }
        Ok(max)
    }

    fn stored_seq(&self, kind: ArtifactKind) -> AnalyticsResult<Option<RunSeq>> {
        let Some(raw) = self.kv.get(&seq_key(kind))? else {
            return Ok(None);
        };
        raw.parse()
            .map(Some)
            .map_err(|_| AnalyticsError::DataQuality(format!("bad {kind} run sequence '{raw}'")))
    }
}

fn entry_key(kind: ArtifactKind) -> String {
    format!("cached_{kind}")
}

fn updated_at_key(kind: ArtifactKind) -> String {
    format!("meta:{kind}_updated_at")
}

fn seq_key(kind: ArtifactKind) -> String {
    format!("meta:{kind}_run_seq")
}
