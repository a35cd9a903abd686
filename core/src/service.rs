//! Analytics service: the read/trigger/poll surface callers talk to.
//!
//! Reads serve whatever the cache holds right now. They never wait for a
//! run and never start one.

use crate::{
    cache::{Artifact, ArtifactCache, SegmentsArtifact},
    cohort::CohortArtifact,
    config::AnalyticsConfig,
    error::AnalyticsResult,
    orchestrator::{Orchestrator, RunHandle},
    source::RecordSource,
    store::KeyValueStore,
    timeline::TimelineArtifact,
    types::ArtifactKind,
    worker::{TaskExecutor, TaskStatus},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The latest artifact of one kind with the instant it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Latest<T> {
    pub payload: T,
    pub updated_at: DateTime<Utc>,
}

pub struct AnalyticsService {
    cache: Arc<ArtifactCache>,
    orchestrator: Orchestrator,
}

impl AnalyticsService {
    pub fn build(
        source: Arc<dyn RecordSource>,
        kv: Arc<dyn KeyValueStore>,
        config: AnalyticsConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> AnalyticsResult<Self> {
        let cache = Arc::new(ArtifactCache::new(kv));
        let orchestrator =
            Orchestrator::new(source, Arc::clone(&cache), Arc::new(config), executor)?;
        Ok(Self { cache, orchestrator })
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn segments(&self) -> AnalyticsResult<Latest<SegmentsArtifact>> {
        self.latest()
    }

    pub fn cohort(&self) -> AnalyticsResult<Latest<CohortArtifact>> {
        self.latest()
    }

    pub fn timeline(&self) -> AnalyticsResult<Latest<TimelineArtifact>> {
        self.latest()
    }

    /// Production instant of the stored segments, `None` before the first run.
    pub fn segments_updated_at(&self) -> AnalyticsResult<Option<DateTime<Utc>>> {
        self.cache.read_timestamp(ArtifactKind::Segments)
    }

    pub fn trigger_recompute(&self, kind: ArtifactKind) -> RunHandle {
        self.orchestrator.trigger(kind)
    }

    pub fn startup(&self) -> Vec<RunHandle> {
        self.orchestrator.startup()
    }

    pub fn poll(&self, task_id: &str) -> Option<TaskStatus> {
        self.orchestrator.poll(task_id)
    }

    pub fn wait(&self, task_id: &str, timeout: Option<Duration>) -> Option<TaskStatus> {
        self.orchestrator.wait(task_id, timeout)
    }

    fn latest<A: Artifact>(&self) -> AnalyticsResult<Latest<A>> {
        let entry = self.cache.read::<A>()?;
        Ok(Latest { payload: entry.payload, updated_at: entry.updated_at })
    }
}
