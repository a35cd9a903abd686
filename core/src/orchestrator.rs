//! Recompute orchestrator: turns "recompute X" into a background run.
//!
//! RUN SEQUENCE (one task per trigger):
//!   1. Take the next run sequence (at trigger time, not at start).
//!      Sequences continue from the highest one already in the cache, so a
//!      restarted process never writes under a number the store has seen.
//!   2. Load a fresh snapshot from the record source.
//!   3. Assemble the fact table.
//!   4. Run the engine for the requested kind.
//!   5. Write the artifact to the cache under that run sequence.
//!
//! RULES:
//!   - A run that fails at any step never touches the cache.
//!   - A timeline run reads the segments artifact from the cache; without
//!     one it fails with `StaleDependency`.
//!   - `startup()` triggers every kind once per orchestrator. The startup
//!     timeline run waits for the startup segmentation run to finish first.

use crate::{
    cache::{ArtifactCache, SegmentsArtifact, WriteOutcome},
    cohort::build_cohorts,
    config::AnalyticsConfig,
    error::{AnalyticsError, AnalyticsResult},
    join::assemble,
    segmentation::segment_customers,
    source::RecordSource,
    timeline::build_timeline,
    types::{ArtifactKind, RunSeq},
    worker::{Job, TaskExecutor, TaskId, TaskStatus},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub task_id: TaskId,
    pub kind: ArtifactKind,
    pub run_seq: RunSeq,
}

/// Everything a run needs, shared read-only between tasks.
struct RunContext {
    source: Arc<dyn RecordSource>,
    cache: Arc<ArtifactCache>,
    config: Arc<AnalyticsConfig>,
}

pub struct Orchestrator {
    ctx: Arc<RunContext>,
    executor: Arc<dyn TaskExecutor>,
    last_seq: AtomicU64,
    startup: Mutex<Option<Vec<RunHandle>>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        cache: Arc<ArtifactCache>,
        config: Arc<AnalyticsConfig>,
        executor: Arc<dyn TaskExecutor>,
    ) -> AnalyticsResult<Self> {
        let last_seq = cache.max_stored_seq()?;
        if last_seq > 0 {
            log::info!("orchestrator: cache holds runs up to {last_seq}, continuing from there");
        }
        Ok(Self {
            ctx: Arc::new(RunContext { source, cache, config }),
            executor,
            last_seq: AtomicU64::new(last_seq),
            startup: Mutex::new(None),
        })
    }

    /// Schedule one recomputation of `kind` and return immediately.
    pub fn trigger(&self, kind: ArtifactKind) -> RunHandle {
        self.schedule(kind, None)
    }

    /// Trigger all three kinds once. Later calls return the first call's
    /// handles without scheduling anything.
    pub fn startup(&self) -> Vec<RunHandle> {
        let mut started = self.startup.lock();
        if let Some(handles) = started.as_ref() {
            log::debug!("orchestrator: startup already triggered, reusing {} handles", handles.len());
            return handles.clone();
        }

        let segments = self.trigger(ArtifactKind::Segments);
        let cohort = self.trigger(ArtifactKind::Cohort);
        let timeline = self.schedule(ArtifactKind::Timeline, Some(segments.task_id.clone()));

        let handles = vec![segments, cohort, timeline];
        *started = Some(handles.clone());
        handles
    }

    pub fn poll(&self, task_id: &str) -> Option<TaskStatus> {
        self.executor.status(task_id)
    }

    pub fn wait(&self, task_id: &str, timeout: Option<Duration>) -> Option<TaskStatus> {
        self.executor.wait(task_id, timeout)
    }

    fn schedule(&self, kind: ArtifactKind, after: Option<TaskId>) -> RunHandle {
        let run_seq = self.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = Arc::clone(&self.ctx);
        let executor = Arc::clone(&self.executor);

        let job: Job = Box::new(move || {
            if let Some(dependency) = after {
                let status = executor.wait(&dependency, None);
                log::debug!("run={run_seq} {kind}: dependency {dependency} finished as {status:?}");
            }
            ctx.run(kind, run_seq)
        });

        let task_id = self.executor.schedule(kind.name(), job);
        log::info!("run={run_seq} {kind}: scheduled as task {task_id}");
        RunHandle { task_id, kind, run_seq }
    }
}

impl RunContext {
    fn run(&self, kind: ArtifactKind, run_seq: RunSeq) -> AnalyticsResult<()> {
        let started = Instant::now();

        // Timeline checks its dependency before paying for a load.
        let segments = match kind {
            ArtifactKind::Timeline => Some(self.current_segments()?),
            _ => None,
        };

        let relations = self.source.load()?;
        let facts = assemble(&relations)?;
        log::info!("run={run_seq} {kind}: {} fact rows assembled", facts.len());

        let produced_at = Utc::now();
        let outcome = match kind {
            ArtifactKind::Segments => {
                let records = segment_customers(&facts, &self.config)?;
                log::info!("run={run_seq} segmentation: {} customers segmented", records.len());
                self.cache.write(&records, run_seq, produced_at)?
            }
            ArtifactKind::Cohort => {
                let artifact = build_cohorts(&facts, &self.config, produced_at)?;
                self.cache.write(&artifact, run_seq, produced_at)?
            }
            ArtifactKind::Timeline => {
                let segments = segments.unwrap_or_default();
                let artifact = build_timeline(&facts, &segments, produced_at)?;
                self.cache.write(&artifact, run_seq, produced_at)?
            }
        };

        let elapsed_ms = started.elapsed().as_millis();
        match outcome {
            WriteOutcome::Stored => {
                log::info!("run={run_seq} {kind}: finished in {elapsed_ms}ms")
            }
            WriteOutcome::Superseded { current } => log::info!(
                "run={run_seq} {kind}: finished in {elapsed_ms}ms, result superseded by run {current}"
            ),
        }
        Ok(())
    }

    fn current_segments(&self) -> AnalyticsResult<SegmentsArtifact> {
        match self.cache.read::<SegmentsArtifact>() {
            Ok(entry) => Ok(entry.payload),
            Err(e) if e.is_not_computed() => Err(AnalyticsError::StaleDependency {
                kind: ArtifactKind::Timeline,
                requires: ArtifactKind::Segments,
            }),
            Err(e) => Err(e),
        }
    }
}
