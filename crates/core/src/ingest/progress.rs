//! Per-job progress tracking for seeding runs.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Ticker recorded for failures that are not tied to one instrument.
pub const GLOBAL_ERROR_TICKER: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionError {
    pub ticker: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub current_ticker: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub errors: Vec<IngestionError>,
}

impl IngestionProgress {
    pub fn new(job_id: Uuid, total: usize) -> Self {
        Self {
            job_id,
            status: JobStatus::Idle,
            total,
            processed: 0,
            successful: 0,
            failed: 0,
            current_ticker: None,
            started_at: None,
            finished_at: None,
            errors: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn record_success(&mut self) {
        self.processed += 1;
        self.successful += 1;
    }

    pub fn record_failure(&mut self, ticker: &str, error: impl ToString) {
        self.processed += 1;
        self.failed += 1;
        self.errors.push(IngestionError {
            ticker: ticker.to_string(),
            error: error.to_string(),
        });
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.current_ticker = None;
        self.finished_at = Some(Utc::now());
    }

    /// Marks the whole job failed. Counters keep whatever was reached.
    pub fn abort(&mut self, error: impl ToString) {
        self.status = JobStatus::Error;
        self.current_ticker = None;
        self.finished_at = Some(Utc::now());
        self.errors.push(IngestionError {
            ticker: GLOBAL_ERROR_TICKER.to_string(),
            error: error.to_string(),
        });
    }
}

/// Finished jobs kept for progress lookups before the oldest are dropped.
pub const DEFAULT_FINISHED_JOBS_KEPT: usize = 100;

#[derive(Debug, Default)]
struct Jobs {
    by_id: HashMap<Uuid, IngestionProgress>,
    /// Job ids, oldest first.
    order: VecDeque<Uuid>,
    latest: Option<Uuid>,
}

impl Jobs {
    fn has_active(&self) -> bool {
        self.by_id.values().any(|p| !p.status.is_finished())
    }

    fn is_finished(&self, job_id: &Uuid) -> bool {
        self.by_id
            .get(job_id)
            .is_some_and(|p| p.status.is_finished())
    }

    /// Drops the oldest finished jobs beyond `keep`. Active jobs stay.
    fn evict_finished(&mut self, keep: usize) {
        let finished = self.order.iter().filter(|id| self.is_finished(id)).count();
        let mut excess = finished.saturating_sub(keep);
        if excess == 0 {
            return;
        }

        let Jobs { by_id, order, .. } = &mut *self;
        order.retain(|id| {
            let done = by_id.get(id).is_some_and(|p| p.status.is_finished());
            if excess > 0 && done {
                by_id.remove(id);
                excess -= 1;
                false
            } else {
                true
            }
        });
        if self.latest.is_some_and(|id| !self.by_id.contains_key(&id)) {
            self.latest = None;
        }
    }
}

/// Shared job table. Cloning shares the same table.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<Jobs>>,
    keep_finished: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FINISHED_JOBS_KEPT)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `keep_finished` completed or aborted jobs.
    pub fn with_capacity(keep_finished: usize) -> Self {
        Self {
            inner: Arc::default(),
            keep_finished,
        }
    }

    /// Registers a new idle job and makes it the latest, unless another job
    /// is still idle or running. Check and insert happen under one lock.
    pub fn try_create(&self, total: usize) -> Option<Uuid> {
        let mut jobs = self.inner.write();
        if jobs.has_active() {
            return None;
        }
        jobs.evict_finished(self.keep_finished);

        let job_id = Uuid::new_v4();
        jobs.by_id.insert(job_id, IngestionProgress::new(job_id, total));
        jobs.order.push_back(job_id);
        jobs.latest = Some(job_id);
        Some(job_id)
    }

    pub fn get(&self, job_id: Uuid) -> Option<IngestionProgress> {
        self.inner.read().by_id.get(&job_id).cloned()
    }

    pub fn latest(&self) -> Option<IngestionProgress> {
        let jobs = self.inner.read();
        jobs.latest.and_then(|id| jobs.by_id.get(&id).cloned())
    }

    /// Applies `f` to the job's progress. Unknown ids are ignored.
    pub fn update(&self, job_id: Uuid, f: impl FnOnce(&mut IngestionProgress)) {
        if let Some(p) = self.inner.write().by_id.get_mut(&job_id) {
            f(p);
        }
    }

    /// True while some job is idle or running.
    pub fn has_active_job(&self) -> bool {
        self.inner.read().has_active()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_one_active_job_at_a_time() {
        let registry = JobRegistry::new();
        let a = registry.try_create(3).unwrap();
        assert!(registry.has_active_job());
        assert!(registry.try_create(5).is_none());

        registry.update(a, |p| {
            p.start();
            p.record_success();
            p.record_failure("ZZZZ", "company not found: ZZZZ");
        });
        assert!(registry.try_create(5).is_none());

        let pa = registry.get(a).unwrap();
        assert_eq!(pa.status, JobStatus::Running);
        assert_eq!((pa.processed, pa.successful, pa.failed), (2, 1, 1));
        assert_eq!(pa.errors[0].ticker, "ZZZZ");

        registry.update(a, |p| p.complete());
        assert!(!registry.has_active_job());

        let b = registry.try_create(5).unwrap();
        let pb = registry.get(b).unwrap();
        assert_eq!(pb.status, JobStatus::Idle);
        assert_eq!(pb.total, 5);
        assert_eq!(registry.latest().unwrap().job_id, b);
        assert_eq!(registry.get(a).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn evicts_oldest_finished_jobs() {
        let registry = JobRegistry::with_capacity(2);
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = registry.try_create(1).unwrap();
            registry.update(id, |p| {
                p.start();
                p.complete();
            });
            ids.push(id);
        }
        assert_eq!(registry.len(), 3);

        let next = registry.try_create(1).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.get(ids[0]).is_none());
        assert!(registry.get(ids[1]).is_some());
        assert!(registry.get(ids[2]).is_some());
        assert_eq!(registry.latest().unwrap().job_id, next);
    }

    #[test]
    fn abort_appends_global_error() {
        let mut p = IngestionProgress::new(Uuid::new_v4(), 2);
        p.start();
        p.abort("connection refused");
        assert_eq!(p.status, JobStatus::Error);
        assert!(p.status.is_finished());
        assert!(p.finished_at.is_some());
        assert_eq!(p.errors.last().unwrap().ticker, GLOBAL_ERROR_TICKER);
    }

    #[test]
    fn unknown_job_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
        assert!(registry.latest().is_none());
    }

    #[test]
    fn serializes_status_lowercase() {
        let p = IngestionProgress::new(Uuid::nil(), 0);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["status"], "idle");
        assert_eq!(v["errors"], serde_json::json!([]));
    }
}
