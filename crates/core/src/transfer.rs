//! Transfer jobs
//!
//! Long-running copies and moves between containers, tracked as jobs with
//! progress, speed and explicit retry. Folder jobs report progress after
//! every file. The job registry is the only state
//! shared between callers and sits behind a single lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::relocation::{RelocationEngine, RelocationRequest};
use crate::traits::ObjectRef;

/// Stable job identifier, preserved across retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Error,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferJob {
    pub id: JobId,
    pub request: RelocationRequest,
    pub status: JobStatus,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Bytes per second over the last run
    pub speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Runs started for this job, retries included
    pub attempts: u32,
}

impl TransferJob {
    fn progress(&self) -> TransferProgress {
        TransferProgress {
            job_id: self.id,
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            speed: self.speed,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Snapshot delivered to the progress sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub job_id: JobId,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferProgress {
    /// Rounded completion percentage, 100 for empty transfers that completed
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return if self.status == JobStatus::Completed { 100 } else { 0 };
        }
        let pct = (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

/// Runs relocation requests as tracked jobs
pub struct TransferJobTracker {
    engine: Arc<RelocationEngine>,
    jobs: Mutex<Vec<TransferJob>>,
    next_id: AtomicU64,
}

impl TransferJobTracker {
    pub fn new(engine: Arc<RelocationEngine>) -> Self {
        Self {
            engine,
            jobs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn jobs_mut(&self) -> MutexGuard<'_, Vec<TransferJob>> {
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn update<R>(&self, id: JobId, f: impl FnOnce(&mut TransferJob) -> R) -> Result<R> {
        let mut jobs = self.jobs_mut();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| Error::NotFound(format!("transfer job {id}")))?;
        Ok(f(job))
    }

    /// Register a pending job
    pub fn submit(&self, request: RelocationRequest) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let total_bytes = request.source.size;
        self.jobs_mut().push(TransferJob {
            id,
            request,
            status: JobStatus::Pending,
            bytes_transferred: 0,
            total_bytes,
            speed: 0.0,
            error: None,
            attempts: 0,
        });
        tracing::debug!(job = %id, "transfer job submitted");
        id
    }

    pub fn jobs(&self) -> Vec<TransferJob> {
        self.jobs_mut().clone()
    }

    pub fn job(&self, id: JobId) -> Option<TransferJob> {
        self.jobs_mut().iter().find(|j| j.id == id).cloned()
    }

    /// Run every pending job, in submission order
    pub async fn run_pending(
        &self,
        sink: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Vec<TransferJob> {
        let ids: Vec<JobId> = self
            .jobs_mut()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.id)
            .collect();
        self.run(&ids, sink).await
    }

    /// Run the given pending jobs one after another
    ///
    /// Jobs that are not pending are left alone. When the engine's
    /// cancellation token fires, jobs not yet started stay pending.
    pub async fn run(
        &self,
        ids: &[JobId],
        sink: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Vec<TransferJob> {
        let cancel = self.engine.cancellation_token();
        for &id in ids {
            if cancel.is_cancelled() {
                tracing::info!(job = %id, "transfer cancelled before start");
                break;
            }
            if let Err(e) = self.run_one(id, sink).await {
                tracing::debug!(job = %id, error = %e, "transfer job not run");
            }
        }
        ids.iter().filter_map(|&id| self.job(id)).collect()
    }

    async fn run_one(
        &self,
        id: JobId,
        sink: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<()> {
        let request = self.update(id, |job| {
            if job.status != JobStatus::Pending {
                return None;
            }
            job.status = JobStatus::Active;
            job.attempts += 1;
            Some(job.request.clone())
        })?;
        let Some(request) = request else {
            return Ok(());
        };

        if request.source.is_folder {
            let total = self
                .engine
                .list(&request.source_container, &request.source.key)
                .await
                .map(|objects| objects.iter().map(|o| o.size).sum::<u64>());
            match total {
                Ok(total) => {
                    self.update(id, |job| job.total_bytes = total)?;
                }
                Err(e) => tracing::warn!(job = %id, error = %e, "could not size folder transfer"),
            }
        }
        sink(self.update(id, |job| job.progress())?);

        let started = Instant::now();
        let on_file = |object: &ObjectRef| {
            let elapsed = started.elapsed().as_secs_f64();
            let progress = self.update(id, |job| {
                job.bytes_transferred = (job.bytes_transferred + object.size).min(job.total_bytes);
                if elapsed > 0.0 {
                    job.speed = job.bytes_transferred as f64 / elapsed;
                }
                job.progress()
            });
            if let Ok(progress) = progress {
                sink(progress);
            }
        };
        let result = self.engine.relocate_each(&request, &on_file).await;
        let elapsed = started.elapsed().as_secs_f64();

        let progress = self.update(id, |job| {
            match &result {
                Ok(_) => {
                    job.status = JobStatus::Completed;
                    job.bytes_transferred = job.total_bytes;
                    job.speed = if elapsed > 0.0 {
                        job.total_bytes as f64 / elapsed
                    } else {
                        0.0
                    };
                }
                Err(reason) => {
                    job.status = JobStatus::Error;
                    job.error = Some(reason.to_string());
                }
            }
            job.progress()
        })?;
        tracing::info!(job = %id, status = ?progress.status, "transfer job finished");
        sink(progress);
        Ok(())
    }

    /// Reset a failed job and run it again under the same id
    pub async fn retry(
        &self,
        id: JobId,
        sink: &(dyn Fn(TransferProgress) + Send + Sync),
    ) -> Result<TransferJob> {
        self.update(id, |job| {
            if job.status != JobStatus::Error {
                return Err(Error::Conflict(format!(
                    "transfer job {id} is {:?}, only failed jobs can be retried",
                    job.status
                )));
            }
            job.status = JobStatus::Pending;
            job.bytes_transferred = 0;
            job.speed = 0.0;
            job.error = None;
            Ok(())
        })??;
        sink(self.update(id, |job| job.progress())?);

        self.run(&[id], sink).await;
        self.job(id)
            .ok_or_else(|| Error::NotFound(format!("transfer job {id}")))
    }

    /// Remove a completed job; returns whether it was removed
    pub fn clear(&self, id: JobId) -> Result<bool> {
        let mut jobs = self.jobs_mut();
        let pos = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| Error::NotFound(format!("transfer job {id}")))?;
        if jobs[pos].status != JobStatus::Completed {
            return Ok(false);
        }
        jobs.remove(pos);
        Ok(true)
    }

    /// Remove every completed job; returns how many went
    pub fn clear_all(&self) -> usize {
        let mut jobs = self.jobs_mut();
        let before = jobs.len();
        jobs.retain(|j| j.status != JobStatus::Completed);
        before - jobs.len()
    }
}
