//! Job registry: owns every clone job's state and cancellation token.
//!
//! - `create` spawns the pipeline and returns immediately
//! - `status` / `list` read snapshots while jobs run
//! - `cancel` fires the job's token; the state stays queryable until pruned

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    domain::{JobId, MessageId},
    errors::Error,
    job::{CloneRequest, JobState, JobStatus, JobSummary},
    pipeline::{run_clone, PipelineOutcome, Progress, Stage},
    transport::TransportProvider,
    Result,
};

/// Live state of one job, written by its pipeline task and read by queries.
struct JobCell {
    state: Mutex<JobState>,
}

impl JobCell {
    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn snapshot(&self) -> JobState {
        self.lock().clone()
    }

    fn transition(&self, next: JobStatus) -> bool {
        self.lock().transition(next)
    }

    fn fail(&self, detail: String) -> bool {
        let mut st = self.lock();
        if !st.transition(JobStatus::Error) {
            return false;
        }
        st.error_detail = Some(detail);
        true
    }
}

impl Progress for JobCell {
    fn stage(&self, stage: Stage) {
        self.lock().stage = Some(stage);
    }

    fn fetched(&self, total: usize) {
        self.lock().total_fetched = total as u64;
    }

    fn cloned(&self, total: u64, last: MessageId) {
        let mut st = self.lock();
        st.total_cloned = total;
        st.last_cloned_id = Some(last);
    }

    fn skipped(&self, _id: MessageId) {
        self.lock().skipped_empty += 1;
    }

    fn emission_failed(&self, _id: MessageId, detail: &str) {
        let mut st = self.lock();
        st.failed_emissions += 1;
        st.last_emission_error = Some(detail.to_string());
    }

    fn fetch_failed(&self, detail: &str) {
        self.lock().error_detail = Some(detail.to_string());
    }
}

struct JobEntry {
    seq: u64,
    cell: Arc<JobCell>,
    /// Present while the pipeline task may still be running.
    cancel: Option<CancellationToken>,
}

#[derive(Default)]
struct RegistryState {
    next_seq: u64,
    jobs: HashMap<JobId, JobEntry>,
}

#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    provider: Arc<dyn TransportProvider>,
    state: AsyncMutex<RegistryState>,
}

impl JobRegistry {
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                provider,
                state: AsyncMutex::new(RegistryState::default()),
            }),
        }
    }

    /// Register a job and launch its pipeline in the background.
    pub async fn create(&self, req: CloneRequest) -> JobId {
        let job_id = JobId::new_v4();
        let cell = Arc::new(JobCell {
            state: Mutex::new(JobState::new(job_id.clone(), &req)),
        });
        let cancel = CancellationToken::new();

        {
            let mut st = self.inner.state.lock().await;
            let seq = st.next_seq;
            st.next_seq += 1;
            st.jobs.insert(
                job_id.clone(),
                JobEntry {
                    seq,
                    cell: cell.clone(),
                    cancel: Some(cancel.clone()),
                },
            );
        }

        info!(
            job_id = %job_id,
            source = %req.source,
            target = %req.target,
            floor = %req.floor,
            "clone job created"
        );

        let registry = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            registry.run_job(id, req, cell, cancel).await;
        });

        job_id
    }

    async fn run_job(
        self,
        job_id: JobId,
        req: CloneRequest,
        cell: Arc<JobCell>,
        cancel: CancellationToken,
    ) {
        if cell.transition(JobStatus::Running) {
            let outcome = run_clone(self.inner.provider.as_ref(), &req, cell.as_ref(), &cancel).await;
            match outcome {
                PipelineOutcome::Completed(out) => {
                    cell.transition(JobStatus::Completed);
                    info!(
                        job_id = %job_id,
                        cloned = out.cloned,
                        skipped = out.skipped,
                        failed = out.failed,
                        "clone job completed"
                    );
                }
                PipelineOutcome::Failed(err) => {
                    error!(job_id = %job_id, error = %err, "clone job failed");
                    cell.fail(err.to_string());
                }
                PipelineOutcome::Cancelled => {
                    cell.transition(JobStatus::Cancelled);
                    info!(job_id = %job_id, "clone job cancelled");
                }
            }
        }

        let mut st = self.inner.state.lock().await;
        if let Some(entry) = st.jobs.get_mut(&job_id) {
            entry.cancel = None;
        }
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobState> {
        let st = self.inner.state.lock().await;
        st.jobs
            .get(job_id)
            .map(|e| e.cell.snapshot())
            .ok_or_else(|| Error::JobNotFound(job_id.clone()))
    }

    /// Every known job, oldest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        let st = self.inner.state.lock().await;
        let mut entries: Vec<&JobEntry> = st.jobs.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| {
                let snap = e.cell.lock();
                JobSummary {
                    job_id: snap.job_id.clone(),
                    status: snap.status,
                }
            })
            .collect()
    }

    /// Request cooperative cancellation and mark the job cancelled.
    ///
    /// Cancelling a job that already finished is a no-op on its state.
    pub async fn cancel(&self, job_id: &JobId) -> Result<JobState> {
        let mut st = self.inner.state.lock().await;
        let entry = st
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.clone()))?;

        if let Some(tok) = entry.cancel.take() {
            tok.cancel();
        }
        if entry.cell.transition(JobStatus::Cancelled) {
            info!(job_id = %job_id, "clone job cancellation requested");
        }
        Ok(entry.cell.snapshot())
    }

    /// Drop terminal jobs that finished more than `older_than` ago. Returns how many.
    pub async fn prune_finished(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut st = self.inner.state.lock().await;
        let before = st.jobs.len();
        st.jobs.retain(|_, e| {
            let snap = e.cell.lock();
            !(snap.status.is_terminal() && snap.finished_at.is_some_and(|t| t <= cutoff))
        });
        before - st.jobs.len()
    }

    /// Cancel every job that may still be running (process shutdown).
    pub async fn shutdown(&self) {
        let mut st = self.inner.state.lock().await;
        for (job_id, entry) in st.jobs.iter_mut() {
            if let Some(tok) = entry.cancel.take() {
                tok.cancel();
                entry.cell.transition(JobStatus::Cancelled);
                info!(job_id = %job_id, "clone job cancelled by shutdown");
            }
        }
    }
}
