//! In-process job queue with the full delivery contract.
//!
//! [`MemoryJobQueue`] implements the same at-least-once semantics as the
//! Redis-backed queue (backoff, dead-lettering, dedup, stall reclaim)
//! without external storage. It backs the test suite and single-process
//! deployments.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use super::job::{DeadJob, ExecutionJob, LeasedJob};
use super::{JobQueue, QueueOptions, QueueStats};
use crate::domain::OrderId;
use crate::error::EngineError;

#[derive(Debug)]
struct ActiveLease {
    job: ExecutionJob,
    leased_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CompletedRecord {
    #[allow(dead_code)]
    job_id: String,
    finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<ExecutionJob>,
    delayed: Vec<(DateTime<Utc>, ExecutionJob)>,
    active: HashMap<String, ActiveLease>,
    live_orders: HashSet<OrderId>,
    attempt_errors: HashMap<String, Vec<String>>,
    dead: Vec<DeadJob>,
    completed: VecDeque<CompletedRecord>,
    failed: VecDeque<CompletedRecord>,
    enqueued_total: u64,
    completed_total: u64,
    failed_attempts_total: u64,
}

/// Volatile [`JobQueue`] implementation.
pub struct MemoryJobQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    options: QueueOptions,
}

impl std::fmt::Debug for MemoryJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryJobQueue")
            .field("options", &self.options)
            .finish()
    }
}

impl MemoryJobQueue {
    /// Creates a queue with the given options.
    #[must_use]
    pub fn new(options: QueueOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
            options,
        }
    }

    /// Promotes due delayed jobs and reclaims stalled leases.
    fn sweep(inner: &mut Inner, options: &QueueOptions, now: DateTime<Utc>) {
        // Delayed jobs whose backoff elapsed become ready.
        let mut still_delayed = Vec::new();
        for (ready_at, job) in inner.delayed.drain(..) {
            if ready_at <= now {
                inner.ready.push_back(job);
            } else {
                still_delayed.push((ready_at, job));
            }
        }
        inner.delayed = still_delayed;

        // Leases past the stall timeout are reclaimed for another attempt.
        let stall = chrono::Duration::from_std(options.stall_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let stalled: Vec<String> = inner
            .active
            .iter()
            .filter(|(_, lease)| lease.leased_at + stall <= now)
            .map(|(lease_id, _)| lease_id.clone())
            .collect();
        for lease_id in stalled {
            if let Some(lease) = inner.active.remove(&lease_id) {
                tracing::warn!(
                    job_id = %lease.job.job_id,
                    order_id = %lease.job.order_id,
                    "reclaiming stalled lease"
                );
                inner.ready.push_back(lease.job);
            }
        }

        // Retention caps on finished-job records.
        while inner.completed.len() > options.keep_completed {
            inner.completed.pop_front();
        }
        while inner.failed.len() > options.keep_failed {
            inner.failed.pop_front();
        }
        let completed_cutoff = now
            - chrono::Duration::from_std(options.completed_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        while matches!(inner.completed.front(), Some(r) if r.finished_at < completed_cutoff) {
            inner.completed.pop_front();
        }
        let failed_cutoff = now
            - chrono::Duration::from_std(options.failed_ttl)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        while matches!(inner.failed.front(), Some(r) if r.finished_at < failed_cutoff) {
            inner.failed.pop_front();
        }
    }

    /// Earliest instant at which a delayed job becomes ready.
    fn next_wake(inner: &Inner) -> Option<DateTime<Utc>> {
        inner.delayed.iter().map(|(ready_at, _)| *ready_at).min()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, order_id: OrderId) -> Result<ExecutionJob, EngineError> {
        let mut inner = self.inner.lock().await;
        if !inner.live_orders.insert(order_id) {
            return Err(EngineError::Conflict {
                order_id,
                status: "queued".to_string(),
                reason: "a live execution job already exists for this order".to_string(),
            });
        }
        let job = ExecutionJob::new(order_id);
        inner.enqueued_total += 1;
        inner.ready.push_back(job.clone());
        drop(inner);
        self.notify.notify_one();
        Ok(job)
    }

    async fn lease(&self, timeout: Duration) -> Result<Option<LeasedJob>, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().await;
                let now = Utc::now();
                Self::sweep(&mut inner, &self.options, now);

                if let Some(job) = inner.ready.pop_front() {
                    let lease_id = uuid::Uuid::new_v4().to_string();
                    inner.active.insert(
                        lease_id.clone(),
                        ActiveLease {
                            job: job.clone(),
                            leased_at: now,
                        },
                    );
                    return Ok(Some(LeasedJob { job, lease_id }));
                }
            }

            // Wait for an enqueue/nack notification, but re-sweep early
            // enough to promote the next delayed job on time.
            let wake = {
                let inner = self.inner.lock().await;
                Self::next_wake(&inner)
            };
            let mut wait = deadline.saturating_duration_since(tokio::time::Instant::now());
            if wait.is_zero() {
                return Ok(None);
            }
            if let Some(wake_at) = wake {
                let until_wake = (wake_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .max(Duration::from_millis(10));
                wait = wait.min(until_wake);
            }
            let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        }
    }

    async fn ack(&self, lease: &LeasedJob) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.remove(&lease.lease_id) else {
            return Err(EngineError::Queue(format!(
                "unknown lease {} (job may have been reclaimed)",
                lease.lease_id
            )));
        };
        inner.live_orders.remove(&active.job.order_id);
        inner.attempt_errors.remove(&active.job.job_id);
        inner.completed_total += 1;
        inner.completed.push_back(CompletedRecord {
            job_id: active.job.job_id,
            finished_at: Utc::now(),
        });
        Ok(())
    }

    async fn nack(&self, lease: &LeasedJob, error: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.remove(&lease.lease_id) else {
            return Err(EngineError::Queue(format!(
                "unknown lease {} (job may have been reclaimed)",
                lease.lease_id
            )));
        };
        let mut job = active.job;
        inner.failed_attempts_total += 1;
        inner
            .attempt_errors
            .entry(job.job_id.clone())
            .or_default()
            .push(error.to_string());

        if job.attempt >= self.options.max_attempts {
            let errors = inner
                .attempt_errors
                .remove(&job.job_id)
                .unwrap_or_default();
            inner.live_orders.remove(&job.order_id);
            tracing::warn!(
                job_id = %job.job_id,
                order_id = %job.order_id,
                attempts = job.attempt,
                "job dead-lettered"
            );
            inner.failed.push_back(CompletedRecord {
                job_id: job.job_id.clone(),
                finished_at: Utc::now(),
            });
            inner.dead.push(DeadJob {
                job,
                attempt_errors: errors,
                dead_lettered_at: Utc::now(),
            });
            return Ok(());
        }

        let delay = self.options.backoff_delay(job.attempt);
        job.attempt += 1;
        let ready_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(5));
        inner.delayed.push((ready_at, job));
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            ready: inner.ready.len(),
            delayed: inner.delayed.len(),
            active: inner.active.len(),
            dead_lettered: inner.dead.len(),
            enqueued_total: inner.enqueued_total,
            completed_total: inner.completed_total,
            failed_attempts_total: inner.failed_attempts_total,
        }
    }

    async fn dead_letters(&self) -> Vec<DeadJob> {
        self.inner.lock().await.dead.clone()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueOptions::default())
    }
}
