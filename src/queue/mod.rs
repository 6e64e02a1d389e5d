//! Durable, retryable FIFO of execution jobs.
//!
//! The queue delivers at-least-once: a job may be observed more than
//! once, so consumers key their idempotence on the job's `order_id`.
//! A nacked job is requeued with exponential backoff until its attempts
//! are exhausted, at which point it moves to the dead-letter partition.

pub mod job;
pub mod memory;
pub mod redis;

pub use job::{DeadJob, ExecutionJob, LeasedJob};
pub use memory::MemoryJobQueue;
pub use redis::RedisJobQueue;

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::OrderId;
use crate::error::EngineError;

/// Queue tuning knobs with the defaults the engine ships with.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Delivery attempts per job before dead-lettering.
    pub max_attempts: u32,
    /// Base delay for the first backoff step.
    pub backoff_base: Duration,
    /// Backoff multiplier per additional attempt.
    pub backoff_multiplier: u32,
    /// Completed job records retained for observability.
    pub keep_completed: usize,
    /// Age cap on completed records.
    pub completed_ttl: Duration,
    /// Failed job records retained for observability.
    pub keep_failed: usize,
    /// Age cap on failed records.
    pub failed_ttl: Duration,
    /// A leased job with no progress for this long is reclaimed.
    pub stall_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            backoff_multiplier: 2,
            keep_completed: 1_000,
            completed_ttl: Duration::from_secs(24 * 60 * 60),
            keep_failed: 5_000,
            failed_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            stall_timeout: Duration::from_secs(30),
        }
    }
}

impl QueueOptions {
    /// Delay before redelivering after `failed_attempt` failed.
    ///
    /// Exponential: base 5 s, multiplier 2 gives 5 s, 10 s, 20 s, …
    #[must_use]
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1);
        let factor = u64::from(self.backoff_multiplier).saturating_pow(exponent);
        Duration::from_millis(
            u64::try_from(self.backoff_base.as_millis())
                .unwrap_or(u64::MAX)
                .saturating_mul(factor),
        )
    }
}

/// Queue observability counters.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Jobs ready for immediate lease.
    pub ready: usize,
    /// Jobs waiting out a backoff delay.
    pub delayed: usize,
    /// Jobs currently leased to workers.
    pub active: usize,
    /// Jobs in the dead-letter partition.
    pub dead_lettered: usize,
    /// Total jobs accepted since startup.
    pub enqueued_total: u64,
    /// Total jobs acked since startup.
    pub completed_total: u64,
    /// Total nacks since startup.
    pub failed_attempts_total: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[ready={}, delayed={}, active={}, dead={}, enq={}, done={}, nacks={}]",
            self.ready,
            self.delayed,
            self.active,
            self.dead_lettered,
            self.enqueued_total,
            self.completed_total,
            self.failed_attempts_total
        )
    }
}

/// Durable FIFO contract with at-least-once delivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably accepts a job for the order.
    ///
    /// `order_id` doubles as the deduplication key: while a job for the
    /// order is live (ready, delayed, or leased), a second enqueue is
    /// rejected so per-order execution stays serial.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Conflict`] when a live job already exists.
    /// - [`EngineError::Queue`] on storage failure.
    async fn enqueue(&self, order_id: OrderId) -> Result<ExecutionJob, EngineError>;

    /// Leases the next ready job, waiting up to `timeout` for one to
    /// become available. Returns `Ok(None)` on timeout.
    ///
    /// Also promotes due delayed jobs and reclaims stalled leases.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Queue`] on storage failure.
    async fn lease(&self, timeout: Duration) -> Result<Option<LeasedJob>, EngineError>;

    /// Settles a delivery as succeeded; removes the job.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Queue`] when the lease is unknown
    /// (e.g. already reclaimed by stall detection).
    async fn ack(&self, lease: &LeasedJob) -> Result<(), EngineError>;

    /// Settles a delivery as failed. Before max attempts the job is
    /// requeued with backoff; on exhaustion it is dead-lettered with
    /// the per-attempt error log.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Queue`] when the lease is unknown.
    async fn nack(&self, lease: &LeasedJob, error: &str) -> Result<(), EngineError>;

    /// Snapshot of the queue counters.
    async fn stats(&self) -> QueueStats;

    /// Dead-lettered jobs, oldest first.
    async fn dead_letters(&self) -> Vec<DeadJob>;
}
