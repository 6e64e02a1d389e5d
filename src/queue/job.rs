//! Execution job artifacts flowing through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OrderId;

/// A queued work item whose processing advances one order through its
/// lifecycle. The queue owns the job record; the order store owns all
/// durable order state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJob {
    /// Queue-assigned job identifier.
    pub job_id: String,
    /// Order this job executes.
    pub order_id: OrderId,
    /// Delivery attempt, 1-based, set by the queue.
    pub attempt: u32,
    /// When the job was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl ExecutionJob {
    /// Creates a first-attempt job for the given order.
    #[must_use]
    pub fn new(order_id: OrderId) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            order_id,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// A job leased to a worker. The lease must be settled with exactly one
/// `ack` or `nack`.
#[derive(Debug, Clone)]
pub struct LeasedJob {
    /// The delivered job.
    pub job: ExecutionJob,
    /// Opaque lease token the queue uses to settle the delivery.
    pub lease_id: String,
}

/// A job that exhausted its delivery attempts, kept in the dead-letter
/// partition with the error from every attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadJob {
    /// The exhausted job.
    pub job: ExecutionJob,
    /// Per-attempt error messages, oldest first.
    pub attempt_errors: Vec<String>,
    /// When the job was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}
