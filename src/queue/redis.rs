//! Redis-backed job queue.
//!
//! Storage layout under a key prefix (default `swapflow:queue`):
//!
//! - `{p}:ready`    list of JSON jobs ready for lease
//! - `{p}:delayed`  sorted set of JSON jobs, score = ready-at (ms epoch)
//! - `{p}:active`   hash of `lease_id` to JSON job
//! - `{p}:leases`   sorted set of `lease_id`, score = leased-at (ms epoch)
//! - `{p}:live`     set of order IDs with a live job (dedup key)
//! - `{p}:errors:{job_id}` list of per-attempt errors
//! - `{p}:dead`     list of JSON dead-letter entries
//! - `{p}:counters` hash of monotonic counters
//!
//! Delivery is at-least-once: a worker crash between `LPOP` and `HSET`
//! can lose at most the in-flight lease, which stall detection repairs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;

use super::job::{DeadJob, ExecutionJob, LeasedJob};
use super::{JobQueue, QueueOptions, QueueStats};
use crate::domain::OrderId;
use crate::error::EngineError;

/// How often the lease loop polls Redis while the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Redis-backed [`JobQueue`] implementation.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    prefix: String,
    options: QueueOptions,
}

impl std::fmt::Debug for RedisJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobQueue")
            .field("prefix", &self.prefix)
            .field("options", &self.options)
            .finish()
    }
}

fn redis_err(e: redis::RedisError) -> EngineError {
    EngineError::Queue(e.to_string())
}

fn json_err(e: serde_json::Error) -> EngineError {
    EngineError::Queue(format!("job serialization: {e}"))
}

impl RedisJobQueue {
    /// Connects to Redis at `url` and returns a queue handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Queue`] when the connection cannot be
    /// established.
    pub async fn connect(url: &str, options: QueueOptions) -> Result<Self, EngineError> {
        let client = redis::Client::open(url).map_err(redis_err)?;
        let conn = ConnectionManager::new(client).await.map_err(redis_err)?;
        Ok(Self {
            conn,
            prefix: "swapflow:queue".to_string(),
            options,
        })
    }

    /// Overrides the key prefix (used by tests to isolate namespaces).
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.prefix)
    }

    /// Moves due delayed jobs to the ready list and reclaims leases past
    /// the stall timeout.
    async fn sweep(&self) -> Result<(), EngineError> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();

        // Promote due delayed jobs.
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("delayed"))
            .arg(0)
            .arg(now_ms)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        for payload in due {
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("delayed"))
                .arg(&payload)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            // Only the remover promotes, so concurrent sweeps cannot
            // duplicate the job.
            if removed == 1 {
                redis::cmd("RPUSH")
                    .arg(self.key("ready"))
                    .arg(&payload)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(redis_err)?;
            }
        }

        // Reclaim stalled leases.
        let stall_ms = i64::try_from(self.options.stall_timeout.as_millis()).unwrap_or(i64::MAX);
        let stalled: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("leases"))
            .arg(0)
            .arg(now_ms - stall_ms)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        for lease_id in stalled {
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("leases"))
                .arg(&lease_id)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            if removed != 1 {
                continue;
            }
            let payload: Option<String> = redis::cmd("HGET")
                .arg(self.key("active"))
                .arg(&lease_id)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            if let Some(payload) = payload {
                redis::cmd("HDEL")
                    .arg(self.key("active"))
                    .arg(&lease_id)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(redis_err)?;
                tracing::warn!(lease_id, "reclaiming stalled redis lease");
                redis::cmd("RPUSH")
                    .arg(self.key("ready"))
                    .arg(&payload)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(redis_err)?;
            }
        }
        Ok(())
    }

    /// Removes the lease from the active partition, returning its job.
    async fn take_lease(&self, lease_id: &str) -> Result<ExecutionJob, EngineError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = redis::cmd("HGET")
            .arg(self.key("active"))
            .arg(lease_id)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        let Some(payload) = payload else {
            return Err(EngineError::Queue(format!(
                "unknown lease {lease_id} (job may have been reclaimed)"
            )));
        };
        redis::cmd("HDEL")
            .arg(self.key("active"))
            .arg(lease_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        redis::cmd("ZREM")
            .arg(self.key("leases"))
            .arg(lease_id)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        serde_json::from_str(&payload).map_err(json_err)
    }

    async fn incr_counter(&self, name: &str) -> Result<(), EngineError> {
        let mut conn = self.conn.clone();
        redis::cmd("HINCRBY")
            .arg(self.key("counters"))
            .arg(name)
            .arg(1)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, order_id: OrderId) -> Result<ExecutionJob, EngineError> {
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("SADD")
            .arg(self.key("live"))
            .arg(order_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        if added == 0 {
            return Err(EngineError::Conflict {
                order_id,
                status: "queued".to_string(),
                reason: "a live execution job already exists for this order".to_string(),
            });
        }

        let job = ExecutionJob::new(order_id);
        let payload = serde_json::to_string(&job).map_err(json_err)?;
        redis::cmd("RPUSH")
            .arg(self.key("ready"))
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        self.incr_counter("enqueued_total").await?;
        Ok(job)
    }

    async fn lease(&self, timeout: Duration) -> Result<Option<LeasedJob>, EngineError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.sweep().await?;

            let mut conn = self.conn.clone();
            let payload: Option<String> = redis::cmd("LPOP")
                .arg(self.key("ready"))
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;

            if let Some(payload) = payload {
                let job: ExecutionJob = serde_json::from_str(&payload).map_err(json_err)?;
                let lease_id = uuid::Uuid::new_v4().to_string();
                redis::cmd("HSET")
                    .arg(self.key("active"))
                    .arg(&lease_id)
                    .arg(&payload)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(redis_err)?;
                redis::cmd("ZADD")
                    .arg(self.key("leases"))
                    .arg(Utc::now().timestamp_millis())
                    .arg(&lease_id)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(redis_err)?;
                return Ok(Some(LeasedJob { job, lease_id }));
            }

            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, lease: &LeasedJob) -> Result<(), EngineError> {
        let job = self.take_lease(&lease.lease_id).await?;
        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(self.key("live"))
            .arg(job.order_id.to_string())
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        redis::cmd("DEL")
            .arg(self.key(&format!("errors:{}", job.job_id)))
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;

        // Keep a bounded window of completed records for observability.
        let payload = serde_json::to_string(&job).map_err(json_err)?;
        redis::cmd("LPUSH")
            .arg(self.key("completed"))
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        redis::cmd("LTRIM")
            .arg(self.key("completed"))
            .arg(0)
            .arg(i64::try_from(self.options.keep_completed).unwrap_or(1_000) - 1)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        self.incr_counter("completed_total").await?;
        Ok(())
    }

    async fn nack(&self, lease: &LeasedJob, error: &str) -> Result<(), EngineError> {
        let mut job = self.take_lease(&lease.lease_id).await?;
        let mut conn = self.conn.clone();
        self.incr_counter("failed_attempts_total").await?;

        let errors_key = self.key(&format!("errors:{}", job.job_id));
        redis::cmd("RPUSH")
            .arg(&errors_key)
            .arg(error)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;

        if job.attempt >= self.options.max_attempts {
            let attempt_errors: Vec<String> = redis::cmd("LRANGE")
                .arg(&errors_key)
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            redis::cmd("DEL")
                .arg(&errors_key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)?;
            redis::cmd("SREM")
                .arg(self.key("live"))
                .arg(job.order_id.to_string())
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)?;

            tracing::warn!(
                job_id = %job.job_id,
                order_id = %job.order_id,
                attempts = job.attempt,
                "job dead-lettered"
            );
            let dead = DeadJob {
                job,
                attempt_errors,
                dead_lettered_at: Utc::now(),
            };
            let dead_payload = serde_json::to_string(&dead).map_err(json_err)?;
            redis::cmd("LPUSH")
                .arg(self.key("dead"))
                .arg(dead_payload)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)?;
            redis::cmd("LTRIM")
                .arg(self.key("dead"))
                .arg(0)
                .arg(i64::try_from(self.options.keep_failed).unwrap_or(5_000) - 1)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_err)?;
            return Ok(());
        }

        let delay = self.options.backoff_delay(job.attempt);
        job.attempt += 1;
        let ready_at = Utc::now().timestamp_millis()
            + i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let payload = serde_json::to_string(&job).map_err(json_err)?;
        redis::cmd("ZADD")
            .arg(self.key("delayed"))
            .arg(ready_at)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn stats(&self) -> QueueStats {
        let mut conn = self.conn.clone();
        let ready: usize = redis::cmd("LLEN")
            .arg(self.key("ready"))
            .query_async(&mut conn)
            .await
            .unwrap_or(0);
        let delayed: usize = redis::cmd("ZCARD")
            .arg(self.key("delayed"))
            .query_async(&mut conn)
            .await
            .unwrap_or(0);
        let active: usize = redis::cmd("HLEN")
            .arg(self.key("active"))
            .query_async(&mut conn)
            .await
            .unwrap_or(0);
        let dead_lettered: usize = redis::cmd("LLEN")
            .arg(self.key("dead"))
            .query_async(&mut conn)
            .await
            .unwrap_or(0);
        let counters: std::collections::HashMap<String, u64> = redis::cmd("HGETALL")
            .arg(self.key("counters"))
            .query_async(&mut conn)
            .await
            .unwrap_or_default();

        QueueStats {
            ready,
            delayed,
            active,
            dead_lettered,
            enqueued_total: counters.get("enqueued_total").copied().unwrap_or(0),
            completed_total: counters.get("completed_total").copied().unwrap_or(0),
            failed_attempts_total: counters
                .get("failed_attempts_total")
                .copied()
                .unwrap_or(0),
        }
    }

    async fn dead_letters(&self) -> Vec<DeadJob> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key("dead"))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();
        payloads
            .iter()
            .rev()
            .filter_map(|p| serde_json::from_str(p).ok())
            .collect()
    }
}
