//! Bounded worker pool consuming the job queue.
//!
//! Each worker loops lease → orchestrate → settle. The pool caps
//! concurrency, throttles job starts, and drains in-flight work on
//! shutdown within a deadline, after which outstanding leases are
//! nacked as retriable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use crate::execution::{JobDisposition, Orchestrator};
use crate::queue::{JobQueue, LeasedJob};

/// Worker pool tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Concurrent workers per process (1..=50).
    pub concurrency: usize,
    /// Cap on job starts per second per process.
    pub max_starts_per_second: u32,
    /// How long one lease call waits before re-checking shutdown.
    pub lease_wait: Duration,
    /// Drain budget on shutdown.
    pub shutdown_deadline: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_starts_per_second: 100,
            lease_wait: Duration::from_millis(500),
            shutdown_deadline: Duration::from_secs(30),
        }
    }
}

/// Sliding one-second window limiting job starts.
#[derive(Debug)]
struct RateWindow {
    window_start: tokio::time::Instant,
    started: u32,
}

#[derive(Debug)]
struct RateLimiter {
    max_per_second: u32,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(RateWindow {
                window_start: tokio::time::Instant::now(),
                started: 0,
            }),
        }
    }

    /// Waits until a job start is permitted under the rate cap.
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = tokio::time::Instant::now();
                if now.duration_since(window.window_start) >= Duration::from_secs(1) {
                    window.window_start = now;
                    window.started = 0;
                }
                if window.started < self.max_per_second {
                    window.started += 1;
                    return;
                }
                Duration::from_secs(1).saturating_sub(now.duration_since(window.window_start))
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

/// Bounded consumer pool over the job queue.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<Orchestrator>,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
    /// Leases currently being executed, so an over-deadline shutdown can
    /// nack whatever the aborted workers left behind.
    in_flight: Arc<Mutex<HashMap<String, LeasedJob>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool; call [`WorkerPool::start`] to spawn the workers.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<Orchestrator>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            orchestrator,
            config,
            shutdown_tx,
            workers: JoinSet::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawns the configured number of worker tasks.
    pub fn start(&mut self) {
        let limiter = Arc::new(RateLimiter::new(self.config.max_starts_per_second));
        for worker_index in 0..self.config.concurrency {
            let queue = Arc::clone(&self.queue);
            let orchestrator = Arc::clone(&self.orchestrator);
            let limiter = Arc::clone(&limiter);
            let in_flight = Arc::clone(&self.in_flight);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let lease_wait = self.config.lease_wait;

            self.workers.spawn(async move {
                tracing::debug!(worker_index, "worker started");
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    limiter.acquire().await;

                    let leased = tokio::select! {
                        leased = queue.lease(lease_wait) => leased,
                        _ = shutdown_rx.changed() => break,
                    };
                    let leased = match leased {
                        Ok(Some(leased)) => leased,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::error!(worker_index, error = %e, "lease failed");
                            tokio::time::sleep(Duration::from_millis(250)).await;
                            continue;
                        }
                    };

                    in_flight
                        .lock()
                        .await
                        .insert(leased.lease_id.clone(), leased.clone());

                    let disposition = orchestrator.execute(&leased.job).await;
                    let settle = match &disposition {
                        JobDisposition::Ack => queue.ack(&leased).await,
                        JobDisposition::Retry(error) => queue.nack(&leased, error).await,
                    };
                    if let Err(e) = settle {
                        tracing::warn!(
                            worker_index,
                            job_id = %leased.job.job_id,
                            error = %e,
                            "lease settlement failed"
                        );
                    }
                    in_flight.lock().await.remove(&leased.lease_id);
                }
                tracing::debug!(worker_index, "worker stopped");
            });
        }
        tracing::info!(
            concurrency = self.config.concurrency,
            rate_limit = self.config.max_starts_per_second,
            "worker pool started"
        );
    }

    /// Stops leasing, drains in-flight jobs within the shutdown
    /// deadline, then nacks whatever is still outstanding as retriable.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        let drain = async {
            while self.workers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.config.shutdown_deadline, drain)
            .await
            .is_err()
        {
            tracing::warn!("shutdown deadline exceeded; aborting workers");
            self.workers.abort_all();
            while self.workers.join_next().await.is_some() {}

            // Aborted workers never settled their leases; requeue them.
            let leftovers: Vec<LeasedJob> =
                self.in_flight.lock().await.drain().map(|(_, j)| j).collect();
            for leased in leftovers {
                if let Err(e) = self.queue.nack(&leased, "worker shutdown").await {
                    tracing::warn!(job_id = %leased.job.job_id, error = %e,
                        "failed to requeue job on shutdown");
                }
            }
        }
        tracing::info!("worker pool stopped");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::audit::AuditBus;
    use crate::domain::{NewOrder, OrderStatus};
    use crate::notify::NotificationHub;
    use crate::queue::{MemoryJobQueue, QueueOptions};
    use crate::store::{MemoryOrderStore, OrderStore};
    use crate::venue::{MockVenue, VenueAdapter, VenueRegistry};
    use rust_decimal_macros::dec;

    fn make_pool(
        store: Arc<MemoryOrderStore>,
        queue: Arc<MemoryJobQueue>,
        concurrency: usize,
    ) -> WorkerPool {
        let registry = Arc::new(VenueRegistry::new(vec![
            Arc::new(MockVenue::new("meteora", dec!(96.2))) as Arc<dyn VenueAdapter>,
        ]));
        let orchestrator = Arc::new(Orchestrator::new(
            store as Arc<dyn OrderStore>,
            registry,
            Arc::new(NotificationHub::new()),
            AuditBus::new(),
            "wallet-test".to_string(),
        ));
        WorkerPool::new(
            queue as Arc<dyn JobQueue>,
            orchestrator,
            WorkerPoolConfig {
                concurrency,
                max_starts_per_second: 100,
                lease_wait: Duration::from_millis(50),
                shutdown_deadline: Duration::from_secs(5),
            },
        )
    }

    fn make_input() -> NewOrder {
        NewOrder {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount: dec!(1.0),
            slippage_tolerance: dec!(1.0),
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn pool_drives_orders_to_completion() {
        let store = Arc::new(MemoryOrderStore::new());
        let queue = Arc::new(MemoryJobQueue::new(QueueOptions::default()));

        let mut order_ids = Vec::new();
        for _ in 0..8 {
            let Ok(order) = store.create(make_input()).await else {
                panic!("create failed");
            };
            let _ = queue.enqueue(order.id).await;
            order_ids.push(order.id);
        }

        let mut pool = make_pool(Arc::clone(&store), Arc::clone(&queue), 4);
        pool.start();

        // Wait until the queue reports all jobs settled.
        for _ in 0..100 {
            if queue.stats().await.completed_total == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pool.shutdown().await;

        for order_id in order_ids {
            let Ok(Some(order)) = store.find_by_id(order_id).await else {
                panic!("order vanished");
            };
            assert_eq!(order.status, OrderStatus::Completed);
        }
        assert_eq!(queue.stats().await.completed_total, 8);
    }

    #[tokio::test]
    async fn shutdown_with_empty_queue_is_prompt() {
        let store = Arc::new(MemoryOrderStore::new());
        let queue = Arc::new(MemoryJobQueue::new(QueueOptions::default()));
        let mut pool = make_pool(store, Arc::clone(&queue), 2);
        pool.start();

        let started = tokio::time::Instant::now();
        pool.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
