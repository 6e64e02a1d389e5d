//! Worker layer: the bounded consumer pool that drains the job queue.

pub mod pool;

pub use pool::{WorkerPool, WorkerPoolConfig};
