//! Execution layer: the per-order pipeline state machine.

pub mod orchestrator;

pub use orchestrator::{JobDisposition, Orchestrator};
