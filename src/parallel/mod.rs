//! Parallel execution support
//!
//! Runs lowering (one item per function) and fence analysis (one item per
//! program module) on a bounded worker pool.

mod executor;

pub use executor::{run_parallel_task, ParallelConfig};
