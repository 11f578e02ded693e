//! Parallel task executor for per-function and per-module work
//!
//! Uses a Rayon pool with a configurable thread limit. Work items are pulled
//! from one shared iterator behind a lock; each worker thread builds its own
//! worker state (visitor, analyzer) and touches nothing else that is shared.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Configuration for parallel execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum number of worker threads (default: num_cpus)
    pub max_parallelism: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get(),
        }
    }
}

impl ParallelConfig {
    /// Run everything on the calling thread
    pub fn sequential() -> Self {
        Self { max_parallelism: 1 }
    }
}

/// Run `work` over every item on a pool of `min(max_parallelism, items)`
/// workers
///
/// # Arguments
/// * `items` - Work items, e.g. one per function or per program module
/// * `config` - Thread limit
/// * `make_worker` - Builds the per-thread worker state
/// * `work` - Processes one item with the calling thread's worker
///
/// # Returns
/// Results in item order, or `Err(Error::ThreadPool)` if the pool could not
/// be created.
///
/// # Example
/// ```ignore
/// let sizes = run_parallel_task(
///     bodies,
///     &ParallelConfig::default(),
///     || (),
///     |_, body| body.node_count(),
/// )?;
/// ```
pub fn run_parallel_task<I, W, R, M, F>(
    items: Vec<I>,
    config: &ParallelConfig,
    make_worker: M,
    work: F,
) -> Result<Vec<R>>
where
    I: Send,
    R: Send,
    M: Fn() -> W + Sync,
    F: Fn(&mut W, I) -> R + Sync,
{
    // Empty fast path
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let threads = config.max_parallelism.max(1).min(total);

    // Single worker - no pool needed
    if threads == 1 {
        let mut worker = make_worker();
        return Ok(items
            .into_iter()
            .map(|item| work(&mut worker, item))
            .collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::ThreadPool(format!("Failed to create thread pool: {}", e)))?;

    let queue = Mutex::new(items.into_iter().enumerate());
    let results = Mutex::new(Vec::with_capacity(total));

    pool.scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|_| {
                let mut worker = make_worker();
                loop {
                    let next = queue.lock().next();
                    let Some((index, item)) = next else {
                        break;
                    };
                    let result = work(&mut worker, item);
                    results.lock().push((index, result));
                }
            });
        }
    });

    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_keep_item_order() {
        let items: Vec<u64> = (0..64).collect();
        let config = ParallelConfig { max_parallelism: 4 };
        let results = run_parallel_task(items, &config, || 0u64, |seen, n| {
            *seen += 1;
            n * 2
        })
        .unwrap();
        assert_eq!(results.len(), 64);
        assert_eq!(results[10], 20);
        assert_eq!(results[63], 126);
    }

    #[test]
    fn test_empty() {
        let results: Vec<u8> =
            run_parallel_task(Vec::<u8>::new(), &ParallelConfig::default(), || (), |_, n| n)
                .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_one_worker_per_thread() {
        let built = AtomicUsize::new(0);
        let config = ParallelConfig { max_parallelism: 3 };
        run_parallel_task(
            vec![1, 2],
            &config,
            || {
                built.fetch_add(1, Ordering::SeqCst);
            },
            |_, n: i32| n,
        )
        .unwrap();
        // capped by the number of items
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sequential() {
        let results =
            run_parallel_task(vec!["a", "b"], &ParallelConfig::sequential(), || (), |_, s| {
                s.len()
            })
            .unwrap();
        assert_eq!(results, vec![1, 1]);
    }
}
