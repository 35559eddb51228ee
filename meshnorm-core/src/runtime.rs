//! Worker pool configuration for parallel annotation.
//!
//! Publications are independent, so a batch can be spread over a rayon
//! pool. Workers share the hierarchy cache and the vocabulary snapshot;
//! neither needs a lock on the read path once warm.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::info;

/// Thread ID counter for naming workers
static WORKER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Configuration for the annotation worker pool.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads (default: number of CPU cores)
    pub worker_threads: usize,
    /// Thread stack size in bytes (default: 2MB)
    pub thread_stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus(),
            thread_stack_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl RuntimeConfig {
    /// Pool of exactly `worker_threads` workers.
    pub fn with_workers(worker_threads: usize) -> Self {
        Self {
            worker_threads: worker_threads.max(1),
            ..Default::default()
        }
    }
}

/// Returns the number of available CPU cores.
#[inline]
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Build the annotation worker pool.
///
/// # Example
///
/// ```
/// use meshnorm_core::runtime::{build_pool, RuntimeConfig};
///
/// let pool = build_pool(RuntimeConfig::with_workers(2)).expect("pool build failed");
/// assert_eq!(pool.current_num_threads(), 2);
/// ```
pub fn build_pool(config: RuntimeConfig) -> Result<ThreadPool, ThreadPoolBuildError> {
    info!(
        worker_threads = config.worker_threads,
        stack_size = config.thread_stack_size,
        "Building annotation pool"
    );

    ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .stack_size(config.thread_stack_size)
        .thread_name(|_| {
            let id = WORKER_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("meshnorm-worker-{}", id)
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(config.worker_threads >= 1);
        assert_eq!(config.thread_stack_size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_with_workers_floor() {
        assert_eq!(RuntimeConfig::with_workers(0).worker_threads, 1);
    }

    #[test]
    fn test_pool_builds() {
        let pool = build_pool(RuntimeConfig::with_workers(2)).expect("pool should build");
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("meshnorm-worker-"));
    }
}
