//! Thread pool management for the parallel reconstruction stages
//!
//! Voxel evaluation and per-leaf loop extraction run through [`parallel_map`],
//! which uses the configured pool or falls back to sequential iteration when
//! parallelism is disabled or the input is small.

use floatscale_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

static GLOBAL_THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<ThreadPoolConfig> = Mutex::new(ThreadPoolConfig::new());

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per available core)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this are processed sequentially
    pub min_parallel_len: usize,
}

impl ThreadPoolConfig {
    const fn new() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: String::new(),
            enabled: true,
            min_parallel_len: 64,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the input length below which work stays on the calling thread
    pub fn with_min_parallel_len(mut self, len: usize) -> Self {
        self.min_parallel_len = len;
        self
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "floatscale".to_string(),
            ..Self::new()
        }
    }
}

/// Initialize the global thread pool with custom configuration.
///
/// Only the first successful call builds a pool; later calls update the
/// `enabled` flag and chunking threshold but keep the existing threads.
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if config.num_threads == Some(0) {
        return Err(Error::InvalidConfiguration(
            "thread count must be at least 1".to_string(),
        ));
    }

    if GLOBAL_THREAD_POOL.get().is_none() {
        let mut builder = ThreadPoolBuilder::new();
        let num_threads = config.num_threads.unwrap_or_else(default_num_threads);
        builder = builder.num_threads(num_threads);

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        if !config.thread_name_prefix.is_empty() {
            let prefix = config.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }

        let pool = builder.build().map_err(|e| {
            Error::InvalidConfiguration(format!("Failed to create thread pool: {}", e))
        })?;
        debug!("Created thread pool with {} threads", pool.current_num_threads());
        // A concurrent initializer may have won the race; either pool is fine.
        let _ = GLOBAL_THREAD_POOL.set(pool);
    }

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = config;
    }

    Ok(())
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .map(|config| config.clone())
        .unwrap_or_default()
}

/// Execute a parallel operation with the configured pool, or rayon's global
/// pool when none was initialized
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match GLOBAL_THREAD_POOL.get() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Parallel map preserving input order
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    let config = get_config();
    if !config.enabled || data.len() < config.min_parallel_len {
        return data.iter().map(f).collect();
    }

    execute_parallel(|| data.par_iter().map(f).collect())
}
