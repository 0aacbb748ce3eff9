//! Runtime limits and the bounded worker pool
//!
//! Two knobs bound resource use on a shared machine:
//! - `parallelism`: concurrent worker threads (one in-flight sample each)
//! - `simulator_threads`: internal thread count the simulator may use
//!   (linear-algebra pools and similar)
//!
//! Both live in one immutable [`RuntimeLimits`] value. It is applied once,
//! when the [`WorkerPool`] is built; the parent process environment is never
//! touched.
//!
//! Toyota Way: Heijunka (Load Balancing) - `parallelism * simulator_threads`
//! never exceeds what the operator asked for.

use rayon::prelude::*;

use crate::{Error, Result};

/// Environment variables that cap common numeric thread pools
pub const THREAD_CAP_VARS: [&str; 3] = ["OMP_NUM_THREADS", "OPENBLAS_NUM_THREADS", "MKL_NUM_THREADS"];

/// Immutable process-wide resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    parallelism: usize,
    simulator_threads: usize,
}

impl RuntimeLimits {
    /// Create limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either value is zero.
    pub fn new(parallelism: usize, simulator_threads: usize) -> Result<Self> {
        if parallelism == 0 {
            return Err(Error::InvalidConfig("parallelism must be >= 1".to_string()));
        }
        if simulator_threads == 0 {
            return Err(Error::InvalidConfig(
                "simulator_threads must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            parallelism,
            simulator_threads,
        })
    }

    /// Concurrent worker count.
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Simulator-internal thread cap.
    #[must_use]
    pub const fn simulator_threads(&self) -> usize {
        self.simulator_threads
    }

    /// Environment to set on simulator child processes.
    #[must_use]
    pub fn thread_env(&self) -> Vec<(&'static str, String)> {
        THREAD_CAP_VARS
            .iter()
            .map(|&var| (var, self.simulator_threads.to_string()))
            .collect()
    }
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            parallelism: 1,
            simulator_threads: 1,
        }
    }
}

/// Rayon pool bounded to `parallelism` threads.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    limits: RuntimeLimits,
}

impl WorkerPool {
    /// Build the pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the OS refuses to start the threads.
    pub fn new(limits: RuntimeLimits) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limits.parallelism())
            .thread_name(|i| format!("sweep-worker-{i}"))
            .build()
            .map_err(|e| Error::Other(format!("failed to build worker pool: {e}")))?;
        tracing::debug!(
            parallelism = limits.parallelism(),
            simulator_threads = limits.simulator_threads(),
            "worker pool started"
        );
        Ok(Self { pool, limits })
    }

    /// Limits the pool was built with.
    #[must_use]
    pub const fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    /// Apply `f` to every item on the pool and block until all return.
    ///
    /// Output position `i` always holds `f(&items[i])`, whatever the order in
    /// which workers finish.
    pub fn map_ordered<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}
