//! Engine context: the worker pool and tuning cache shared by all operations
//!
//! An [`EngineContext`] wraps a fixed-size [`rayon::ThreadPool`] sized from
//! the detected topology. Workers are named `rsb-worker-N` and can be pinned
//! to cores on Linux. The context also owns the cache of autotuning
//! profiles, so profiles live exactly as long as the context.
//!
//! Shutdown is explicit and idempotent. Once shut down, every operation that
//! needs the pool fails with [`RsbError::ContextClosed`].
//!
//! For programs that want one process-wide context, [`lib_init`],
//! [`global_context`] and [`lib_exit`] manage a shared instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info};

use crate::constants::WORKER_THREAD_PREFIX;
use crate::error::{Result, RsbError};
use crate::matrix::config::SystemParameters;
use crate::tuning::{TuningKey, TuningProfile};

/// Configuration for [`EngineContext`]
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Number of worker threads. Defaults to the number of logical CPUs.
    pub n_threads: usize,
    /// Pin each worker to one core (best effort, Linux only)
    pub pin_threads: bool,
    /// Prefix for worker thread names
    pub name_prefix: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            n_threads: num_cpus::get().max(1),
            pin_threads: false,
            name_prefix: WORKER_THREAD_PREFIX.to_string(),
        }
    }
}

impl ContextConfig {
    /// Default configuration with a fixed number of workers
    pub fn with_threads(n_threads: usize) -> Self {
        Self {
            n_threads,
            ..Self::default()
        }
    }
}

/// Worker pool plus tuning cache
pub struct EngineContext {
    pool: RwLock<Option<rayon::ThreadPool>>,
    config: ContextConfig,
    system: SystemParameters,
    profiles: Mutex<HashMap<TuningKey, TuningProfile>>,
}

impl EngineContext {
    /// Creates a context and starts its workers
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a zero thread count, `ResourceExhausted` if the
    /// pool cannot be started.
    pub fn new(config: ContextConfig) -> Result<Self> {
        if config.n_threads == 0 {
            return Err(RsbError::invalid("context needs at least one worker thread"));
        }

        let system = SystemParameters {
            n_threads: config.n_threads,
            ..SystemParameters::default()
        };
        let prefix = config.name_prefix.clone();
        let pin = config.pin_threads;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .start_handler(move |idx| {
                if pin {
                    pin_thread_best_effort(idx);
                }
            })
            .build()
            .map_err(|e| RsbError::ResourceExhausted(format!("thread pool: {}", e)))?;

        info!(
            "engine context started: {} workers ({} physical cores, numa: {}, pinned: {})",
            config.n_threads, system.physical_cores, system.numa_available, pin
        );

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            config,
            system,
            profiles: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a context with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(ContextConfig::default())
    }

    /// The configuration this context was created with
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Host parameters detected at creation
    pub fn system(&self) -> &SystemParameters {
        &self.system
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.config.n_threads
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_closed(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Runs `op` inside the worker pool
    pub fn install<OP, R>(&self, op: OP) -> Result<R>
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        let guard = self
            .pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(pool) => Ok(pool.install(op)),
            None => Err(RsbError::ContextClosed),
        }
    }

    /// Stops the workers and drops every cached profile
    ///
    /// Calling it again has no effect.
    pub fn shutdown(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if pool.is_some() {
            self.lock_profiles().clear();
            info!("engine context shut down");
        }
    }

    fn lock_profiles(&self) -> MutexGuard<'_, HashMap<TuningKey, TuningProfile>> {
        self.profiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached profile for `key`, if one was stored
    pub fn cached_profile(&self, key: &TuningKey) -> Option<TuningProfile> {
        self.lock_profiles().get(key).cloned()
    }

    /// Stores the profile chosen for `key`, replacing any previous one
    pub fn store_profile(&self, key: TuningKey, profile: TuningProfile) {
        debug!("caching tuning profile {:?} -> {:?}", key, profile);
        self.lock_profiles().insert(key, profile);
    }

    /// Every cached profile
    pub fn profiles(&self) -> Vec<(TuningKey, TuningProfile)> {
        self.lock_profiles()
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect()
    }

    /// Forgets every cached profile
    pub fn clear_profiles(&self) {
        self.lock_profiles().clear();
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("n_threads", &self.config.n_threads)
            .field("name_prefix", &self.config.name_prefix)
            .field("numa_available", &self.system.numa_available)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Best-effort thread-to-core pinning via `sched_setaffinity` on Linux
fn pin_thread_best_effort(thread_index: usize) {
    #[cfg(target_os = "linux")]
    {
        let cpus = num_cpus::get().max(1);
        let core = thread_index % cpus;

        // SAFETY: we pass a correctly-sized cpu_set_t to sched_setaffinity
        // for the calling thread (tid 0).
        let rc = unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_SET(core, &mut set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if rc != 0 {
            log::warn!("could not pin worker {} to core {}", thread_index, core);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = thread_index;
    }
}

// ============================================================================
// PROCESS-WIDE CONTEXT
// ============================================================================

static GLOBAL: Mutex<Option<Arc<EngineContext>>> = Mutex::new(None);

fn lock_global() -> MutexGuard<'static, Option<Arc<EngineContext>>> {
    GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts the process-wide context, or returns it if already running
pub fn lib_init() -> Result<Arc<EngineContext>> {
    let mut global = lock_global();
    if let Some(ctx) = global.as_ref() {
        return Ok(Arc::clone(ctx));
    }
    let ctx = Arc::new(EngineContext::with_defaults()?);
    *global = Some(Arc::clone(&ctx));
    Ok(ctx)
}

/// The process-wide context
///
/// Fails with `ContextClosed` before [`lib_init`] or after [`lib_exit`].
pub fn global_context() -> Result<Arc<EngineContext>> {
    lock_global().as_ref().cloned().ok_or(RsbError::ContextClosed)
}

/// Shuts the process-wide context down; a no-op when none is running
///
/// Handles still holding the old context see `ContextClosed` afterwards.
pub fn lib_exit() {
    if let Some(ctx) = lock_global().take() {
        ctx.shutdown();
    }
}
