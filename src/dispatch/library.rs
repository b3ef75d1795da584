//! Process-wide solution library
//!
//! Libraries are embedded in the binary and looked up by name. The first
//! call to [`library`] instantiates the configured one exactly once; every
//! later call, from any thread, reuses it. Lookups are memoized per
//! `(problem, hardware)` until [`teardown_library`] releases them. The memo
//! holds at most `cache_capacity` entries; once full, new lookups go to the
//! underlying library every time and existing entries keep hitting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use tracing::{debug, debug_span, info, warn};

use super::{Hardware, Solution, SolutionLibrary};
use crate::config::{DispatchConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_LIBRARY_NAME};
use crate::host::library::HostLibrary;
use crate::problem::GemmProblem;

/// Constructor of an embedded library
pub type LibraryFactory = fn() -> Arc<dyn SolutionLibrary>;

fn host_library() -> Arc<dyn SolutionLibrary> {
    Arc::new(HostLibrary::new())
}

fn registry() -> &'static RwLock<HashMap<String, LibraryFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, LibraryFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, LibraryFactory> = HashMap::new();
        map.insert(DEFAULT_LIBRARY_NAME.to_string(), host_library as LibraryFactory);
        RwLock::new(map)
    })
}

/// Make a library available under `name`, replacing any previous entry.
///
/// Only affects [`library`] if called before its first use.
pub fn register_embedded_library(name: impl Into<String>, factory: LibraryFactory) {
    let name = name.into();
    debug!(library = %name, "registering embedded library");
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, factory);
}

/// Instantiate the embedded library registered under `name`.
pub fn new_embedded_library(name: &str) -> Option<Arc<dyn SolutionLibrary>> {
    let factory = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .copied();
    factory.map(|make| make())
}

/// Library that never finds a solution
struct EmptyLibrary;

impl SolutionLibrary for EmptyLibrary {
    fn find_best_solution(
        &self,
        _problem: &GemmProblem,
        _hardware: &Hardware,
    ) -> Option<Arc<dyn Solution>> {
        None
    }
}

type CacheKey = (GemmProblem, String);

/// Memoizing wrapper around an embedded library
pub struct CachedLibrary {
    name: String,
    inner: Arc<dyn SolutionLibrary>,
    cache: Mutex<HashMap<CacheKey, Option<Arc<dyn Solution>>>>,
    capacity: usize,
    torn_down: AtomicBool,
}

impl CachedLibrary {
    pub fn new(name: impl Into<String>, inner: Arc<dyn SolutionLibrary>) -> Self {
        Self::with_capacity(name, inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Memoize at most `capacity` lookups.
    pub fn with_capacity(
        name: impl Into<String>,
        inner: Arc<dyn SolutionLibrary>,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            cache: Mutex::new(HashMap::new()),
            capacity,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Instantiate the library named in `config`.
    ///
    /// An unknown name yields a library on which every lookup misses.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let inner = new_embedded_library(&config.library_name).unwrap_or_else(|| {
            warn!(
                library = %config.library_name,
                "embedded library not found; every lookup will report no solution"
            );
            Arc::new(EmptyLibrary)
        });
        Self::with_capacity(config.library_name.clone(), inner, config.cache_capacity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of memoized lookups, hits and misses alike
    pub fn cached_lookups(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Drop every memoized lookup.
    pub fn teardown(&self) {
        let released = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            let released = cache.len();
            cache.clear();
            released
        };
        self.torn_down.store(true, Ordering::Release);
        info!(library = %self.name, released, "solution library torn down");
    }
}

impl SolutionLibrary for CachedLibrary {
    fn find_best_solution(
        &self,
        problem: &GemmProblem,
        hardware: &Hardware,
    ) -> Option<Arc<dyn Solution>> {
        let key = (*problem, hardware.arch.clone());
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }

        let found = self.inner.find_best_solution(problem, hardware);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.len() < self.capacity {
            cache.insert(key, found.clone());
        } else {
            debug!(
                library = %self.name,
                capacity = self.capacity,
                "lookup cache full; not memoizing"
            );
        }
        found
    }
}

static LIBRARY: OnceLock<Arc<CachedLibrary>> = OnceLock::new();

/// The process-wide library, created from the environment on first use.
pub fn library() -> Arc<CachedLibrary> {
    init_library(&DispatchConfig::default())
}

/// The process-wide library, created from `config` if this is the first use.
///
/// Later calls return the existing instance regardless of `config`.
pub fn init_library(config: &DispatchConfig) -> Arc<CachedLibrary> {
    LIBRARY
        .get_or_init(|| {
            debug_span!("InitializeSolutionLibrary", library = %config.library_name)
                .in_scope(|| Arc::new(CachedLibrary::from_config(config)))
        })
        .clone()
}

/// Process-exit hook releasing the library's memoized solutions.
///
/// Does nothing if the library was never created.
pub fn teardown_library() {
    if let Some(library) = LIBRARY.get() {
        library.teardown();
    }
}
