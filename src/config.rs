//! Dispatch configuration
//!
//! The configuration can be controlled via:
//! 1. Runtime construction (`DispatchConfig::with_library`, `debug`)
//! 2. Environment variables, read by `DispatchConfig::default()`:
//!    * `GEMM_DISPATCH_LIBRARY` selects the embedded solution library
//!    * `GEMM_DISPATCH_DEBUG=1` logs every dispatched problem
//!    * `GEMM_DISPATCH_CACHE_CAPACITY` bounds the memoized lookups

/// Name of the embedded library that ships with the crate
pub const DEFAULT_LIBRARY_NAME: &str = "gemm_dispatch_kernels";

pub const LIBRARY_ENV: &str = "GEMM_DISPATCH_LIBRARY";
pub const DEBUG_ENV: &str = "GEMM_DISPATCH_DEBUG";
pub const CACHE_CAPACITY_ENV: &str = "GEMM_DISPATCH_CACHE_CAPACITY";

/// Distinct `(problem, hardware)` lookups memoized before the cache stops growing
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Configuration of the process-wide GEMM runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Embedded solution library (and code objects) to load
    pub library_name: String,
    /// Log each dispatched problem and the chosen solution at `info` level
    pub debug_dispatch: bool,
    /// Memoized lookups kept by the process-wide library
    pub cache_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let library_name = std::env::var(LIBRARY_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LIBRARY_NAME.to_string());

        let debug_dispatch = std::env::var(DEBUG_ENV)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let cache_capacity = std::env::var(CACHE_CAPACITY_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_CACHE_CAPACITY);

        Self {
            library_name,
            debug_dispatch,
            cache_capacity,
        }
    }
}

impl DispatchConfig {
    /// Create a config that loads the named embedded library
    pub fn with_library(name: impl Into<String>) -> Self {
        Self {
            library_name: name.into(),
            ..Default::default()
        }
    }

    /// Enable dispatch logging
    pub fn debug(mut self) -> Self {
        self.debug_dispatch = true;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}
