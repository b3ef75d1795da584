//! Kernel execution adapter
//!
//! An executor owns the loaded code objects of a kernel library and enqueues
//! kernel sequences on a stream of its own type. Launching is fire-and-forget:
//! no completion event or status callback is recorded here.

use tracing::{debug_span, instrument};

use crate::dispatch::KernelSequence;
use crate::error::ExecutorError;

/// Loads code objects and launches kernels on a stream
pub trait KernelExecutor: Send + Sync {
    /// Stream type the executor enqueues work on
    type Stream: ?Sized;

    /// Make the code objects embedded for `library` launchable.
    ///
    /// Must be idempotent; repeated calls for a loaded library are cheap.
    fn load_embedded_code_objects(&self, library: &str) -> Result<(), ExecutorError>;

    /// Enqueue `kernels` in order on `stream`.
    ///
    /// # Safety
    /// Every buffer bound in `kernels` must be valid for the elements its
    /// problem addresses, and must not be freed or accessed elsewhere until
    /// `stream` has run the kernels. Known buffer extents must not overstate
    /// the allocation.
    unsafe fn launch_kernels(
        &self,
        kernels: KernelSequence,
        stream: &Self::Stream,
    ) -> Result<(), ExecutorError>;
}

/// Ensure `library`'s code objects are loaded, then launch `kernels` on `stream`.
///
/// # Safety
/// Same contract as [`KernelExecutor::launch_kernels`].
#[instrument(skip_all, fields(op = "execute", library = %library, kernels = kernels.len()))]
pub unsafe fn execute<E: KernelExecutor + ?Sized>(
    executor: &E,
    library: &str,
    kernels: KernelSequence,
    stream: &E::Stream,
) -> Result<(), ExecutorError> {
    debug_span!("LoadCodeObjects").in_scope(|| executor.load_embedded_code_objects(library))?;
    // SAFETY: forwarded from the caller
    debug_span!("LaunchKernels").in_scope(|| unsafe { executor.launch_kernels(kernels, stream) })
}
