//! GEMM entry point
//!
//! [`GemmRuntime`] wires a solution library, a hardware service and an
//! executor together. The process-wide host runtime behind [`gemm`] uses the
//! lazily created global library and the host backend.

use std::sync::{Arc, OnceLock};

use tracing::{info, instrument};

use crate::config::DispatchConfig;
use crate::dispatch::library::init_library;
use crate::dispatch::{dispatch, HardwareService, OperandBuffers, SolutionLibrary};
use crate::error::Result;
use crate::executor::{execute, KernelExecutor};
use crate::host::{HostExecutor, HostHardware, HostStream};
use crate::matrix::MatrixDescriptor;
use crate::problem::{build_problem, canonicalize_operand_order};

/// Outcome of a GEMM call
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success = 0,
    /// No kernel matches the problem on the current hardware; nothing was enqueued
    NoSolution = 1,
}

/// Dereference an operand that must be present.
///
/// # Panics
/// If `operand` is `None`. A missing operand is a caller bug, not a runtime
/// condition.
pub fn deref_or_fail<'a, T: ?Sized>(operand: Option<&'a T>, what: &str) -> &'a T {
    match operand {
        Some(value) => value,
        None => panic!("Dereference null pointer: {what}"),
    }
}

/// Dispatches GEMM calls through one library, hardware service and executor
pub struct GemmRuntime<E: KernelExecutor> {
    library: Arc<dyn SolutionLibrary>,
    hardware: Arc<dyn HardwareService>,
    executor: E,
    config: DispatchConfig,
}

impl<E: KernelExecutor> GemmRuntime<E> {
    pub fn new(
        library: Arc<dyn SolutionLibrary>,
        hardware: Arc<dyn HardwareService>,
        executor: E,
        config: DispatchConfig,
    ) -> Self {
        Self {
            library,
            hardware,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Enqueue `output += left * right` on `stream`.
    ///
    /// # Safety
    /// See [`GemmRuntime::try_gemm`].
    ///
    /// # Panics
    /// If any descriptor is `None`, or if the hardware service or executor
    /// fails. Use [`GemmRuntime::try_gemm`] to receive those failures as
    /// values.
    pub unsafe fn gemm(
        &self,
        stream: &E::Stream,
        left: Option<&MatrixDescriptor>,
        right: Option<&MatrixDescriptor>,
        output: Option<&MatrixDescriptor>,
    ) -> Status {
        // SAFETY: forwarded from the caller
        match unsafe { self.try_gemm(stream, left, right, output) } {
            Ok(()) => Status::Success,
            Err(e) if e.is_no_solution() => Status::NoSolution,
            Err(e) => panic!("gemm failed: {e}"),
        }
    }

    /// Like [`GemmRuntime::gemm`], returning every failure other than a
    /// missing descriptor as an error.
    ///
    /// # Safety
    /// Each descriptor's `data` must be valid for every element the problem
    /// built from the three descriptors addresses, and must not be freed or
    /// accessed elsewhere until `stream` has run the enqueued kernels. A
    /// descriptor's `len`, when known, must not overstate its buffer; the
    /// host backend then refuses problems that would address past it.
    ///
    /// # Panics
    /// If any descriptor is `None`.
    #[instrument(skip_all, fields(op = "gemm", library = %self.config.library_name))]
    pub unsafe fn try_gemm(
        &self,
        stream: &E::Stream,
        left: Option<&MatrixDescriptor>,
        right: Option<&MatrixDescriptor>,
        output: Option<&MatrixDescriptor>,
    ) -> Result<()> {
        let left = deref_or_fail(left, "left matrix descriptor");
        let right = deref_or_fail(right, "right matrix descriptor");
        let output = deref_or_fail(output, "output matrix descriptor");

        let (a, b, c) = canonicalize_operand_order(left, right, output);
        let problem = build_problem(a, b, c);
        let hardware = self.hardware.current_hardware()?;

        let kernels = dispatch(
            &*self.library,
            &problem,
            &hardware,
            OperandBuffers::from_descriptors(a, b, c),
        )?;

        if self.config.debug_dispatch {
            info!(
                %problem,
                %hardware,
                kernels = kernels.len(),
                "[GEMM] dispatch"
            );
        }

        // SAFETY: the buffers bound in `kernels` are the caller's descriptors
        unsafe { execute(&self.executor, &self.config.library_name, kernels, stream) }?;
        Ok(())
    }
}

/// The process-wide host runtime, configured from the environment on first use.
pub fn host_runtime() -> &'static GemmRuntime<HostExecutor> {
    static RUNTIME: OnceLock<GemmRuntime<HostExecutor>> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        let config = DispatchConfig::default();
        let library = init_library(&config);
        GemmRuntime::new(library, Arc::new(HostHardware), HostExecutor::new(), config)
    })
}

/// Enqueue `output += left * right` on a host stream using the process-wide
/// runtime.
///
/// # Safety
/// See [`GemmRuntime::try_gemm`].
///
/// # Panics
/// See [`GemmRuntime::gemm`].
pub unsafe fn gemm(
    stream: &HostStream,
    left: Option<&MatrixDescriptor>,
    right: Option<&MatrixDescriptor>,
    output: Option<&MatrixDescriptor>,
) -> Status {
    // SAFETY: forwarded from the caller
    unsafe { host_runtime().gemm(stream, left, right, output) }
}
