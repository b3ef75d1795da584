//! Solution lookup and buffer binding
//!
//! This module defines the narrow interfaces the dispatch layer consumes:
//! a [`SolutionLibrary`] that picks the best [`Solution`] for a problem on a
//! given [`Hardware`], and a [`HardwareService`] that reports the current
//! device. [`dispatch`] ties them together and produces a [`KernelSequence`]
//! ready for an executor.

pub mod library;

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, debug_span, instrument, warn};

use crate::error::DispatchError;
use crate::matrix::MatrixDescriptor;
use crate::problem::GemmProblem;

pub use library::{library, new_embedded_library, register_embedded_library, teardown_library};

/// Device pointer handed through to kernels without being dereferenced here
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePtr(pub *mut c_void);

// The dispatch layer never dereferences device pointers; validity and
// exclusive access are the caller's contract until the stream completes.
unsafe impl Send for DevicePtr {}
unsafe impl Sync for DevicePtr {}

impl DevicePtr {
    pub fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn as_f32(&self) -> *const f32 {
        self.0.cast_const().cast()
    }

    pub fn as_f32_mut(&self) -> *mut f32 {
        self.0.cast()
    }
}

/// Device the kernels will run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hardware {
    /// Processor identifier solutions are compiled for, e.g. `gfx90a`
    pub arch: String,
    pub name: String,
    pub compute_units: u32,
}

impl fmt::Display for Hardware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} CUs)", self.arch, self.name, self.compute_units)
    }
}

/// Reports the device of the calling thread
pub trait HardwareService: Send + Sync {
    fn current_hardware(&self) -> Result<Arc<Hardware>, DispatchError>;
}

/// Elements available behind each bound buffer, where known
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferExtents {
    pub a: Option<usize>,
    pub b: Option<usize>,
    pub c: Option<usize>,
    pub d: Option<usize>,
}

impl BufferExtents {
    /// Extents in `a, b, c, d` order, labelled by operand
    pub fn labelled(&self) -> [(&'static str, Option<usize>); 4] {
        [("a", self.a), ("b", self.b), ("c", self.c), ("d", self.d)]
    }
}

/// Operand buffers in library order (`a`, `b`, `c`)
#[derive(Debug, Clone, Copy)]
pub struct OperandBuffers {
    pub a: DevicePtr,
    pub b: DevicePtr,
    pub c: DevicePtr,
    /// `d` mirrors `c`; the output is read and written in place
    pub extents: BufferExtents,
}

impl OperandBuffers {
    /// Take the buffers of descriptors already in library order.
    pub fn from_descriptors(
        a: &MatrixDescriptor,
        b: &MatrixDescriptor,
        c: &MatrixDescriptor,
    ) -> Self {
        Self {
            a: DevicePtr(a.data),
            b: DevicePtr(b.data),
            c: DevicePtr(c.data),
            extents: BufferExtents {
                a: a.buffer_len(),
                b: b.buffer_len(),
                c: c.buffer_len(),
                d: c.buffer_len(),
            },
        }
    }
}

/// Buffers and scalars a solution is bound to
#[derive(Debug, Clone, Copy)]
pub struct ContractionInputs {
    pub a: DevicePtr,
    pub b: DevicePtr,
    pub c: DevicePtr,
    pub d: DevicePtr,
    pub alpha: f32,
    pub beta: f32,
    pub extents: BufferExtents,
}

impl ContractionInputs {
    /// Accumulate into the output: C and D share the output buffer and
    /// `alpha = beta = 1`.
    pub fn accumulate(operands: OperandBuffers) -> Self {
        Self {
            a: operands.a,
            b: operands.b,
            c: operands.c,
            d: operands.c,
            alpha: 1.0,
            beta: 1.0,
            extents: operands.extents,
        }
    }
}

/// Arguments of one kernel launch
#[derive(Debug, Clone, Copy)]
pub struct KernelArgs {
    pub problem: GemmProblem,
    pub inputs: ContractionInputs,
}

/// One ready-to-launch kernel
#[derive(Debug, Clone)]
pub struct KernelInvocation {
    pub kernel_name: String,
    pub workgroup_size: [u32; 3],
    pub num_workgroups: [u32; 3],
    pub args: KernelArgs,
}

/// Ordered kernels produced by binding a solution to buffers
#[derive(Debug, Clone, Default)]
pub struct KernelSequence {
    kernels: Vec<KernelInvocation>,
}

impl KernelSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kernel: KernelInvocation) {
        self.kernels.push(kernel);
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KernelInvocation> {
        self.kernels.iter()
    }
}

impl FromIterator<KernelInvocation> for KernelSequence {
    fn from_iter<I: IntoIterator<Item = KernelInvocation>>(iter: I) -> Self {
        Self {
            kernels: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for KernelSequence {
    type Item = KernelInvocation;
    type IntoIter = std::vec::IntoIter<KernelInvocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.kernels.into_iter()
    }
}

/// A concrete kernel implementation chosen for a problem
pub trait Solution: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Bind the solution to buffers, producing the kernels to launch.
    fn solve(
        &self,
        problem: &GemmProblem,
        inputs: &ContractionInputs,
        hardware: &Hardware,
    ) -> KernelSequence;
}

/// Lookup service over precompiled solutions
pub trait SolutionLibrary: Send + Sync {
    fn find_best_solution(
        &self,
        problem: &GemmProblem,
        hardware: &Hardware,
    ) -> Option<Arc<dyn Solution>>;
}

/// Select the best solution for `problem` and bind it to `operands`.
///
/// A missing solution is reported as [`DispatchError::NoSolution`] and no
/// kernels are produced.
#[instrument(skip_all, fields(
    op = "dispatch",
    m = problem.m,
    n = problem.n,
    k = problem.k,
    batch = problem.batch_multiplier(),
    transpose_a = problem.transpose_a,
    transpose_b = problem.transpose_b,
    arch = %hardware.arch
))]
pub fn dispatch(
    library: &dyn SolutionLibrary,
    problem: &GemmProblem,
    hardware: &Hardware,
    operands: OperandBuffers,
) -> Result<KernelSequence, DispatchError> {
    let solution = debug_span!("FindBestSolution")
        .in_scope(|| library.find_best_solution(problem, hardware));

    let Some(solution) = solution else {
        warn!(%problem, arch = %hardware.arch, "No solution found.");
        return Err(DispatchError::NoSolution {
            problem: *problem,
            arch: hardware.arch.clone(),
        });
    };

    let inputs = ContractionInputs::accumulate(operands);
    let kernels = debug_span!("Solve", solution = solution.name())
        .in_scope(|| solution.solve(problem, &inputs, hardware));

    debug!(
        solution = solution.name(),
        kernels = kernels.len(),
        "bound solution"
    );
    Ok(kernels)
}
