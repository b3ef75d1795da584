//! Stride-inferred GEMM dispatch
//!
//! This library turns three layout-agnostic matrix descriptors into a
//! canonical GEMM problem, looks up the best kernel solution for it on the
//! current hardware, and launches the bound kernels on the caller's stream.
//! A host backend implements the hardware, library and executor interfaces
//! on the CPU.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod ffi;
pub mod host;
pub mod matrix;
pub mod problem;
pub mod runtime;

// Re-export commonly used types for convenience
pub use config::DispatchConfig;
pub use dispatch::{library, teardown_library, Hardware, KernelSequence, Solution, SolutionLibrary};
pub use error::{DispatchError, ExecutorError, GemmError};
pub use host::HostStream;
pub use matrix::{Batch, MatrixDescriptor};
pub use problem::{build_problem, canonicalize_operand_order, GemmProblem};
pub use runtime::{gemm, GemmRuntime, Status};
