//! Error types for dispatch and execution.

use thiserror::Error;

use crate::problem::GemmProblem;

/// Errors raised while selecting and binding a solution.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The library holds no kernel for the problem on this hardware.
    #[error("no solution found for {problem} on {arch}")]
    NoSolution { problem: GemmProblem, arch: String },

    #[error("hardware query failed: {0}")]
    Hardware(String),
}

/// Errors raised by a kernel executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to load code objects for library '{library}': {reason}")]
    CodeObjectLoad { library: String, reason: String },

    #[error("kernel '{0}' not found in loaded code objects")]
    KernelNotFound(String),

    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// The problem addresses more elements of an operand than its buffer holds.
    #[error("operand {operand} needs {required} elements but its buffer holds {available}")]
    BufferTooSmall {
        operand: &'static str,
        required: usize,
        available: usize,
    },
}

/// Top-level error of a GEMM call.
#[derive(Debug, Error)]
pub enum GemmError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl GemmError {
    /// Whether the call failed only because no kernel matched.
    pub fn is_no_solution(&self) -> bool {
        matches!(self, GemmError::Dispatch(DispatchError::NoSolution { .. }))
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GemmError>;
