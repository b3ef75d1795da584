//! Host reference backend
//!
//! Implements the hardware, solution-library and executor interfaces on the
//! CPU so the dispatch pipeline runs end to end without a GPU:
//!
//! | Interface          | Host implementation |
//! |--------------------|---------------------|
//! | `HardwareService`  | [`HostHardware`]    |
//! | `SolutionLibrary`  | [`HostLibrary`]     |
//! | `KernelExecutor`   | [`HostExecutor`]    |
//! | stream             | [`HostStream`]      |

pub mod executor;
pub mod hardware;
pub(crate) mod kernels;
pub mod library;
pub mod stream;

pub use executor::HostExecutor;
pub use hardware::HostHardware;
pub use library::{HostLibrary, HostSolution};
pub use stream::HostStream;

/// Processor identifier reported by the host hardware service
pub const HOST_ARCH: &str = "host";
