use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use super::kernels;
use super::library::{embedded_code_object, HostCodeObject};
use super::stream::HostStream;
use crate::config::DEFAULT_LIBRARY_NAME;
use crate::dispatch::{KernelArgs, KernelInvocation, KernelSequence};
use crate::error::ExecutorError;
use crate::executor::KernelExecutor;

/// Runs kernel sequences on [`HostStream`]s
#[derive(Debug, Default)]
pub struct HostExecutor {
    loaded: Mutex<HashMap<String, Arc<HostCodeObject>>>,
}

impl HostExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, library: &str) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(library)
    }

    fn resolve(&self, kernel_name: &str) -> Option<[usize; 2]> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find_map(|code| code.get(kernel_name).copied())
    }
}

impl KernelExecutor for HostExecutor {
    type Stream = HostStream;

    fn load_embedded_code_objects(&self, library: &str) -> Result<(), ExecutorError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if loaded.contains_key(library) {
            return Ok(());
        }
        if library != DEFAULT_LIBRARY_NAME {
            return Err(ExecutorError::CodeObjectLoad {
                library: library.to_string(),
                reason: "no code objects embedded under this name".to_string(),
            });
        }

        let code = embedded_code_object();
        info!(library, kernels = code.len(), "loaded embedded code objects");
        loaded.insert(library.to_string(), Arc::new(code));
        Ok(())
    }

    unsafe fn launch_kernels(
        &self,
        kernels: KernelSequence,
        stream: &HostStream,
    ) -> Result<(), ExecutorError> {
        // Validate everything first so a bad sequence enqueues nothing
        let resolved = kernels
            .into_iter()
            .map(|launch| {
                let tile = match self.resolve(&launch.kernel_name) {
                    Some(tile) => tile,
                    None => return Err(ExecutorError::KernelNotFound(launch.kernel_name.clone())),
                };
                check_grid(&launch)?;
                check_extents(&launch.args)?;
                Ok((launch, tile))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (launch, tile) in resolved {
            debug!(
                kernel = %launch.kernel_name,
                grid = ?launch.num_workgroups,
                block = ?launch.workgroup_size,
                "enqueue host kernel"
            );
            let args = launch.args;
            stream.enqueue(Box::new(move || {
                // SAFETY: known extents were checked above; the caller keeps
                // the bound buffers valid and unaliased until the stream has
                // run this kernel.
                unsafe { kernels::gemm_strided(&args, tile) }
            }));
        }
        Ok(())
    }
}

/// The launch grid must cover M, N and the batch.
fn check_grid(launch: &KernelInvocation) -> Result<(), ExecutorError> {
    let problem = &launch.args.problem;
    let required = [problem.m, problem.n, problem.batch_multiplier()];
    for (axis, required) in required.into_iter().enumerate() {
        let covered =
            u64::from(launch.num_workgroups[axis]) * u64::from(launch.workgroup_size[axis]);
        if covered < required as u64 {
            return Err(ExecutorError::Launch(format!(
                "{}: grid {:?} of {:?} covers {covered} along axis {axis}, problem needs {required}",
                launch.kernel_name, launch.num_workgroups, launch.workgroup_size
            )));
        }
    }
    Ok(())
}

/// Every buffer of known length must hold what the problem addresses.
fn check_extents(args: &KernelArgs) -> Result<(), ExecutorError> {
    let addressed = args.problem.addressed_extents();
    for ((operand, available), required) in args.inputs.extents.labelled().into_iter().zip(addressed) {
        if let Some(available) = available {
            if required > available {
                return Err(ExecutorError::BufferTooSmall {
                    operand,
                    required,
                    available,
                });
            }
        }
    }
    Ok(())
}
