//! Embedded host solution library
//!
//! Solutions are ranked; the best one whose predicates accept the problem and
//! hardware wins. Kernel names follow the usual contraction naming scheme,
//! e.g. `Cijk_Ailk_Bljk_SB_MT16x16`, so the executor can resolve them in the
//! code objects embedded alongside the library.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::HOST_ARCH;
use crate::dispatch::{
    ContractionInputs, Hardware, KernelArgs, KernelInvocation, KernelSequence, Solution,
    SolutionLibrary,
};
use crate::problem::{DataType, GemmProblem, TypeSet};

/// Kernel name for a problem shape class and macro tile.
pub fn kernel_name(transpose_a: bool, transpose_b: bool, batched: bool, tile: [usize; 2]) -> String {
    let a = if transpose_a { "Alik" } else { "Ailk" };
    let b = if transpose_b { "Bjlk" } else { "Bljk" };
    let batch = if batched { "B" } else { "" };
    format!(
        "Cijk_{a}_{b}_{}{batch}_MT{}x{}",
        DataType::Float.abbrev(),
        tile[0],
        tile[1]
    )
}

/// One precompiled host solution
#[derive(Debug, Clone)]
pub struct HostSolution {
    name: String,
    tile: [usize; 2],
    /// Smallest M and N the solution accepts
    min_size: usize,
    rank: u32,
}

impl HostSolution {
    pub fn new(name: impl Into<String>, tile: [usize; 2], min_size: usize, rank: u32) -> Self {
        Self {
            name: name.into(),
            tile,
            min_size,
            rank,
        }
    }

    pub fn tile(&self) -> [usize; 2] {
        self.tile
    }

    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Whether the solution can run `problem` on `hardware`.
    pub fn matches(&self, problem: &GemmProblem, hardware: &Hardware) -> bool {
        hardware.arch == HOST_ARCH
            && problem.types == TypeSet::uniform(DataType::Float)
            && problem.m >= self.min_size
            && problem.n >= self.min_size
    }
}

impl Solution for HostSolution {
    fn name(&self) -> &str {
        &self.name
    }

    fn solve(
        &self,
        problem: &GemmProblem,
        inputs: &ContractionInputs,
        _hardware: &Hardware,
    ) -> KernelSequence {
        let [tile_m, tile_n] = self.tile;
        // Saturated dimensions no longer cover the problem and are refused at launch
        let dim = |x: usize| u32::try_from(x).unwrap_or(u32::MAX);
        let groups = |extent: usize, tile: usize| dim(extent.div_ceil(tile.max(1)).max(1));

        std::iter::once(KernelInvocation {
            kernel_name: kernel_name(
                problem.transpose_a,
                problem.transpose_b,
                problem.is_batched(),
                self.tile,
            ),
            workgroup_size: [dim(tile_m), dim(tile_n), 1],
            num_workgroups: [
                groups(problem.m, tile_m),
                groups(problem.n, tile_n),
                dim(problem.batch_multiplier()),
            ],
            args: KernelArgs {
                problem: *problem,
                inputs: *inputs,
            },
        })
        .collect()
    }
}

/// Solution library shipped with the crate
pub struct HostLibrary {
    solutions: Vec<Arc<HostSolution>>,
}

impl HostLibrary {
    /// Macro tiles of the embedded solutions
    pub const TILES: [[usize; 2]; 2] = [[1, 1], [16, 16]];

    pub fn new() -> Self {
        Self::with_solutions(vec![
            HostSolution::new("host_sgemm_naive", [1, 1], 0, 0),
            HostSolution::new("host_sgemm_tiled_16x16", [16, 16], 16, 10),
        ])
    }

    pub fn with_solutions(solutions: Vec<HostSolution>) -> Self {
        Self {
            solutions: solutions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn solutions(&self) -> &[Arc<HostSolution>] {
        &self.solutions
    }
}

impl Default for HostLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SolutionLibrary for HostLibrary {
    fn find_best_solution(
        &self,
        problem: &GemmProblem,
        hardware: &Hardware,
    ) -> Option<Arc<dyn Solution>> {
        let best = self
            .solutions
            .iter()
            .filter(|s| s.matches(problem, hardware))
            .max_by_key(|s| s.rank)?;
        debug!(solution = %best.name, rank = best.rank, "selected host solution");
        Some(best.clone() as Arc<dyn Solution>)
    }
}

/// Host code object: kernel name to macro tile
pub type HostCodeObject = HashMap<String, [usize; 2]>;

/// Code objects embedded for the host library, one kernel per shape class
/// and tile.
pub fn embedded_code_object() -> HostCodeObject {
    let mut kernels = HashMap::new();
    for tile in HostLibrary::TILES {
        for transpose_a in [false, true] {
            for transpose_b in [false, true] {
                for batched in [false, true] {
                    kernels.insert(kernel_name(transpose_a, transpose_b, batched, tile), tile);
                }
            }
        }
    }
    kernels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DevicePtr;
    use crate::matrix::MatrixDescriptor;
    use crate::problem::build_problem;

    fn host() -> Hardware {
        Hardware {
            arch: HOST_ARCH.to_string(),
            name: "cpu".to_string(),
            compute_units: 4,
        }
    }

    fn square(n: usize) -> GemmProblem {
        let d = MatrixDescriptor::new([n, n], [n, 1], std::ptr::null_mut());
        build_problem(&d, &d, &d)
    }

    fn inputs() -> ContractionInputs {
        ContractionInputs {
            a: DevicePtr::null(),
            b: DevicePtr::null(),
            c: DevicePtr::null(),
            d: DevicePtr::null(),
            alpha: 1.0,
            beta: 1.0,
            extents: Default::default(),
        }
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(kernel_name(false, false, false, [1, 1]), "Cijk_Ailk_Bljk_S_MT1x1");
        assert_eq!(kernel_name(true, true, true, [16, 16]), "Cijk_Alik_Bjlk_SB_MT16x16");
    }

    #[test]
    fn test_small_problem_selects_naive() {
        let lib = HostLibrary::new();
        let s = lib.find_best_solution(&square(4), &host()).unwrap();
        assert_eq!(s.name(), "host_sgemm_naive");
    }

    #[test]
    fn test_large_problem_selects_tiled() {
        let lib = HostLibrary::new();
        let s = lib.find_best_solution(&square(32), &host()).unwrap();
        assert_eq!(s.name(), "host_sgemm_tiled_16x16");
    }

    #[test]
    fn test_other_hardware_has_no_solution() {
        let lib = HostLibrary::new();
        let gpu = Hardware {
            arch: "gfx90a".to_string(),
            name: "MI210".to_string(),
            compute_units: 104,
        };
        assert!(lib.find_best_solution(&square(32), &gpu).is_none());
    }

    #[test]
    fn test_solve_emits_one_launch() {
        let solution = HostSolution::new("tiled", [16, 16], 16, 1);
        let d = MatrixDescriptor::new([40, 40], [40, 1], std::ptr::null_mut()).with_batch(3, 1600);
        let problem = build_problem(&d, &d, &d);

        let seq = solution.solve(&problem, &inputs(), &host());
        assert_eq!(seq.len(), 1);
        let launch = seq.iter().next().unwrap();
        assert_eq!(launch.kernel_name, "Cijk_Ailk_Bljk_SB_MT16x16");
        assert_eq!(launch.workgroup_size, [16, 16, 1]);
        assert_eq!(launch.num_workgroups, [3, 3, 3]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_grid_saturates() {
        let huge = 1usize << 33;
        let d = MatrixDescriptor::new([huge, 4], [huge, 1], std::ptr::null_mut())
            .with_batch(huge, 1);
        let problem = build_problem(&d, &d, &d);

        let seq = HostSolution::new("naive", [1, 1], 0, 0).solve(&problem, &inputs(), &host());
        let launch = seq.iter().next().unwrap();
        assert_eq!(launch.num_workgroups, [u32::MAX, 4, u32::MAX]);
    }

    #[test]
    fn test_code_object_covers_every_solution_kernel() {
        let code = embedded_code_object();
        let lib = HostLibrary::new();
        for solution in lib.solutions() {
            for batched in [false, true] {
                let name = kernel_name(true, false, batched, solution.tile());
                assert_eq!(code.get(&name), Some(&solution.tile()));
            }
        }
        assert_eq!(code.len(), 16);
    }
}
