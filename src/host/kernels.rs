use crate::dispatch::KernelArgs;

/// Host implementation of the strided-batched contraction
/// Computes: D = alpha * op(A) @ op(B) + beta * C
/// with column-major operands, where op(X) is X or X^T depending on the
/// problem's transpose flags.
///
/// # Arguments
/// * `args` - Problem key and bound buffers
/// * `tile` - Macro tile `[tile_m, tile_n]`; `[1, 1]` walks element by element
///
/// # Safety
/// All four buffers must be valid for every element the problem addresses,
/// for every batch (see [`crate::problem::GemmProblem::addressed_extents`]).
/// C and D may alias exactly (each element is read before it is written) but
/// must not otherwise overlap A or B.
pub(crate) unsafe fn gemm_strided(args: &KernelArgs, tile: [usize; 2]) {
    let KernelArgs { problem, inputs } = args;

    let a = inputs.a.as_f32();
    let b = inputs.b.as_f32();
    let c = inputs.c.as_f32();
    let d = inputs.d.as_f32_mut();
    let alpha = inputs.alpha;
    let beta = inputs.beta;

    let (m, n, k) = (problem.m, problem.n, problem.k);

    // Element offsets of A(i, l) and B(l, j):
    // - Normal: unit stride along the free index, ld along the bound index
    // - Transposed: unit stride along the bound index, ld along the free index
    let (a_row_stride, a_col_stride) = if problem.transpose_a {
        (problem.lda, 1)
    } else {
        (1, problem.lda)
    };
    let (b_row_stride, b_col_stride) = if problem.transpose_b {
        (problem.ldb, 1)
    } else {
        (1, problem.ldb)
    };

    let tile_m = tile[0].max(1);
    let tile_n = tile[1].max(1);

    for batch in 0..problem.batch_multiplier() {
        let a = a.add(batch * problem.stride_a);
        let b = b.add(batch * problem.stride_b);
        let c = c.add(batch * problem.stride_c);
        let d = d.add(batch * problem.stride_d);

        for jj in (0..n).step_by(tile_n) {
            let j_end = usize::min(jj + tile_n, n);
            for ii in (0..m).step_by(tile_m) {
                let i_end = usize::min(ii + tile_m, m);

                for j in jj..j_end {
                    for i in ii..i_end {
                        let mut sum = 0.0f32;
                        for l in 0..k {
                            let a_idx = i * a_row_stride + l * a_col_stride;
                            let b_idx = l * b_row_stride + j * b_col_stride;
                            sum += *a.add(a_idx) * *b.add(b_idx);
                        }
                        let c_val = *c.add(i + j * problem.ldc);
                        *d.add(i + j * problem.ldd) = alpha * sum + beta * c_val;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ContractionInputs, DevicePtr};
    use crate::matrix::MatrixDescriptor;
    use crate::problem::build_problem;

    fn args(
        problem: crate::problem::GemmProblem,
        a: &mut [f32],
        b: &mut [f32],
        c: &mut [f32],
    ) -> KernelArgs {
        let c_ptr = DevicePtr(c.as_mut_ptr().cast());
        KernelArgs {
            problem,
            inputs: ContractionInputs {
                a: DevicePtr(a.as_mut_ptr().cast()),
                b: DevicePtr(b.as_mut_ptr().cast()),
                c: c_ptr,
                d: c_ptr,
                alpha: 1.0,
                beta: 1.0,
                extents: Default::default(),
            },
        }
    }

    /// Column-major reference: C[i + j*m] += sum_l A[i + l*m] * B[l + j*k]
    fn reference(a: &[f32], b: &[f32], c: &[f32], m: usize, n: usize, k: usize) -> Vec<f32> {
        let mut out = c.to_vec();
        for j in 0..n {
            for i in 0..m {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += a[i + l * m] * b[l + j * k];
                }
                out[i + j * m] += sum;
            }
        }
        out
    }

    #[test]
    fn test_accumulates_into_output() {
        // Row-major strides on square operands: A(i, l) = a[i + l*2]
        let mut a = vec![1.0, 2.0, 3.0, 4.0];
        let mut b = vec![5.0, 6.0, 7.0, 8.0];
        let mut c = vec![1.0, 1.0, 1.0, 1.0];
        let d = MatrixDescriptor::new([2, 2], [2, 1], std::ptr::null_mut());
        let problem = build_problem(&d, &d, &d);
        let expected = reference(&a, &b, &c, 2, 2, 2);

        let kernel_args = args(problem, &mut a, &mut b, &mut c);
        unsafe { gemm_strided(&kernel_args, [1, 1]) };
        assert_eq!(c, expected);
    }

    #[test]
    fn test_tiled_matches_naive() {
        let (m, n, k) = (5, 7, 3);
        let mut a: Vec<f32> = (0..m * k).map(|x| x as f32 * 0.5).collect();
        let mut b: Vec<f32> = (0..k * n).map(|x| 1.0 - x as f32 * 0.25).collect();
        let mut c1 = vec![0.5; m * n];
        let mut c2 = c1.clone();

        // Column-major, non-transposed: strides (ld, 1) classify as not transposed
        let da = MatrixDescriptor::new([m, k], [m, 1], std::ptr::null_mut());
        let db = MatrixDescriptor::new([k, n], [k, 1], std::ptr::null_mut());
        let dc = MatrixDescriptor::new([m, n], [m, 1], std::ptr::null_mut());
        let problem = build_problem(&da, &db, &dc);
        let expected = reference(&a, &b, &c1, m, n, k);

        let naive = args(problem, &mut a, &mut b, &mut c1);
        unsafe { gemm_strided(&naive, [1, 1]) };
        let tiled = args(problem, &mut a, &mut b, &mut c2);
        unsafe { gemm_strided(&tiled, [4, 4]) };

        assert_eq!(c1, expected);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_transposed_operands() {
        // A^T stored: A(i, l) = a[l + i*k]
        let (m, n, k) = (2, 2, 3);
        let a_t: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut a_plain = vec![0.0; m * k];
        for i in 0..m {
            for l in 0..k {
                a_plain[i + l * m] = a_t[l + i * k];
            }
        }
        let mut b: Vec<f32> = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut c = vec![0.0; m * n];
        let expected = reference(&a_plain, &b, &c, m, n, k);

        let da = MatrixDescriptor::new([m, k], [1, k], std::ptr::null_mut());
        let db = MatrixDescriptor::new([k, n], [k, 1], std::ptr::null_mut());
        let dc = MatrixDescriptor::new([m, n], [m, 1], std::ptr::null_mut());
        let problem = build_problem(&da, &db, &dc);
        assert!(problem.transpose_a);

        let mut a_t = a_t;
        let kernel_args = args(problem, &mut a_t, &mut b, &mut c);
        unsafe { gemm_strided(&kernel_args, [1, 1]) };
        assert_eq!(c, expected);
    }

    #[test]
    fn test_batches_use_strides() {
        let d = MatrixDescriptor::new([2, 2], [2, 1], std::ptr::null_mut()).with_batch(2, 4);
        let problem = build_problem(&d, &d, &d);

        let mut a = vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0];
        let mut b = vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0];
        let mut c = vec![0.0; 8];
        let kernel_args = args(problem, &mut a, &mut b, &mut c);
        unsafe { gemm_strided(&kernel_args, [2, 2]) };

        assert_eq!(&c[..4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&c[4..], &[2.0, 4.0, 6.0, 8.0]);
    }
}
