//! Canonical GEMM problem keys
//!
//! The solution library is keyed by a [`GemmProblem`]: transposition flags,
//! data types, extents, leading dimensions and batch strides of a
//! column-major contraction `D = alpha * op(A) * op(B) + beta * C`. The
//! builder derives every field from the operand descriptors' strides.

use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::{debug_span, warn};

use crate::matrix::{data_type, is_transposed, leading_dimension, MatrixDescriptor};

/// Element type of one problem operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
}

impl DataType {
    /// Single-letter abbreviation used in kernel names
    pub fn abbrev(&self) -> &'static str {
        match self {
            DataType::Float => "S",
        }
    }
}

/// Data types of the four operand slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSet {
    pub a: DataType,
    pub b: DataType,
    pub c: DataType,
    pub d: DataType,
}

impl TypeSet {
    pub fn uniform(data_type: DataType) -> Self {
        Self {
            a: data_type,
            b: data_type,
            c: data_type,
            d: data_type,
        }
    }
}

type ProblemKey = (
    (bool, bool, TypeSet),
    (usize, usize, usize, Option<usize>),
    (usize, usize, usize, usize),
    (usize, usize, usize, usize),
    u64,
);

/// Lookup key for the solution library
///
/// Two structurally equal problems hash identically; `alpha` participates by
/// bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct GemmProblem {
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub types: TypeSet,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// `None` for a plain GEMM
    pub batch_count: Option<usize>,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
    pub ldd: usize,
    pub stride_a: usize,
    pub stride_b: usize,
    pub stride_c: usize,
    pub stride_d: usize,
    pub alpha: f64,
}

impl GemmProblem {
    /// Number of independent GEMMs the problem describes.
    ///
    /// A plain problem counts as one.
    pub fn batch_multiplier(&self) -> usize {
        self.batch_count.unwrap_or(1)
    }

    pub fn is_batched(&self) -> bool {
        self.batch_count.is_some()
    }

    /// Multiply-add count over the whole batch
    pub fn flop_count(&self) -> usize {
        2 * self.m * self.n * self.k * self.batch_multiplier()
    }

    /// Contraction name in index notation, e.g. `Contraction_l_Ailk_Bljk_Cijk_Dijk`.
    pub fn operation_identifier(&self) -> String {
        let a = if self.transpose_a { "Alik" } else { "Ailk" };
        let b = if self.transpose_b { "Bjlk" } else { "Bljk" };
        format!("Contraction_l_{a}_{b}_Cijk_Dijk")
    }

    /// Elements of A, B, C and D the column-major contraction addresses,
    /// counting every batch.
    ///
    /// A buffer smaller than its extent would be read or written out of
    /// bounds. Saturates instead of overflowing.
    pub fn addressed_extents(&self) -> [usize; 4] {
        if self.m == 0 || self.n == 0 {
            return [0; 4];
        }
        let batches = self.batch_multiplier();
        let span = |rows: usize, cols: usize, ld: usize, transposed: bool, stride: usize| {
            if rows == 0 || cols == 0 || batches == 0 {
                return 0;
            }
            let (fast, slow) = if transposed { (cols, rows) } else { (rows, cols) };
            (fast - 1)
                .saturating_add((slow - 1).saturating_mul(ld))
                .saturating_add((batches - 1).saturating_mul(stride))
                .saturating_add(1)
        };
        [
            span(self.m, self.k, self.lda, self.transpose_a, self.stride_a),
            span(self.k, self.n, self.ldb, self.transpose_b, self.stride_b),
            span(self.m, self.n, self.ldc, false, self.stride_c),
            span(self.m, self.n, self.ldd, false, self.stride_d),
        ]
    }

    fn key_fields(&self) -> ProblemKey {
        (
            (self.transpose_a, self.transpose_b, self.types),
            (self.m, self.n, self.k, self.batch_count),
            (self.lda, self.ldb, self.ldc, self.ldd),
            (self.stride_a, self.stride_b, self.stride_c, self.stride_d),
            self.alpha.to_bits(),
        )
    }
}

impl PartialEq for GemmProblem {
    fn eq(&self, other: &Self) -> bool {
        self.key_fields() == other.key_fields()
    }
}

impl Eq for GemmProblem {}

impl Hash for GemmProblem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_fields().hash(state);
    }
}

impl fmt::Display for GemmProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{}x{}",
            self.operation_identifier(),
            self.m,
            self.n,
            self.k
        )?;
        if let Some(count) = self.batch_count {
            write!(f, " batch={count}")?;
        }
        write!(f, " ld=({},{},{})", self.lda, self.ldb, self.ldc)
    }
}

/// Map the caller's `(left, right, output)` onto the library's `(a, b, c)`.
///
/// The caller describes its operands in the opposite storage convention to
/// the solution library, so left and right trade places: `a` is the caller's
/// right operand and `b` its left. Applying the swap twice, or not at all,
/// still builds a valid problem but yields a transposed result.
pub fn canonicalize_operand_order<'a>(
    left: &'a MatrixDescriptor,
    right: &'a MatrixDescriptor,
    output: &'a MatrixDescriptor,
) -> (
    &'a MatrixDescriptor,
    &'a MatrixDescriptor,
    &'a MatrixDescriptor,
) {
    (right, left, output)
}

/// Build the problem key for `D = A * B + C` from operands already in
/// library order.
pub fn build_problem(
    a: &MatrixDescriptor,
    b: &MatrixDescriptor,
    c: &MatrixDescriptor,
) -> GemmProblem {
    let _span = debug_span!("BuildProblem").entered();
    check_preconditions(a, b, c);

    let types = TypeSet {
        a: data_type(a),
        b: data_type(b),
        c: data_type(c),
        d: data_type(c),
    };

    if a.is_batched() || b.is_batched() || c.is_batched() {
        let count = a.batch.num.max(b.batch.num).max(c.batch.num);
        GemmProblem {
            transpose_a: is_transposed(a),
            transpose_b: is_transposed(b),
            types,
            m: a.lens[0],
            n: b.lens[1],
            k: a.lens[1],
            batch_count: Some(count),
            lda: leading_dimension(a),
            ldb: leading_dimension(b),
            ldc: leading_dimension(c),
            ldd: leading_dimension(c),
            stride_a: a.batch.stride,
            stride_b: b.batch.stride,
            stride_c: c.batch.stride,
            stride_d: c.batch.stride,
            alpha: 1.0,
        }
    } else {
        GemmProblem {
            transpose_a: is_transposed(a),
            transpose_b: is_transposed(b),
            types,
            m: a.lens[0],
            n: b.lens[1],
            k: a.lens[1],
            batch_count: None,
            lda: leading_dimension(a),
            ldb: leading_dimension(b),
            ldc: leading_dimension(c),
            ldd: leading_dimension(c),
            stride_a: 0,
            stride_b: 0,
            stride_c: 0,
            stride_d: 0,
            alpha: 1.0,
        }
    }
}

/// Report, but never reject, inputs whose behavior is undefined.
fn check_preconditions(a: &MatrixDescriptor, b: &MatrixDescriptor, c: &MatrixDescriptor) {
    for (name, operand) in [("a", a), ("b", b), ("c", c)] {
        if operand.has_stride_tie() {
            warn!(
                operand = name,
                strides = ?operand.strides,
                "equal strides; layout classified as not transposed"
            );
        }
    }

    if a.lens[1] != b.lens[0] {
        warn!(
            a_lens = ?a.lens,
            b_lens = ?b.lens,
            "inner extents disagree; K taken from a"
        );
    }

    let counts = [a.batch.num, b.batch.num, c.batch.num];
    let batched: Vec<usize> = counts.iter().copied().filter(|&n| n > 0).collect();
    if batched.windows(2).any(|w| w[0] != w[1]) {
        warn!(?counts, "operand batch counts differ; using the largest");
    }
}
