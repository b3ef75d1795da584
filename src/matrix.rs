//! Matrix descriptors and stride-based layout inference
//!
//! A [`MatrixDescriptor`] describes one 2-D operand (optionally a stack of
//! them) by extents and element strides only. Whether the operand is
//! "transposed" and what its leading dimension is are never stored; both are
//! recomputed from the strides whenever a problem is built.

use std::ffi::c_void;

use crate::problem::DataType;

/// Value of [`MatrixDescriptor::len`] when the buffer size is not known
pub const UNKNOWN_LEN: usize = usize::MAX;

/// Batch description of a descriptor. `num == 0` means "not batched".
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Batch {
    pub num: usize,
    pub stride: usize,
}

/// One operand of a GEMM call
///
/// The layout mirrors the C struct accepted by the FFI entry point, so a
/// `*mut MatrixDescriptor` coming from C can be dereferenced directly.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MatrixDescriptor {
    /// Logical extents of the two matrix dimensions
    pub lens: [usize; 2],
    /// Element strides, positionally matching `lens`
    pub strides: [usize; 2],
    pub batch: Batch,
    /// Device storage owned by the caller
    pub data: *mut c_void,
    /// Elements available at `data`, or [`UNKNOWN_LEN`]
    ///
    /// A known length lets the host backend refuse problems that would
    /// address past the buffer.
    pub len: usize,
}

impl MatrixDescriptor {
    /// Create an unbatched descriptor over `data` of unknown length.
    pub fn new(lens: [usize; 2], strides: [usize; 2], data: *mut c_void) -> Self {
        Self {
            lens,
            strides,
            batch: Batch::default(),
            data,
            len: UNKNOWN_LEN,
        }
    }

    /// Create a descriptor over an `f32` slice, recording its length.
    ///
    /// The descriptor does not borrow the slice. The slice must outlive every
    /// kernel enqueued with this descriptor.
    pub fn from_slice(lens: [usize; 2], strides: [usize; 2], data: &mut [f32]) -> Self {
        Self::new(lens, strides, data.as_mut_ptr().cast()).with_len(data.len())
    }

    /// Record the number of elements available at `data`.
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Elements available at `data`, if known
    pub fn buffer_len(&self) -> Option<usize> {
        (self.len != UNKNOWN_LEN).then_some(self.len)
    }

    /// Mark the descriptor as a stack of `num` matrices `stride` elements apart.
    pub fn with_batch(mut self, num: usize, stride: usize) -> Self {
        self.batch = Batch { num, stride };
        self
    }

    /// A view of the same storage with extents and strides swapped.
    ///
    /// The batch description is not carried over.
    pub fn transpose(&self) -> Self {
        Self::new(
            [self.lens[1], self.lens[0]],
            [self.strides[1], self.strides[0]],
            self.data,
        )
        .with_len(self.len)
    }

    pub fn is_batched(&self) -> bool {
        self.batch.num > 0
    }

    /// Equal strides cannot be classified; the layout silently falls back to
    /// not transposed.
    pub(crate) fn has_stride_tie(&self) -> bool {
        self.strides[0] == self.strides[1]
    }
}

/// Whether the second logical dimension carries the larger stride.
///
/// Equal strides evaluate as not transposed.
pub fn is_transposed(descriptor: &MatrixDescriptor) -> bool {
    descriptor.strides[1] > descriptor.strides[0]
}

/// Storage axis of logical dimension `n`, accounting for transposition.
pub fn axis_index(descriptor: &MatrixDescriptor, n: usize) -> usize {
    (n + usize::from(is_transposed(descriptor))) % 2
}

/// Index of the stride that serves as the leading dimension.
pub fn fast_axis_index(descriptor: &MatrixDescriptor) -> usize {
    axis_index(descriptor, 0)
}

/// Leading dimension as used in the problem key.
pub fn leading_dimension(descriptor: &MatrixDescriptor) -> usize {
    descriptor.strides[fast_axis_index(descriptor)]
}

/// Element type of the descriptor's storage. Only single precision is supported.
pub fn data_type(_descriptor: &MatrixDescriptor) -> DataType {
    DataType::Float
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn desc(lens: [usize; 2], strides: [usize; 2]) -> MatrixDescriptor {
        MatrixDescriptor::new(lens, strides, ptr::null_mut())
    }

    #[test]
    fn test_row_major_strides_are_not_transposed() {
        let d = desc([4, 8], [8, 1]);
        assert!(!is_transposed(&d));
        assert_eq!(fast_axis_index(&d), 0);
        assert_eq!(leading_dimension(&d), 8);
    }

    #[test]
    fn test_column_major_strides_are_transposed() {
        let d = desc([4, 8], [1, 4]);
        assert!(is_transposed(&d));
        assert_eq!(fast_axis_index(&d), 1);
        assert_eq!(leading_dimension(&d), 4);
    }

    #[test]
    fn test_padded_leading_dimension() {
        // Rows padded to 16 elements
        let d = desc([3, 5], [16, 1]);
        assert!(!is_transposed(&d));
        assert_eq!(leading_dimension(&d), 16);

        let d = desc([3, 5], [1, 16]);
        assert!(is_transposed(&d));
        assert_eq!(leading_dimension(&d), 16);
    }

    #[test]
    fn test_axis_index_flips_with_transposition() {
        let row = desc([4, 8], [8, 1]);
        let col = desc([4, 8], [1, 4]);
        assert_eq!((axis_index(&row, 0), axis_index(&row, 1)), (0, 1));
        assert_eq!((axis_index(&col, 0), axis_index(&col, 1)), (1, 0));
    }

    #[test]
    fn test_equal_strides_default_to_not_transposed() {
        let d = desc([1, 1], [1, 1]);
        assert!(d.has_stride_tie());
        assert!(!is_transposed(&d));
        assert_eq!(leading_dimension(&d), 1);
    }

    #[test]
    fn test_transpose_swaps_layout() {
        let d = desc([4, 8], [8, 1]).with_batch(3, 32);
        let t = d.transpose();
        assert_eq!(t.lens, [8, 4]);
        assert_eq!(t.strides, [1, 8]);
        assert_eq!(t.batch, Batch::default());
        assert_eq!(is_transposed(&t), !is_transposed(&d));
        assert_eq!(leading_dimension(&t), leading_dimension(&d));
    }

    #[test]
    fn test_batch_builder() {
        let d = desc([2, 2], [2, 1]);
        assert!(!d.is_batched());
        let d = d.with_batch(5, 4);
        assert!(d.is_batched());
        assert_eq!(d.batch, Batch { num: 5, stride: 4 });
    }

    #[test]
    fn test_buffer_length_is_recorded() {
        let mut data = vec![0.0f32; 6];
        let d = MatrixDescriptor::from_slice([2, 3], [3, 1], &mut data);
        assert_eq!(d.buffer_len(), Some(6));
        assert_eq!(d.transpose().buffer_len(), Some(6));
        assert_eq!(desc([2, 3], [3, 1]).buffer_len(), None);
        assert_eq!(desc([2, 3], [3, 1]).with_len(0).buffer_len(), Some(0));
    }

    #[test]
    fn test_data_type_is_float() {
        assert_eq!(data_type(&desc([2, 2], [2, 1])), DataType::Float);
    }
}
