//! C ABI over the process-wide host runtime
//!
//! A null descriptor or stream panics inside an `extern "C"` function, which
//! aborts the process; C callers get the fatal path, not a status code.

use crate::host::HostStream;
use crate::matrix::MatrixDescriptor;
use crate::runtime::{deref_or_fail, gemm, Status};

/// Create a host stream. Release it with [`gemm_dispatch_stream_destroy`].
#[no_mangle]
pub extern "C" fn gemm_dispatch_stream_create() -> *mut HostStream {
    Box::into_raw(Box::new(HostStream::new()))
}

/// Run every kernel queued on `stream`.
///
/// # Safety
/// `stream` must come from [`gemm_dispatch_stream_create`] and not have been
/// destroyed.
#[no_mangle]
pub unsafe extern "C" fn gemm_dispatch_stream_synchronize(stream: *const HostStream) {
    deref_or_fail(unsafe { stream.as_ref() }, "stream").synchronize();
}

/// Destroy a stream. Queued kernels that were never synchronized are dropped.
///
/// # Safety
/// `stream` must come from [`gemm_dispatch_stream_create`] and must not be
/// used afterwards. Null is ignored.
#[no_mangle]
pub unsafe extern "C" fn gemm_dispatch_stream_destroy(stream: *mut HostStream) {
    if !stream.is_null() {
        drop(unsafe { Box::from_raw(stream) });
    }
}

/// Enqueue `c += a * b` on `stream`.
///
/// # Safety
/// Non-null pointers must be valid for the duration of the call, and every
/// descriptor's data must stay valid until `stream` is synchronized. Each
/// descriptor's `len` is its buffer length in elements, or `SIZE_MAX` when
/// unknown; a known length lets the call refuse out-of-bounds problems.
#[no_mangle]
pub unsafe extern "C" fn gemm_dispatch_sgemm(
    stream: *const HostStream,
    a: *mut MatrixDescriptor,
    b: *mut MatrixDescriptor,
    c: *mut MatrixDescriptor,
) -> Status {
    let stream = deref_or_fail(unsafe { stream.as_ref() }, "stream");
    // SAFETY: the descriptor contract above is the one `gemm` requires
    unsafe { gemm(stream, a.as_ref(), b.as_ref(), c.as_ref()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_lifecycle() {
        let stream = gemm_dispatch_stream_create();
        assert!(!stream.is_null());
        unsafe {
            gemm_dispatch_stream_synchronize(stream);
            assert_eq!((*stream).pending(), 0);
            gemm_dispatch_stream_destroy(stream);
            gemm_dispatch_stream_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_sgemm_accumulates_through_handles() {
        let mut left = vec![1.0, 0.0, 0.0, 1.0];
        let mut right = vec![2.0, 3.0, 4.0, 5.0];
        let mut out = vec![1.0; 4];
        let mut a = MatrixDescriptor::from_slice([2, 2], [2, 1], &mut left);
        let mut b = MatrixDescriptor::from_slice([2, 2], [2, 1], &mut right);
        let mut c = MatrixDescriptor::from_slice([2, 2], [2, 1], &mut out);

        let stream = gemm_dispatch_stream_create();
        unsafe {
            assert_eq!(gemm_dispatch_sgemm(stream, &mut a, &mut b, &mut c), Status::Success);
            gemm_dispatch_stream_synchronize(stream);
            gemm_dispatch_stream_destroy(stream);
        }
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0]);
    }
}
