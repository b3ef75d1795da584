use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, debug_span};

type Work = Box<dyn FnOnce() + Send>;

/// In-order host stream
///
/// Launched kernels are queued and only run on [`HostStream::synchronize`],
/// so work enqueued by a GEMM call completes asynchronously from the call,
/// as on a device stream.
#[derive(Default)]
pub struct HostStream {
    queue: Mutex<VecDeque<Work>>,
    completed: AtomicUsize,
}

impl HostStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue(&self, work: Work) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(work);
    }

    /// Number of kernels waiting to run
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of kernels run so far
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Run queued kernels in order until the queue is empty.
    pub fn synchronize(&self) {
        let _span = debug_span!("SynchronizeHostStream").entered();
        let mut ran = 0;
        loop {
            // Release the lock before running so kernels may enqueue follow-up work
            let next = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(work) = next else { break };
            work();
            ran += 1;
            self.completed.fetch_add(1, Ordering::AcqRel);
        }
        debug!(ran, "host stream synchronized");
    }
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostStream")
            .field("pending", &self.pending())
            .field("completed", &self.completed())
            .finish()
    }
}
