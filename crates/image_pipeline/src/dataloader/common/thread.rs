//! Thread-local storage for worker identification.
//!
//! Each worker thread records its index here when it starts so log events and
//! error messages can say which worker produced them.

use std::cell::Cell;

thread_local! {
    /// Worker index (0 to num_workers-1). Stays 0 on non-worker threads.
    pub static WORKER_ID: Cell<usize> = const { Cell::new(0) };
}

/// Index of the worker running on the current thread.
pub fn current_worker_id() -> usize {
    WORKER_ID.with(Cell::get)
}
