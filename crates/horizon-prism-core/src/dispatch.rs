//! Deferred invocation queue for the owner thread.
//!
//! A [`Dispatcher`] collects one-shot closures posted from any thread and
//! runs them, in FIFO order, when the owning thread calls
//! [`run_pending`](Dispatcher::run_pending). It is the stand-in for an event
//! loop: work that must not run inside a notification callback (coalesced
//! live-shaping passes, cross-thread change processing) is posted here and
//! picked up at the owner's next idle point.
//!
//! The thread that constructs the dispatcher is its owner. Posting is allowed
//! from any thread; draining is meant for the owner only.

use std::collections::VecDeque;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

/// A type-erased deferred invocation.
type Invocation = Box<dyn FnOnce() + Send>;

/// FIFO queue of deferred one-shot invocations, drained on the owner thread.
///
/// # Example
///
/// ```
/// use horizon_prism_core::Dispatcher;
///
/// let dispatcher = Dispatcher::new();
/// dispatcher.post(|| println!("deferred"));
/// assert_eq!(dispatcher.pending_count(), 1);
/// assert_eq!(dispatcher.run_pending(), 1);
/// ```
pub struct Dispatcher {
    /// The thread that owns this dispatcher (the one that created it).
    owner: ThreadId,
    /// Pending invocations in post order.
    queue: Mutex<VecDeque<Invocation>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher owned by the current thread.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns `true` if the current thread is the dispatcher's owner.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Post an invocation to run on the owner thread.
    ///
    /// May be called from any thread, including from inside an invocation
    /// currently being run by [`run_pending`](Self::run_pending).
    pub fn post<F>(&self, invocation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.lock().push_back(Box::new(invocation));
    }

    /// Number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every pending invocation, in post order, and return how many ran.
    ///
    /// Invocations posted while draining are run in the same call. The queue
    /// lock is released around each invocation, so invocations may post or
    /// inspect the queue freely.
    ///
    /// Must be called from the owner thread.
    pub fn run_pending(&self) -> usize {
        if !self.is_owner_thread() {
            tracing::warn!(
                target: "horizon_prism_core::dispatch",
                "run_pending called off the owner thread; refusing to drain"
            );
            return 0;
        }

        let mut ran = 0;
        loop {
            let Some(invocation) = self.queue.lock().pop_front() else {
                break;
            };
            invocation();
            ran += 1;
        }
        tracing::trace!(target: "horizon_prism_core::dispatch", ran, "drained dispatcher");
        ran
    }
}
