//! Async operation dispatcher
//!
//! Runs the blocking half of an operation on the worker pool and hands the
//! payload back to the origin thread, where its completion callback runs.
//!
//! # Handoff
//!
//! ```text
//! origin thread                     worker thread
//! ─────────────                     ─────────────
//! submit(payload, work, after)
//!   after  → pending map[id]
//!   payload, work → pool ─────────▶ work(&mut payload)
//!                                   slot[id] = payload
//!   run()/poll()  ◀──────────────── completions.push(id)
//!   after(slot.take())
//! ```
//!
//! The payload is owned by exactly one side at a time: the job closure while
//! the worker runs, then the handoff slot until the origin thread takes it.
//! The completion callback never leaves the origin thread, so it need not be
//! `Send`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use quarry_core::Result;
use rustc_hash::FxHashMap;
use tracing::{error, trace, warn};

use crate::background::{panic_message, PoolStats, WorkerPool};

/// Ids of operations whose work has finished, in completion order.
#[derive(Default)]
struct CompletionQueue {
    ready: Mutex<VecDeque<u64>>,
    signal: Condvar,
}

impl CompletionQueue {
    fn push(&self, id: u64) {
        self.ready.lock().push_back(id);
        self.signal.notify_one();
    }

    fn try_pop(&self) -> Option<u64> {
        self.ready.lock().pop_front()
    }

    fn pop_wait(&self) -> u64 {
        let mut ready = self.ready.lock();
        loop {
            if let Some(id) = ready.pop_front() {
                return id;
            }
            self.signal.wait(&mut ready);
        }
    }

    fn len(&self) -> usize {
        self.ready.lock().len()
    }
}

/// A submitted operation, as seen from the origin thread.
trait PendingOp {
    fn complete(self: Box<Self>);
}

struct Pending<P, A> {
    slot: Arc<Mutex<Option<P>>>,
    after: A,
}

impl<P, A: FnOnce(P)> PendingOp for Pending<P, A> {
    fn complete(self: Box<Self>) {
        let Pending { slot, after } = *self;
        let payload = slot.lock().take();
        match payload {
            Some(payload) => after(payload),
            None => error!(target: "quarry::dispatch", "Completed operation left no payload"),
        }
    }
}

/// Submits work to the pool and delivers completions on the origin thread.
///
/// A `Dispatcher` is bound to the thread that created it: it is neither
/// `Send` nor `Sync`, and callbacks only ever run inside [`run`](Self::run)
/// or [`poll`](Self::poll) on that thread.
pub struct Dispatcher {
    pool: WorkerPool,
    completions: Arc<CompletionQueue>,
    pending: RefCell<FxHashMap<u64, Box<dyn PendingOp>>>,
    next_id: Cell<u64>,
    /// Operations submitted and not yet fully delivered
    pins: Cell<usize>,
}

/// Releases one liveness pin when dropped, even if a callback unwinds.
struct LivenessPin<'a>(&'a Cell<usize>);

impl Drop for LivenessPin<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Dispatcher {
    /// Wrap a worker pool.
    pub fn new(pool: WorkerPool) -> Self {
        Dispatcher {
            pool,
            completions: Arc::new(CompletionQueue::default()),
            pending: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(1),
            pins: Cell::new(0),
        }
    }

    /// Submit one operation.
    ///
    /// `work` runs on a worker thread with exclusive access to the payload.
    /// Once it returns, `after` receives the payload on the origin thread
    /// during the next [`run`](Self::run) or [`poll`](Self::poll). If `work`
    /// panics, `after` still receives the payload as the work left it.
    ///
    /// Fails with `Error::Busy` when the pool refuses the job; `after` is
    /// dropped without being called.
    pub fn submit<P, W, A>(&self, payload: P, work: W, after: A) -> Result<()>
    where
        P: Send + 'static,
        W: FnOnce(&mut P) + Send + 'static,
        A: FnOnce(P) + 'static,
    {
        let id = self.next_id.get();
        let slot: Arc<Mutex<Option<P>>> = Arc::new(Mutex::new(None));

        let job_slot = Arc::clone(&slot);
        let completions = Arc::clone(&self.completions);
        let job = move || {
            let mut payload = payload;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| work(&mut payload))) {
                error!(
                    target: "quarry::dispatch",
                    op = id,
                    panic = panic_message(&*panic),
                    "Operation panicked on worker thread"
                );
            }
            *job_slot.lock() = Some(payload);
            completions.push(id);
        };

        self.pool.submit(job)?;

        self.next_id.set(id + 1);
        self.pins.set(self.pins.get() + 1);
        self.pending
            .borrow_mut()
            .insert(id, Box::new(Pending { slot, after }));
        trace!(target: "quarry::dispatch", op = id, "Submitted");
        Ok(())
    }

    /// Deliver completions until no operation is outstanding.
    ///
    /// Operations submitted by callbacks are waited for too. Returns the
    /// number of callbacks run.
    pub fn run(&self) -> usize {
        let mut delivered = 0;
        while self.has_undelivered() {
            let id = self.completions.pop_wait();
            delivered += self.deliver(id);
        }
        delivered
    }

    /// Deliver every completion already available, without blocking.
    ///
    /// Completions that arrive while callbacks run are left for the next
    /// call. Returns the number of callbacks run.
    pub fn poll(&self) -> usize {
        let available = self.completions.len();
        let mut delivered = 0;
        for _ in 0..available {
            match self.completions.try_pop() {
                Some(id) => delivered += self.deliver(id),
                None => break,
            }
        }
        delivered
    }

    /// Operations submitted whose callback has not finished
    pub fn pending(&self) -> usize {
        self.pins.get()
    }

    /// Worker pool metrics
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn has_undelivered(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    fn deliver(&self, id: u64) -> usize {
        // The borrow ends here so callbacks may submit again.
        let op = self.pending.borrow_mut().remove(&id);
        match op {
            Some(op) => {
                let _pin = LivenessPin(&self.pins);
                trace!(target: "quarry::dispatch", op = id, "Delivering");
                op.complete();
                1
            }
            None => {
                warn!(target: "quarry::dispatch", op = id, "Completion for unknown operation");
                0
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Undelivered payloads go before the join: a worker may be waiting
        // for an instance one of them still holds.
        let undelivered = std::mem::take(self.pending.get_mut());
        if !undelivered.is_empty() {
            warn!(
                target: "quarry::dispatch",
                undelivered = undelivered.len(),
                "Dispatcher dropped with operations never delivered"
            );
        }
        drop(undelivered);
        self.pool.shutdown();
    }
}
