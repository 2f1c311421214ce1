//! A bounded worker pool with zero-capacity hand-off: `push` blocks until a
//! worker is free to take the event, so the caller's queue depth is always
//! "one in flight per idle worker", never an unbounded backlog.
//!
//! A single [`Rendezvous`] slot is shared by every worker thread. `push`
//! writes the slot and waits for a worker to take it — that wait doubles as
//! the acknowledgment that the event was accepted, not merely queued. If the
//! pool is interrupted (by `interrupt()` or by a handler raising) while an
//! event sits in the slot unconsumed, the slot is discarded rather than
//! handed to a worker: `push` then reports `false` for that event, matching
//! a cooperative cancel rather than a silent drop.
//!
//! Each worker's state (`W`) is built by `on_init` on the worker's own
//! thread and lives there until `on_dispose` consumes it on exit. It never
//! crosses a thread boundary, so a worker is free to hold resources that
//! are neither `Send` nor `Sync` — in particular, per-worker database
//! connections that must not be shared across threads.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::error;

thread_local! {
    static CANCEL_FLAG: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Cooperative cancellation point for code running inside a pool worker.
/// Call between sub-steps of a unit of work (one parse step, one index
/// save) so an interrupt lands before the next expensive step starts.
pub fn check_cancel() -> bool {
    CANCEL_FLAG.with(|flag| flag.borrow().as_ref().is_some_and(|f| f.load(Ordering::SeqCst)))
}

/// Raised by `assert_continue()` to unwind a handler early on interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

pub fn assert_continue() -> Result<(), Interrupted> {
    if check_cancel() { Err(Interrupted) } else { Ok(()) }
}

/// The outcome of a completed [`TasksPool`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolResultState {
    Success,
    Interrupted,
    RaisedException,
}

enum Slot<E> {
    Empty,
    Full(E),
    Released,
}

struct Rendezvous<E> {
    slot: Mutex<Slot<E>>,
    cond: Condvar,
}

impl<E> Rendezvous<E> {
    fn new() -> Self {
        Self { slot: Mutex::new(Slot::Empty), cond: Condvar::new() }
    }

    /// Blocks until the slot is free, places `event`, then blocks again
    /// until a worker takes it. Returns `false` if the pool was released
    /// before a worker ever claimed the event.
    fn put(&self, event: E) -> bool {
        let mut guard = self.slot.lock().unwrap();
        loop {
            match &*guard {
                Slot::Empty => break,
                Slot::Released => return false,
                Slot::Full(_) => guard = self.cond.wait(guard).unwrap(),
            }
        }
        *guard = Slot::Full(event);
        self.cond.notify_all();
        loop {
            match &*guard {
                Slot::Full(_) => guard = self.cond.wait(guard).unwrap(),
                Slot::Empty => return true,
                Slot::Released => return false,
            }
        }
    }

    /// Blocks until an event is available, returning `None` once released.
    fn get(&self) -> Option<E> {
        let mut guard = self.slot.lock().unwrap();
        loop {
            match &*guard {
                Slot::Full(_) => break,
                Slot::Released => return None,
                Slot::Empty => guard = self.cond.wait(guard).unwrap(),
            }
        }
        let taken = std::mem::replace(&mut *guard, Slot::Empty);
        self.cond.notify_all();
        match taken {
            Slot::Full(event) => Some(event),
            _ => unreachable!("slot was Full under the same lock acquisition"),
        }
    }

    fn release(&self) {
        let mut guard = self.slot.lock().unwrap();
        *guard = Slot::Released;
        self.cond.notify_all();
    }
}

/// A fixed-size pool of worker threads fed one event at a time through a
/// rendezvous slot. Handlers that fail cause the pool to interrupt itself
/// and the run to end in [`PoolResultState::RaisedException`]; everything
/// already accepted before the failure still runs to completion.
pub struct TasksPool<E> {
    rendezvous: Arc<Rendezvous<E>>,
    state: Arc<Mutex<PoolResultState>>,
    interrupted: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<E: Send + 'static> TasksPool<E> {
    /// Spawn `worker_count` threads. `on_init(index)` runs once on each
    /// worker's own thread before it starts pulling events, and its return
    /// value is that worker's private state for the rest of its life.
    /// `on_handle(state, event, index)` runs for every accepted event and
    /// returns `Err` to signal a raised exception. `on_dispose(state,
    /// index)` runs once, taking ownership of the state, after the worker
    /// stops pulling events (whether it ran out of work, was interrupted,
    /// or raised) — the place to flush or close per-worker resources.
    pub fn start<W, I, H, D>(worker_count: usize, on_init: I, on_handle: H, on_dispose: D) -> Self
    where
        I: Fn(usize) -> W + Send + Sync + 'static,
        H: Fn(&mut W, E, usize) -> Result<(), String> + Send + Sync + 'static,
        D: Fn(W, usize) + Send + Sync + 'static,
    {
        let rendezvous = Arc::new(Rendezvous::new());
        let state = Arc::new(Mutex::new(PoolResultState::Success));
        let interrupted = Arc::new(AtomicBool::new(false));
        let on_init = Arc::new(on_init);
        let on_handle = Arc::new(on_handle);
        let on_dispose = Arc::new(on_dispose);

        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let rendezvous = rendezvous.clone();
            let state = state.clone();
            let interrupted = interrupted.clone();
            let on_init = on_init.clone();
            let on_handle = on_handle.clone();
            let on_dispose = on_dispose.clone();
            handles.push(std::thread::spawn(move || {
                CANCEL_FLAG.with(|flag| *flag.borrow_mut() = Some(interrupted.clone()));
                let mut worker_state = on_init(index);
                while let Some(event) = rendezvous.get() {
                    if let Err(message) = on_handle(&mut worker_state, event, index) {
                        let mut guard = state.lock().unwrap();
                        if *guard != PoolResultState::RaisedException {
                            *guard = PoolResultState::RaisedException;
                            error!(worker = index, %message, "pool worker raised, interrupting pool");
                        }
                        drop(guard);
                        interrupted.store(true, Ordering::SeqCst);
                        rendezvous.release();
                        break;
                    }
                }
                on_dispose(worker_state, index);
            }));
        }

        Self { rendezvous, state, interrupted, handles }
    }

    /// Hand an event to a free worker. Returns `false` if the pool has been
    /// interrupted or completed, or raced a shutdown before a worker claimed
    /// the event.
    pub fn push(&self, event: E) -> bool {
        self.rendezvous.put(event)
    }

    /// Request early termination. Already-accepted events still run to
    /// completion; no further `push` succeeds.
    pub fn interrupt(&self) {
        let mut guard = self.state.lock().unwrap();
        if *guard != PoolResultState::RaisedException {
            *guard = PoolResultState::Interrupted;
        }
        drop(guard);
        self.interrupted.store(true, Ordering::SeqCst);
        self.rendezvous.release();
    }

    /// Signal that no more events are coming, join every worker, and report
    /// the final state.
    pub fn complete(mut self) -> PoolResultState {
        self.rendezvous.release();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn processes_every_pushed_event_and_succeeds() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let pool = TasksPool::start(
            2,
            |_index| (),
            move |_state, event: usize, _worker| {
                seen_clone.lock().unwrap().push(event);
                Ok(())
            },
            |_state, _index| {},
        );
        for i in 0..5 {
            assert!(pool.push(i));
        }
        assert_eq!(pool.complete(), PoolResultState::Success);
        let mut collected = seen.lock().unwrap().clone();
        collected.sort();
        assert_eq!(collected, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn interrupt_stops_further_pushes() {
        let pool: TasksPool<usize> = TasksPool::start(1, |_| (), |_state, _event, _worker| Ok(()), |_, _| {});
        pool.interrupt();
        assert!(!pool.push(1));
        assert_eq!(pool.complete(), PoolResultState::Interrupted);
    }

    #[test]
    fn a_raising_handler_rejects_events_pushed_after_it_and_reports_exactly_what_ran() {
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let accepted_clone = accepted.clone();
        let throw_count = Arc::new(AtomicUsize::new(0));
        let throw_count_clone = throw_count.clone();

        let pool: TasksPool<usize> = TasksPool::start(
            2,
            |_| (),
            move |_state, event, _worker| {
                accepted_clone.lock().unwrap().push(event);
                std::thread::sleep(Duration::from_millis(300));
                if throw_count_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(format!("boom on {event}"))
                } else {
                    Ok(())
                }
            },
            |_, _| {},
        );

        let mut results = Vec::new();
        for i in 0..4 {
            results.push(pool.push(i));
        }

        assert_eq!(pool.complete(), PoolResultState::RaisedException);
        assert_eq!(results[0], true);
        assert_eq!(results[1], true);
        assert_eq!(results[2], false);
        assert_eq!(results[3], false);
        let mut accepted = accepted.lock().unwrap().clone();
        accepted.sort();
        assert_eq!(accepted, vec![0, 1]);
    }

    #[test]
    fn check_cancel_is_false_outside_a_worker_thread() {
        assert!(!check_cancel());
        assert!(assert_continue().is_ok());
    }

    #[test]
    fn on_init_runs_once_per_worker_before_handling_and_on_dispose_runs_once_after() {
        let inits = Arc::new(Mutex::new(Vec::new()));
        let inits_clone = inits.clone();
        let disposals = Arc::new(Mutex::new(Vec::new()));
        let disposals_clone = disposals.clone();
        let pool: TasksPool<usize> = TasksPool::start(
            3,
            move |index| {
                inits_clone.lock().unwrap().push(index);
                index
            },
            |_state, _event, _worker| Ok(()),
            move |state, index| {
                assert_eq!(state, index);
                disposals_clone.lock().unwrap().push(index);
            },
        );
        for i in 0..3 {
            pool.push(i);
        }
        pool.complete();
        let mut ran = inits.lock().unwrap().clone();
        ran.sort();
        assert_eq!(ran, vec![0, 1, 2]);
        let mut disposed = disposals.lock().unwrap().clone();
        disposed.sort();
        assert_eq!(disposed, vec![0, 1, 2]);
    }
}
