//! Deterministic service executor.
//!
//! Applies committed log entries to a user state machine, advances a
//! deterministic logical clock, and runs a deterministic scheduler for timer
//! callbacks. Every observable side effect — which handler runs, what
//! `timestamp`/`op_kind` it observes, which timers fire and in what order —
//! is a pure function of the sequence of [`Executor::apply`] and
//! [`Executor::tick`] calls. The executor never reads a real clock.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

#[cfg(debug_assertions)]
use std::thread::ThreadId;

use tracing::{debug, error, warn};

use crate::error::{ExecutorError, ExecutorResult};

/// Identity of a registered operation. A small, stable, human-assigned
/// name (`"put"`, `"get"`) rather than a generated id — handler registries
/// in this crate are keyed by name, not by a high-cardinality identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OperationId(String);

impl OperationId {
    /// Build an operation id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationId({:?})", self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Whether an operation may mutate state and schedule side effects
/// (`Command`), or must only read (`Query`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Mutates state; may call [`Executor::execute`] / [`Executor::schedule`].
    Command,
    /// Read-only; must not mutate, schedule, or enqueue post-op tasks.
    Query,
}

/// A committed log entry delivered to the state machine.
///
/// `wall_clock_millis` is replicated logical time: identical on every
/// replica for the same log index, supplied by the orchestrator. The
/// executor never reads a real clock to derive it.
#[derive(Clone, Debug)]
pub struct Commit {
    /// Which registered handler this commit dispatches to.
    pub op_id: OperationId,
    /// Command vs. query.
    pub op_kind: OperationKind,
    /// Opaque operation payload.
    pub payload: Vec<u8>,
    /// Replicated logical time, in milliseconds.
    pub wall_clock_millis: u64,
}

/// Error type returned by a registered handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A registered operation handler.
///
/// Handlers receive `&mut Executor` so they can call [`Executor::execute`]
/// and [`Executor::schedule`] while they run; the executor removes the
/// handler from its registry before invoking it so this does not conflict
/// with the `&mut self` borrow the call itself requires.
pub type Handler = Box<dyn FnMut(&Commit, &mut Executor) -> Result<Vec<u8>, HandlerError>>;

/// A zero-argument callback queued with [`Executor::execute`]. Its error
/// type mirrors [`HandlerError`]: failures are logged and swallowed, never
/// propagated to the caller of `apply`, per the crate's propagation policy.
pub type PostOpTask = Box<dyn FnMut() -> Result<(), HandlerError>>;

/// A timer callback registered with [`Executor::schedule`]. Receives the
/// logical time it fired at (the task's own scheduled `time`, not the
/// `tick` argument that triggered it).
pub type TimerTask = Box<dyn FnMut(u64)>;

/// Handle to a scheduled timer, returned by [`Executor::schedule`].
///
/// `cancel` is idempotent and may be called from inside the callback it
/// cancels (this removes only *future* firings of a periodic task — the
/// firing already in progress always completes).
#[derive(Clone)]
pub struct Scheduled {
    cancelled: Rc<Cell<bool>>,
}

impl Scheduled {
    fn new() -> Self {
        Self {
            cancelled: Rc::new(Cell::new(false)),
        }
    }

    /// Cancel this timer. A no-op if already cancelled or already fired
    /// (for a one-shot task).
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Whether this timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

struct TimerEntry {
    time: u64,
    seq: u64,
    interval: u64,
    cancelled: Rc<Cell<bool>>,
    task: TimerTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Reverses [`TimerEntry`] ordering so a [`BinaryHeap`] (a max-heap) pops
/// the earliest `(time, seq)` first, per the design note that a priority
/// heap keyed by `(time, insertion_seq)` is an equally valid — and for
/// large live-timer counts, preferable — strategy to sorted-array
/// binary-search insertion.
struct EarliestFirst(TimerEntry);

impl PartialEq for EarliestFirst {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for EarliestFirst {}
impl PartialOrd for EarliestFirst {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for EarliestFirst {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

#[derive(Clone, Copy)]
struct ActiveContext {
    kind: OperationKind,
    timestamp: u64,
}

/// The deterministic executor. Owns the handler registry, the post-op task
/// queue, and the scheduled-timer heap. Single-threaded, cooperative: there
/// is no internal locking because there is never more than one logical
/// owner thread driving it (see the module docs on determinism).
pub struct Executor {
    handlers: HashMap<OperationId, Handler>,
    post_op_queue: VecDeque<PostOpTask>,
    timers: BinaryHeap<EarliestFirst>,
    next_seq: u64,
    context: Option<ActiveContext>,
    #[cfg(debug_assertions)]
    owner_thread: Cell<Option<ThreadId>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Create a new executor with no registered handlers and no pending
    /// timers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            post_op_queue: VecDeque::new(),
            timers: BinaryHeap::new(),
            next_seq: 0,
            context: None,
            #[cfg(debug_assertions)]
            owner_thread: Cell::new(None),
        }
    }

    #[cfg(debug_assertions)]
    fn assert_owner_thread(&self) {
        let current = std::thread::current().id();
        match self.owner_thread.get() {
            None => self.owner_thread.set(Some(current)),
            Some(owner) => assert_eq!(
                owner, current,
                "Executor accessed from a second thread; it is single-threaded by contract"
            ),
        }
    }

    #[cfg(not(debug_assertions))]
    fn assert_owner_thread(&self) {}

    /// Register (or replace) the handler for `op_id`.
    pub fn register(&mut self, op_id: OperationId, handler: Handler) {
        self.assert_owner_thread();
        if self.handlers.insert(op_id.clone(), handler).is_some() {
            debug!(op_id = ?op_id, "replaced existing handler");
        } else {
            debug!(op_id = ?op_id, "registered handler");
        }
    }

    /// Apply a committed entry: dispatch to its handler under the commit's
    /// logical time, then unconditionally drain the post-op task queue,
    /// then return the handler's result (or the error it produced).
    ///
    /// Step 4 (draining post-op tasks) always runs, even when the handler
    /// returns an error — this mirrors a scoped finalizer that executes on
    /// every exit path.
    pub fn apply(&mut self, commit: &Commit) -> ExecutorResult<Vec<u8>> {
        self.assert_owner_thread();
        self.context = Some(ActiveContext {
            kind: commit.op_kind,
            timestamp: commit.wall_clock_millis,
        });

        let mut handler = match self.handlers.remove(&commit.op_id) {
            Some(h) => h,
            None => {
                self.context = None;
                warn!(op_id = ?commit.op_id, "apply called with no registered handler");
                return Err(ExecutorError::UnknownOperation(commit.op_id.clone()));
            }
        };

        debug!(op_id = ?commit.op_id, timestamp = commit.wall_clock_millis, "applying commit");
        let outcome = handler(commit, self);
        self.handlers.insert(commit.op_id.clone(), handler);

        self.drain_post_op_tasks();
        self.context = None;

        outcome.map_err(|source| ExecutorError::ApplicationError {
            op_id: commit.op_id.clone(),
            source,
        })
    }

    fn drain_post_op_tasks(&mut self) {
        while let Some(mut task) = self.post_op_queue.pop_front() {
            if let Err(source) = task() {
                error!(error = %source, "post-op task failed, swallowing");
            }
        }
    }

    /// Queue a callback to run immediately after the current `apply` call
    /// returns, in FIFO order with every other task queued during the same
    /// `apply`. A task's `Err` is logged and swallowed; it never aborts
    /// sibling tasks and never propagates out of `apply`. Only legal during
    /// a COMMAND.
    pub fn execute(
        &mut self,
        task: impl FnMut() -> Result<(), HandlerError> + 'static,
    ) -> ExecutorResult<()> {
        self.require_command("execute")?;
        self.post_op_queue.push_back(Box::new(task));
        Ok(())
    }

    /// Schedule `task` to fire once the logical clock passes
    /// `current_timestamp + initial_delay`, then (if `interval > 0`)
    /// reschedule it every `interval` thereafter, anchored to the
    /// previously scheduled firing time rather than to wall-clock drift.
    /// Only legal during a COMMAND.
    pub fn schedule(
        &mut self,
        initial_delay: u64,
        interval: u64,
        task: impl FnMut(u64) + 'static,
    ) -> ExecutorResult<Scheduled> {
        let base = self.require_command("schedule")?;
        let handle = Scheduled::new();
        let entry = TimerEntry {
            time: base + initial_delay,
            seq: self.next_seq,
            interval,
            cancelled: handle.cancelled.clone(),
            task: Box::new(task),
        };
        self.next_seq += 1;
        self.timers.push(EarliestFirst(entry));
        Ok(handle)
    }

    /// Convenience wrapper for a one-shot [`Executor::schedule`] (`interval
    /// == 0`).
    pub fn schedule_once(
        &mut self,
        delay: u64,
        task: impl FnMut(u64) + 'static,
    ) -> ExecutorResult<Scheduled> {
        self.schedule(delay, 0, task)
    }

    fn require_command(&self, attempted: &'static str) -> ExecutorResult<u64> {
        match self.context {
            Some(ActiveContext {
                kind: OperationKind::Command,
                timestamp,
            }) => Ok(timestamp),
            _ => Err(ExecutorError::IllegalContext { attempted }),
        }
    }

    /// Advance the logical clock to `t`, firing every scheduled task whose
    /// `time` is strictly less than `t`, in ascending `time` order with
    /// FIFO tiebreak among equal times. Never fails; a `tick` with nothing
    /// due is a no-op.
    pub fn tick(&mut self, t: u64) {
        self.assert_owner_thread();
        loop {
            let due = match self.timers.peek() {
                Some(EarliestFirst(entry)) if entry.time < t => true,
                _ => false,
            };
            if !due {
                break;
            }

            let EarliestFirst(mut entry) = self.timers.pop().expect("peeked Some above");

            if entry.cancelled.get() {
                debug!(time = entry.time, "skipping cancelled timer");
                continue;
            }

            self.context = Some(ActiveContext {
                kind: OperationKind::Command,
                timestamp: entry.time,
            });
            (entry.task)(entry.time);
            self.context = None;

            if entry.interval > 0 && !entry.cancelled.get() {
                let next_time = entry.time + entry.interval;
                self.next_seq += 1;
                self.timers.push(EarliestFirst(TimerEntry {
                    time: next_time,
                    seq: self.next_seq,
                    interval: entry.interval,
                    cancelled: entry.cancelled.clone(),
                    task: entry.task,
                }));
            }
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("registered_operations", &self.handlers.len())
            .field("pending_post_op_tasks", &self.post_op_queue.len())
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}
