// src/counter.rs

//! Completion counters with triggered operations.
//!
//! A [`Counter`] counts completions and doubles as a small scheduler: deferred
//! operations are queued against a threshold and dispatched, in threshold
//! order, by whichever thread moves the counter past it.
//!
//! # Locking
//!
//! ```text
//! value      AtomicU64, lock-free reads
//! pending    Mutex<Pending>, the trigger queue plus a `draining` flag
//! wait_set   Mutex<()> + Condvar, MutexCond counters only
//! ```
//!
//! Every value mutation and every insertion is followed by an evaluation pass
//! that re-reads the value under the `pending` lock, so a trigger whose
//! threshold is already met can never be left behind.
//!
//! At most one thread drains a counter at a time. It pops one ready trigger
//! under the lock and runs it with no lock held. A thread that finds `draining`
//! set returns at once; the drainer re-reads the value before each pop and
//! picks up its work. Dispatch therefore stays in threshold order, an executor
//! may touch the same counter from inside a dispatched operation, and counters
//! whose operations complete on each other never wait on one another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::op::OpExecutor;
use crate::trigger::{Trigger, TriggerQueue};
use crate::types::OpFlags;

/// Which events a counter counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CntrEvents {
    /// One increment per completed operation.
    #[default]
    Completion,
    /// Bytes transferred. Not supported by this provider.
    Bytes,
}

/// How a thread blocks in [`Counter::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitObj {
    /// Busy-poll the domain's progress engine.
    #[default]
    None,
    Unspec,
    Set,
    Fd,
    /// Monitor wait on a mutex and condition variable.
    MutexCond,
    Yield,
}

/// Creation attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterAttr {
    pub events: CntrEvents,
    pub wait_obj: WaitObj,
    pub flags: OpFlags,
}

/// The domain a counter belongs to.
///
/// Dispatched triggers land on its [`OpExecutor`] entry points, and busy-poll
/// waits call [`Domain::progress`] until the counter catches up.
pub trait Domain: OpExecutor {
    /// Poll completion queues and run pending protocol work once.
    fn progress(&self);
}

/// Mutex and condition variable backing a `MutexCond` counter.
#[derive(Debug, Default)]
pub struct WaitSet {
    mutex: Mutex<()>,
    cond: Condvar,
}

impl WaitSet {
    pub fn mutex(&self) -> &Mutex<()> {
        &self.mutex
    }

    pub fn condvar(&self) -> &Condvar {
        &self.cond
    }
}

/// Post-creation control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    SetOpsFlags(OpFlags),
    GetOpsFlags,
    /// Expose the wait set for integration with external wait objects.
    GetWait,
    /// Any command code this provider does not recognize.
    Other(i32),
}

#[derive(Debug)]
pub enum ControlReply<'a> {
    Done,
    OpsFlags(OpFlags),
    Wait(&'a WaitSet),
}

/// Triggers not yet dispatched.
#[derive(Debug)]
struct Pending {
    queue: TriggerQueue,
    /// Some thread is running dispatched operations for this counter.
    draining: bool,
}

/// A completion counter.
pub struct Counter {
    domain: Arc<dyn Domain>,
    events: CntrEvents,
    wait_obj: WaitObj,
    flags: AtomicU64,
    value: AtomicU64,
    error_value: AtomicU64,
    pending: Mutex<Pending>,
    wait_set: Option<WaitSet>,
}

impl Counter {
    /// Validate `attr` and create a counter bound to `domain`.
    pub fn open(domain: Arc<dyn Domain>, attr: &CounterAttr) -> Result<Self> {
        if attr.events != CntrEvents::Completion {
            tracing::debug!(
                events = ?attr.events,
                supported = ?CntrEvents::Completion,
                "counter open rejected"
            );
            return Err(Error::InvalidArgument("events"));
        }

        match attr.wait_obj {
            WaitObj::None | WaitObj::MutexCond => {}
            other => {
                tracing::debug!(
                    wait_obj = ?other,
                    supported = ?[WaitObj::None, WaitObj::MutexCond],
                    "counter open rejected"
                );
                return Err(Error::InvalidArgument("wait_obj"));
            }
        }

        let triggers = TriggerQueue::with_capacity(4)?;
        let wait_set = (attr.wait_obj == WaitObj::MutexCond).then(WaitSet::default);

        Ok(Self {
            domain,
            events: attr.events,
            wait_obj: attr.wait_obj,
            flags: AtomicU64::new(attr.flags.bits()),
            value: AtomicU64::new(0),
            error_value: AtomicU64::new(0),
            pending: Mutex::new(Pending {
                queue: triggers,
                draining: false,
            }),
            wait_set,
        })
    }

    pub fn wait_obj(&self) -> WaitObj {
        self.wait_obj
    }

    pub fn read(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn read_error(&self) -> u64 {
        self.error_value.load(Ordering::Acquire)
    }

    /// Count `delta` failed completions.
    pub fn record_error(&self, delta: u64) {
        self.error_value.fetch_add(delta, Ordering::AcqRel);
    }

    pub fn add(&self, delta: u64) -> Result<()> {
        self.value.fetch_add(delta, Ordering::AcqRel);
        self.check_triggers();
        self.wake();
        Ok(())
    }

    pub fn set(&self, value: u64) -> Result<()> {
        self.value.store(value, Ordering::Release);
        self.check_triggers();
        self.wake();
        Ok(())
    }

    /// Block until the counter reaches `threshold`.
    ///
    /// `MutexCond` counters honor `timeout` (`None` waits forever). Busy-poll
    /// counters drive progress until the threshold is met and ignore it.
    ///
    /// Each `add`/`set` wakes a single `MutexCond` waiter. With several
    /// waiters on different thresholds the woken one may still be short and go
    /// back to sleep while a satisfied waiter stays blocked until the next
    /// update or its timeout.
    pub fn wait(&self, threshold: u64, timeout: Option<Duration>) -> Result<()> {
        match self.wait_obj {
            WaitObj::None => {
                while self.read() < threshold {
                    self.domain.progress();
                    std::thread::yield_now();
                }
                Ok(())
            }
            WaitObj::MutexCond => {
                let ws = self.wait_set.as_ref().ok_or(Error::BadState)?;
                let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

                let mut guard = ws.mutex.lock();
                while self.read() < threshold {
                    match deadline {
                        Some(deadline) => {
                            if ws.cond.wait_until(&mut guard, deadline).timed_out()
                                && self.read() < threshold
                            {
                                return Err(Error::Timeout);
                            }
                        }
                        None => ws.cond.wait(&mut guard),
                    }
                }
                Ok(())
            }
            _ => Err(Error::BadState),
        }
    }

    /// Queue `trigger` and dispatch whatever is already eligible.
    pub fn add_trigger(&self, trigger: Trigger) {
        self.pending.lock().queue.insert(trigger);
        self.check_triggers();
    }

    pub fn pending_triggers(&self) -> usize {
        self.pending.lock().queue.len()
    }

    /// Lowest threshold still queued.
    pub fn next_trigger_threshold(&self) -> Option<u64> {
        self.pending.lock().queue.next_threshold()
    }

    pub fn control(&self, command: Control) -> Result<ControlReply<'_>> {
        match command {
            Control::SetOpsFlags(flags) => {
                self.flags.store(flags.bits(), Ordering::Release);
                Ok(ControlReply::Done)
            }
            Control::GetOpsFlags => Ok(ControlReply::OpsFlags(self.ops_flags())),
            Control::GetWait => self
                .wait_set
                .as_ref()
                .map(ControlReply::Wait)
                .ok_or(Error::BadState),
            Control::Other(code) => {
                tracing::debug!(code, "unknown counter control command");
                Err(Error::NoSystemCall)
            }
        }
    }

    pub fn ops_flags(&self) -> OpFlags {
        OpFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    /// Close the counter, discarding any triggers that never fired.
    pub fn close(self) {
        let mut pending = self.pending.lock();
        let discarded = pending.queue.drain().count();
        if discarded > 0 {
            tracing::debug!(discarded, "closing counter with pending triggers");
        }
    }

    fn check_triggers(&self) {
        let mut pending = self.pending.lock();
        if pending.draining {
            return;
        }

        pending.draining = true;
        while let Some(trigger) = pending.queue.pop_ready(self.read()) {
            MutexGuard::unlocked(&mut pending, || self.dispatch_one(trigger));
        }
        pending.draining = false;
    }

    fn dispatch_one(&self, trigger: Trigger) {
        tracing::trace!(
            threshold = trigger.threshold,
            kind = trigger.op.kind(),
            ep = trigger.op.endpoint().0,
            "dispatching triggered op"
        );

        match trigger.op.execute(&*self.domain) {
            Ok(()) => {}
            Err(Error::NoSystemCall) => {
                tracing::debug!(kind = trigger.op.kind(), "unsupported triggered op dropped");
            }
            Err(e) => {
                tracing::warn!(kind = trigger.op.kind(), "triggered op failed: {}", e);
            }
        }
    }

    fn wake(&self) {
        if let Some(ws) = &self.wait_set {
            let _guard = ws.mutex.lock();
            ws.cond.notify_one();
        }
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Counter")
            .field("events", &self.events)
            .field("wait_obj", &self.wait_obj)
            .field("value", &self.read())
            .field("error_value", &self.read_error())
            .field("pending_triggers", &self.pending_triggers())
            .finish()
    }
}
