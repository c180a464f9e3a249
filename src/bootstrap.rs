//! Bootstrap plumbing shared by both directions of the bridge.
//!
//! `InjectorHandoff` carries the modern injector from asynchronous module
//! setup to the synchronous legacy bootstrap that consumes it exactly once.
//! `ApplyBuffer` queues scope work that arrives before the legacy framework
//! is ready to digest, then replays it in arrival order and runs everything
//! after the flip directly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{BridgeError, ERR_HANDOFF_CONSUMED};
use crate::modern::Injector;

pub struct InjectorHandoff {
    inner: RefCell<Option<Rc<Injector>>>,
}

impl InjectorHandoff {
    pub fn new(injector: Rc<Injector>) -> InjectorHandoff {
        InjectorHandoff {
            inner: RefCell::new(Some(injector)),
        }
    }

    /// Yields the injector once; every later call is an error.
    pub fn take(&self) -> Result<Rc<Injector>, BridgeError> {
        self.inner.borrow_mut().take().ok_or_else(|| {
            BridgeError::missing(
                ERR_HANDOFF_CONSUMED,
                "the injector handoff was already consumed",
            )
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Buffering,
    Flushed,
}

/// FIFO buffer for apply work issued before the legacy side is live. The
/// transition to direct execution is one-way.
pub struct ApplyBuffer {
    phase: Cell<Phase>,
    queue: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl ApplyBuffer {
    pub fn new() -> ApplyBuffer {
        ApplyBuffer {
            phase: Cell::new(Phase::Buffering),
            queue: RefCell::new(Vec::new()),
        }
    }

    pub fn is_flushed(&self) -> bool {
        self.phase.get() == Phase::Flushed
    }

    /// Run `work` now if flushed, otherwise queue it.
    pub fn apply(&self, work: impl FnOnce() + 'static) {
        if self.is_flushed() {
            work();
        } else {
            self.queue.borrow_mut().push(Box::new(work));
        }
    }

    /// Replay the queue in order and switch to direct execution. Work issued
    /// by replayed items runs directly, inside the same flush.
    pub fn flush(&self) {
        self.phase.set(Phase::Flushed);
        let queue: Vec<Box<dyn FnOnce()>> = self.queue.borrow_mut().drain(..).collect();
        for work in queue {
            work();
        }
    }
}

/// Surface an error that escaped a bridge callback. The error is returned so
/// callers on a fallible path can still propagate it.
pub fn report_uncaught(error: BridgeError) -> BridgeError {
    log::error!("uncaught bridge error: {}", error);
    error
}
