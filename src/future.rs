//! One-shot synchronously-flushing future.
//!
//! The legacy compile step is synchronous, but the modern injector it needs
//! may only become available after an asynchronous module load. A
//! `SyncPromise` parks itself in the owning DOM node's data slot so the link
//! function can return immediately; on resolution it overwrites that slot
//! with the real value, so later synchronous lookups bypass the future
//! entirely, and drops its node handle so the element is not retained.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::dom::{BridgeNode, NodeHandle};

pub struct SyncPromise<T: Clone + 'static> {
    resolved: RefCell<Option<T>>,
    callbacks: RefCell<Vec<Box<dyn FnOnce(&T)>>>,
    slot: RefCell<Option<(NodeHandle, String)>>,
}

impl<T: Clone + 'static> SyncPromise<T> {
    pub fn new() -> Rc<Self> {
        Rc::new(SyncPromise {
            resolved: RefCell::new(None),
            callbacks: RefCell::new(Vec::new()),
            slot: RefCell::new(None),
        })
    }

    /// Create a promise and publish it in `node`'s data slot under `key`.
    pub fn park(node: &NodeHandle, key: &str) -> Rc<Self> {
        let promise = Self::new();
        node.set_data(key, promise.clone() as Rc<dyn Any>);
        *promise.slot.borrow_mut() = Some((node.clone(), key.to_string()));
        promise
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.borrow().is_some()
    }

    /// Run `callback` with the value: synchronously right now if already
    /// resolved, otherwise once at resolution, in registration order.
    pub fn then(&self, callback: impl FnOnce(&T) + 'static) {
        let resolved = self.resolved.borrow();
        if let Some(value) = resolved.as_ref() {
            callback(value);
        } else {
            drop(resolved);
            self.callbacks.borrow_mut().push(Box::new(callback));
        }
    }

    /// Resolve exactly once. A second call is a no-op: flushed callbacks are
    /// never re-fired.
    pub fn resolve(&self, value: T) {
        if self.resolved.borrow().is_some() {
            return;
        }
        *self.resolved.borrow_mut() = Some(value.clone());

        // Replace the parked promise with the plain value and release the
        // node handle.
        if let Some((node, key)) = self.slot.borrow_mut().take() {
            node.set_data(&key, Rc::new(value.clone()) as Rc<dyn Any>);
        }

        let callbacks: Vec<Box<dyn FnOnce(&T)>> =
            self.callbacks.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback(&value);
        }
    }
}

/// What a synchronous lookup of a promise-bearing data slot finds.
pub enum SlotLookup<T: Clone + 'static> {
    Pending(Rc<SyncPromise<T>>),
    Resolved(T),
    Absent,
}

pub fn lookup_slot<T: Clone + 'static>(node: &BridgeNode, key: &str) -> SlotLookup<T> {
    match node.get_data(key) {
        None => SlotLookup::Absent,
        Some(data) => {
            if let Ok(promise) = data.clone().downcast::<SyncPromise<T>>() {
                SlotLookup::Pending(promise)
            } else if let Ok(value) = data.downcast::<T>() {
                SlotLookup::Resolved((*value).clone())
            } else {
                SlotLookup::Absent
            }
        }
    }
}
