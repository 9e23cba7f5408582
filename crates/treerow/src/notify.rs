#![forbid(unsafe_code)]

//! Change-notification plumbing for the projection.
//!
//! [`Emitter<T>`] is a plain observer list: callbacks register through
//! [`Emitter::subscribe`] and receive every emitted value, in
//! registration order. Unlike a value cell there is no deduplication —
//! a size-change is reported after *every* structural mutation, even
//! when the row count happens to be unchanged, because renderers use it
//! as an invalidation signal, not as a value feed.
//!
//! Subscribers are stored as `Weak` references; the strong reference
//! lives in the returned [`Subscription`] guard, so dropping the guard
//! unsubscribes. Dead entries are pruned lazily during emission.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

/// A shared observer list. Cloning creates a new handle to the same
/// subscriber set.
pub struct Emitter<T> {
    subscribers: Rc<RefCell<Vec<CallbackWeak<T>>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Rc::clone(&self.subscribers),
        }
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("subscriber_count", &self.subscribers.borrow().len())
            .finish()
    }
}

impl<T: 'static> Emitter<T> {
    /// Create an emitter with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register a callback. It is invoked for every emission until the
    /// returned [`Subscription`] guard is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Invoke all live subscribers with `value`, pruning dead entries.
    ///
    /// Callbacks run outside the subscriber-list borrow, so a callback
    /// may register or drop subscriptions without panicking.
    pub fn emit(&self, value: &T) {
        let live: Vec<CallbackRc<T>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|w| w.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in &live {
            callback(value);
        }
    }

    /// Number of registered subscribers, dead entries included until the
    /// next emission prunes them.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// RAII guard for a subscriber callback.
///
/// Dropping the guard drops the strong callback reference; the weak
/// entry in the emitter fails to upgrade from then on and is pruned on
/// the next emission.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
