#![forbid(unsafe_code)]

//! Multicast event source with RAII subscriptions.
//!
//! # Design
//!
//! [`EventSource<E>`] keeps its handlers as `Weak` function pointers behind a
//! `parking_lot::Mutex`. [`EventSource::subscribe`] hands the only strong
//! reference back to the caller inside a [`Subscription`] guard, so dropping
//! the guard is all it takes to unsubscribe.
//!
//! # Invariants
//!
//! 1. Handlers are invoked in registration order.
//! 2. Handlers run outside the handler lock: a handler may subscribe,
//!    unsubscribe, or raise the same source again without deadlocking.
//! 3. A handler whose [`Subscription`] was dropped before [`EventSource::raise`]
//!    started is never invoked by that raise.
//!
//! # Failure Modes
//!
//! - **Concurrent unsubscribe**: a guard dropped on another thread while a
//!   raise is already dispatching may still see one final invocation. Handlers
//!   that capture `Weak` targets must tolerate a target that is shutting down.
//! - **Subscriber leak**: guards stored forever keep their handlers alive. Dead
//!   weak references are pruned lazily on every raise.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type HandlerArc<E> = Arc<dyn Fn(&E) + Send + Sync>;
type HandlerWeak<E> = Weak<dyn Fn(&E) + Send + Sync>;

/// A thread-safe list of event handlers.
pub struct EventSource<E> {
    handlers: Mutex<Vec<HandlerWeak<E>>>,
}

impl<E> Default for EventSource<E> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("handler_count", &self.handlers.lock().len())
            .finish()
    }
}

impl<E: 'static> EventSource<E> {
    /// Create an event source with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// Returns a [`Subscription`] guard. Dropping the guard unsubscribes the
    /// handler; the dead entry is pruned on the next `subscribe` or
    /// [`raise`](Self::raise).
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let strong: HandlerArc<E> = Arc::new(handler);
        let mut handlers = self.handlers.lock();
        handlers.retain(|w| w.strong_count() > 0);
        handlers.push(Arc::downgrade(&strong));
        drop(handlers);
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Invoke every live handler with `event` and prune dead ones.
    pub fn raise(&self, event: &E) {
        let live: Vec<HandlerArc<E>> = {
            let mut handlers = self.handlers.lock();
            handlers.retain(|w| w.strong_count() > 0);
            handlers.iter().filter_map(Weak::upgrade).collect()
        };

        for handler in &live {
            handler(event);
        }
    }

    /// Number of registered handlers, including dead ones not yet pruned.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Number of handlers whose guards are still alive.
    #[must_use]
    pub fn live_handler_count(&self) -> usize {
        self.handlers
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Whether at least one live handler is registered.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.handlers.lock().iter().any(|w| w.strong_count() > 0)
    }
}

/// RAII guard for an event handler.
///
/// Dropping the `Subscription` drops the only strong reference to the
/// handler, so the `Weak` kept by the source fails to upgrade from then on.
#[must_use = "dropping a Subscription immediately unsubscribes the handler"]
pub struct Subscription {
    _guard: Box<dyn Any + Send + Sync>,
}

impl Subscription {
    /// Unsubscribe explicitly. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
