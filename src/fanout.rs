//! # Ordered publish/subscribe primitive.
//!
//! [`Fanout`] holds an ordered list of subscribers and forwards a call to every one of
//! them. It knows nothing about what the call is: the caller passes a closure that invokes
//! the right trait method, so dispatch stays static.
//!
//! ## Rules
//! - **Registration order**: `emit` visits subscribers in the order they were added.
//! - **Duplicates allowed**: a subscriber added twice is called twice per `emit`.
//! - **Strict removal**: `remove` deletes the *first* matching entry (pointer identity) or
//!   fails with [`FanoutError::NotFound`].
//! - **Snapshot delivery**: `emit` works on a snapshot, so subscribers may add/remove
//!   entries from inside a callback; the change applies to the next `emit`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use jobvisor::Fanout;
//!
//! trait Ping: Send + Sync {
//!     fn ping(&self, n: usize);
//! }
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! impl Ping for Counter {
//!     fn ping(&self, n: usize) {
//!         self.0.fetch_add(n, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(Counter::default());
//! let fanout: Fanout<dyn Ping> = Fanout::new();
//! fanout.add(counter.clone());
//! fanout.add(counter.clone());
//! fanout.emit(|sub| sub.ping(2));
//! assert_eq!(counter.0.load(Ordering::SeqCst), 4);
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::FanoutError;

/// Ordered list of subscribers receiving every broadcast.
pub struct Fanout<T: ?Sized> {
    subs: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> Fanout<T> {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(Vec::new()),
        }
    }

    /// Creates a fan-out pre-populated in the given order.
    #[must_use]
    pub fn with_subscribers(subs: Vec<Arc<T>>) -> Self {
        Self {
            subs: RwLock::new(subs),
        }
    }

    /// Appends a subscriber.
    pub fn add(&self, sub: Arc<T>) {
        self.subs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sub);
    }

    /// Removes the first entry that is the same allocation as `sub`.
    pub fn remove(&self, sub: &Arc<T>) -> Result<(), FanoutError> {
        let mut subs = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        let pos = subs
            .iter()
            .position(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(sub)))
            .ok_or(FanoutError::NotFound)?;
        subs.remove(pos);
        Ok(())
    }

    /// Number of registered entries (duplicates counted).
    pub fn len(&self) -> usize {
        self.subs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current subscribers in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.subs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls `f` once per registered entry, in registration order.
    pub fn emit<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        for sub in self.snapshot() {
            f(&sub);
        }
    }
}

impl<T: ?Sized> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Fanout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("subscribers", &self.len())
            .finish()
    }
}
