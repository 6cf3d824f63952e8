//! Event Bus for notifying the game-state layer.
//!
//! The EventBus provides a push-based subscription model: subscribers register
//! callbacks that are invoked, in registration order, every time an event is
//! emitted. Each component (connection, queue) owns its own bus.
//!
//! A panicking listener is logged and skipped; the remaining listeners still
//! see the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync + 'static>;
type Filter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync + 'static>;

struct Listener<E> {
    id: u64,
    filter: Option<Filter<E>>,
    callback: Callback<E>,
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            filter: self.filter.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Registry<E> {
    next_id: u64,
    listeners: Vec<Listener<E>>,
}

impl<E> Registry<E> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }
}

/// Type-erased handle used by [`Subscription`] to reach its registry.
trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64) -> bool;
}

impl<E: 'static> Unsubscribe for Mutex<Registry<E>> {
    fn unsubscribe(&self, id: u64) -> bool {
        self.lock().unwrap_or_else(PoisonError::into_inner).remove(id)
    }
}

/// Disposer returned by [`EventBus::subscribe`].
///
/// Dropping a `Subscription` does NOT unsubscribe. Call `dispose()` to remove
/// the listener.
#[must_use = "keep the subscription to be able to dispose the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<dyn Unsubscribe>,
}

impl Subscription {
    /// Remove the listener. Returns false if it was already gone.
    pub fn dispose(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Listener registry for events of type `E`.
///
/// Cloning shares the registry.
pub struct EventBus<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventBus<E> {
    /// Create a new EventBus with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to every event.
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        self.register(None, Arc::new(callback))
    }

    /// Subscribe to the events accepted by `filter`.
    pub fn subscribe_where(
        &self,
        filter: impl Fn(&E) -> bool + Send + Sync + 'static,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription {
        self.register(Some(Arc::new(filter)), Arc::new(callback))
    }

    fn register(&self, filter: Option<Filter<E>>, callback: Callback<E>) -> Subscription {
        let id = {
            let mut registry = self.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push(Listener {
                id,
                filter,
                callback,
            });
            id
        };

        let registry: Arc<dyn Unsubscribe> = self.registry.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Deliver an event to all matching subscribers, in registration order.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// dispose from inside the callback. Returns how many listeners ran to
    /// completion.
    pub fn emit(&self, event: &E) -> usize {
        let listeners: Vec<Listener<E>> = self.lock().listeners.clone();

        let mut delivered = 0;
        for listener in listeners {
            if let Some(filter) = &listener.filter {
                if !filter(event) {
                    continue;
                }
            }
            let callback = &listener.callback;
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    tracing::error!(
                        listener_id = listener.id,
                        panic = %message,
                        "Event listener panicked; continuing with remaining listeners"
                    );
                }
            }
        }
        delivered
    }

    /// Get the number of subscribers.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}
