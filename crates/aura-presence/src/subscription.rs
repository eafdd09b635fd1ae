//! Listener registries with RAII unsubscribe tokens, and the session
//! identity plumbing shared by capture and transcription.
//!
//! Registering or removing a listener never touches the device behind a
//! session; only `start`/`stop` do.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one open period of a session.
///
/// Every `start` mints a fresh id; events carry the id of the session that
/// produced them so late deliveries from a closed session can be told apart
/// from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An event tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent<E> {
    pub session: SessionId,
    pub event: E,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct ListenerSet<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// Registry of event listeners.
pub struct Listeners<E> {
    inner: Arc<Mutex<ListenerSet<E>>>,
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: 'static> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> Listeners<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut set = lock(&self.inner);
            let id = set.next_id;
            set.next_id += 1;
            set.entries.push((id, Arc::new(listener)));
            id
        };

        let registry: Weak<Mutex<ListenerSet<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Deliver an event to every registered listener, in registration order.
    ///
    /// The registry lock is released before listeners run, so a listener may
    /// drop its own subscription.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Callback<E>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unsubscribe token returned by [`Listeners::subscribe`].
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// Gate between a device callback thread and a session's listeners.
///
/// Holds the id of the session currently allowed to deliver. Delivery runs
/// with the gate locked, so [`close`](Self::close) waits for any in-flight
/// delivery and nothing is delivered once it returns.
#[derive(Clone, Default)]
pub(crate) struct DeliveryGate {
    open: Arc<Mutex<Option<SessionId>>>,
}

impl DeliveryGate {
    pub fn open(&self, session: SessionId) {
        *lock(&self.open) = Some(session);
    }

    /// Close the gate. Returns the session that was open.
    pub fn close(&self) -> Option<SessionId> {
        lock(&self.open).take()
    }

    /// Close the gate only if `session` still owns it.
    pub fn close_if(&self, session: SessionId) -> bool {
        let mut open = lock(&self.open);
        if *open == Some(session) {
            *open = None;
            true
        } else {
            false
        }
    }

    pub fn is_open_for(&self, session: SessionId) -> bool {
        *lock(&self.open) == Some(session)
    }

    /// Run `deliver` if `session` still owns the gate.
    ///
    /// `deliver` must not call back into the owning session.
    pub fn deliver(&self, session: SessionId, deliver: impl FnOnce()) -> bool {
        let open = lock(&self.open);
        if *open != Some(session) {
            return false;
        }
        deliver();
        drop(open);
        true
    }
}
