//! Registered combinations and their listeners
//!
//! Copy-on-write: writers swap in a new `Arc<Vec<..>>` under a lock,
//! readers take one snapshot per matching pass. A registration added
//! concurrently either takes part in a whole pass or not at all.

mod combination;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::events::HotkeyEvent;

pub use combination::Combination;

/// Callback invoked for every event of a registration
pub type Listener = Arc<dyn Fn(HotkeyEvent) + Send + Sync + 'static>;

/// Identifier unique within one registry
pub type RegistrationId = u64;

/// Immutable view of the registry at one point in time
pub type Snapshot = Arc<Vec<Arc<Registration>>>;

/// A combination bound to a listener
pub struct Registration {
    id: RegistrationId,
    combination: Combination,
    listener: Listener,
    subscribed: AtomicBool,
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn combination(&self) -> &Combination {
        &self.combination
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Cleared by unsubscribe before the registry entry is removed
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("combination", &self.combination.to_string())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

struct Inner {
    next_id: AtomicU64,
    entries: RwLock<Snapshot>,
}

impl Inner {
    fn remove(&self, id: RegistrationId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let next: Vec<_> = entries.iter().filter(|r| r.id != id).cloned().collect();
        *entries = Arc::new(next);
    }
}

/// Thread-safe store of registrations
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                entries: RwLock::new(Arc::new(Vec::new())),
            }),
        }
    }

    /// Append a registration and return its subscription handle
    pub fn insert(&self, combination: Combination, listener: Listener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            combination,
            listener,
            subscribed: AtomicBool::new(true),
        });

        {
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let mut next = Vec::with_capacity(entries.len() + 1);
            next.extend(entries.iter().cloned());
            next.push(Arc::clone(&registration));
            *entries = Arc::new(next);
        }

        debug!(id, combination = %registration.combination, "registration added");

        Subscription {
            registration,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Current registrations, in insertion order
    pub fn snapshot(&self) -> Snapshot {
        let entries = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*entries)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `register`
///
/// Dropping it keeps the registration alive; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
    registration: Arc<Registration>,
    registry: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> RegistrationId {
        self.registration.id
    }

    pub fn combination(&self) -> &Combination {
        &self.registration.combination
    }

    pub fn is_subscribed(&self) -> bool {
        self.registration.is_subscribed()
    }

    /// Remove the registration; further calls do nothing
    ///
    /// Events already queued for it are discarded.
    pub fn unsubscribe(&self) {
        if !self.registration.subscribed.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.registration.id);
        }

        debug!(id = self.registration.id, "registration removed");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.registration).finish()
    }
}
