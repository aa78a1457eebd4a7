//! Subscription identifiers and handles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

/// Unique identifier for a subscription within one registry.
///
/// Ids are handed out in increasing order, so sorting by id gives
/// registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registry side of a handle.
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId);
    fn is_registered(&self, id: SubscriptionId) -> bool;
}

/// Handle to a registered observer.
///
/// Dropping the handle disposes it. Call [`Subscription::detach`] to keep the
/// observer registered for as long as its source lives instead.
#[must_use = "dropping a Subscription disposes it immediately"]
pub struct Subscription {
    id: SubscriptionId,
    source: Weak<dyn Unsubscribe>,
    disposed: AtomicBool,
    detached: bool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, source: Weak<dyn Unsubscribe>) -> Self {
        Self {
            id,
            source,
            disposed: AtomicBool::new(false),
            detached: false,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop all future deliveries. Idempotent.
    ///
    /// A delivery already queued on an asynchronous target still runs.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.id);
        }
    }

    /// True until disposed or until the source is torn down.
    pub fn is_active(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
            && self
                .source
                .upgrade()
                .map(|source| source.is_registered(self.id))
                .unwrap_or(false)
    }

    /// Give up the handle without disposing.
    ///
    /// The observer stays registered until its source is dropped.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
