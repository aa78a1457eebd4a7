//! Ordered registry of observers, shared by state storage and the
//! activity broadcaster.

use crate::dispatch::DispatchTarget;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::types::{Subscription, SubscriptionId, Unsubscribe};

/// Observer callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Internal subscriber state.
struct Subscriber<T> {
    target: DispatchTarget,
    callback: Callback<T>,
    /// Source watermark at registration (commit version for state storage).
    registered_at: u64,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            callback: Arc::clone(&self.callback),
            registered_at: self.registered_at,
        }
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    fn deliver(&self, value: &T) {
        match &self.target {
            DispatchTarget::Immediate => (self.callback)(value),
            target => {
                let callback = Arc::clone(&self.callback);
                let value = value.clone();
                target.dispatch(Box::new(move || callback(&value)));
            }
        }
    }
}

/// Manages observers and fans values out to them.
pub(crate) struct SubscriberRegistry<T> {
    /// What is being observed, for log fields.
    kind: &'static str,
    /// Live subscribers by id. Iteration order is registration order.
    subscribers: RwLock<BTreeMap<SubscriptionId, Subscriber<T>>>,
    next_id: AtomicU64,
}

impl<T> SubscriberRegistry<T> {
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Force-dispose every subscriber. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut subs = self.subscribers.write();
        let count = subs.len();
        subs.clear();
        count
    }
}

impl<T: Clone + Send + 'static> SubscriberRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer and return its disposer.
    pub fn subscribe(
        self: &Arc<Self>,
        target: DispatchTarget,
        callback: Callback<T>,
        registered_at: u64,
    ) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().insert(
            id,
            Subscriber {
                target,
                callback,
                registered_at,
            },
        );
        tracing::trace!(kind = self.kind, id = id.0, "subscribed");

        let weak: Weak<Self> = Arc::downgrade(self);
        let source: Weak<dyn Unsubscribe> = weak;
        Subscription::new(id, source)
    }

    /// Deliver `value` to every subscriber registered right now.
    ///
    /// The list is snapshotted first: subscribers added during delivery
    /// wait for the next value, subscribers removed before their turn are
    /// skipped. `accept` sees each subscriber's registration watermark.
    pub fn broadcast(&self, value: &T, accept: impl Fn(u64) -> bool) {
        let snapshot: Vec<(SubscriptionId, Subscriber<T>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect();

        for (id, sub) in snapshot {
            if !accept(sub.registered_at) || !self.contains(id) {
                continue;
            }
            sub.deliver(value);
        }
    }

    /// Deliver `value` to one subscriber, if it is still registered.
    pub fn send_to(&self, id: SubscriptionId, value: &T) -> bool {
        let sub = self.subscribers.read().get(&id).cloned();
        match sub {
            Some(sub) => {
                sub.deliver(value);
                true
            }
            None => false,
        }
    }
}

impl<T: Clone + Send + 'static> Unsubscribe for SubscriberRegistry<T> {
    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.write().remove(&id).is_some() {
            tracing::trace!(kind = self.kind, id = id.0, "unsubscribed");
        }
    }

    fn is_registered(&self, id: SubscriptionId) -> bool {
        self.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<(u32, i32)>>>, tag: u32) -> Callback<i32> {
        let log = Arc::clone(log);
        Arc::new(move |v: &i32| log.lock().push((tag, *v)))
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let handle = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 1), 0);
        assert_eq!(registry.len(), 1);
        assert!(handle.is_active());

        handle.dispose();
        assert_eq!(registry.len(), 0);
        assert!(!handle.is_active());

        // Idempotent.
        handle.dispose();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_broadcast_in_registration_order() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 1), 0);
        let _b = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 2), 0);
        let _c = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 3), 0);

        registry.broadcast(&7, |_| true);
        assert_eq!(*log.lock(), vec![(1, 7), (2, 7), (3, 7)]);
    }

    #[test]
    fn test_watermark_filter() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let _old = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 1), 0);
        let _new = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 2), 5);

        registry.broadcast(&5, |at| at < 5);
        assert_eq!(*log.lock(), vec![(1, 5)]);
    }

    #[test]
    fn test_drop_handle_disposes_detach_does_not() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new("test"));
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let _scoped = registry.subscribe(DispatchTarget::Immediate, recorder(&log, 1), 0);
        }
        assert_eq!(registry.len(), 0);

        registry
            .subscribe(DispatchTarget::Immediate, recorder(&log, 2), 0)
            .detach();
        assert_eq!(registry.len(), 1);

        registry.broadcast(&1, |_| true);
        assert_eq!(*log.lock(), vec![(2, 1)]);
    }

    #[test]
    fn test_handle_outlives_registry() {
        let registry = Arc::new(SubscriberRegistry::<i32>::new("test"));
        let handle = registry.subscribe(DispatchTarget::Immediate, Arc::new(|_: &i32| {}), 0);
        drop(registry);
        assert!(!handle.is_active());
        handle.dispose();
    }
}
