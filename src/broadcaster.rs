//! Fire-and-forget activity events.

use crate::dispatch::DispatchTarget;
use crate::subscriptions::{SubscriberRegistry, Subscription};
use std::sync::Arc;

/// Delivers transient events to the listeners registered at emit time.
///
/// Nothing is buffered or replayed: a listener added after an emission
/// never sees it. This is the counterpart of state subscriptions, which
/// always start from the latest record.
pub struct EventBroadcaster<A> {
    listeners: Arc<SubscriberRegistry<A>>,
}

impl<A: Clone + Send + 'static> EventBroadcaster<A> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(SubscriberRegistry::new("activity")),
        }
    }

    /// Deliver `event` to each current listener once, in registration order.
    ///
    /// Listeners registered while this runs are not invoked for it;
    /// listeners disposed before their turn are skipped.
    pub fn emit(&self, event: A) {
        self.listeners.broadcast(&event, |_| true);
    }

    pub fn add_listener(
        &self,
        target: DispatchTarget,
        callback: impl Fn(&A) + Send + Sync + 'static,
    ) -> Subscription {
        self.listeners.subscribe(target, Arc::new(callback), 0)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<A: Clone + Send + 'static> Default for EventBroadcaster<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Drop for EventBroadcaster<A> {
    fn drop(&mut self) {
        let disposed = self.listeners.clear();
        if disposed > 0 {
            tracing::debug!(disposed, "event broadcaster torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    enum Activity {
        Saved,
        Failed(String),
    }

    #[test]
    fn test_emit_reaches_each_listener_once_in_order() {
        let broadcaster = EventBroadcaster::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let subs: Vec<_> = (0..4)
            .map(|i| {
                let log = Arc::clone(&log);
                broadcaster.add_listener(DispatchTarget::Immediate, move |a: &Activity| {
                    log.lock().push((i, a.clone()))
                })
            })
            .collect();

        broadcaster.emit(Activity::Saved);
        let expected: Vec<_> = (0..4).map(|i| (i, Activity::Saved)).collect();
        assert_eq!(*log.lock(), expected);
        drop(subs);
    }

    #[test]
    fn test_listener_added_during_emit_misses_it() {
        let broadcaster = Arc::new(EventBroadcaster::<Activity>::new());
        let late_hits = Arc::new(Mutex::new(0));
        let late_subs = Arc::new(Mutex::new(Vec::new()));

        let _adder = {
            let weak = Arc::downgrade(&broadcaster);
            let late_hits = Arc::clone(&late_hits);
            let late_subs = Arc::clone(&late_subs);
            broadcaster.add_listener(DispatchTarget::Immediate, move |_| {
                if let Some(b) = weak.upgrade() {
                    let hits = Arc::clone(&late_hits);
                    let sub = b.add_listener(DispatchTarget::Immediate, move |_| {
                        *hits.lock() += 1;
                    });
                    late_subs.lock().push(sub);
                }
            })
        };

        broadcaster.emit(Activity::Saved);
        assert_eq!(*late_hits.lock(), 0);
        assert_eq!(broadcaster.listener_count(), 2);

        broadcaster.emit(Activity::Failed("disk".into()));
        // The listener added by the first emit sees the second one.
        assert_eq!(*late_hits.lock(), 1);
        late_subs.lock().clear();
    }

    #[test]
    fn test_listener_removed_before_its_turn() {
        let broadcaster = EventBroadcaster::<Activity>::new();
        let second_hits = Arc::new(Mutex::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let _first = {
            let victim = Arc::clone(&victim);
            broadcaster.add_listener(DispatchTarget::Immediate, move |_| {
                if let Some(sub) = victim.lock().take() {
                    sub.dispose();
                }
            })
        };
        let second = {
            let hits = Arc::clone(&second_hits);
            broadcaster.add_listener(DispatchTarget::Immediate, move |_| *hits.lock() += 1)
        };
        *victim.lock() = Some(second);

        broadcaster.emit(Activity::Saved);
        assert_eq!(*second_hits.lock(), 0);
        assert_eq!(broadcaster.listener_count(), 1);
    }

    #[test]
    fn test_no_delivery_after_dispose() {
        let broadcaster = EventBroadcaster::<Activity>::new();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let sub = broadcaster.add_listener(DispatchTarget::Immediate, move |_| *h.lock() += 1);

        broadcaster.emit(Activity::Saved);
        sub.dispose();
        broadcaster.emit(Activity::Saved);
        assert_eq!(*hits.lock(), 1);
    }
}
