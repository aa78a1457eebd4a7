//! The atomic state container.

use crate::changes::Changes;
use crate::dispatch::DispatchTarget;
use crate::error::Result;
use crate::logger::{CommitLog, StoreLogger};
use crate::mutation::{Lens, MutationSession, SessionPhase, Transaction};
use crate::store::StoreConfig;
use crate::subscriptions::{SubscriberRegistry, Subscription, SubscriptionId};
use crate::types::MutationTrace;
use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

thread_local! {
    /// Number of drains running on this thread, across all containers.
    static DRAIN_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// A delivery waiting to be fanned out, in commit order.
enum Delivery<S> {
    /// A committed record, for every subscriber registered before it.
    Commit(Changes<S>),
    /// The catch-up record for a new subscriber.
    Replay(SubscriptionId, Changes<S>),
}

/// Deliveries queued under the write lock, each with a ticket.
struct DeliveryQueue<S> {
    pending: VecDeque<(u64, Delivery<S>)>,
    /// Ticket handed to the most recently queued delivery.
    last_ticket: u64,
    /// Every delivery up to this ticket has been handed to its subscribers.
    delivered: u64,
    /// Some thread is draining `pending`.
    draining: bool,
}

/// Marks the current thread as draining for the lifetime of the guard.
struct DrainDepth;

impl DrainDepth {
    fn enter() -> Self {
        DRAIN_DEPTH.with(|d| d.set(d.get() + 1));
        DrainDepth
    }

    fn inside_drain() -> bool {
        DRAIN_DEPTH.with(|d| d.get() > 0)
    }
}

impl Drop for DrainDepth {
    fn drop(&mut self) {
        DRAIN_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Holds one state value, serializes mutations to it, and publishes a new
/// [`Changes`] record to every subscriber after each commit.
///
/// Mutation bodies run on a private copy of the current state while the
/// write lock is held. Only a successful body replaces the record. Delivery
/// happens after the write lock is released and completes before `mutate`
/// returns. A subscriber may mutate the same storage again; that nested
/// commit is queued and delivered right after the one being dispatched.
pub struct StateStorage<S> {
    name: String,

    /// Current record. Read locks are held only long enough to clone it.
    record: RwLock<Changes<S>>,

    /// Serializes mutation bodies.
    write_lock: Mutex<()>,

    subscribers: Arc<SubscriberRegistry<Changes<S>>>,

    deliveries: Mutex<DeliveryQueue<S>>,

    /// Signalled whenever `delivered` advances or a drainer stops.
    delivered_cv: Condvar,

    logger: Option<Arc<dyn StoreLogger>>,

    record_traces: bool,
}

impl<S: Clone + Send + Sync + 'static> StateStorage<S> {
    /// Create a container with the default configuration.
    pub fn new(initial: S) -> Self {
        Self::from_config(initial, StoreConfig::default())
    }

    /// Create a container, validating the configuration first.
    pub fn with_config(initial: S, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(initial, config))
    }

    fn from_config(initial: S, config: StoreConfig) -> Self {
        tracing::debug!(store = %config.name, "state storage created");
        Self {
            name: config.name,
            record: RwLock::new(Changes::initial(initial)),
            write_lock: Mutex::new(()),
            subscribers: Arc::new(SubscriberRegistry::new("state")),
            deliveries: Mutex::new(DeliveryQueue {
                pending: VecDeque::new(),
                last_ticket: 0,
                delivered: 0,
                draining: false,
            }),
            delivered_cv: Condvar::new(),
            logger: config.logger,
            record_traces: config.record_traces,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // --- Reads ---

    /// The current record.
    pub fn current(&self) -> Changes<S> {
        self.record.read().clone()
    }

    /// The current state value.
    pub fn snapshot(&self) -> Arc<S> {
        self.record.read().current_arc()
    }

    /// Version of the current record (number of commits so far).
    pub fn commit_version(&self) -> u64 {
        self.record.read().version()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // --- Writes ---

    /// Mutate the whole state.
    #[track_caller]
    pub fn mutate<R>(
        &self,
        label: impl Into<String>,
        body: impl FnOnce(&mut MutationSession<'_, S>) -> R,
    ) -> R {
        let trace = MutationTrace::new(label);
        match self.run_session(trace, |session| Ok::<R, Infallible>(body(session))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Mutate the whole state with a body that can fail.
    ///
    /// On `Err` the record is left untouched and nobody is notified.
    #[track_caller]
    pub fn try_mutate<R, E>(
        &self,
        label: impl Into<String>,
        body: impl FnOnce(&mut MutationSession<'_, S>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let trace = MutationTrace::new(label);
        self.run_session(trace, body)
    }

    /// Mutate a projected sub-region of the state.
    #[track_caller]
    pub fn mutate_scoped<T, R>(
        &self,
        label: impl Into<String>,
        lens: &Lens<S, T>,
        body: impl FnOnce(&mut MutationSession<'_, T>) -> R,
    ) -> R {
        let trace = MutationTrace::new(label);
        let result = self.run_session(trace, |session| {
            Ok::<R, Infallible>(session.scoped(lens, body))
        });
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`StateStorage::mutate_scoped`].
    #[track_caller]
    pub fn try_mutate_scoped<T, R, E>(
        &self,
        label: impl Into<String>,
        lens: &Lens<S, T>,
        body: impl FnOnce(&mut MutationSession<'_, T>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let trace = MutationTrace::new(label);
        self.run_session(trace, |session| session.scoped(lens, body))
    }

    /// Run one mutation session and, on success, commit and deliver.
    fn run_session<R, E>(
        &self,
        trace: MutationTrace,
        body: impl FnOnce(&mut MutationSession<'_, S>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        let started = Instant::now();
        let mut phase = SessionPhase::Idle;

        phase.advance(SessionPhase::Acquiring, &self.name);
        let guard = self.write_lock.lock();
        phase.advance(SessionPhase::Active, &self.name);

        let base = self.record.read().clone();
        let mut state = base.current().clone();
        let mut traces = Vec::with_capacity(1);
        let mut transaction = Transaction::new();

        traces.push(trace);
        let outcome = {
            let mut session = MutationSession::new(&mut state, &mut traces, &mut transaction);
            body(&mut session)
        };

        let value = match outcome {
            Ok(value) => value,
            Err(e) => {
                phase.advance(SessionPhase::Closed, &self.name);
                tracing::debug!(store = %self.name, "mutation failed, state unchanged");
                return Err(e);
            }
        };

        phase.advance(SessionPhase::Committing, &self.name);
        if !self.record_traces {
            traces.clear();
        }
        let next = base.make_next(state, traces);
        *self.record.write() = next.clone();
        let ticket = self.enqueue(Delivery::Commit(next.clone()));

        if let Some(logger) = &self.logger {
            logger.did_commit(&CommitLog {
                store_name: &self.name,
                old_version: base.version(),
                new_version: next.version(),
                traces: next.traces(),
                transaction: &transaction,
                elapsed: started.elapsed(),
            });
        }

        drop(guard);
        phase.advance(SessionPhase::Closed, &self.name);

        self.deliver_through(ticket);
        Ok(value)
    }

    // --- Subscriptions ---

    /// Register a state observer.
    ///
    /// Unless `drops_first` is set, the callback first receives the current
    /// record with its previous snapshot dropped, so every comparison on that
    /// first delivery reports a change. With `drops_first` the first call
    /// comes from the next commit.
    pub fn subscribe(
        &self,
        drops_first: bool,
        target: DispatchTarget,
        callback: impl Fn(&Changes<S>) + Send + Sync + 'static,
    ) -> Subscription {
        let (subscription, ticket) = {
            let _guard = self.write_lock.lock();
            let current = self.record.read().clone();
            let registered_at = current.version();
            let callback = Arc::new(callback);
            let subscription = self.subscribers.subscribe(target, callback, registered_at);
            let ticket = if drops_first {
                None
            } else {
                let replay = Delivery::Replay(subscription.id(), current.dropped_previous());
                Some(self.enqueue(replay))
            };
            (subscription, ticket)
        };

        if let Some(ticket) = ticket {
            self.deliver_through(ticket);
        }
        subscription
    }

    // --- Delivery ---

    /// Queue a delivery. Must be called with the write lock held so tickets
    /// follow commit order.
    fn enqueue(&self, delivery: Delivery<S>) -> u64 {
        let mut queue = self.deliveries.lock();
        queue.last_ticket += 1;
        let ticket = queue.last_ticket;
        queue.pending.push_back((ticket, delivery));
        ticket
    }

    /// Return once delivery `ticket` has been handed to its subscribers.
    ///
    /// Only one thread drains at a time. Other callers block until the
    /// drainer reaches their ticket, or take over if it stops first. A call
    /// made from inside a subscriber callback never blocks: the drain that
    /// is already running on this thread, or on another one, delivers it.
    fn deliver_through(&self, ticket: u64) {
        let reentrant = DrainDepth::inside_drain();
        let mut queue = self.deliveries.lock();
        loop {
            if queue.delivered >= ticket {
                return;
            }
            if !queue.draining {
                queue.draining = true;
                drop(queue);
                self.drain();
                queue = self.deliveries.lock();
                continue;
            }
            if reentrant {
                return;
            }
            self.delivered_cv.wait(&mut queue);
        }
    }

    /// Deliver queued records until none are left.
    ///
    /// A panicking callback does not stop the drain: the remaining records
    /// are still delivered, then the first panic is resumed on this thread.
    fn drain(&self) {
        let _depth = DrainDepth::enter();
        let mut first_panic = None;

        loop {
            let (ticket, delivery) = {
                let mut queue = self.deliveries.lock();
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.deliver(delivery)));

            self.deliveries.lock().delivered = ticket;
            self.delivered_cv.notify_all();

            if let Err(payload) = outcome {
                tracing::warn!(store = %self.name, ticket, "subscriber panicked during delivery");
                first_panic.get_or_insert(payload);
            }
        }

        self.delivered_cv.notify_all();
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }
    }

    fn deliver(&self, delivery: Delivery<S>) {
        match delivery {
            Delivery::Commit(changes) => {
                let version = changes.version();
                tracing::trace!(store = %self.name, version, "delivering commit");
                self.subscribers.broadcast(&changes, |registered_at| registered_at < version);
            }
            Delivery::Replay(id, changes) => {
                self.subscribers.send_to(id, &changes);
            }
        }
    }
}

impl<S> Drop for StateStorage<S> {
    fn drop(&mut self) {
        let disposed = self.subscribers.clear();
        tracing::debug!(store = %self.name, disposed, "state storage torn down");
        if let Some(logger) = &self.logger {
            logger.did_tear_down(&self.name, disposed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioned::{Versioned, VersionedField};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Counter {
        count: u32,
        label: String,
    }

    fn collect(
        storage: &StateStorage<Counter>,
        drops_first: bool,
    ) -> (Subscription, Arc<Mutex<Vec<Changes<Counter>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = storage.subscribe(drops_first, DispatchTarget::Immediate, move |c| {
            sink.lock().push(c.clone())
        });
        (sub, seen)
    }

    #[test]
    fn test_initial_record() {
        let storage = StateStorage::new(Counter::default());
        let current = storage.current();
        assert!(current.previous().is_none());
        assert_eq!(current.version(), 0);
        assert_eq!(storage.snapshot().count, 0);
    }

    #[test]
    fn test_mutate_commits_and_chains_records() {
        let storage = StateStorage::new(Counter::default());

        let returned = storage.mutate("bump", |s| {
            s.count += 1;
            s.count
        });
        assert_eq!(returned, 1);

        storage.mutate("bump", |s| s.count += 1);
        let current = storage.current();
        assert_eq!(current.version(), 2);
        assert_eq!(current.current().count, 2);
        assert_eq!(current.previous().map(|p| p.count), Some(1));
        assert_eq!(current.traces().len(), 1);
        assert_eq!(current.traces()[0].label, "bump");
    }

    #[test]
    fn test_failed_mutation_is_noop() {
        let storage = StateStorage::new(Counter::default());
        let (_sub, seen) = collect(&storage, true);

        let result: std::result::Result<(), &str> = storage.try_mutate("fail", |s| {
            s.count = 99;
            Err("nope")
        });

        assert_eq!(result, Err("nope"));
        assert_eq!(storage.snapshot().count, 0);
        assert_eq!(storage.commit_version(), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_subscribe_replays_current_as_changed() {
        let storage = StateStorage::new(Counter::default());
        storage.mutate("bump", |s| s.count += 1);
        storage.mutate("noop", |_| ());

        let (_sub, seen) = collect(&storage, false);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].previous().is_none());
        assert!(seen[0].has_changes(|s| s.count));
        assert_eq!(seen[0].version(), 2);
    }

    #[test]
    fn test_drops_first_skips_replay() {
        let storage = StateStorage::new(Counter::default());
        let (_sub, seen) = collect(&storage, true);
        assert!(seen.lock().is_empty());

        storage.mutate("bump", |s| s.count += 1);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].version(), 1);
        assert!(seen[0].previous().is_some());
    }

    #[test]
    fn test_scoped_mutation() {
        let storage = StateStorage::new(Counter::default());
        let label = crate::lens!(Counter, label);

        storage.mutate_scoped("rename", &label, |l| l.push_str("clicks"));
        assert_eq!(storage.snapshot().label, "clicks");

        let failed: std::result::Result<(), ()> =
            storage.try_mutate_scoped("rename", &label, |l| {
                l.clear();
                Err(())
            });
        assert!(failed.is_err());
        assert_eq!(storage.snapshot().label, "clicks");
    }

    #[test]
    fn test_version_compare_through_storage() {
        #[derive(Clone, Default)]
        struct Doc {
            title: String,
            body: VersionedField<Vec<String>>,
        }

        let storage = StateStorage::new(Doc::default());
        storage.mutate("title", |d| d.title.push('x'));
        assert!(!storage.current().compare_by_version(|d| &d.body).is_changed());

        storage.mutate("body", |d| d.body.push("para".to_string()));
        let current = storage.current();
        assert!(current.compare_by_version(|d| &d.body).is_changed());
        assert_eq!(current.current().body.version().value(), 1);
    }

    #[test]
    fn test_disabled_traces() {
        let config = StoreConfig {
            record_traces: false,
            ..Default::default()
        };
        let storage = StateStorage::with_config(Counter::default(), config).unwrap();
        storage.mutate("bump", |s| {
            s.append_trace("inner");
            s.count += 1
        });
        assert!(storage.current().traces().is_empty());
    }

    #[test]
    fn test_teardown_disposes_subscriptions() {
        let storage = StateStorage::new(Counter::default());
        let (sub, _seen) = collect(&storage, true);
        assert!(sub.is_active());
        drop(storage);
        assert!(!sub.is_active());
    }
}
