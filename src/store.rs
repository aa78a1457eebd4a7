//! Main Store struct tying state storage, activities and diagnostics together.

use crate::broadcaster::EventBroadcaster;
use crate::changes::Changes;
use crate::dispatch::DispatchTarget;
use crate::driver::Driver;
use crate::error::{Result, StoreError};
use crate::logger::{ActivityLog, StoreLogger};
use crate::mutation::{Lens, MutationSession};
use crate::storage::StateStorage;
use crate::subscriptions::Subscription;
use crate::types::ActivityTrace;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Name used in log fields.
    pub name: String,

    /// Diagnostics sink. Called while the write lock is held, so it must
    /// not mutate the store it observes.
    pub logger: Option<Arc<dyn StoreLogger>>,

    /// Keep mutation traces in committed records.
    pub record_traces: bool,
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_logger(mut self, logger: impl StoreLogger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "store name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            logger: None,
            record_traces: true,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("logger", &self.logger.is_some())
            .field("record_traces", &self.record_traces)
            .finish()
    }
}

/// Accumulates a value over every delivery a subscriber receives.
pub struct Scan<Input, Acc> {
    accumulated: Acc,
    update: Box<dyn FnMut(&mut Acc, &Input) + Send>,
}

impl<Input, Acc> Scan<Input, Acc> {
    pub fn new(initial: Acc, update: impl FnMut(&mut Acc, &Input) + Send + 'static) -> Self {
        Self {
            accumulated: initial,
            update: Box::new(update),
        }
    }

    /// Fold `input` in and return the new accumulated value.
    pub fn accumulate(&mut self, input: &Input) -> &Acc {
        (self.update)(&mut self.accumulated, input);
        &self.accumulated
    }

    pub fn value(&self) -> &Acc {
        &self.accumulated
    }
}

/// A state container with an activity channel.
///
/// `S` is the state; `A` is the type of transient activities sent alongside
/// it. Stores that never send activities can leave `A` as `()`.
pub struct Store<S, A = ()> {
    name: String,
    logger: Option<Arc<dyn StoreLogger>>,
    storage: StateStorage<S>,
    activities: EventBroadcaster<A>,
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
{
    pub fn new(initial: S) -> Self {
        let config = StoreConfig::default();
        Self {
            name: config.name.clone(),
            logger: config.logger.clone(),
            storage: StateStorage::new(initial),
            activities: EventBroadcaster::new(),
        }
    }

    pub fn with_config(initial: S, config: StoreConfig) -> Result<Self> {
        let name = config.name.clone();
        let logger = config.logger.clone();
        let storage = StateStorage::with_config(initial, config)?;
        Ok(Self {
            name,
            logger,
            storage,
            activities: EventBroadcaster::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn logger(&self) -> Option<&Arc<dyn StoreLogger>> {
        self.logger.as_ref()
    }

    /// The underlying container.
    pub fn storage(&self) -> &StateStorage<S> {
        &self.storage
    }

    // --- State ---

    /// The latest change record.
    pub fn state(&self) -> Changes<S> {
        self.storage.current()
    }

    #[track_caller]
    pub fn commit<R>(
        &self,
        name: impl Into<String>,
        mutation: impl FnOnce(&mut MutationSession<'_, S>) -> R,
    ) -> R {
        self.storage.mutate(name, mutation)
    }

    #[track_caller]
    pub fn try_commit<R, E>(
        &self,
        name: impl Into<String>,
        mutation: impl FnOnce(&mut MutationSession<'_, S>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E> {
        self.storage.try_mutate(name, mutation)
    }

    /// Subscribe to state changes.
    ///
    /// The first delivery always reports changes unless `drops_first` is
    /// set, in which case the first call comes from the next commit.
    pub fn sink_state(
        &self,
        drops_first: bool,
        target: DispatchTarget,
        receive: impl Fn(&Changes<S>) + Send + Sync + 'static,
    ) -> Subscription {
        self.storage.subscribe(drops_first, target, receive)
    }

    /// Subscribe with an accumulator that is updated before each delivery.
    pub fn sink_state_scan<Acc>(
        &self,
        scan: Scan<Changes<S>, Acc>,
        drops_first: bool,
        target: DispatchTarget,
        receive: impl Fn(&Changes<S>, &Acc) + Send + Sync + 'static,
    ) -> Subscription
    where
        Acc: Send + 'static,
    {
        let scan = Mutex::new(scan);
        self.storage.subscribe(drops_first, target, move |changes| {
            let mut scan = scan.lock();
            let accumulated = scan.accumulate(changes);
            receive(changes, accumulated);
        })
    }

    // --- Activities ---

    /// Send a transient activity to the current activity listeners.
    #[track_caller]
    pub fn send(&self, name: impl Into<String>, activity: A) {
        let trace = ActivityTrace::new(name);
        if let Some(logger) = &self.logger {
            logger.did_send_activity(&ActivityLog {
                store_name: &self.name,
                trace: &trace,
            });
        }
        self.activities.emit(activity);
    }

    pub fn sink_activity(
        &self,
        target: DispatchTarget,
        receive: impl Fn(&A) + Send + Sync + 'static,
    ) -> Subscription {
        self.activities.add_listener(target, receive)
    }

    /// A handle that reads, writes and observes only the part of the state
    /// selected by `scope`.
    pub fn driver<T>(&self, scope: Lens<S, T>) -> Driver<'_, S, A, T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Driver::new(self, scope)
    }
}
