//! Scoped access to a store.

use crate::changes::Changes;
use crate::dispatch::DispatchTarget;
use crate::logger::DriverLog;
use crate::mutation::{Lens, MutationSession};
use crate::store::Store;
use crate::subscriptions::Subscription;

/// Reads, writes and observes one projection of a store's state.
///
/// Drivers are cheap to create. Their creation and destruction are reported
/// to the store's logger.
pub struct Driver<'s, S, A, T>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    store: &'s Store<S, A>,
    scope: Lens<S, T>,
}

impl<'s, S, A, T> Driver<'s, S, A, T>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: &'s Store<S, A>, scope: Lens<S, T>) -> Self {
        if let Some(logger) = store.logger() {
            logger.did_create_driver(&DriverLog {
                store_name: store.name(),
                scope: std::any::type_name::<T>(),
            });
        }
        Self { store, scope }
    }

    pub fn store(&self) -> &'s Store<S, A> {
        self.store
    }

    /// The latest record, projected onto this driver's scope.
    pub fn state(&self) -> Changes<T> {
        let scope = &self.scope;
        self.store.state().map(|s| scope.get(s).clone())
    }

    pub fn root_state(&self) -> Changes<S> {
        self.store.state()
    }

    /// Mutate the scoped value.
    #[track_caller]
    pub fn commit<R>(
        &self,
        name: impl Into<String>,
        mutation: impl FnOnce(&mut MutationSession<'_, T>) -> R,
    ) -> R {
        self.store.storage().mutate_scoped(name, &self.scope, mutation)
    }

    /// Fallible variant of [`Driver::commit`].
    #[track_caller]
    pub fn try_commit<R, E>(
        &self,
        name: impl Into<String>,
        mutation: impl FnOnce(&mut MutationSession<'_, T>) -> Result<R, E>,
    ) -> Result<R, E> {
        self.store
            .storage()
            .try_mutate_scoped(name, &self.scope, mutation)
    }

    /// Subscribe to the scoped state.
    ///
    /// Every root commit is delivered, projected; use the comparison methods
    /// on [`Changes`] to skip commits that did not touch the scope.
    pub fn sink_state(
        &self,
        drops_first: bool,
        target: DispatchTarget,
        receive: impl Fn(&Changes<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let scope = self.scope.clone();
        self.store.sink_state(drops_first, target, move |changes| {
            receive(&changes.map(|s| scope.get(s).clone()))
        })
    }

    #[track_caller]
    pub fn send(&self, name: impl Into<String>, activity: A) {
        self.store.send(name, activity)
    }

    /// A driver for a sub-scope of this one.
    pub fn detached<U>(&self, scope: &Lens<T, U>) -> Driver<'s, S, A, U>
    where
        U: Clone + Send + Sync + 'static,
    {
        Driver::new(self.store, self.scope.then(scope))
    }
}

impl<S, A, T> Drop for Driver<'_, S, A, T>
where
    S: Clone + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(logger) = self.store.logger() {
            logger.did_destroy_driver(&DriverLog {
                store_name: self.store.name(),
                scope: std::any::type_name::<T>(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Account {
        name: String,
        balance: i64,
    }

    #[derive(Clone, Debug, Default)]
    struct Bank {
        primary: Account,
        audit: Vec<String>,
    }

    #[test]
    fn test_scoped_commit_and_state() {
        let store: Store<Bank> = Store::new(Bank::default());
        let primary = store.driver(lens!(Bank, primary));

        primary.commit("deposit", |acct| acct.balance += 50);
        assert_eq!(primary.state().current().balance, 50);
        assert_eq!(store.state().current().primary.balance, 50);
        assert_eq!(primary.root_state().version(), 1);
        assert_eq!(primary.store().name(), "store");

        let labels: Vec<_> = store
            .state()
            .traces()
            .iter()
            .map(|t| t.label.clone())
            .collect();
        assert_eq!(labels.last().map(String::as_str), Some("deposit"));
    }

    #[test]
    fn test_detached_goes_deeper() {
        let store: Store<Bank> = Store::new(Bank::default());
        let primary = store.driver(lens!(Bank, primary));
        let balance = primary.detached(&lens!(Account, balance));

        balance.commit("set", |b| **b = 7);
        assert_eq!(*balance.state().current(), 7);
        assert_eq!(primary.state().current().balance, 7);
    }

    #[test]
    fn test_scoped_sink_detects_unrelated_commits() {
        let store: Store<Bank> = Store::new(Bank::default());
        let primary = store.driver(lens!(Bank, primary));
        let changed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changed);

        let _sub = primary.sink_state(true, DispatchTarget::Immediate, move |c| {
            sink.lock().push(c.has_changes(|a| a.clone()))
        });

        store.commit("audit", |b| b.audit.push("checked".into()));
        primary.commit("rename", |a| a.name = "main".into());

        assert_eq!(*changed.lock(), vec![false, true]);
    }

    #[test]
    fn test_failed_scoped_commit() {
        let store: Store<Bank> = Store::new(Bank::default());
        let primary = store.driver(lens!(Bank, primary));

        let result: Result<(), String> = primary.try_commit("withdraw", |a| {
            a.balance -= 100;
            if a.balance < 0 {
                return Err("insufficient funds".to_string());
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(primary.state().current().balance, 0);
        assert_eq!(store.storage().commit_version(), 0);
    }
}
