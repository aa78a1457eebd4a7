//! Diagnostics hooks.
//!
//! A [`StoreLogger`] observes commits, activities and driver lifecycle. It is
//! purely for observability; nothing it does feeds back into the container.

use crate::mutation::Transaction;
use crate::types::{ActivityTrace, MutationTrace};
use std::time::Duration;

/// What a logger sees after each successful commit.
pub struct CommitLog<'a> {
    pub store_name: &'a str,
    /// Commit version of the record that was replaced.
    pub old_version: u64,
    /// Commit version of the new record.
    pub new_version: u64,
    pub traces: &'a [MutationTrace],
    pub transaction: &'a Transaction,
    /// Time spent waiting for exclusivity plus running the body.
    pub elapsed: Duration,
}

pub struct ActivityLog<'a> {
    pub store_name: &'a str,
    pub trace: &'a ActivityTrace,
}

/// A scoped driver was created or dropped.
pub struct DriverLog<'a> {
    pub store_name: &'a str,
    /// Type name of the scope the driver works on.
    pub scope: &'a str,
}

/// Observer of container internals.
pub trait StoreLogger: Send + Sync {
    fn did_commit(&self, log: &CommitLog<'_>);

    fn did_send_activity(&self, _log: &ActivityLog<'_>) {}

    fn did_create_driver(&self, _log: &DriverLog<'_>) {}

    fn did_destroy_driver(&self, _log: &DriverLog<'_>) {}

    fn did_tear_down(&self, _store_name: &str, _disposed_subscriptions: usize) {}
}

/// Forwards every hook to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl StoreLogger for TracingLogger {
    fn did_commit(&self, log: &CommitLog<'_>) {
        let traces = serde_json::to_string(log.traces).unwrap_or_default();
        tracing::debug!(
            store = log.store_name,
            from = log.old_version,
            to = log.new_version,
            elapsed_us = log.elapsed.as_micros() as u64,
            transaction_keys = log.transaction.len(),
            %traces,
            "commit"
        );
    }

    fn did_send_activity(&self, log: &ActivityLog<'_>) {
        tracing::debug!(
            store = log.store_name,
            name = %log.trace.name,
            origin = %log.trace.origin,
            "activity"
        );
    }

    fn did_create_driver(&self, log: &DriverLog<'_>) {
        tracing::debug!(store = log.store_name, scope = log.scope, "driver created");
    }

    fn did_destroy_driver(&self, log: &DriverLog<'_>) {
        tracing::debug!(store = log.store_name, scope = log.scope, "driver destroyed");
    }

    fn did_tear_down(&self, store_name: &str, disposed_subscriptions: usize) {
        tracing::debug!(store = store_name, disposed_subscriptions, "torn down");
    }
}
