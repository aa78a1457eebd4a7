//! Immutable before/after change records.

use crate::types::{MutationTrace, Timestamp};
use crate::versioned::Versioned;
use std::fmt;
use std::sync::Arc;

/// Outcome of comparing a projected value between two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeResult {
    Changed,
    Unchanged,
}

impl ChangeResult {
    pub fn is_changed(self) -> bool {
        self == ChangeResult::Changed
    }
}

impl From<bool> for ChangeResult {
    fn from(changed: bool) -> Self {
        if changed {
            ChangeResult::Changed
        } else {
            ChangeResult::Unchanged
        }
    }
}

/// Snapshot pair produced by one commit.
///
/// A record never changes once built. The next commit produces a new record
/// whose `previous` is this record's `current`. Cloning is cheap: both
/// snapshots and the trace list are shared.
pub struct Changes<S> {
    previous: Option<Arc<S>>,
    current: Arc<S>,
    traces: Arc<[MutationTrace]>,
    version: u64,
    timestamp: Timestamp,
}

impl<S> Changes<S> {
    /// The first record of a container: no previous snapshot.
    pub fn initial(state: S) -> Self {
        Self {
            previous: None,
            current: Arc::new(state),
            traces: Arc::from(Vec::new()),
            version: 0,
            timestamp: Timestamp::now(),
        }
    }

    /// Build the successor of this record.
    pub(crate) fn make_next(&self, state: S, traces: Vec<MutationTrace>) -> Self {
        Self {
            previous: Some(Arc::clone(&self.current)),
            current: Arc::new(state),
            traces: Arc::from(traces),
            version: self.version + 1,
            timestamp: Timestamp::now(),
        }
    }

    pub fn current(&self) -> &S {
        &self.current
    }

    pub fn current_arc(&self) -> Arc<S> {
        Arc::clone(&self.current)
    }

    pub fn previous(&self) -> Option<&S> {
        self.previous.as_deref()
    }

    pub fn traces(&self) -> &[MutationTrace] {
        &self.traces
    }

    /// Commit number: 0 for the initial record, +1 per commit.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Same record with the previous snapshot removed, so every comparison
    /// reports a change. Used for the replay delivered on subscribe.
    pub fn dropped_previous(&self) -> Self {
        Self {
            previous: None,
            ..self.clone()
        }
    }

    /// Compare a projection with a caller-supplied equality.
    pub fn compare<'a, T>(
        &'a self,
        selector: impl Fn(&'a S) -> T,
        equals: impl Fn(&T, &T) -> bool,
    ) -> ChangeResult {
        match &self.previous {
            None => ChangeResult::Changed,
            Some(previous) => {
                let old = selector(previous);
                let new = selector(&self.current);
                (!equals(&old, &new)).into()
            }
        }
    }

    /// Compare the write counters of a versioned projection.
    pub fn compare_by_version<V: Versioned + ?Sized>(
        &self,
        selector: impl Fn(&S) -> &V,
    ) -> ChangeResult {
        match &self.previous {
            None => ChangeResult::Changed,
            Some(previous) => {
                (selector(previous).version() != selector(&self.current).version()).into()
            }
        }
    }

    pub fn has_changes<'a, T: PartialEq>(&'a self, selector: impl Fn(&'a S) -> T) -> bool {
        self.compare(selector, |a, b| a == b).is_changed()
    }

    pub fn no_changes<'a, T: PartialEq>(&'a self, selector: impl Fn(&'a S) -> T) -> bool {
        !self.has_changes(selector)
    }

    /// Run `f` with the new projected value only if it changed.
    pub fn if_changed<'a, T: PartialEq, R>(
        &'a self,
        selector: impl Fn(&'a S) -> T,
        f: impl FnOnce(T) -> R,
    ) -> Option<R> {
        if self.has_changes(&selector) {
            Some(f(selector(&self.current)))
        } else {
            None
        }
    }

    /// Project both snapshots into a new record.
    ///
    /// The projected record keeps the version, timestamp and traces of this
    /// one, and has no previous snapshot if this one has none.
    pub fn map<T>(&self, f: impl Fn(&S) -> T) -> Changes<T> {
        Changes {
            previous: self.previous.as_deref().map(|p| Arc::new(f(p))),
            current: Arc::new(f(&self.current)),
            traces: Arc::clone(&self.traces),
            version: self.version,
            timestamp: self.timestamp,
        }
    }
}

impl<S> Clone for Changes<S> {
    fn clone(&self) -> Self {
        Self {
            previous: self.previous.clone(),
            current: Arc::clone(&self.current),
            traces: Arc::clone(&self.traces),
            version: self.version,
            timestamp: self.timestamp,
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Changes<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changes")
            .field("version", &self.version)
            .field("previous", &self.previous)
            .field("current", &self.current)
            .field("traces", &self.traces.len())
            .finish()
    }
}
