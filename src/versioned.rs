//! Per-field version counters.
//!
//! A [`VersionedField`] wraps a sub-tree of the state and bumps its
//! [`VersionCounter`] on every mutable access. Comparing two counters answers
//! "was this field written between these two snapshots" in O(1), without
//! requiring `PartialEq` on the wrapped type.
//!
//! A field that is written and then restored to its old content still reports
//! a change; the counter is a watermark, not a content hash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Monotonic write counter for a single field.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionCounter(u64);

impl VersionCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Record one write.
    pub fn mark_as_updated(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

impl fmt::Debug for VersionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionCounter({})", self.0)
    }
}

/// Anything that exposes a write watermark.
pub trait Versioned {
    fn version(&self) -> VersionCounter;
}

impl Versioned for VersionCounter {
    fn version(&self) -> VersionCounter {
        *self
    }
}

/// A value paired with a counter that is bumped on each mutable access.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VersionedField<T> {
    value: T,
    counter: VersionCounter,
}

impl<T> VersionedField<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            counter: VersionCounter::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutable access. Counts as a write even if nothing is changed through it.
    pub fn get_mut(&mut self) -> &mut T {
        self.counter.mark_as_updated();
        &mut self.value
    }

    pub fn set(&mut self, value: T) {
        self.counter.mark_as_updated();
        self.value = value;
    }

    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        f(self.get_mut())
    }

    /// Bump the counter without touching the value.
    pub fn touch(&mut self) {
        self.counter.mark_as_updated();
    }

    pub fn counter(&self) -> VersionCounter {
        self.counter
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Versioned for VersionedField<T> {
    fn version(&self) -> VersionCounter {
        self.counter
    }
}

impl<T> Deref for VersionedField<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for VersionedField<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
    }
}

impl<T> From<T> for VersionedField<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for VersionedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedField")
            .field("value", &self.value)
            .field("version", &self.counter.0)
            .finish()
    }
}
