//! Core types shared across the container.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Source location a trace was recorded from.
#[derive(Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Origin {
    /// Location of the caller, following `#[track_caller]` frames.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }
}

impl From<&'static Location<'static>> for Origin {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Diagnostic entry appended while a mutation runs.
///
/// Carried by the resulting change record; never consulted for correctness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MutationTrace {
    pub label: String,
    pub origin: Origin,
    pub timestamp: Timestamp,
}

impl MutationTrace {
    #[track_caller]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            origin: Origin::caller(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Diagnostic entry describing where an activity was sent from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActivityTrace {
    pub name: String,
    pub origin: Origin,
    pub timestamp: Timestamp,
}

impl ActivityTrace {
    #[track_caller]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Origin::caller(),
            timestamp: Timestamp::now(),
        }
    }
}
