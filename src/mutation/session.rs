//! The exclusive scope a mutation body runs in.

use crate::types::MutationTrace;
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::lens::Lens;
use super::transaction::Transaction;

/// Lifecycle of one mutation session.
///
/// `Idle → Acquiring → Active → Committing → Closed`. A body that fails
/// goes straight from `Active` to `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Acquiring,
    Active,
    Committing,
    Closed,
}

impl SessionPhase {
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::{Acquiring, Active, Closed, Committing, Idle};
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Active)
                | (Active, Committing)
                | (Active, Closed)
                | (Committing, Closed)
        )
    }

    pub(crate) fn advance(&mut self, next: SessionPhase, store: &str) {
        debug_assert!(
            self.can_transition_to(next),
            "invalid session transition {:?} -> {:?}",
            self,
            next
        );
        tracing::trace!(store, from = ?*self, to = ?next, "session phase");
        *self = next;
    }
}

/// Mutable, traced access to (a projection of) the state.
///
/// Dereferences to the projected value. The reference is only valid for the
/// duration of the body; the container commits whatever it holds once the
/// body returns successfully.
pub struct MutationSession<'a, T> {
    target: &'a mut T,
    traces: &'a mut Vec<MutationTrace>,
    transaction: &'a mut Transaction,
}

impl<'a, T> MutationSession<'a, T> {
    pub(crate) fn new(
        target: &'a mut T,
        traces: &'a mut Vec<MutationTrace>,
        transaction: &'a mut Transaction,
    ) -> Self {
        Self {
            target,
            traces,
            transaction,
        }
    }

    /// Record where and why this mutation happened.
    #[track_caller]
    pub fn append_trace(&mut self, label: impl Into<String>) {
        self.traces.push(MutationTrace::new(label));
    }

    pub fn traces(&self) -> &[MutationTrace] {
        &self.traces[..]
    }

    pub fn transaction(&mut self) -> &mut Transaction {
        &mut *self.transaction
    }

    /// Run `body` against a sub-region, sharing this session's traces and
    /// transaction.
    pub fn scoped<U, R>(
        &mut self,
        lens: &Lens<T, U>,
        body: impl FnOnce(&mut MutationSession<'_, U>) -> R,
    ) -> R {
        let mut inner = MutationSession {
            target: lens.get_mut(&mut *self.target),
            traces: &mut *self.traces,
            transaction: &mut *self.transaction,
        };
        body(&mut inner)
    }
}

impl<T> Deref for MutationSession<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.target
    }
}

impl<T> DerefMut for MutationSession<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.target
    }
}

impl<T: fmt::Debug> fmt::Debug for MutationSession<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationSession")
            .field("target", &self.target)
            .field("traces", &self.traces.len())
            .field("transaction", &self.transaction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Form {
        title: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_session_writes_through() {
        let mut form = Form::default();
        let mut traces = Vec::new();
        let mut tx = Transaction::new();

        let mut session = MutationSession::new(&mut form, &mut traces, &mut tx);
        session.title = "draft".to_string();
        session.append_trace("set title");
        session.transaction().insert("why", "typing");

        drop(session);
        assert_eq!(form.title, "draft");
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].label, "set title");
        assert!(tx.contains("why"));
    }

    #[test]
    fn test_scoped_shares_traces() {
        let mut form = Form::default();
        let mut traces = Vec::new();
        let mut tx = Transaction::new();
        let tags = crate::lens!(Form, tags);

        let mut session = MutationSession::new(&mut form, &mut traces, &mut tx);
        let len = session.scoped(&tags, |inner| {
            inner.push("rust".to_string());
            inner.append_trace("tag");
            inner.len()
        });
        session.append_trace("outer");

        drop(session);
        assert_eq!(len, 1);
        assert_eq!(form.tags, vec!["rust".to_string()]);
        let labels: Vec<_> = traces.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["tag", "outer"]);
    }

    #[test]
    fn test_phase_transitions() {
        use SessionPhase::*;
        assert!(Idle.can_transition_to(Acquiring));
        assert!(Active.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Acquiring.can_transition_to(Committing));
    }
}
