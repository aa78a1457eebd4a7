//! Mutation sessions.
//!
//! A mutation body receives a [`MutationSession`]: exclusive access to the
//! state (or a [`Lens`] projection of it), a trace list that ends up in the
//! committed record, and a [`Transaction`] for context that only lives as
//! long as the session.

mod lens;
mod session;
mod transaction;

pub use lens::Lens;
pub use session::{MutationSession, SessionPhase};
pub use transaction::Transaction;
