//! # Reactive Store
//!
//! A single-source-of-truth state container. It serializes every mutation,
//! keeps an immutable before/after record of each commit, and pushes those
//! records to subscribers that only need to know what actually changed.
//!
//! ## Core Concepts
//!
//! - **StateStorage**: Owns the state; one mutation session at a time
//! - **Changes**: Immutable previous/current pair with selective comparison
//! - **VersionedField**: Write counter for sub-trees without cheap equality
//! - **EventBroadcaster**: Transient activities, never stored or replayed
//! - **Store / Driver**: State plus activities, and scoped views over them
//!
//! ## Example
//!
//! ```ignore
//! use reactive_store::{lens, DispatchTarget, Store, VersionedField};
//!
//! #[derive(Clone, Default)]
//! struct AppState {
//!     count: u32,
//!     log: VersionedField<Vec<String>>,
//! }
//!
//! let store: Store<AppState> = Store::new(AppState::default());
//!
//! let _sub = store.sink_state(false, DispatchTarget::Immediate, |changes| {
//!     if changes.has_changes(|s| s.count) {
//!         println!("count is now {}", changes.current().count);
//!     }
//!     if changes.compare_by_version(|s| &s.log).is_changed() {
//!         println!("log grew");
//!     }
//! });
//!
//! store.commit("increment", |state| state.count += 1);
//!
//! let log = store.driver(lens!(AppState, log));
//! log.commit("append", |log| log.push("hello".to_string()));
//! ```

pub mod broadcaster;
pub mod changes;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod logger;
pub mod mutation;
pub mod storage;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod versioned;

// Re-exports
pub use broadcaster::EventBroadcaster;
pub use changes::{ChangeResult, Changes};
pub use dispatch::{DispatchTarget, Job, SerialQueue, TargetQueue};
pub use driver::Driver;
pub use error::{Result, StoreError};
pub use logger::{ActivityLog, CommitLog, DriverLog, StoreLogger, TracingLogger};
pub use mutation::{Lens, MutationSession, SessionPhase, Transaction};
pub use storage::StateStorage;
pub use store::{Scan, Store, StoreConfig};
pub use subscriptions::{Callback, Subscription, SubscriptionId};
pub use types::{ActivityTrace, MutationTrace, Origin, Timestamp};
pub use versioned::{VersionCounter, Versioned, VersionedField};
