//! Observer registration and fan-out.
//!
//! Both state subscriptions and activity listeners are kept in a
//! [`SubscriberRegistry`](manager::SubscriberRegistry):
//! - Ordered by registration
//! - Snapshotted at the start of every delivery cycle
//! - Per-subscriber dispatch target
//!
//! Registering returns a [`Subscription`] handle. Disposing it (explicitly
//! or by dropping it) removes the observer before the next delivery.
//!
//! # Example
//!
//! ```ignore
//! let storage = StateStorage::new(0u32);
//!
//! let subscription = storage.subscribe(false, DispatchTarget::Immediate, |changes| {
//!     println!("now {}", changes.current());
//! });
//!
//! storage.mutate("bump", |state| **state += 1);
//! subscription.dispose();
//! ```

mod manager;
mod types;

pub use manager::Callback;
pub(crate) use manager::SubscriberRegistry;
pub use types::{Subscription, SubscriptionId};
