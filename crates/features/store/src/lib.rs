//! Transaction group persistence.
//!
//! # Core Features
//!
//! - **[`TxGroupStore`]**: save, enlist, list, status update, status lookup and delete over any
//!   [`gts_cache::HashCache`]. Status lookups never fail; they read as rolled back instead.
//! - **[`GarbageCollector`]**: removes groups whose initiator rolled back and groups whose items
//!   all committed. In-flight and undecodable groups are kept.
//!
//! Neither type locks anything beyond a single cache command. See
//! [`TxGroupStore::update_item_status`] for the resulting lost-update window.

mod error;
mod gc;
mod store;

pub use error::{StoreError, StoreErrorExt};
pub use gc::{GarbageCollector, Resolution, SweepReport};
pub use store::{TxGroupStore, TxGroupStoreInner, group_key};
