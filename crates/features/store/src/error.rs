use gts_cache::CacheError;
use std::borrow::Cow;

/// A specialized [`StoreError`] enum of this crate.
#[gts_derive::gts_error]
pub enum StoreError {
    /// The backing cache rejected or failed a command.
    #[error("Cache error{}: {source}", format_context(.context))]
    Cache { source: CacheError, context: Option<Cow<'static, str>> },

    /// An item could not be encoded for, or decoded from, the cache.
    #[error("Serialization error{}: {source}", format_context(.context))]
    Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },

    /// The item addressed by a status update is not (or no longer) stored.
    #[error("Item not found{}: {group_id}/{task_key}", format_context(.context))]
    ItemNotFound { group_id: String, task_key: String, context: Option<Cow<'static, str>> },
}
