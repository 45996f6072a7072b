//! Key-value cache contract for transaction group state.
//!
//! The transaction manager keeps every group as one hash (`key -> {field -> value}`) in an
//! external cache. This crate pins down the small slice of that cache the manager relies on and
//! ships an in-process engine with the same semantics.
//!
//! # Core Features
//!
//! - **[`HashCache`]**: `hset`/`hset_existing`/`hget`/`hget_all`/`del`/`keys`. Each call is
//!   atomic on its own; there is no multi-call transaction.
//! - **[`MemoryCache`]**: a thread-safe, cheaply cloneable engine backed by `FxHashMap` and
//!   `parking_lot::RwLock`.
//! - **Glob patterns**: `keys` understands `*`, `?` and `\` escapes.
//!
//! # Examples
//!
//! ```rust
//! use gts_cache::{CacheError, HashCache, MemoryCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let cache = MemoryCache::new();
//!     cache.hset("transaction:group:G1", "G1", "{}".to_owned()).await?;
//!
//!     let keys = cache.keys("transaction:group:*").await?;
//!     assert_eq!(keys, vec!["transaction:group:G1".to_owned()]);
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod memory;
mod pattern;

pub use engine::HashCache;
pub use error::{CacheError, CacheErrorExt};
pub use memory::MemoryCache;
pub use pattern::glob_match;
