//! # Domain Models
//!
//! Pure data shared by every transaction manager crate: transaction items and groups, their
//! wire shape, the cache key schema and configuration structs.
//! Keep it lean: `serde` only, no I/O, networking or protocol logic.

pub mod config;
pub mod constants;
pub mod model;
