//! Cache key schema for transaction groups.

/// Prefix applied to a `txGroupId` to address the group's hash.
pub const GROUP_KEY_PREFIX: &str = "transaction:group:";

/// Glob matching every group hash.
pub const GROUP_KEY_PATTERN: &str = "transaction:group:*";
