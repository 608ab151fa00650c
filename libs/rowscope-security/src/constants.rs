use crate::UserId;

/// Unauthenticated caller.
pub const ANONYMOUS: UserId = UserId::new(1);

/// Trusted system identity used for maintenance and background work.
pub const SYSTEM: UserId = UserId::new(2);

/// Automated ingestion worker.
pub const INGESTION_WORKER: UserId = UserId::new(3);

/// Highest id of the reserved system-identity range.
/// Saves made by identities at or below this id are not audit-stamped.
pub const RESERVED_ID_CEILING: i64 = 4;
