/// Job identifiers are opaque UUIDs assigned by the backend at submission.
pub type JobId = uuid::Uuid;

/// Requester identity, resolved by the caller before any submission.
pub type RequesterId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
