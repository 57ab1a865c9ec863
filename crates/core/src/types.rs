/// Every analysis job is identified by a random v4 UUID.
pub type JobId = uuid::Uuid;

/// Identity assigned by the external tracker. Unique within one job.
pub type TrackId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
