/// Run identifiers are assigned sequentially by the history store.
pub type RunId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
