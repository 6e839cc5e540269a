use chrono::{DateTime, Utc};

/// Injectable wall-clock source for all engine timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}
