use chrono::{DateTime, Utc};
use std::time::Instant;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn millis_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
