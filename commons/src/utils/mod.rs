use std::time::{SystemTime, UNIX_EPOCH};

pub struct TimeUtility;

impl TimeUtility {
    /// Milliseconds since the Unix epoch, used for transport send timestamps.
    pub fn get_timestamp_ms() -> u64 {
        let now = SystemTime::now();
        let since_epoch = now.duration_since(UNIX_EPOCH).expect("Time went backwards");
        since_epoch.as_millis() as u64
    }
}
