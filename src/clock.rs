//! wall clock used to stamp history records.
//!
//! the history log treats the timestamp as an opaque string; only this module
//! knows its format. time synchronisation is left to the operating system.

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait Clock: Send + Sync {
    /// current local time as "YYYY-MM-DD HH:MM:SS"
    fn timestamp(&self) -> String;
}

pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600)).unwrap_or_else(|| {
            warn!("[CLOCK] Invalid UTC offset {}h, using UTC", utc_offset_hours);
            Utc.fix()
        });
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        Utc::now().with_timezone(&self.offset).format(TIMESTAMP_FORMAT).to_string()
    }
}

/// clock frozen at a preset string
#[cfg(test)]
pub struct FixedClock(pub String);

#[cfg(test)]
impl Clock for FixedClock {
    fn timestamp(&self) -> String {
        self.0.clone()
    }
}
