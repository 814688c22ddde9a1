use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A bookable candidate, recomputed per availability request. `display_date`
/// is what the widget renders; `date` is the ISO day used for booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "date")]
    pub display_date: String,
    #[serde(rename = "isoDate")]
    pub date: NaiveDate,
    pub time: String,
    pub label: String,
    #[serde(rename = "type")]
    pub period: String,
    pub available: bool,
}

impl Slot {
    pub fn start(&self) -> NaiveDateTime {
        let time = chrono::NaiveTime::parse_from_str(&self.time, "%H:%M")
            .unwrap_or_else(|_| chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        self.date.and_time(time)
    }

    pub fn end(&self, duration_minutes: u32) -> NaiveDateTime {
        self.start() + chrono::Duration::minutes(duration_minutes as i64)
    }
}

/// Request-scoped exclusion window in tenant-local time; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BusyInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl BusyInterval {
    /// Half-open overlap: a slot is excluded when it intersects the
    /// interval at all, adjacency does not count.
    pub fn overlaps(&self, slot_start: NaiveDateTime, slot_end: NaiveDateTime) -> bool {
        slot_start < self.end && slot_end > self.start
    }
}
