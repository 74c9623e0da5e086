use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A daily half-open time-of-day window `[start, end)`.
///
/// `start > end` wraps midnight (22:00–07:00). `start == end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.wraps_midnight() {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }

    /// End of the window occurrence that contains `local`.
    ///
    /// Only meaningful when `self.contains(local.time())`.
    pub fn end_after(&self, local: NaiveDateTime) -> NaiveDateTime {
        let date = local.date();
        if self.wraps_midnight() && local.time() >= self.start {
            (date + Duration::days(1)).and_time(self.end)
        } else {
            date.and_time(self.end)
        }
    }

    /// Next occurrence of `start` at or after `local`.
    pub fn next_start(&self, local: NaiveDateTime) -> NaiveDateTime {
        let date = local.date();
        if local.time() <= self.start {
            date.and_time(self.start)
        } else {
            (date + Duration::days(1)).and_time(self.start)
        }
    }
}
