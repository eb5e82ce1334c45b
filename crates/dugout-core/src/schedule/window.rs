// Weekly boundary arithmetic.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A point in the league week, e.g. Monday 00:00, in the league's local
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyBoundary {
    pub weekday: Weekday,
    pub time: NaiveTime,
}

impl WeeklyBoundary {
    pub fn new(weekday: Weekday, time: NaiveTime) -> Self {
        Self { weekday, time }
    }

    /// The latest occurrence of this boundary at or before `now`.
    pub fn latest_at_or_before(&self, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let local = now.with_timezone(&offset);
        let days_back = (7 + local.weekday().num_days_from_monday()
            - self.weekday.num_days_from_monday())
            % 7;
        let date = local.date_naive() - Duration::days(i64::from(days_back));
        let candidate = match offset.from_local_datetime(&date.and_time(self.time)).single() {
            Some(dt) => dt.with_timezone(&Utc),
            // Fixed offsets have no gaps or folds.
            None => now,
        };
        if candidate > now {
            candidate - Duration::weeks(1)
        } else {
            candidate
        }
    }

    /// Every occurrence after `after` up to and including `now`, oldest
    /// first. Without a previous occurrence only the latest one counts.
    pub fn occurrences_since(
        &self,
        after: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Vec<DateTime<Utc>> {
        let mut at = self.latest_at_or_before(now, offset);
        let Some(after) = after else {
            return vec![at];
        };
        let mut due = Vec::new();
        while at > after {
            due.push(at);
            at -= Duration::weeks(1);
        }
        due.reverse();
        due
    }
}

/// Which edge of the transaction window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    Open,
    Close,
}
