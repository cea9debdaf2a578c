//! Consecutive-day activity streak.
//!
//! The streak is the length of the run of consecutive noted days that ends
//! at the most recent noted day. It is not anchored to today: an owner who
//! stopped posting a week ago still reports the run they finished with.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-day note count, aggregated outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakSample {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub note_count: u32,
}

impl StreakSample {
    pub fn new(year: i32, month: u32, day: u32, note_count: u32) -> Self {
        Self {
            year,
            month,
            day,
            note_count,
        }
    }

    fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Zero-padded `YYYY-MM-DD` key for a calendar day.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Length of the consecutive run of noted days ending at the latest one.
///
/// Samples may arrive in any order and may repeat a day. Samples with a
/// zero count or an impossible date are ignored.
pub fn streak(samples: &[StreakSample]) -> u32 {
    let noted: HashSet<NaiveDate> = samples
        .iter()
        .filter(|s| s.note_count > 0)
        .filter_map(|s| {
            let date = s.date();
            if date.is_none() {
                warn!(year = s.year, month = s.month, day = s.day, "skipping invalid streak sample");
            }
            date
        })
        .collect();

    let Some(latest) = noted.iter().max().copied() else {
        return 0;
    };

    let mut count = 0;
    let mut cursor = latest;
    while noted.contains(&cursor) {
        count += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    count
}
