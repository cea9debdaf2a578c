use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, TimeZone};

use crate::types::RecurringSlot;

/// Earliest enabled slot time strictly after `from`, in `from`'s offset.
///
/// Looks at most one week ahead (eight calendar days, so today's earlier
/// slots are reconsidered next week). Returns `None` when no slot has any
/// day enabled.
pub fn next_occurrence(
    slots: &[RecurringSlot],
    from: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let tz = from.timezone();
    let today = from.date_naive();

    (0..=7u64)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .flat_map(|date| {
            let dow = date.weekday().num_days_from_monday() as usize;
            slots
                .iter()
                .filter(move |slot| slot.days[dow])
                .filter_map(move |slot| {
                    let time =
                        NaiveTime::from_hms_opt(slot.hour_24() as u32, slot.minute as u32, 0)?;
                    tz.from_local_datetime(&date.and_time(time)).single()
                })
        })
        .filter(|candidate| *candidate > from)
        .min()
}
