use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Meridiem {
    Am,
    Pm,
}

impl std::fmt::Display for Meridiem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Meridiem::Am => write!(f, "am"),
            Meridiem::Pm => write!(f, "pm"),
        }
    }
}

impl std::str::FromStr for Meridiem {
    type Err = SlotError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "am" => Ok(Meridiem::Am),
            "pm" => Ok(Meridiem::Pm),
            other => Err(SlotError::InvalidMeridiem(other.to_string())),
        }
    }
}

/// A slot as submitted by the owner (or by the seeding routine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInput {
    pub hour: u8,
    pub minute: u8,
    pub meridiem: Meridiem,
    /// Monday first.
    pub days: [bool; 7],
}

impl SlotInput {
    /// Enabled on every day of the week.
    pub const fn every_day(hour: u8, minute: u8, meridiem: Meridiem) -> Self {
        Self {
            hour,
            minute,
            meridiem,
            days: [true; 7],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.hour) {
            return Err(SlotError::InvalidSlot(format!(
                "hour must be 1..=12, got {}",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(SlotError::InvalidSlot(format!(
                "minute must be 0..=59, got {}",
                self.minute
            )));
        }
        Ok(())
    }
}

/// A persisted weekly slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSlot {
    pub id: String,
    pub owner_id: String,
    /// 1..=12
    pub hour: u8,
    pub minute: u8,
    pub meridiem: Meridiem,
    /// Monday first.
    pub days: [bool; 7],
    /// ISO-8601
    pub created_at: String,
    pub updated_at: String,
}

impl RecurringSlot {
    /// Hour on the 24-hour clock. 12 am is midnight, 12 pm is noon.
    pub fn hour_24(&self) -> u8 {
        to_24h(self.hour, self.meridiem)
    }

    pub fn pattern(&self) -> WeeklyPattern {
        WeeklyPattern {
            hour: self.hour_24(),
            minute: self.minute,
            days: self.days,
        }
    }
}

pub(crate) fn to_24h(hour: u8, meridiem: Meridiem) -> u8 {
    match meridiem {
        Meridiem::Am => hour % 12,
        Meridiem::Pm => hour % 12 + 12,
    }
}

/// A weekly time-of-day rule on the 24-hour clock.
///
/// This is the vocabulary of a recurring trigger directive. It is derived
/// from slots for display and suggestion only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPattern {
    /// 0..=23
    pub hour: u8,
    pub minute: u8,
    /// Monday first.
    pub days: [bool; 7],
}

impl WeeklyPattern {
    /// Enabled weekdays as cron day-of-week numbers (0 = Sunday).
    pub fn cron_days(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self
            .days
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| ((i + 1) % 7) as u8)
            .collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_hour_conversion() {
        assert_eq!(to_24h(12, Meridiem::Am), 0);
        assert_eq!(to_24h(1, Meridiem::Am), 1);
        assert_eq!(to_24h(12, Meridiem::Pm), 12);
        assert_eq!(to_24h(5, Meridiem::Pm), 17);
    }

    #[test]
    fn validate_bounds() {
        assert!(SlotInput::every_day(12, 59, Meridiem::Pm).validate().is_ok());
        assert!(SlotInput::every_day(0, 0, Meridiem::Am).validate().is_err());
        assert!(SlotInput::every_day(13, 0, Meridiem::Am).validate().is_err());
        assert!(SlotInput::every_day(9, 60, Meridiem::Am).validate().is_err());
    }

    #[test]
    fn cron_days_maps_monday_first_to_sunday_zero() {
        let pattern = WeeklyPattern {
            hour: 9,
            minute: 0,
            // Monday, Wednesday, Sunday
            days: [true, false, true, false, false, false, true],
        };
        assert_eq!(pattern.cron_days(), vec![0, 1, 3]);
    }
}
