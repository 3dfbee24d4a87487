use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete service time, stored as minutes after midnight.
///
/// Renders as a 12-hour clock label (`"7:00 PM"`) and accepts the common spellings a guest or
/// an operator would type: `"7:00 PM"`, `"7pm"`, `"7:30pm"`, `"19:00"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot {
    minutes: u16,
}

impl TimeSlot {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { minutes: u16::from(hour) * 60 + u16::from(minute) })
    }

    /// On-the-hour slot; `hour` wraps into `0..24`.
    pub const fn on_the_hour(hour: u8) -> Self {
        Self { minutes: (hour % 24) as u16 * 60 }
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    pub fn parse(value: &str) -> Option<Self> {
        let compact: String =
            value.trim().to_ascii_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.replace('.', "");

        let (clock, meridiem) = if let Some(clock) = compact.strip_suffix("am") {
            (clock, Some(Meridiem::Am))
        } else if let Some(clock) = compact.strip_suffix("pm") {
            (clock, Some(Meridiem::Pm))
        } else {
            (compact.as_str(), None)
        };

        let (hour_part, minute_part) = match clock.split_once(':') {
            Some((hour, minute)) => (hour, Some(minute)),
            None => (clock, None),
        };

        if hour_part.is_empty()
            || hour_part.len() > 2
            || !hour_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        let hour = hour_part.parse::<u8>().ok()?;

        let minute = match minute_part {
            Some(minute) if minute.len() == 2 && minute.chars().all(|c| c.is_ascii_digit()) => {
                minute.parse::<u8>().ok()?
            }
            Some(_) => return None,
            // A bare number is a quantity, not a time.
            None if meridiem.is_none() => return None,
            None => 0,
        };

        let hour = match meridiem {
            Some(_) if hour == 0 || hour > 12 => return None,
            Some(Meridiem::Am) => hour % 12,
            Some(Meridiem::Pm) => hour % 12 + 12,
            None => hour,
        };

        Self::new(hour, minute)
    }

    pub fn label(&self) -> String {
        let hour = self.hour();
        let (display_hour, suffix) = match hour {
            0 => (12, "AM"),
            1..=11 => (hour, "AM"),
            12 => (12, "PM"),
            _ => (hour - 12, "PM"),
        };
        format!("{display_hour}:{:02} {suffix}", self.minute())
    }
}

#[derive(Clone, Copy)]
enum Meridiem {
    Am,
    Pm,
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unrecognized time slot `{value}`"))
    }
}

impl From<TimeSlot> for String {
    fn from(value: TimeSlot) -> Self {
        value.label()
    }
}

#[cfg(test)]
mod tests {
    use super::TimeSlot;

    #[test]
    fn parses_common_spellings_to_the_same_slot() {
        let expected = TimeSlot::new(19, 0).expect("valid slot");
        for raw in ["7:00 PM", "7pm", "7 pm", "7:00pm", "19:00", "7:00 p.m."] {
            assert_eq!(TimeSlot::parse(raw), Some(expected), "failed to parse `{raw}`");
        }
    }

    #[test]
    fn renders_twelve_hour_label() {
        assert_eq!(TimeSlot::new(19, 30).expect("slot").label(), "7:30 PM");
        assert_eq!(TimeSlot::new(12, 0).expect("slot").label(), "12:00 PM");
        assert_eq!(TimeSlot::new(0, 15).expect("slot").label(), "12:15 AM");
        assert_eq!(TimeSlot::new(11, 45).expect("slot").label(), "11:45 AM");
    }

    #[test]
    fn rejects_bare_numbers_and_out_of_range_values() {
        assert_eq!(TimeSlot::parse("4"), None);
        assert_eq!(TimeSlot::parse("13pm"), None);
        assert_eq!(TimeSlot::parse("24:00"), None);
        assert_eq!(TimeSlot::parse("7:5pm"), None);
        assert_eq!(TimeSlot::parse("2025-07-04"), None);
    }

    #[test]
    fn serde_uses_label_form() {
        let slot = TimeSlot::new(18, 30).expect("slot");
        let json = serde_json::to_string(&slot).expect("serialize");
        assert_eq!(json, "\"6:30 PM\"");
        let back: TimeSlot = serde_json::from_str("\"18:30\"").expect("deserialize");
        assert_eq!(back, slot);
    }
}
