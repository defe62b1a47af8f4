use jiff::civil;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Day-of-week condition value, lowercase in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    fn to_civil(self) -> civil::Weekday {
        match self {
            Weekday::Monday => civil::Weekday::Monday,
            Weekday::Tuesday => civil::Weekday::Tuesday,
            Weekday::Wednesday => civil::Weekday::Wednesday,
            Weekday::Thursday => civil::Weekday::Thursday,
            Weekday::Friday => civil::Weekday::Friday,
            Weekday::Saturday => civil::Weekday::Saturday,
            Weekday::Sunday => civil::Weekday::Sunday,
        }
    }
}

/// An `HH:MM` clock range, start inclusive, end exclusive.
///
/// Wrap-around ranges (end before start) are rejected at validation time
/// rather than given midnight-crossing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HourRange {
    #[serde(with = "hhmm")]
    pub start: civil::Time,
    #[serde(with = "hhmm")]
    pub end: civil::Time,
}

impl HourRange {
    fn contains(&self, t: civil::Time) -> bool {
        self.start <= t && t < self.end
    }
}

/// The `time:` condition block of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(default)]
    pub hours: Option<HourRange>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TimeWindow {
    /// Reject unknown IANA zones and wrap-around hour ranges.
    pub fn validate(&self) -> Result<(), PolicyError> {
        TimeZone::get(&self.timezone)
            .map_err(|_| PolicyError::UnknownTimezone(self.timezone.clone()))?;
        if let Some(hours) = &self.hours {
            if hours.end < hours.start {
                return Err(PolicyError::WraparoundHours {
                    start: format_hhmm(hours.start),
                    end: format_hhmm(hours.end),
                });
            }
        }
        Ok(())
    }

    /// Whether `now`, viewed in this window's zone, falls inside the window.
    pub fn contains(&self, now: jiff::Timestamp) -> Result<bool, PolicyError> {
        let tz = TimeZone::get(&self.timezone)
            .map_err(|_| PolicyError::UnknownTimezone(self.timezone.clone()))?;
        let local = now.to_zoned(tz);

        if !self.days.is_empty()
            && !self.days.iter().any(|d| d.to_civil() == local.weekday())
        {
            return Ok(false);
        }
        if let Some(hours) = &self.hours {
            return Ok(hours.contains(local.time()));
        }
        Ok(true)
    }
}

fn format_hhmm(t: civil::Time) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Parse a strict `HH:MM` 24-hour clock value.
pub fn parse_hhmm(s: &str) -> Result<civil::Time, PolicyError> {
    let bad = || PolicyError::InvalidHour(s.to_string());

    let (h, m) = s.split_once(':').ok_or_else(bad)?;
    if h.len() != 2 || m.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return Err(bad());
    }
    let hour: i8 = h.parse().map_err(|_| bad())?;
    let minute: i8 = m.parse().map_err(|_| bad())?;
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) {
        return Err(bad());
    }
    civil::Time::new(hour, minute, 0, 0).map_err(|_| bad())
}

mod hhmm {
    use jiff::civil;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(t: &civil::Time, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hhmm(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<civil::Time, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(yaml: &str) -> TimeWindow {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn business_hours_boundaries_are_start_inclusive_end_exclusive() {
        let w = window(
            "days: [tuesday]\nhours: { start: \"09:00\", end: \"18:00\" }\ntimezone: America/New_York",
        );
        w.validate().unwrap();

        let before: jiff::Timestamp = "2026-01-20T08:59:59-05:00".parse().unwrap();
        let opening: jiff::Timestamp = "2026-01-20T09:00:00-05:00".parse().unwrap();
        let closing: jiff::Timestamp = "2026-01-20T18:00:00-05:00".parse().unwrap();

        assert!(!w.contains(before).unwrap());
        assert!(w.contains(opening).unwrap());
        assert!(!w.contains(closing).unwrap());
    }

    #[test]
    fn days_are_checked_in_the_named_zone() {
        let w = window("days: [monday]\ntimezone: America/New_York");
        w.validate().unwrap();

        // 01:00 UTC Tuesday is still Monday evening in New York.
        let late_monday: jiff::Timestamp = "2026-01-20T01:00:00Z".parse().unwrap();
        assert!(w.contains(late_monday).unwrap());
    }

    #[test]
    fn empty_window_matches_everything() {
        let w = window("timezone: UTC");
        w.validate().unwrap();
        let t: jiff::Timestamp = "2026-01-20T03:00:00Z".parse().unwrap();
        assert!(w.contains(t).unwrap());
    }

    #[test]
    fn unknown_timezone_fails_validation() {
        let w = window("timezone: Mars/Olympus_Mons");
        assert!(matches!(w.validate(), Err(PolicyError::UnknownTimezone(_))));
    }

    #[test]
    fn wraparound_hours_rejected() {
        let w = window("hours: { start: \"22:00\", end: \"06:00\" }\ntimezone: UTC");
        assert!(matches!(w.validate(), Err(PolicyError::WraparoundHours { .. })));
    }

    #[test]
    fn hhmm_parsing_is_strict() {
        assert!(parse_hhmm("09:00").is_ok());
        assert!(parse_hhmm("23:59").is_ok());
        for bad in ["9:00", "09:0", "24:00", "09:60", "09-00", "0900", ""] {
            assert!(parse_hhmm(bad).is_err(), "accepted {bad:?}");
        }
    }
}
