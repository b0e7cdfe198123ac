//! Daily window and weekday recurrence calculus
//!
//! A window string `"HH:MM-HH:MM"` (or the 12-hour `"8:00AM-7:30PM"` form) is
//! always evaluated against the calendar day of "now" in the policy timezone.
//! The later of the two times is when workloads go down, the earlier one is when
//! they come back, and off-hours wrap around midnight.

use crate::errors::WindowError;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;

const TIME_FORMAT_24H: &str = "%H:%M";
const TIME_FORMAT_12H: &str = "%I:%M%p";
const EXPECTED_TIME_PARTS: usize = 2;

/// A window anchored to one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First time of the window string
    pub activate_at: DateTime<Tz>,
    /// Second time of the window string
    pub deactivate_at: DateTime<Tz>,
}

impl Window {
    /// Instant at which workloads are scaled to zero
    pub fn downscale_at(&self) -> DateTime<Tz> {
        self.activate_at.max(self.deactivate_at)
    }

    /// Instant at which workloads get their replicas back
    pub fn upscale_at(&self) -> DateTime<Tz> {
        self.activate_at.min(self.deactivate_at)
    }

    /// True from `downscale_at` (inclusive) until `upscale_at` (exclusive), wrapping midnight
    pub fn is_off_hours(&self, now: DateTime<Tz>) -> bool {
        now >= self.downscale_at() || now < self.upscale_at()
    }
}

/// Parse a window string and anchor both times to the day of `now` in `tz`.
pub fn parse_window(raw: &str, tz: Tz, now: DateTime<Tz>) -> Result<Window, WindowError> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() != EXPECTED_TIME_PARTS {
        return Err(WindowError::MalformedWindow {
            window: raw.to_string(),
        });
    }

    let twelve_hour = parts.iter().any(|part| is_twelve_hour(part));
    let first = parse_time_of_day(parts[0], twelve_hour)?;
    let second = parse_time_of_day(parts[1], twelve_hour)?;

    if first == second {
        return Err(WindowError::EmptyWindow {
            window: raw.to_string(),
        });
    }

    Ok(Window {
        activate_at: anchor_to_day(first, tz, now)?,
        deactivate_at: anchor_to_day(second, tz, now)?,
    })
}

fn is_twelve_hour(part: &str) -> bool {
    let upper = part.trim().to_ascii_uppercase();
    upper.ends_with("AM") || upper.ends_with("PM")
}

fn parse_time_of_day(part: &str, twelve_hour: bool) -> Result<NaiveTime, WindowError> {
    let compact: String = part.chars().filter(|c| !c.is_whitespace()).collect();
    let format = if twelve_hour {
        TIME_FORMAT_12H
    } else {
        TIME_FORMAT_24H
    };

    NaiveTime::parse_from_str(&compact, format).map_err(|_| WindowError::InvalidTime {
        time: part.trim().to_string(),
    })
}

/// Re-anchor a time of day onto the calendar day of `now`.
///
/// Ambiguous local times take the earliest instant; times inside a DST gap move
/// forward by one hour.
fn anchor_to_day(time: NaiveTime, tz: Tz, now: DateTime<Tz>) -> Result<DateTime<Tz>, WindowError> {
    let naive = now
        .date_naive()
        .and_hms_opt(time.hour(), time.minute(), 0)
        .ok_or_else(|| WindowError::InvalidTime {
            time: time.to_string(),
        })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .ok_or_else(|| WindowError::NonexistentLocalTime {
            time: naive.to_string(),
            timezone: tz.name().to_string(),
        })
}

fn weekday_from_token(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_uppercase().as_str() {
        "MON" => Some(Weekday::Mon),
        "TUE" => Some(Weekday::Tue),
        "WED" => Some(Weekday::Wed),
        "THU" => Some(Weekday::Thu),
        "FRI" => Some(Weekday::Fri),
        "SAT" => Some(Weekday::Sat),
        "SUN" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Expand a `"MON-FRI"` style range into its weekdays, endpoints included.
///
/// Ranges whose start comes after their end wrap through Saturday into Sunday.
/// A single valid day yields just that day, anything else yields nothing.
pub fn parse_recurrence(raw: &str) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = raw.split('-').filter_map(weekday_from_token).collect();

    if days.len() == 2 {
        let start = days[0].num_days_from_sunday();
        let end = days[1].num_days_from_sunday();

        if start < end {
            days.extend((start + 1..end).map(weekday_from_sunday_index));
        } else {
            days.extend((start + 1..=6).map(weekday_from_sunday_index));
            days.extend((0..end).map(weekday_from_sunday_index));
        }
    }

    days
}

fn weekday_from_sunday_index(index: u32) -> Weekday {
    (0..index).fold(Weekday::Sun, |day, _| day.succ())
}

pub fn is_recurrence_day(day: Weekday, days: &[Weekday]) -> bool {
    days.contains(&day)
}

/// Convenience for callers holding a zoned timestamp.
pub fn is_recurrence_date(now: DateTime<Tz>, days: &[Weekday]) -> bool {
    is_recurrence_day(now.weekday(), days)
}
