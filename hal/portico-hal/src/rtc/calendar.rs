//! Proleptic Gregorian calendar arithmetic
//!
//! All conversions are UTC: no time zone offset and daylight saving is
//! never in effect.

use core::fmt;

const SECONDS_PER_DAY: i64 = 86_400;
/// Days from 0000-03-01 to 1970-01-01
const EPOCH_SHIFT: i64 = 719_468;
const DAYS_PER_ERA: i64 = 146_097;

/// Day of the week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Weekday {
    #[default]
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    /// Weekday of a day counted from 1970-01-01 (a Thursday)
    fn from_unix_days(days: i64) -> Self {
        match (days + 4).rem_euclid(7) {
            0 => Weekday::Sunday,
            1 => Weekday::Monday,
            2 => Weekday::Tuesday,
            3 => Weekday::Wednesday,
            4 => Weekday::Thursday,
            5 => Weekday::Friday,
            _ => Weekday::Saturday,
        }
    }
}

pub const fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`, or `None` for a bad month
pub const fn days_in_month(year: i32, month: u8) -> Option<u8> {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => Some(31),
        4 | 6 | 9 | 11 => Some(30),
        2 if is_leap_year(year) => Some(29),
        2 => Some(28),
        _ => None,
    }
}

/// Days since 1970-01-01 of a date with `month` in 1-12
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month_from_march = (month + 9) % 12;
    let day_of_year = (153 * month_from_march + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * DAYS_PER_ERA + day_of_era - EPOCH_SHIFT
}

/// Inverse of [`days_from_civil`]
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let days = days + EPOCH_SHIFT;
    let era = days.div_euclid(DAYS_PER_ERA);
    let day_of_era = days - era * DAYS_PER_ERA;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let month_from_march = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * month_from_march + 2) / 5 + 1;
    let month = if month_from_march < 10 {
        month_from_march + 3
    } else {
        month_from_march - 9
    };
    let year = year_of_era + era * 400;

    // Both bounded by the algorithm: month in 1-12, day in 1-31
    (if month <= 2 { year + 1 } else { year }, month as u8, day as u8)
}

/// Broken-down calendar time
///
/// `year`, `month` (1-12), `day` (1-31), `hour`, `minute` and `second` are
/// the primary fields. `weekday`, `day_of_year` (1-366) and `is_dst` are
/// derived from them by [`CalendarTime::validate`] and never trusted on
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalendarTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: Weekday,
    pub day_of_year: u16,
    pub is_dst: bool,
}

impl CalendarTime {
    /// Build a time from its primary fields
    ///
    /// The derived fields are left at their defaults until validation.
    pub const fn new(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            weekday: Weekday::Sunday,
            day_of_year: 0,
            is_dst: false,
        }
    }

    /// Seconds since the Unix epoch
    ///
    /// Out-of-range fields are normalized instead of rejected: a 30th of
    /// February counts as the 2nd of March, month 13 as January of the next
    /// year.
    pub fn to_unix(&self) -> i64 {
        let months = i64::from(self.year) * 12 + i64::from(self.month) - 1;
        let year = months.div_euclid(12);
        let month = months.rem_euclid(12) + 1;
        let days = days_from_civil(year, month, 1) + i64::from(self.day) - 1;

        days * SECONDS_PER_DAY
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second)
    }

    /// Calendar time of `seconds` since the Unix epoch, derived fields
    /// included
    ///
    /// Returns `None` if the year does not fit in an `i32`.
    pub fn from_unix(seconds: i64) -> Option<Self> {
        let days = seconds.div_euclid(SECONDS_PER_DAY);
        let time_of_day = seconds.rem_euclid(SECONDS_PER_DAY);

        let (year, month, day) = civil_from_days(days);
        let year = i32::try_from(year).ok()?;
        let day_of_year = days - days_from_civil(i64::from(year), 1, 1) + 1;

        Some(Self {
            year,
            month,
            day,
            hour: (time_of_day / 3600) as u8,
            minute: (time_of_day % 3600 / 60) as u8,
            second: (time_of_day % 60) as u8,
            weekday: Weekday::from_unix_days(days),
            day_of_year: day_of_year as u16,
            is_dst: false,
        })
    }

    /// Check that the primary fields name a real instant
    ///
    /// Converts to an epoch count and back, then compares every field with
    /// the round-tripped value; any normalization on the way (April 31st,
    /// 24:00, a leap second) shows up as a mismatch. On success returns the
    /// time with its derived fields filled in.
    pub fn validate(&self) -> Option<Self> {
        let converted = Self::from_unix(self.to_unix())?;

        let mut candidate = *self;
        candidate.weekday = converted.weekday;
        candidate.day_of_year = converted.day_of_year;
        candidate.is_dst = converted.is_dst;

        (candidate == converted).then_some(converted)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_some()
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
