//! Packed FAT date/time fields.

use chrono::{Datelike, Local, Timelike};

/// Creation stamp as stored in a directory entry.
///
/// `date = ((year - 1980) << 9) | (month << 5) | day`,
/// `time = (hour << 11) | (minute << 5) | (second / 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatTimestamp {
    pub date: u16,
    pub time: u16,
}

impl FatTimestamp {
    /// Pack calendar fields. Years before 1980 clamp to 1980.
    pub fn from_civil(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = year.saturating_sub(1980).min(0x7F);
        let date = (year << 9) | ((month as u16 & 0x0F) << 5) | (day as u16 & 0x1F);
        let time = ((hour as u16 & 0x1F) << 11)
            | ((minute as u16 & 0x3F) << 5)
            | ((second as u16 / 2) & 0x1F);
        Self { date, time }
    }

    /// Current local wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Pack any calendar date-time. Years outside 1980..=2107 clamp.
    pub fn from_datetime<T: Datelike + Timelike>(dt: &T) -> Self {
        Self::from_civil(
            dt.year().clamp(0, u16::MAX as i32) as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// `(year, month, day)`.
    pub fn date_parts(&self) -> (u16, u8, u8) {
        (
            ((self.date >> 9) & 0x7F) + 1980,
            ((self.date >> 5) & 0x0F) as u8,
            (self.date & 0x1F) as u8,
        )
    }

    /// `(hour, minute, second)`; seconds have 2-second resolution.
    pub fn time_parts(&self) -> (u8, u8, u8) {
        (
            ((self.time >> 11) & 0x1F) as u8,
            ((self.time >> 5) & 0x3F) as u8,
            ((self.time & 0x1F) * 2) as u8,
        )
    }
}
