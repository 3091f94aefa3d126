//! FAT date/time stamps

use std::time::{SystemTime, UNIX_EPOCH};

/// Calendar timestamp with FAT resolution (two seconds for write times,
/// 10 ms when a creation hundredths byte is present).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FatDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u16,
}

impl FatDateTime {
    /// Decode a packed date/time pair. A zero date means "not set".
    pub fn decode(date: u16, time: u16, tenths: u8) -> Option<Self> {
        if date == 0 {
            return None;
        }
        let extra_ms = tenths as u16 * 10;
        Some(Self {
            year: 1980 + (date >> 9),
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8 + (extra_ms / 1000) as u8,
            millis: extra_ms % 1000,
        })
    }

    pub fn decode_date(date: u16) -> Option<Self> {
        Self::decode(date, 0, 0)
    }

    pub fn encode_date(&self) -> u16 {
        let year = self.year.clamp(1980, 2107) - 1980;
        (year << 9) | ((self.month as u16) << 5) | self.day as u16
    }

    pub fn encode_time(&self) -> u16 {
        ((self.hour as u16) << 11) | ((self.minute as u16) << 5) | (self.second as u16 / 2)
    }

    /// Hundredths byte carrying the odd second and milliseconds
    pub fn encode_tenths(&self) -> u8 {
        ((self.second as u16 % 2) * 100 + self.millis / 10) as u8
    }

    /// Convert seconds since the Unix epoch (UTC) to a calendar timestamp
    pub fn from_unix_seconds(secs: u64) -> Self {
        let days = (secs / 86_400) as i64;
        let rem = secs % 86_400;

        // Civil-from-days, proleptic Gregorian calendar
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z.rem_euclid(146_097);
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
        let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
        let year = (yoe + era * 400 + if month <= 2 { 1 } else { 0 }) as u16;

        Self {
            year,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: ((rem % 3600) / 60) as u8,
            second: (rem % 60) as u8,
            millis: 0,
        }
    }
}

/// Source of "now" for timestamp updates
pub trait TimeProvider {
    fn now(&self) -> FatDateTime;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> FatDateTime {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        FatDateTime::from_unix_seconds(secs)
    }
}

/// Always reports the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider(pub FatDateTime);

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> FatDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_conversion() {
        let t = FatDateTime::from_unix_seconds(0);
        assert_eq!((t.year, t.month, t.day), (1970, 1, 1));
        // 2024-02-29 12:34:56 UTC
        let t = FatDateTime::from_unix_seconds(1_709_210_096);
        assert_eq!((t.year, t.month, t.day), (2024, 2, 29));
        assert_eq!((t.hour, t.minute, t.second), (12, 34, 56));
    }

    #[test]
    fn packed_round_trip() {
        let t = FatDateTime {
            year: 2021,
            month: 7,
            day: 14,
            hour: 23,
            minute: 59,
            second: 31,
            millis: 250,
        };
        let back = FatDateTime::decode(t.encode_date(), t.encode_time(), t.encode_tenths());
        assert_eq!(back, Some(t));
    }

    #[test]
    fn zero_date_is_unset() {
        assert_eq!(FatDateTime::decode(0, 0x1234, 0), None);
    }
}
