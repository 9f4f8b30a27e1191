//! File timestamps.
//!
//! The engine exchanges times as Windows FILETIME values: a 64-bit count of
//! 100-nanosecond intervals since January 1, 1601 (UTC). [`Timestamp`] wraps
//! that value and converts to the representations the individual formats use:
//!
//! - `SystemTime` for the public API and the file system
//! - Unix seconds for tar headers (sub-second precision is truncated)
//! - broken-down civil time for zip's MS-DOS date fields
//!
//! # Example
//!
//! ```rust
//! use szbridge::Timestamp;
//!
//! let ts = Timestamp::from_unix_secs(1_700_000_000).unwrap();
//! assert_eq!(ts.as_unix_secs(), 1_700_000_000);
//! assert_eq!(Timestamp::from_filetime(ts.as_filetime()), ts);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Offset between 1601-01-01 and 1970-01-01 in 100-nanosecond intervals
/// (11,644,473,600 seconds).
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

const INTERVALS_PER_SECOND: u64 = 10_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// A point in time with FILETIME precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

/// Broken-down UTC calendar time, as stored in MS-DOS date fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    /// Full year, e.g. 2024.
    pub year: i32,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-59.
    pub second: u8,
}

impl Timestamp {
    /// Creates a timestamp from a raw FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn as_filetime(&self) -> u64 {
        self.filetime
    }

    /// The current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Creates a timestamp from Unix seconds.
    ///
    /// Returns `None` if the value is outside the FILETIME range.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Self::from_unix_secs_nanos(secs, 0)
    }

    /// Creates a timestamp from Unix seconds plus nanoseconds; nanoseconds are
    /// truncated to 100 ns.
    pub fn from_unix_secs_nanos(secs: i64, nanos: u32) -> Option<Self> {
        let sub = u64::from(nanos) / 100;
        if secs >= 0 {
            (secs as u64)
                .checked_mul(INTERVALS_PER_SECOND)?
                .checked_add(FILETIME_UNIX_DIFF)?
                .checked_add(sub)
                .map(Self::from_filetime)
        } else {
            let back = secs.unsigned_abs().checked_mul(INTERVALS_PER_SECOND)?;
            FILETIME_UNIX_DIFF
                .checked_sub(back)?
                .checked_add(sub)
                .map(Self::from_filetime)
        }
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => {
                let secs = i64::try_from(d.as_secs()).ok()?;
                Self::from_unix_secs_nanos(secs, d.subsec_nanos())
            }
            Err(e) => {
                let d = e.duration();
                let intervals = d
                    .as_secs()
                    .checked_mul(INTERVALS_PER_SECOND)?
                    .checked_add(u64::from(d.subsec_nanos()) / 100)?;
                FILETIME_UNIX_DIFF
                    .checked_sub(intervals)
                    .map(Self::from_filetime)
            }
        }
    }

    /// Returns Unix seconds, rounding toward negative infinity.
    pub fn as_unix_secs(&self) -> i64 {
        let diff = self.filetime as i128 - FILETIME_UNIX_DIFF as i128;
        diff.div_euclid(INTERVALS_PER_SECOND as i128) as i64
    }

    /// Converts to a `SystemTime` without loss.
    pub fn as_system_time(&self) -> SystemTime {
        let to_duration = |intervals: u64| {
            Duration::new(
                intervals / INTERVALS_PER_SECOND,
                ((intervals % INTERVALS_PER_SECOND) * 100) as u32,
            )
        };
        if self.filetime >= FILETIME_UNIX_DIFF {
            UNIX_EPOCH + to_duration(self.filetime - FILETIME_UNIX_DIFF)
        } else {
            UNIX_EPOCH - to_duration(FILETIME_UNIX_DIFF - self.filetime)
        }
    }

    /// Unix mtime as stored in tar headers; clamps pre-1970 times to zero.
    pub fn as_unix_mtime(&self) -> u64 {
        self.as_unix_secs().max(0) as u64
    }

    /// Breaks the timestamp into UTC calendar fields.
    pub fn to_civil(&self) -> CivilTime {
        let secs = self.as_unix_secs();
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let rem = secs.rem_euclid(SECONDS_PER_DAY);
        let (year, month, day) = civil_from_days(days);
        CivilTime {
            year,
            month,
            day,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }

    /// Builds a timestamp from UTC calendar fields.
    ///
    /// Returns `None` for out-of-range fields.
    pub fn from_civil(civil: CivilTime) -> Option<Self> {
        if !(1..=12).contains(&civil.month)
            || !(1..=31).contains(&civil.day)
            || civil.hour > 23
            || civil.minute > 59
            || civil.second > 60
        {
            return None;
        }
        let days = days_from_civil(civil.year, civil.month, civil.day);
        let secs = days * SECONDS_PER_DAY
            + i64::from(civil.hour) * 3600
            + i64::from(civil.minute) * 60
            + i64::from(civil.second);
        Self::from_unix_secs(secs)
    }
}

// Days since 1970-01-01 to proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i32, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year as i32, month, day)
}

fn days_from_civil(year: i32, month: u8, day: u8) -> i64 {
    let y = i64::from(year) - i64::from(month <= 2);
    let era = y.div_euclid(400);
    let yoe = y.rem_euclid(400);
    let m = i64::from(month);
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

impl Default for Timestamp {
    /// The Unix epoch.
    fn default() -> Self {
        Self::from_filetime(FILETIME_UNIX_DIFF)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = crate::Error;

    fn try_from(time: SystemTime) -> crate::Result<Self> {
        Self::from_system_time(time)
            .ok_or_else(|| crate::Error::InvalidArgument("time outside FILETIME range".into()))
    }
}
