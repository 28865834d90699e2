//! DOS date/time encoding.
//!
//! Every directory record carries three timestamp fields packed into a
//! 16-bit date, a 16-bit time (two-second resolution) and a one-byte
//! centisecond count that recovers the second's lost low bit. See
//! `DIR_CrtTime`/`DIR_CrtDate` and friends in [`crate::tree`].

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

/// A directory entry's date/time, already packed into its on-disk form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosTimestamp {
    pub date: u16,
    pub time: u16,
    pub centiseconds: u8,
}

impl DosTimestamp {
    pub const ZERO: DosTimestamp = DosTimestamp {
        date: 0,
        time: 0,
        centiseconds: 0,
    };
}

/// Converts a wall-clock time to `(dos_date, dos_time, centiseconds)`,
/// clamping to the representable range [1980-01-01, 2107-12-31].
pub fn encode(when: DateTime<Local>) -> DosTimestamp {
    let year = when.year();
    let dos_year = year - 1980;

    let (month, day, hour, minute, second, milli) = if dos_year < 0 {
        (1, 1, 0, 0, 0, 0)
    } else if dos_year > 127 {
        (12, 31, 23, 59, 59, 990)
    } else {
        (
            when.month(),
            when.day(),
            when.hour(),
            when.minute(),
            when.second(),
            when.timestamp_subsec_millis(),
        )
    };
    let dos_year = if dos_year < 0 {
        0
    } else if dos_year > 127 {
        127
    } else {
        dos_year as u16
    };

    let date = (dos_year << 9) | ((month as u16) << 5) | (day as u16);
    let time = ((hour as u16) << 11) | ((minute as u16) << 5) | ((second as u16) >> 1);
    let centiseconds = ((milli / 10) + (second & 1) * 100) as u8;

    DosTimestamp {
        date,
        time,
        centiseconds,
    }
}

/// Inverse of [`encode`], used by tests to check round-tripping within
/// rounding error.
#[cfg(test)]
pub fn decode(ts: DosTimestamp) -> DateTime<Local> {
    let year = 1980 + ((ts.date >> 9) & 0x7F) as i32;
    let month = ((ts.date >> 5) & 0x0F) as u32;
    let day = (ts.date & 0x1F) as u32;
    let hour = ((ts.time >> 11) & 0x1F) as u32;
    let minute = ((ts.time >> 5) & 0x3F) as u32;
    let second = ((ts.time & 0x1F) * 2) as u32 + (ts.centiseconds as u32 / 100);
    let milli = (ts.centiseconds as u32 % 100) * 10;
    Local
        .with_ymd_and_hms(year, month.max(1), day.max(1), hour, minute, second.min(59))
        .single()
        .unwrap()
        + chrono::Duration::milliseconds(milli as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encodes_ordinary_time() {
        let when = Local.with_ymd_and_hms(2020, 6, 15, 13, 45, 30).unwrap();
        let ts = encode(when);
        assert_eq!(ts.date, ((2020 - 1980) << 9) | (6 << 5) | 15);
        assert_eq!(ts.time, (13 << 11) | (45 << 5) | (30 >> 1));
        assert_eq!(ts.centiseconds, 0);
    }

    #[test]
    fn odd_second_is_recovered_via_centiseconds() {
        let when = Local
            .with_ymd_and_hms(2020, 6, 15, 13, 45, 31)
            .unwrap()
            + chrono::Duration::milliseconds(250);
        let ts = encode(when);
        assert_eq!(ts.time & 1, 0);
        assert_eq!(ts.centiseconds, 25 + 100);
    }

    #[test]
    fn clamps_below_1980() {
        let when = Local.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let ts = encode(when);
        assert_eq!(ts.date, (0 << 9) | (1 << 5) | 1);
        assert_eq!(ts.time, 0);
        assert_eq!(ts.centiseconds, 0);
    }

    #[test]
    fn clamps_above_2107() {
        let when = Local.with_ymd_and_hms(2200, 3, 4, 5, 6, 7).unwrap();
        let ts = encode(when);
        assert_eq!(ts.date, (127 << 9) | (12 << 5) | 31);
        assert_eq!(ts.time, (23 << 11) | (59 << 5) | (59 >> 1));
        assert_eq!(ts.centiseconds, 199);
    }

    #[test]
    fn round_trips_within_ten_milliseconds() {
        let when = Local.with_ymd_and_hms(2021, 11, 2, 8, 9, 10).unwrap();
        let ts = encode(when);
        let back = decode(ts);
        let diff = (back - when).num_milliseconds().abs();
        assert!(diff <= 10, "diff was {diff}ms");
    }
}
