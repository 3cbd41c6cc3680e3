//! ProDOS date and time words.
//!
//! A date word packs day (bits 0-4), month (bits 5-8) and year-since-1900
//! (bits 9-15, so years 1900-2027). A time word packs minute (bits 0-5) and
//! hour (bits 8-12). Out-of-range values clamp on encode; a zero date word
//! decodes to "use the current time".

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

pub fn date_word<T: Datelike>(t: &T) -> u16 {
    let year = (t.year() - 1900).clamp(0, 127) as u16;
    let month = t.month().clamp(1, 12) as u16;
    let day = t.day().clamp(1, 31) as u16;
    (year << 9) | (month << 5) | day
}

pub fn time_word<T: Timelike>(t: &T) -> u16 {
    let hour = t.hour().min(23) as u16;
    let minute = t.minute().min(59) as u16;
    (hour << 8) | minute
}

/// Decode a guest-supplied date/time pair, interpreted as host wall-clock
/// time. A zero date word means "now"; garbage fields also fall back to
/// `None` so callers can substitute the current time.
pub fn decode(date: u16, time: u16) -> Option<DateTime<Utc>> {
    if date == 0 {
        return None;
    }

    let day = (date & 0x1F) as u32;
    let month = ((date >> 5) & 0x0F) as u32;
    let year = 1900 + (date >> 9) as i32;
    let minute = (time & 0x3F) as u32;
    let hour = ((time >> 8) & 0x1F) as u32;

    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn packs_fields_into_the_documented_bits() {
        let d = NaiveDate::from_ymd_opt(1986, 9, 17).unwrap();
        let word = date_word(&d);
        assert_eq!(word & 0x1F, 17);
        assert_eq!((word >> 5) & 0x0F, 9);
        assert_eq!(word >> 9, 86);

        let t = d.and_hms_opt(13, 45, 59).unwrap();
        let word = time_word(&t);
        assert_eq!(word & 0x3F, 45);
        assert_eq!(word >> 8, 13);
    }

    #[test]
    fn clamps_years_outside_the_prodos_range() {
        let before = NaiveDate::from_ymd_opt(1899, 1, 1).unwrap();
        assert_eq!(date_word(&before) >> 9, 0);
        let after = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap();
        assert_eq!(date_word(&after) >> 9, 127);
    }

    #[test]
    fn zero_date_decodes_to_none() {
        assert!(decode(0, 0x0D2D).is_none());
    }

    #[test]
    fn decode_round_trips_through_local_time() {
        let d = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        let t = d.and_hms_opt(23, 59, 0).unwrap();
        let decoded = decode(date_word(&d), time_word(&t)).unwrap();
        let local = decoded.with_timezone(&Local);
        assert_eq!(local.date_naive(), d);
        assert_eq!(local.time(), t.time());
    }

    #[test]
    fn nonsense_fields_decode_to_none() {
        // Month 15, day 0.
        assert!(decode(0x1E0, 0).is_none());
    }
}
