use chrono::{NaiveTime, TimeZone, Utc};

/// Whether `now` falls inside the sleep window `[bed_time, wake_time)`.
///
/// A bed time later than the wake time wraps past midnight.
pub fn is_night_at(bed_time: NaiveTime, wake_time: NaiveTime, now: NaiveTime) -> bool {
    if bed_time > wake_time {
        now >= bed_time || now < wake_time
    } else {
        bed_time <= now && now < wake_time
    }
}

/// Evaluates the sleep window against the wall clock in `tz`.
pub fn is_night_now<Z: TimeZone>(bed_time: NaiveTime, wake_time: NaiveTime, tz: &Z) -> bool {
    is_night_at(bed_time, wake_time, local_time(tz))
}

pub fn local_time<Z: TimeZone>(tz: &Z) -> NaiveTime {
    Utc::now().with_timezone(tz).time()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, second).unwrap()
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        let (bed, wake) = (at(21, 0, 0), at(5, 0, 0));

        assert!(is_night_at(bed, wake, at(23, 0, 0)));
        assert!(is_night_at(bed, wake, at(0, 0, 0)));
        assert!(is_night_at(bed, wake, at(4, 59, 0)));
        assert!(is_night_at(bed, wake, at(4, 59, 59)));
        assert!(!is_night_at(bed, wake, at(5, 0, 0)));
        assert!(!is_night_at(bed, wake, at(5, 0, 1)));
        assert!(!is_night_at(bed, wake, at(13, 0, 0)));
        assert!(!is_night_at(bed, wake, at(20, 59, 0)));
    }

    #[test]
    fn bed_time_is_inclusive() {
        assert!(is_night_at(at(21, 0, 0), at(5, 0, 0), at(21, 0, 0)));
        assert!(is_night_at(at(1, 0, 0), at(7, 0, 0), at(1, 0, 0)));
    }

    #[test]
    fn non_wrapping_window() {
        let (bed, wake) = (at(1, 0, 0), at(7, 0, 0));

        assert!(is_night_at(bed, wake, at(3, 30, 0)));
        assert!(!is_night_at(bed, wake, at(7, 0, 0)));
        assert!(!is_night_at(bed, wake, at(0, 59, 59)));
        assert!(!is_night_at(bed, wake, at(23, 0, 0)));
    }

    #[test]
    fn equal_bed_and_wake_is_never_night() {
        let same = at(6, 0, 0);

        assert!(!is_night_at(same, same, at(6, 0, 0)));
        assert!(!is_night_at(same, same, at(18, 0, 0)));
    }
}
