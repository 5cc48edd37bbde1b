use chrono::{NaiveDateTime, TimeDelta, Timelike};

/// Push photos taken before `day_begins` o'clock back to the previous day.
///
/// The shift is `hour + 1` hours, so any early time lands at 23:MM of the
/// previous day (00:30 becomes 23:30, 05:30 with `day_begins = 6` becomes
/// 23:30 as well). `day_begins = 0` never shifts anything.
pub fn apply_day_begins(date: NaiveDateTime, day_begins: u32) -> NaiveDateTime {
    let hour = date.hour();
    if hour >= day_begins {
        return date;
    }
    TimeDelta::try_hours(i64::from(hour) + 1)
        .and_then(|shift| date.checked_sub_signed(shift))
        .unwrap_or(date)
}
