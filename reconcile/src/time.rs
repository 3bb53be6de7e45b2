use chrono::DateTime;
use chrono_tz::Tz;

use crate::EpochSeconds;

/// Renders a feed timestamp as "HH:MM:SS" on the wall clock of `timezone`, the same form the
/// static schedule uses. None if the value isn't an integer number of seconds, or is out of
/// range.
pub fn local_clock_time(value: &EpochSeconds, timezone: &Tz) -> Option<String> {
    let seconds = value.as_seconds()?;
    let instant = DateTime::from_timestamp(seconds, 0)?;
    Some(instant.with_timezone(timezone).format("%H:%M:%S").to_string())
}
