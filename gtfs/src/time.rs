use std::cmp::Ordering;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A time of day relative to the start of a service day, as written in stop_times.txt. Hours may
/// go past 23 for trips running after midnight, so this is never treated as a calendar time. The
/// original text is kept and is what gets shown to callers.
#[derive(Clone, Debug)]
pub struct ScheduleTime {
    seconds: u32,
    raw: String,
}

impl ScheduleTime {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.len() != 3 {
            bail!("Schedule time {raw:?} isn't H:MM:SS");
        }
        let mut values = [0u32; 3];
        for (value, part) in values.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                bail!("Schedule time {raw:?} isn't H:MM:SS");
            }
            *value = part
                .parse()
                .map_err(|err| anyhow!("Schedule time {raw:?}: {err}"))?;
        }
        let [hours, minutes, seconds] = values;
        if parts[1].len() != 2 || parts[2].len() != 2 || minutes >= 60 || seconds >= 60 {
            bail!("Schedule time {raw:?} has invalid minutes or seconds");
        }
        let total = hours
            .checked_mul(3600)
            .and_then(|x| x.checked_add(minutes * 60 + seconds))
            .ok_or_else(|| anyhow!("Schedule time {raw:?} is too far past midnight"))?;
        Ok(Self {
            seconds: total,
            raw: trimmed.to_string(),
        })
    }

    pub fn from_seconds(seconds: u32) -> Self {
        Self {
            seconds,
            raw: format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                (seconds % 3600) / 60,
                seconds % 60
            ),
        }
    }

    /// Seconds since the start of the service day
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn start_of_day() -> Self {
        Self::from_seconds(0)
    }

    /// 24:00:00, so a half-open window ending here still covers a departure at 23:59:59
    pub fn end_of_day() -> Self {
        Self::from_seconds(24 * 3600)
    }
}

impl PartialEq for ScheduleTime {
    fn eq(&self, other: &Self) -> bool {
        self.seconds == other.seconds
    }
}

impl Eq for ScheduleTime {}

impl PartialOrd for ScheduleTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds.cmp(&other.seconds)
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for ScheduleTime {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        Self::parse(raw)
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = <String>::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
