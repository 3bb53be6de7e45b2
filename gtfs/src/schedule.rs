use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::Result;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{RouteID, ServiceID, StopID, TripID};

/// The trips serving some stops during a window, keyed by trip ID. Trips keep the order they were
/// inserted in, which is also the order they serialize in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schedule {
    trips: Vec<TripRecord>,
    position: HashMap<TripID, usize>,
}

/// A schedule with real-time fields filled in. Same shape as the input, so a merged schedule can
/// be fed through the merge again.
pub type MergedSchedule = Schedule;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub trip_info: TripInfo,
    pub stops: Vec<StopRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripInfo {
    pub trip_id: TripID,
    pub route_id: RouteID,
    pub service_id: ServiceID,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    /// As written in the static schedule, possibly past 24:00:00
    pub departure_scheduled_time: String,
    pub stop_id: StopID,
    pub stop_name: Option<String>,
    pub stop_headsign: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_departure: Option<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime_arrival: Option<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_relationship: Option<ScheduleRelationship>,
}

/// An observed or predicted arrival/departure attached to a stop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Local wall-clock "HH:MM:SS"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<i32>,
    /// Anything else the feed said about this event, passed through untouched
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleRelationship {
    Scheduled,
    Skipped,
    NoData,
    Unscheduled,
}

impl ScheduleRelationship {
    /// The numbering used by GTFS-Realtime's StopTimeUpdate.ScheduleRelationship
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Scheduled),
            1 => Some(Self::Skipped),
            2 => Some(Self::NoData),
            3 => Some(Self::Unscheduled),
            _ => None,
        }
    }
}

impl StopRecord {
    /// A stop with no real-time information yet
    pub fn scheduled(
        stop_id: StopID,
        departure_scheduled_time: String,
        stop_name: Option<String>,
        stop_headsign: Option<String>,
    ) -> Self {
        Self {
            departure_scheduled_time,
            stop_id,
            stop_name,
            stop_headsign,
            actual_departure: None,
            realtime_arrival: None,
            stop_sequence: None,
            schedule_relationship: None,
        }
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trip: TripRecord) -> Result<()> {
        let trip_id = trip.trip_info.trip_id.clone();
        if self.position.contains_key(&trip_id) {
            bail!("Schedule already has {:?}", trip_id);
        }
        self.position.insert(trip_id, self.trips.len());
        self.trips.push(trip);
        Ok(())
    }

    pub fn get(&self, trip_id: &TripID) -> Option<&TripRecord> {
        self.position.get(trip_id).map(|idx| &self.trips[*idx])
    }

    pub fn contains(&self, trip_id: &TripID) -> bool {
        self.position.contains_key(trip_id)
    }

    /// In insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TripRecord> {
        self.trips.iter()
    }

    pub fn trip_ids(&self) -> impl Iterator<Item = &TripID> {
        self.trips.iter().map(|trip| &trip.trip_info.trip_id)
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Builds a new schedule with the same trips in the same order, replacing each trip's stops
    /// with whatever `f` returns. `self` is only read.
    pub fn try_map_stops<E, F>(&self, mut f: F) -> Result<Schedule, E>
    where
        F: FnMut(&TripRecord) -> Result<Vec<StopRecord>, E>,
    {
        let mut trips = Vec::with_capacity(self.trips.len());
        for trip in &self.trips {
            trips.push(TripRecord {
                trip_info: trip.trip_info.clone(),
                stops: f(trip)?,
            });
        }
        Ok(Schedule {
            trips,
            position: self.position.clone(),
        })
    }
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.trips.len()))?;
        for trip in &self.trips {
            map.serialize_entry(&trip.trip_info.trip_id, trip)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_map(ScheduleVisitor)
    }
}

struct ScheduleVisitor;

impl<'de> Visitor<'de> for ScheduleVisitor {
    type Value = Schedule;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from trip ID to trip")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Schedule, A::Error> {
        let mut schedule = Schedule::new();
        while let Some((key, trip)) = access.next_entry::<TripID, TripRecord>()? {
            if key != trip.trip_info.trip_id {
                return Err(serde::de::Error::custom(format!(
                    "{:?} is stored under key {:?}",
                    trip.trip_info.trip_id, key
                )));
            }
            schedule.insert(trip).map_err(serde::de::Error::custom)?;
        }
        Ok(schedule)
    }
}
