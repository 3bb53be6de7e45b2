use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use prost::Message;
use serde::{Deserialize, Deserializer, Serialize};

use gtfs::{ScheduleRelationship, StopID, TripID};

/// Decoded trip updates from a GTFS-Realtime feed. `entities` is None when the message carried no
/// entity list at all.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeFeed {
    pub entities: Option<Vec<TripUpdateEntity>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TripUpdateEntity {
    /// The feed entity's own ID, only used to describe problems
    pub id: Option<String>,
    /// Required; a merge refuses entities without one
    pub trip_id: Option<TripID>,
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimeUpdate {
    #[serde(default)]
    pub stop_id: Option<StopID>,
    #[serde(default)]
    pub arrival: Option<StopTimeEvent>,
    #[serde(default)]
    pub departure: Option<StopTimeEvent>,
    #[serde(default)]
    pub stop_sequence: Option<u32>,
    #[serde(default, deserialize_with = "lenient_schedule_relationship")]
    pub schedule_relationship: Option<ScheduleRelationship>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StopTimeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<EpochSeconds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<i32>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// A timestamp exactly as the feed delivered it. JSON renderings of the feed write 64-bit integers
/// as strings, and a corrupt feed may contain anything, so validation is left to the merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    Integer(i64),
    Text(String),
    Other(serde_json::Value),
}

impl EpochSeconds {
    pub fn as_seconds(&self) -> Option<i64> {
        match self {
            EpochSeconds::Integer(x) => Some(*x),
            EpochSeconds::Text(x) => x.parse().ok(),
            EpochSeconds::Other(_) => None,
        }
    }
}

impl fmt::Display for EpochSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochSeconds::Integer(x) => write!(f, "{x}"),
            EpochSeconds::Text(x) => write!(f, "{x}"),
            EpochSeconds::Other(x) => write!(f, "{x}"),
        }
    }
}

impl RealtimeFeed {
    pub fn empty() -> Self {
        Self { entities: None }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.as_ref().map(|list| list.len()).unwrap_or(0)
    }
}

/// Decodes a binary GTFS-Realtime FeedMessage. Entities that aren't trip updates (vehicle
/// positions, alerts) are skipped.
pub fn decode_protobuf(bytes: &[u8]) -> Result<RealtimeFeed> {
    let message = gtfs_realtime::FeedMessage::decode(bytes)
        .map_err(|err| anyhow!("Couldn't decode GTFS-Realtime message: {err}"))?;
    if message.entity.is_empty() {
        info!("GTFS-Realtime message has no entities");
        return Ok(RealtimeFeed::empty());
    }

    let mut entities = Vec::new();
    let mut skipped = 0;
    for entity in message.entity {
        let Some(trip_update) = entity.trip_update else {
            skipped += 1;
            continue;
        };
        let stop_time_updates = trip_update
            .stop_time_update
            .into_iter()
            .map(|stu| StopTimeUpdate {
                stop_id: stu.stop_id.map(StopID::from),
                arrival: stu.arrival.map(event_from_protobuf),
                departure: stu.departure.map(event_from_protobuf),
                stop_sequence: stu.stop_sequence,
                schedule_relationship: stu.schedule_relationship.and_then(|code| {
                    let rel = ScheduleRelationship::from_code(code);
                    if rel.is_none() {
                        warn!("Ignoring unknown schedule_relationship {code} in {}", entity.id);
                    }
                    rel
                }),
            })
            .collect();
        entities.push(TripUpdateEntity {
            id: Some(entity.id),
            trip_id: trip_update.trip.trip_id.map(TripID::from),
            stop_time_updates,
        });
    }
    if skipped > 0 {
        debug!("Skipped {skipped} entities without trip updates");
    }
    info!("Decoded {} trip updates", entities.len());
    Ok(RealtimeFeed {
        entities: Some(entities),
    })
}

fn event_from_protobuf(event: gtfs_realtime::trip_update::StopTimeEvent) -> StopTimeEvent {
    StopTimeEvent {
        time: event.time.map(EpochSeconds::Integer),
        delay: event.delay,
        uncertainty: event.uncertainty,
        other: BTreeMap::new(),
    }
}

/// Decodes the JSON rendering of a FeedMessage, using the proto field names:
/// `{"entity": [{"id": ..., "trip_update": {"trip": {"trip_id": ...}, "stop_time_update": [...]}}]}`
pub fn decode_json(bytes: &[u8]) -> Result<RealtimeFeed> {
    let message: JsonFeedMessage = serde_json::from_slice(bytes)?;
    let Some(list) = message.entity else {
        info!("JSON feed has no entity list");
        return Ok(RealtimeFeed::empty());
    };

    let mut entities = Vec::new();
    for entity in list {
        let Some(trip_update) = entity.trip_update else {
            continue;
        };
        entities.push(TripUpdateEntity {
            id: entity.id,
            trip_id: trip_update.trip.and_then(|trip| trip.trip_id),
            stop_time_updates: trip_update.stop_time_update,
        });
    }
    info!("Decoded {} trip updates", entities.len());
    Ok(RealtimeFeed {
        entities: Some(entities),
    })
}

// JSON renderings write known values by name and unknown ones as the bare enum number. Anything
// unrecognized is dropped, the same as the protobuf path.
fn lenient_schedule_relationship<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<ScheduleRelationship>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    let rel = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(ref code)) => code
            .as_i64()
            .and_then(|code| i32::try_from(code).ok())
            .and_then(ScheduleRelationship::from_code),
        Some(ref other @ serde_json::Value::String(_)) => {
            serde_json::from_value(other.clone()).ok()
        }
        Some(_) => None,
    };
    if rel.is_none() {
        if let Some(value) = value {
            warn!("Ignoring unknown schedule_relationship {value}");
        }
    }
    Ok(rel)
}

#[derive(Deserialize)]
struct JsonFeedMessage {
    #[serde(default)]
    entity: Option<Vec<JsonFeedEntity>>,
}

#[derive(Deserialize)]
struct JsonFeedEntity {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    trip_update: Option<JsonTripUpdate>,
}

#[derive(Deserialize)]
struct JsonTripUpdate {
    #[serde(default)]
    trip: Option<JsonTripDescriptor>,
    #[serde(default)]
    stop_time_update: Vec<StopTimeUpdate>,
}

#[derive(Deserialize)]
struct JsonTripDescriptor {
    #[serde(default)]
    trip_id: Option<TripID>,
}
