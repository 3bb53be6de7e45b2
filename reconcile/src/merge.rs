use std::collections::HashMap;

use chrono_tz::Tz;

use gtfs::{EventRecord, MergedSchedule, Schedule, StopID, StopRecord, TripID};

use crate::{
    index_stop_updates, local_clock_time, EventKind, MergeError, RealtimeFeed, StopTimeEvent,
    StopTimeUpdate, StopUpdateIndex,
};

/// Overlays real-time trip updates onto a static schedule. Holds only configuration, so one
/// instance can be shared freely between threads.
#[derive(Clone, Copy, Debug)]
pub struct Merger {
    timezone: Tz,
}

impl Merger {
    /// Feed timestamps are rendered as wall-clock time in `timezone`
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Builds a new schedule with the same trips and stops as `schedule`, where every stop that a
    /// trip update mentions carries that update's arrival, departure, stop sequence and schedule
    /// relationship. Neither input is modified.
    ///
    /// Trip updates are applied in feed order. Every stop of a trip that shares a stop ID gets the
    /// same update, so a loop route visiting a stop twice sees one real-time record at both
    /// visits.
    pub fn merge(
        &self,
        schedule: &Schedule,
        feed: &RealtimeFeed,
    ) -> Result<MergedSchedule, MergeError> {
        let Some(ref entities) = feed.entities else {
            return Ok(schedule.clone());
        };

        let mut updates_per_trip: HashMap<&TripID, Vec<StopUpdateIndex>> = HashMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            let trip_id = entity
                .trip_id
                .as_ref()
                .ok_or_else(|| MergeError::MissingTripId {
                    index: idx,
                    entity_id: entity.id.clone(),
                })?;
            // Feeds routinely mention trips outside the queried window
            if !schedule.contains(trip_id) {
                continue;
            }
            updates_per_trip
                .entry(trip_id)
                .or_default()
                .push(index_stop_updates(&entity.stop_time_updates));
        }

        schedule.try_map_stops(|trip| {
            let trip_id = &trip.trip_info.trip_id;
            let Some(indices) = updates_per_trip.get(trip_id) else {
                return Ok(trip.stops.clone());
            };
            let mut stops = Vec::with_capacity(trip.stops.len());
            for stop in &trip.stops {
                let mut merged = stop.clone();
                for index in indices {
                    if let Some(update) = index.get(&stop.stop_id) {
                        self.overlay(trip_id, &mut merged, update)?;
                    }
                }
                stops.push(merged);
            }
            Ok(stops)
        })
    }

    // Only fields the update actually carries are touched
    fn overlay(
        &self,
        trip_id: &TripID,
        stop: &mut StopRecord,
        update: &StopTimeUpdate,
    ) -> Result<(), MergeError> {
        if let Some(ref departure) = update.departure {
            stop.actual_departure = Some(self.event_record(
                trip_id,
                &stop.stop_id,
                EventKind::Departure,
                departure,
            )?);
        }
        if let Some(ref arrival) = update.arrival {
            stop.realtime_arrival = Some(self.event_record(
                trip_id,
                &stop.stop_id,
                EventKind::Arrival,
                arrival,
            )?);
        }
        if let Some(stop_sequence) = update.stop_sequence {
            stop.stop_sequence = Some(stop_sequence);
        }
        if let Some(rel) = update.schedule_relationship {
            stop.schedule_relationship = Some(rel);
        }
        Ok(())
    }

    fn event_record(
        &self,
        trip_id: &TripID,
        stop_id: &StopID,
        field: EventKind,
        event: &StopTimeEvent,
    ) -> Result<EventRecord, MergeError> {
        let time = match event.time {
            Some(ref raw) => Some(local_clock_time(raw, &self.timezone).ok_or_else(|| {
                MergeError::MalformedTime {
                    trip_id: trip_id.clone(),
                    stop_id: stop_id.clone(),
                    field,
                    value: raw.to_string(),
                }
            })?),
            None => None,
        };
        Ok(EventRecord {
            time,
            delay: event.delay,
            uncertainty: event.uncertainty,
            other: event.other.clone(),
        })
    }
}

/// Shorthand for `Merger::new(timezone).merge(schedule, feed)`
pub fn merge(
    schedule: &Schedule,
    feed: &RealtimeFeed,
    timezone: Tz,
) -> Result<MergedSchedule, MergeError> {
    Merger::new(timezone).merge(schedule, feed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Asia::Tokyo;
    use gtfs::{RouteID, ScheduleRelationship, ServiceID, TripInfo, TripRecord};

    use super::*;
    use crate::{EpochSeconds, TripUpdateEntity};

    fn epoch(h: u32, m: u32, s: u32) -> i64 {
        Tokyo
            .with_ymd_and_hms(2025, 10, 22, h, m, s)
            .unwrap()
            .timestamp()
    }

    fn schedule(trip_id: &str, stops: &[&str]) -> Schedule {
        let mut schedule = Schedule::new();
        schedule
            .insert(TripRecord {
                trip_info: TripInfo {
                    trip_id: TripID::new(trip_id),
                    route_id: RouteID::new("R1"),
                    service_id: ServiceID::new("weekday"),
                    route_short_name: Some("1".to_string()),
                    route_long_name: Some("Loop".to_string()),
                },
                stops: stops
                    .iter()
                    .map(|stop| {
                        StopRecord::scheduled(
                            StopID::new(*stop),
                            "08:00:00".to_string(),
                            Some(format!("{stop} name")),
                            None,
                        )
                    })
                    .collect(),
            })
            .unwrap();
        schedule
    }

    fn entity(trip_id: &str, updates: Vec<StopTimeUpdate>) -> TripUpdateEntity {
        TripUpdateEntity {
            id: Some(format!("entity-{trip_id}")),
            trip_id: Some(TripID::new(trip_id)),
            stop_time_updates: updates,
        }
    }

    fn departure_at(stop: &str, time: EpochSeconds) -> StopTimeUpdate {
        StopTimeUpdate {
            stop_id: Some(StopID::new(stop)),
            departure: Some(StopTimeEvent {
                time: Some(time),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn feed(entities: Vec<TripUpdateEntity>) -> RealtimeFeed {
        RealtimeFeed {
            entities: Some(entities),
        }
    }

    #[test]
    fn no_entity_list_is_a_plain_copy() {
        let input = schedule("T1", &["A", "B"]);
        let merged = Merger::new(Tokyo)
            .merge(&input, &RealtimeFeed::empty())
            .unwrap();
        assert_eq!(merged, input);
    }

    #[test]
    fn overlays_departure_and_arrival() {
        let input = schedule("T1", &["A", "B"]);
        let update = StopTimeUpdate {
            stop_id: Some(StopID::new("A")),
            arrival: Some(StopTimeEvent {
                time: Some(EpochSeconds::Text(epoch(8, 2, 30).to_string())),
                uncertainty: Some(30),
                ..Default::default()
            }),
            departure: Some(StopTimeEvent {
                time: Some(EpochSeconds::Integer(epoch(8, 3, 0))),
                delay: Some(180),
                ..Default::default()
            }),
            stop_sequence: Some(4),
            schedule_relationship: Some(ScheduleRelationship::Scheduled),
        };
        let merged = Merger::new(Tokyo)
            .merge(&input, &feed(vec![entity("T1", vec![update])]))
            .unwrap();

        let stop = &merged.get(&TripID::new("T1")).unwrap().stops[0];
        let departure = stop.actual_departure.as_ref().unwrap();
        assert_eq!(departure.time.as_deref(), Some("08:03:00"));
        assert_eq!(departure.delay, Some(180));
        let arrival = stop.realtime_arrival.as_ref().unwrap();
        assert_eq!(arrival.time.as_deref(), Some("08:02:30"));
        assert_eq!(arrival.uncertainty, Some(30));
        assert_eq!(stop.stop_sequence, Some(4));
        assert_eq!(
            stop.schedule_relationship,
            Some(ScheduleRelationship::Scheduled)
        );
        assert_eq!(stop.departure_scheduled_time, "08:00:00");

        // The other stop is untouched
        assert_eq!(
            merged.get(&TripID::new("T1")).unwrap().stops[1],
            input.get(&TripID::new("T1")).unwrap().stops[1]
        );
    }

    #[test]
    fn event_without_time_is_attached_without_one() {
        let input = schedule("T1", &["A"]);
        let update = StopTimeUpdate {
            stop_id: Some(StopID::new("A")),
            departure: Some(StopTimeEvent {
                delay: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(&input, &feed(vec![entity("T1", vec![update])]), Tokyo).unwrap();
        let stop = &merged.get(&TripID::new("T1")).unwrap().stops[0];
        let departure = stop.actual_departure.as_ref().unwrap();
        assert_eq!(departure.time, None);
        assert_eq!(departure.delay, Some(60));
        assert!(stop.realtime_arrival.is_none());
        assert!(stop.stop_sequence.is_none());
    }

    #[test]
    fn overlay_never_clears_fields() {
        let input = schedule("T1", &["A"]);
        let first = entity("T1", vec![departure_at("A", EpochSeconds::Integer(epoch(8, 3, 0)))]);
        let second = entity(
            "T1",
            vec![StopTimeUpdate {
                stop_id: Some(StopID::new("A")),
                schedule_relationship: Some(ScheduleRelationship::NoData),
                ..Default::default()
            }],
        );
        let merged = merge(&input, &feed(vec![first, second]), Tokyo).unwrap();
        let stop = &merged.get(&TripID::new("T1")).unwrap().stops[0];
        assert_eq!(
            stop.actual_departure.as_ref().unwrap().time.as_deref(),
            Some("08:03:00")
        );
        assert_eq!(
            stop.schedule_relationship,
            Some(ScheduleRelationship::NoData)
        );
    }

    #[test]
    fn duplicate_scheduled_visits_share_one_update() {
        let input = schedule("LOOP", &["A", "B", "A"]);
        let update = departure_at("A", EpochSeconds::Integer(epoch(8, 10, 0)));
        let merged = merge(&input, &feed(vec![entity("LOOP", vec![update])]), Tokyo).unwrap();
        let stops = &merged.get(&TripID::new("LOOP")).unwrap().stops;
        assert_eq!(stops.len(), 3);
        assert_eq!(stops[0].actual_departure, stops[2].actual_departure);
        assert!(stops[0].actual_departure.is_some());
        assert!(stops[1].actual_departure.is_none());
    }

    #[test]
    fn malformed_time_names_the_stop() {
        let input = schedule("T1", &["A", "B"]);
        let update = departure_at("B", EpochSeconds::Text("not-a-time".to_string()));
        let err = merge(&input, &feed(vec![entity("T1", vec![update])]), Tokyo).unwrap_err();
        assert_eq!(
            err,
            MergeError::MalformedTime {
                trip_id: TripID::new("T1"),
                stop_id: StopID::new("B"),
                field: EventKind::Departure,
                value: "not-a-time".to_string(),
            }
        );
        assert!(err.to_string().contains("departure"));
    }

    #[test]
    fn malformed_time_on_an_unscheduled_stop_is_never_read() {
        let input = schedule("T1", &["A"]);
        let update = departure_at("Z", EpochSeconds::Text("garbage".to_string()));
        assert!(merge(&input, &feed(vec![entity("T1", vec![update])]), Tokyo).is_ok());
    }

    #[test]
    fn entity_without_trip_id_is_rejected() {
        let input = schedule("T1", &["A"]);
        let broken = TripUpdateEntity {
            id: Some("e7".to_string()),
            trip_id: None,
            stop_time_updates: Vec::new(),
        };
        let err = merge(&input, &feed(vec![entity("T1", Vec::new()), broken]), Tokyo).unwrap_err();
        assert_eq!(
            err,
            MergeError::MissingTripId {
                index: 1,
                entity_id: Some("e7".to_string()),
            }
        );
    }
}
