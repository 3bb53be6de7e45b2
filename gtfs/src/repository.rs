use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use chrono::NaiveDate;

use super::{
    ScheduleTime, Schedule, StopID, StopRecord, StopTime, Trip, TripID, TripInfo, TripRecord, GTFS,
};

/// Which trips to look up: everything departing one of `stop_ids` on `date`, within
/// `[start, stop)`, capped at `limit` stop visits.
#[derive(Clone, Debug)]
pub struct ScheduleQuery {
    pub stop_ids: BTreeSet<StopID>,
    pub date: NaiveDate,
    pub start: ScheduleTime,
    pub stop: ScheduleTime,
    pub limit: usize,
}

impl ScheduleQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    /// The whole service day up to 24:00:00, with the default limit. Later departures of trips
    /// running past midnight need an explicit window.
    pub fn new<I: IntoIterator<Item = StopID>>(stop_ids: I, date: NaiveDate) -> Self {
        Self {
            stop_ids: stop_ids.into_iter().collect(),
            date,
            start: ScheduleTime::start_of_day(),
            stop: ScheduleTime::end_of_day(),
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn window(mut self, start: ScheduleTime, stop: ScheduleTime) -> Self {
        self.start = start;
        self.stop = stop;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.stop_ids.is_empty() {
            bail!("A schedule query needs at least one stop");
        }
        if self.start > self.stop {
            bail!(
                "Query window starts at {} after it ends at {}",
                self.start,
                self.stop
            );
        }
        Ok(())
    }
}

/// Answers "which trips serve these stops, when" with a schedule ready for merging.
pub trait ScheduleRepository {
    fn schedule_for_stops(&self, query: &ScheduleQuery) -> Result<Schedule>;
}

impl ScheduleRepository for GTFS {
    fn schedule_for_stops(&self, query: &ScheduleQuery) -> Result<Schedule> {
        query.validate()?;
        let services = self.calendar.services_on(query.date);

        let mut visits: Vec<(&ScheduleTime, &Trip, &StopTime)> = Vec::new();
        for trip in self.trips.values() {
            if !services.contains(&trip.service_id) {
                continue;
            }
            for st in &trip.stop_times {
                if !query.stop_ids.contains(&st.stop_id) {
                    continue;
                }
                if let Some(ref departure) = st.departure_time {
                    if departure >= &query.start && departure < &query.stop {
                        visits.push((departure, trip, st));
                    }
                }
            }
        }
        visits.sort_by(|a, b| {
            a.0.cmp(b.0)
                .then_with(|| a.1.trip_id.cmp(&b.1.trip_id))
                .then_with(|| a.2.stop_sequence.cmp(&b.2.stop_sequence))
        });
        visits.truncate(query.limit);

        // Group by trip, keeping the order each trip first shows up
        let mut order: Vec<&TripID> = Vec::new();
        let mut grouped: HashMap<&TripID, (&Trip, Vec<StopRecord>)> = HashMap::new();
        for (departure, trip, st) in visits {
            let entry = grouped.entry(&trip.trip_id).or_insert_with(|| {
                order.push(&trip.trip_id);
                (trip, Vec::new())
            });
            entry.1.push(StopRecord::scheduled(
                st.stop_id.clone(),
                departure.as_str().to_string(),
                self.stops.get(&st.stop_id).and_then(|stop| stop.name.clone()),
                st.stop_headsign.clone(),
            ));
        }

        let mut schedule = Schedule::new();
        for trip_id in order {
            let (trip, stops) = grouped
                .remove(trip_id)
                .ok_or_else(|| anyhow!("Lost track of {:?}", trip_id))?;
            let route = self.routes.get(&trip.route_id);
            schedule.insert(TripRecord {
                trip_info: TripInfo {
                    trip_id: trip.trip_id.clone(),
                    route_id: trip.route_id.clone(),
                    service_id: trip.service_id.clone(),
                    route_short_name: route.and_then(|r| r.short_name.clone()),
                    route_long_name: route.and_then(|r| r.long_name.clone()),
                },
                stops,
            })?;
        }
        debug!(
            "{} trips serve {} stops on {} between {} and {}",
            schedule.len(),
            query.stop_ids.len(),
            query.date,
            query.start,
            query.stop
        );
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{sample, write_dir, CALENDAR, ROUTES, STOPS};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(raw: &str) -> ScheduleTime {
        ScheduleTime::parse(raw).unwrap()
    }

    fn stops(ids: &[&str]) -> Vec<StopID> {
        ids.iter().map(|id| StopID::new(*id)).collect()
    }

    fn trip_ids(schedule: &Schedule) -> Vec<&str> {
        schedule.trip_ids().map(|id| id.as_str()).collect()
    }

    #[test]
    fn trips_in_departure_order() {
        let gtfs = sample();
        // Tuesday
        let query = ScheduleQuery::new(stops(&["22030 1", "24140 1"]), date(2025, 10, 21))
            .window(time("07:00:00"), time("09:00:00"));
        let schedule = gtfs.schedule_for_stops(&query).unwrap();
        assert_eq!(trip_ids(&schedule), vec!["T1", "T2"]);

        let t1 = schedule.get(&TripID::new("T1")).unwrap();
        assert_eq!(t1.trip_info.route_short_name.as_deref(), Some("1"));
        assert_eq!(
            t1.trip_info.route_long_name.as_deref(),
            Some("Station - City Hall")
        );
        assert_eq!(t1.stops.len(), 2);
        assert_eq!(t1.stops[0].stop_name.as_deref(), Some("Station Front"));
        assert_eq!(t1.stops[0].stop_headsign.as_deref(), Some("City Hall"));
        assert_eq!(t1.stops[0].departure_scheduled_time, "08:00:00");
        assert_eq!(t1.stops[1].departure_scheduled_time, "08:10:00");
    }

    #[test]
    fn window_is_half_open() {
        let gtfs = sample();
        let query = ScheduleQuery::new(stops(&["22030 1"]), date(2025, 10, 21))
            .window(time("08:00:00"), time("08:30:00"));
        let schedule = gtfs.schedule_for_stops(&query).unwrap();
        assert_eq!(trip_ids(&schedule), vec!["T1"]);
    }

    #[test]
    fn weekend_and_exceptions() {
        let gtfs = sample();
        // Saturday: only the weekend trip
        let query = ScheduleQuery::new(stops(&["22030 1"]), date(2025, 10, 25));
        assert_eq!(
            trip_ids(&gtfs.schedule_for_stops(&query).unwrap()),
            vec!["T3"]
        );

        // Wednesday with an added holiday service
        let query = ScheduleQuery::new(stops(&["22030 2"]), date(2025, 10, 22))
            .window(time("21:15:00"), time("22:00:00"));
        assert_eq!(
            trip_ids(&gtfs.schedule_for_stops(&query).unwrap()),
            vec!["T4"]
        );

        // Weekday service removed on this Monday
        let query = ScheduleQuery::new(stops(&["22030 1"]), date(2025, 11, 3));
        assert!(gtfs.schedule_for_stops(&query).unwrap().is_empty());
    }

    #[test]
    fn post_midnight_departures_keep_their_text() {
        let gtfs = sample();
        let query = ScheduleQuery::new(stops(&["22030 2"]), date(2025, 10, 21))
            .window(time("23:00:00"), time("25:00:00"));
        let schedule = gtfs.schedule_for_stops(&query).unwrap();
        let t5 = schedule.get(&TripID::new("T5")).unwrap();
        assert_eq!(t5.stops[0].departure_scheduled_time, "24:10:00");
    }

    #[test]
    fn limit_counts_stop_visits() {
        let gtfs = sample();
        let query = ScheduleQuery::new(stops(&["22030 1", "24140 1"]), date(2025, 10, 21))
            .limit(3);
        let schedule = gtfs.schedule_for_stops(&query).unwrap();
        assert_eq!(trip_ids(&schedule), vec!["T1", "T2"]);
        assert_eq!(schedule.get(&TripID::new("T1")).unwrap().stops.len(), 2);
        assert_eq!(schedule.get(&TripID::new("T2")).unwrap().stops.len(), 1);
    }

    #[test]
    fn default_window_keeps_the_last_second_of_the_day() {
        let dir = write_dir(&[
            ("stops.txt", STOPS),
            ("routes.txt", ROUTES),
            (
                "trips.txt",
                "route_id,service_id,trip_id\nR1,weekday,LATE\nR1,weekday,MIDNIGHT\n",
            ),
            (
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 LATE,23:59:59,23:59:59,22030 1,1\n\
                 MIDNIGHT,24:00:00,24:00:00,22030 1,1\n",
            ),
            ("calendar.txt", CALENDAR),
        ]);
        let gtfs = GTFS::load_from_dir(dir.path()).unwrap();
        let query = ScheduleQuery::new(stops(&["22030 1"]), date(2025, 10, 21));
        assert_eq!(
            trip_ids(&gtfs.schedule_for_stops(&query).unwrap()),
            vec!["LATE"]
        );
    }

    #[test]
    fn bad_queries() {
        let gtfs = sample();
        let empty = ScheduleQuery::new(Vec::new(), date(2025, 10, 21));
        assert!(gtfs.schedule_for_stops(&empty).is_err());

        let backwards = ScheduleQuery::new(stops(&["22030 1"]), date(2025, 10, 21))
            .window(time("10:00:00"), time("09:00:00"));
        assert!(gtfs.schedule_for_stops(&backwards).is_err());
    }
}
