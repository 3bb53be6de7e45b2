#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod calendar;
mod ids;
mod repository;
mod routes;
mod schedule;
mod stop_times;
mod stops;
mod time;
mod trips;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use zip::ZipArchive;

pub use calendar::{Calendar, DaysOfWeek, Service};
pub use ids::{RouteID, ServiceID, StopID, TripID};
pub use repository::{ScheduleQuery, ScheduleRepository};
pub use routes::Route;
pub use schedule::{
    EventRecord, MergedSchedule, Schedule, ScheduleRelationship, StopRecord, TripInfo, TripRecord,
};
pub use stop_times::StopTime;
pub use stops::Stop;
pub use time::ScheduleTime;
pub use trips::Trip;

/// A static GTFS dataset, held in memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GTFS {
    pub stops: BTreeMap<StopID, Stop>,
    pub routes: BTreeMap<RouteID, Route>,
    pub trips: BTreeMap<TripID, Trip>,
    pub calendar: Calendar,
}

impl GTFS {
    /// Reads a directory containing stops.txt, routes.txt, etc
    pub fn load_from_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref();
        info!("Loading GTFS from {}", dir.display());
        Self::load(|name| {
            let path = dir.join(name);
            if !path.exists() {
                return Ok(None);
            }
            Ok(Some(fs_err::read(path)?))
        })
    }

    /// Reads a zipped GTFS feed. The files may sit at the root of the archive or inside one
    /// folder.
    pub fn load_from_zip<R: std::io::Read + std::io::Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let prefix = match archive
            .file_names()
            .find(|name| *name == "stops.txt" || name.ends_with("/stops.txt"))
        {
            Some(name) => name.trim_end_matches("stops.txt").to_string(),
            None => bail!("No stops.txt in the archive"),
        };
        info!("Loading zipped GTFS from {:?}", prefix);
        Self::load(|name| {
            let path = format!("{prefix}{name}");
            if archive.file_names().all(|x| x != path) {
                return Ok(None);
            }
            let mut bytes = Vec::new();
            get_zip_file(&mut archive, &path)?.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        })
    }

    fn load<F: FnMut(&str) -> Result<Option<Vec<u8>>>>(mut read_file: F) -> Result<Self> {
        let mut required = |name: &str| -> Result<Vec<u8>> {
            read_file(name)?.ok_or_else(|| anyhow!("GTFS is missing {name}"))
        };
        let stops = stops::load(required("stops.txt")?.as_slice())?;
        let routes = routes::load(required("routes.txt")?.as_slice())?;
        let mut trips = trips::load(required("trips.txt")?.as_slice())?;
        let mut stop_times = stop_times::load(required("stop_times.txt")?.as_slice(), &stops)?;

        for trip in trips.values_mut() {
            trip.stop_times = match stop_times.remove(&trip.trip_id) {
                Some(list) => list,
                None => bail!("Trip {:?} has no stop times", trip.trip_id),
            };
            if !routes.contains_key(&trip.route_id) {
                warn!("{:?} belongs to unknown {:?}", trip.trip_id, trip.route_id);
            }
        }
        if !stop_times.is_empty() {
            warn!(
                "Stop times defined for unknown trips: {:?}",
                stop_times.keys()
            );
        }

        let calendar_file = read_file("calendar.txt")?;
        let exceptions_file = read_file("calendar_dates.txt")?;
        if calendar_file.is_none() && exceptions_file.is_none() {
            bail!("GTFS needs calendar.txt or calendar_dates.txt");
        }
        let mut calendar = match calendar_file {
            Some(bytes) => calendar::load(bytes.as_slice())?,
            None => Calendar::default(),
        };
        if let Some(bytes) = exceptions_file {
            calendar::load_exceptions(&mut calendar, bytes.as_slice())?;
        }

        info!(
            "Loaded {} stops, {} routes, {} trips, {} services",
            stops.len(),
            routes.len(),
            trips.len(),
            calendar.services.len()
        );
        Ok(Self {
            stops,
            routes,
            trips,
            calendar,
        })
    }
}

// Adds the path in the error message
fn get_zip_file<'a, R: std::io::Read + std::io::Seek>(
    archive: &'a mut ZipArchive<R>,
    path: &str,
) -> Result<zip::read::ZipFile<'a>> {
    archive
        .by_name(path)
        .map_err(|err| anyhow!("{path}: {err}"))
}
