use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{ScheduleTime, Stop, StopID, TripID};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopTime {
    pub stop_id: StopID,
    pub stop_sequence: u32,
    pub arrival_time: Option<ScheduleTime>,
    pub departure_time: Option<ScheduleTime>,
    pub stop_headsign: Option<String>,
}

pub fn load<R: std::io::Read>(
    reader: R,
    stops: &BTreeMap<StopID, Stop>,
) -> Result<BTreeMap<TripID, Vec<StopTime>>> {
    let mut stop_times: BTreeMap<TripID, Vec<StopTime>> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        if !stops.contains_key(&rec.stop_id) {
            bail!("{:?} visits unknown {:?}", rec.trip_id, rec.stop_id);
        }
        let arrival_time = parse_optional(rec.arrival_time.as_deref())?;
        let departure_time = parse_optional(rec.departure_time.as_deref())?;
        if let (Some(arrival), Some(departure)) = (&arrival_time, &departure_time) {
            if arrival > departure {
                bail!(
                    "{:?} arrives at {arrival} after departing at {departure}",
                    rec.trip_id
                );
            }
        }
        stop_times.entry(rec.trip_id).or_default().push(StopTime {
            stop_id: rec.stop_id,
            stop_sequence: rec.stop_sequence,
            arrival_time,
            departure_time,
            stop_headsign: rec.stop_headsign,
        });
    }

    // Sort by stop_sequence, in case the file isn't in order
    for list in stop_times.values_mut() {
        list.sort_by_key(|st| st.stop_sequence);
    }
    Ok(stop_times)
}

// Intermediate stops may leave times blank
fn parse_optional(raw: Option<&str>) -> Result<Option<ScheduleTime>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(x) => Ok(Some(ScheduleTime::parse(x)?)),
    }
}

#[derive(Deserialize)]
struct Record {
    trip_id: TripID,
    arrival_time: Option<String>,
    departure_time: Option<String>,
    stop_id: StopID,
    stop_sequence: u32,
    stop_headsign: Option<String>,
}
