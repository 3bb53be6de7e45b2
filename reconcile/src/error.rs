use std::fmt;

use thiserror::Error;

use gtfs::{StopID, TripID};

/// Conditions that abort a merge. Everything else the feed can throw at the merge (unknown trips,
/// unknown stops, missing optional fields) is not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("Malformed {field} time {value:?} for {stop_id:?} on {trip_id:?}")]
    MalformedTime {
        trip_id: TripID,
        stop_id: StopID,
        field: EventKind,
        value: String,
    },

    #[error("Feed entity #{index} (id {entity_id:?}) has a trip update without a trip_id")]
    MissingTripId {
        index: usize,
        entity_id: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Arrival,
    Departure,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Arrival => write!(f, "arrival"),
            EventKind::Departure => write!(f, "departure"),
        }
    }
}
