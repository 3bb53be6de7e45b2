//! Reconciles a static schedule with GTFS-Realtime trip updates.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod error;
mod feed;
mod index;
mod merge;
mod time;

pub use self::error::{EventKind, MergeError};
pub use self::feed::{
    decode_json, decode_protobuf, EpochSeconds, RealtimeFeed, StopTimeEvent, StopTimeUpdate,
    TripUpdateEntity,
};
pub use self::index::{index_stop_updates, StopUpdateIndex};
pub use self::merge::{merge, Merger};
pub use self::time::local_clock_time;
