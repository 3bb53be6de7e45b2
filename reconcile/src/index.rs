use std::collections::HashMap;

use gtfs::StopID;

use crate::StopTimeUpdate;

/// Stop ID to the update for that stop
pub type StopUpdateIndex<'a> = HashMap<&'a StopID, &'a StopTimeUpdate>;

/// Indexes one trip's stop time updates by stop. Updates without a stop ID can't be matched to a
/// scheduled stop and are left out. When a stop appears more than once, the later update wins.
pub fn index_stop_updates(updates: &[StopTimeUpdate]) -> StopUpdateIndex<'_> {
    let mut index = HashMap::with_capacity(updates.len());
    for update in updates {
        match update.stop_id {
            Some(ref stop_id) if !stop_id.as_str().is_empty() => {
                index.insert(stop_id, update);
            }
            _ => {}
        }
    }
    index
}
