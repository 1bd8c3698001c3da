// Auxiliary lookup tables for tests and reporting
//
// Each tracer mirrors its externally relevant state here after every
// handled message. The registry is observational only: no tracer reads
// another tracer's snapshot to make a protocol decision. Tests and the demo
// use it to await quiescent states and to render the final topology.

use super::{Mode, ProcMode};
use crate::events::{EventStats, Pid};
use crate::tracer::messages::TracerId;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Point-in-time mirror of one tracer's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerSnapshot {
    pub id: TracerId,
    pub mode: Mode,
    pub traced: BTreeMap<Pid, ProcMode>,
    pub routes: BTreeMap<Pid, TracerId>,
    pub stats: EventStats,
}

static REGISTRY: Mutex<BTreeMap<TracerId, TracerSnapshot>> = Mutex::new(BTreeMap::new());

/// Record the current state of a tracer.
pub(crate) fn publish(snapshot: TracerSnapshot) {
    let mut registry = REGISTRY.lock().unwrap();
    registry.insert(snapshot.id, snapshot);
}

/// Drop a terminated tracer's entry.
pub(crate) fn remove(id: TracerId) {
    let mut registry = REGISTRY.lock().unwrap();
    registry.remove(&id);
}

/// Snapshot of a single live tracer.
pub fn lookup(id: TracerId) -> Option<TracerSnapshot> {
    REGISTRY.lock().unwrap().get(&id).cloned()
}

/// Snapshots of every live tracer, ordered by identity.
pub fn all() -> Vec<TracerSnapshot> {
    REGISTRY.lock().unwrap().values().cloned().collect()
}

/// Number of live tracers.
pub fn live_count() -> usize {
    REGISTRY.lock().unwrap().len()
}

/// Release the lookup tables. Called by [`crate::tracer::stop`].
pub(crate) fn clear() {
    REGISTRY.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: TracerId) -> TracerSnapshot {
        TracerSnapshot {
            id,
            mode: Mode::Direct,
            traced: BTreeMap::new(),
            routes: BTreeMap::new(),
            stats: EventStats::default(),
        }
    }

    #[test]
    fn test_publish_lookup_remove() {
        let id = TracerId::fresh();
        publish(snapshot(id));
        assert_eq!(lookup(id).unwrap().mode, Mode::Direct);
        remove(id);
        assert_eq!(lookup(id), None);
    }
}
