// Trace source - the primitive that delivers raw events to tracer mailboxes
//
// The runtime-facing half of the choreography. A source delivers the
// lifecycle and message events of a process to whichever tracer currently
// owns its observation; ownership starts at the root tracer, is inherited
// across spawns, and is transferred by `preempt` when a descendant tracer
// takes over.

use crate::events::{Event, Pid};
use crate::tracer::messages::{TracerHandle, TracerMsg};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// The external trace primitive.
///
/// Implementations must be safe to call from several tracer tasks at once.
pub trait TraceSource: Send + Sync {
    /// Begin delivering events of `p` (and, by inheritance, of processes it
    /// spawns) to `sink`, until superseded by a later `preempt`.
    fn trace(&self, p: Pid, sink: TracerHandle) -> bool;

    /// Transfer delivery of `p`'s events to `sink`. Returns `false` when
    /// `p` has already exited; callers treat that as normal.
    fn preempt(&self, p: Pid, sink: TracerHandle) -> bool;
}

/// In-memory trace source driven by a scripted target program.
///
/// `emit` delivers an event to the current owner's mailbox while holding
/// the ownership lock, so an `emit` that completes before a `preempt` is
/// enqueued at the old owner and one that starts after it is enqueued at
/// the new owner - there is no in-between.
#[derive(Default)]
pub struct SimSource {
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    owners: HashMap<Pid, TracerHandle>,
    exited: HashSet<Pid>,
}

impl SimSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one event of the target program.
    ///
    /// A spawn first makes the child inherit the parent's owner; an exit
    /// retires the process after delivery. Returns `false` when nobody owns
    /// the source process (the event is dropped).
    pub fn emit(&self, event: Event) -> bool {
        let mut state = self.state.lock().unwrap();
        if let Event::Spawn { src, child, .. } = &event {
            if let Some(owner) = state.owners.get(src).cloned() {
                state.owners.insert(*child, owner);
            }
        }
        let src = event.src();
        let exit = matches!(event, Event::Exit { .. });
        let delivered = match state.owners.get(&src) {
            Some(owner) => owner.send(TracerMsg::Event(event)),
            None => {
                tracing::warn!(%src, "event for unowned process dropped");
                false
            }
        };
        if exit {
            state.owners.remove(&src);
            state.exited.insert(src);
        }
        delivered
    }

    /// Whether `p` has already exited.
    pub fn has_exited(&self, p: Pid) -> bool {
        self.state.lock().unwrap().exited.contains(&p)
    }
}

impl TraceSource for SimSource {
    fn trace(&self, p: Pid, sink: TracerHandle) -> bool {
        let mut state = self.state.lock().unwrap();
        tracing::debug!(%p, tracer = %sink.id, "trace");
        state.owners.insert(p, sink);
        true
    }

    fn preempt(&self, p: Pid, sink: TracerHandle) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.exited.contains(&p) {
            return false;
        }
        tracing::debug!(%p, tracer = %sink.id, "preempt");
        state.owners.insert(p, sink);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EntryPoint;
    use crate::tracer::messages::TracerId;
    use tokio::sync::mpsc;

    fn handle() -> (TracerHandle, mpsc::UnboundedReceiver<TracerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TracerHandle::new(TracerId::fresh(), tx), rx)
    }

    fn exit(p: Pid) -> Event {
        Event::Exit {
            src: p,
            reason: "normal".into(),
        }
    }

    #[test]
    fn test_events_go_to_current_owner() {
        let source = SimSource::new();
        let (a, mut rx_a) = handle();
        let (b, mut rx_b) = handle();

        assert!(source.trace(Pid(1), a));
        assert!(source.emit(Event::Receive {
            src: Pid(1),
            msg: serde_json::json!(1),
        }));
        assert!(matches!(rx_a.try_recv(), Ok(TracerMsg::Event(_))));

        assert!(source.preempt(Pid(1), b));
        assert!(source.emit(Event::Receive {
            src: Pid(1),
            msg: serde_json::json!(2),
        }));
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(rx_b.try_recv(), Ok(TracerMsg::Event(_))));
    }

    #[test]
    fn test_spawn_inherits_owner() {
        let source = SimSource::new();
        let (a, mut rx_a) = handle();
        source.trace(Pid(1), a);

        source.emit(Event::Spawn {
            src: Pid(1),
            child: Pid(2),
            entry: EntryPoint::new("m", "f", 0),
        });
        source.emit(Event::Spawned {
            src: Pid(2),
            parent: Pid(1),
            entry: EntryPoint::new("m", "f", 0),
        });

        // both the spawn and the child's first own event reach the owner
        assert!(matches!(rx_a.try_recv(), Ok(TracerMsg::Event(Event::Spawn { .. }))));
        assert!(matches!(
            rx_a.try_recv(),
            Ok(TracerMsg::Event(Event::Spawned { .. }))
        ));
    }

    #[test]
    fn test_preempt_after_exit_reports_false() {
        let source = SimSource::new();
        let (a, _rx_a) = handle();
        let (b, _rx_b) = handle();
        source.trace(Pid(1), a);
        source.emit(exit(Pid(1)));

        assert!(source.has_exited(Pid(1)));
        assert!(!source.preempt(Pid(1), b));
    }

    #[test]
    fn test_emit_for_unowned_process_is_dropped() {
        let source = SimSource::new();
        assert!(!source.emit(exit(Pid(99))));
    }
}
