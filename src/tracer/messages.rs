// Mailbox protocol of the tracer choreography
//
// Tracers communicate exclusively through these messages over private FIFO
// mailboxes. A message is either delivered by the trace source (non-routed)
// or relayed by another tracer (routed); the distinction drives the
// priority/direct state machine. Routed messages carry the handle of the
// direct observer that first wrapped them, preserved across hops, so a
// downstream tracer can address that observer directly.

use crate::events::{Event, EventStats, Pid};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Identity of a tracer agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct TracerId(pub u64);

impl TracerId {
    /// Allocate a fresh identity, unique within this run.
    pub fn fresh() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TracerId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for TracerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Address of a tracer: its identity plus the sending half of its mailbox.
///
/// Equality is by identity; the channel half is just transport.
#[derive(Debug, Clone)]
pub struct TracerHandle {
    pub id: TracerId,
    tx: mpsc::UnboundedSender<TracerMsg>,
}

impl TracerHandle {
    pub fn new(id: TracerId, tx: mpsc::UnboundedSender<TracerMsg>) -> Self {
        Self { id, tx }
    }

    /// Deliver a message to this tracer's mailbox. A closed mailbox means
    /// the tracer already terminated; the message is dropped and the
    /// condition reported to the caller.
    pub fn send(&self, msg: TracerMsg) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(tracer = %self.id, "message to terminated tracer dropped");
                false
            }
        }
    }
}

impl PartialEq for TracerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TracerHandle {}

/// The end-of-partition marker.
///
/// Issued by the tracer that has assumed direct observation of `target`;
/// handled (rather than forwarded) exactly by its issuer once it has swept
/// the routing chain.
#[derive(Debug, Clone)]
pub struct Detach {
    /// The tracer that issued the marker and will handle it
    pub sender: TracerHandle,
    /// The process whose observation is being migrated
    pub target: Pid,
}

/// Payload of a routed message.
#[derive(Debug, Clone)]
pub enum RoutedMsg {
    Event(Event),
    Detach(Detach),
}

/// Termination notice a tracer sends its supervisor, carrying the event
/// statistics accumulated by it and by the descendants it outlived.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownSignal {
    pub tracer: TracerId,
    pub stats: EventStats,
}

/// Everything a tracer can find in its mailbox.
#[derive(Debug, Clone)]
pub enum TracerMsg {
    /// A trace event delivered directly by the trace source
    Event(Event),
    /// A detach marker from a descendant, not yet routed
    Detach(Detach),
    /// A message relayed along routing tables; `router` is the direct
    /// observer that first wrapped it
    Routed {
        router: TracerHandle,
        msg: RoutedMsg,
    },
    /// A child tracer terminated
    Down(DownSignal),
}

impl TracerMsg {
    /// Routed messages are the only ones a priority-mode tracer consumes;
    /// everything else is deferred until the transition to direct.
    pub fn is_routed(&self) -> bool {
        matches!(self, TracerMsg::Routed { .. })
    }
}
