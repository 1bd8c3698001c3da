// Events that flow from the trace source to the tracer network and monitors
//
// These events represent single observed steps of the target program. Using
// an enum allows pattern matching and ensures type-safe communication
// between the tracer tasks and the analyzers they feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a traced process.
///
/// Comparable, hashable and cheap to copy; the numeric payload carries no
/// meaning beyond uniqueness within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Entry-point descriptor of a newly spawned process.
///
/// The instrumentation predicate inspects this to decide whether the new
/// process gets a monitor of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryPoint {
    pub module: String,
    pub function: String,
    pub arity: usize,
}

impl EntryPoint {
    pub fn new(module: impl Into<String>, function: impl Into<String>, arity: usize) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            arity,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.module, self.function, self.arity)
    }
}

/// A single observation of the target program.
///
/// Five recognized kinds plus a catch-all for observations a source adapter
/// surfaces but the monitor logic does not distinguish. Events are immutable
/// values; everything downstream clones rather than mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")] // JSON like {"kind": "send", ...}
pub enum Event {
    /// `src` spawned `child`, which will run `entry`
    Spawn {
        src: Pid,
        child: Pid,
        entry: EntryPoint,
    },

    /// `src` terminated
    Exit { src: Pid, reason: String },

    /// `src` sent `msg` to `to`
    Send {
        src: Pid,
        to: Pid,
        msg: serde_json::Value,
    },

    /// `src` consumed `msg` from its mailbox
    Receive { src: Pid, msg: serde_json::Value },

    /// `src` started life, spawned by `parent` to run `entry`
    Spawned {
        src: Pid,
        parent: Pid,
        entry: EntryPoint,
    },

    /// An observation outside the five recognized kinds
    Other { src: Pid, info: serde_json::Value },
}

/// Discriminant of an [`Event`], used for statistics and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Spawn,
    Exit,
    Send,
    Receive,
    Spawned,
    Other,
}

impl Event {
    /// The process this event was observed on.
    pub fn src(&self) -> Pid {
        match self {
            Event::Spawn { src, .. }
            | Event::Exit { src, .. }
            | Event::Send { src, .. }
            | Event::Receive { src, .. }
            | Event::Spawned { src, .. }
            | Event::Other { src, .. } => *src,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Spawn { .. } => EventKind::Spawn,
            Event::Exit { .. } => EventKind::Exit,
            Event::Send { .. } => EventKind::Send,
            Event::Receive { .. } => EventKind::Receive,
            Event::Spawned { .. } => EventKind::Spawned,
            Event::Other { .. } => EventKind::Other,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Spawn { src, child, entry } => {
                write!(f, "spawn({src}, {child}, {entry})")
            }
            Event::Exit { src, reason } => write!(f, "exit({src}, {reason})"),
            Event::Send { src, to, msg } => write!(f, "send({src}, {to}, {msg})"),
            Event::Receive { src, msg } => write!(f, "recv({src}, {msg})"),
            Event::Spawned { src, parent, entry } => {
                write!(f, "spawned({src}, {parent}, {entry})")
            }
            Event::Other { src, info } => write!(f, "other({src}, {info})"),
        }
    }
}

/// Per-tracer event counters, folded into the tracer's exit signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub spawn: u64,
    pub exit: u64,
    pub send: u64,
    pub receive: u64,
    pub spawned: u64,
    pub other: u64,
}

impl EventStats {
    /// Count one event of the given kind.
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Spawn => self.spawn += 1,
            EventKind::Exit => self.exit += 1,
            EventKind::Send => self.send += 1,
            EventKind::Receive => self.receive += 1,
            EventKind::Spawned => self.spawned += 1,
            EventKind::Other => self.other += 1,
        }
    }

    /// Fold another tracer's counters into this one.
    pub fn absorb(&mut self, other: &EventStats) {
        self.spawn += other.spawn;
        self.exit += other.exit;
        self.send += other.send;
        self.receive += other.receive;
        self.spawned += other.spawned;
        self.other += other.other;
    }

    pub fn total(&self) -> u64 {
        self.spawn + self.exit + self.send + self.receive + self.spawned + self.other
    }
}

impl fmt::Display for EventStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spawn={} exit={} send={} receive={} spawned={} other={}",
            self.spawn, self.exit, self.send, self.receive, self.spawned, self.other
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_src_covers_every_kind() {
        let p = Pid(7);
        let events = [
            Event::Spawn {
                src: p,
                child: Pid(8),
                entry: EntryPoint::new("server", "loop", 1),
            },
            Event::Exit {
                src: p,
                reason: "normal".into(),
            },
            Event::Send {
                src: p,
                to: Pid(9),
                msg: json!(42),
            },
            Event::Receive {
                src: p,
                msg: json!("hi"),
            },
            Event::Spawned {
                src: p,
                parent: Pid(1),
                entry: EntryPoint::new("server", "loop", 1),
            },
            Event::Other {
                src: p,
                info: json!(null),
            },
        ];
        for event in &events {
            assert_eq!(event.src(), p);
        }
    }

    #[test]
    fn test_stats_record_and_total() {
        let mut stats = EventStats::default();
        stats.record(EventKind::Spawn);
        stats.record(EventKind::Send);
        stats.record(EventKind::Send);
        stats.record(EventKind::Other);
        assert_eq!(stats.spawn, 1);
        assert_eq!(stats.send, 2);
        assert_eq!(stats.other, 1);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_stats_absorb() {
        let mut a = EventStats {
            spawn: 1,
            exit: 2,
            ..Default::default()
        };
        let b = EventStats {
            exit: 3,
            receive: 4,
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!(a.spawn, 1);
        assert_eq!(a.exit, 5);
        assert_eq!(a.receive, 4);
    }

    #[test]
    fn test_event_json_round_trip() {
        let event = Event::Send {
            src: Pid(3),
            to: Pid(4),
            msg: json!({"tag": "req", "n": 1}),
        };
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("\"kind\":\"send\""));
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
