// Vigil - runtime verification for concurrent message-passing programs
//
// As the target program executes, a tree of tracer tasks intercepts its
// lifecycle and communication events and feeds them to synthesized
// monitors, which decide whether the observed trace satisfies or violates
// a property and leave behind an auditable proof derivation.
//
// Architecture:
// - Trace source: delivers raw events of observed processes to tracer mailboxes
// - Tracers: partition the trace, route out-of-order events, migrate
//   ownership with the detach protocol
// - Analyzer: small-step reduction of monitor terms, one event at a time
// - Audit storage: writes verdict reports to JSON Lines files
// - Event system: tokio mpsc channels connect all components

pub mod analyzer;
pub mod config;
pub mod events;
pub mod instrument;
pub mod monitor;
pub mod source;
pub mod storage;
pub mod tracer;

pub use analyzer::{Analyzer, ProofEntry, VerdictHook, VerdictReport};
pub use events::{EntryPoint, Event, EventStats, Pid};
pub use instrument::{InstrPredicate, PredicateMap};
pub use monitor::{Env, Mon, Verdict};
pub use source::{SimSource, TraceSource};
pub use tracer::{start, stop, AnalysisMode, Root};
