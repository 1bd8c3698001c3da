// Tracer - one agent per trace partition
//
// A tracer owns a set of directly observed processes, a routing table for
// processes whose events pass through it on the way to a descendant, and an
// optional analyzer. The network forms a tree: the root tracer receives the
// raw event stream, descendants are created on spawn events the
// instrumentation predicate matches.
//
// A freshly instrumented tracer starts in priority mode: its process's
// earlier events are still flowing down the ancestor chain as routed
// messages, so it consumes only routed traffic and defers everything
// delivered directly. The detach marker it issues sweeps the ancestors'
// routing entries and, on arriving back, flips the process - and eventually
// the tracer - to direct mode.

use crate::analyzer::{Analyzer, AnalyzerMsg, AnalyzerTask, VerdictHook};
use crate::events::{Event, EventStats, Pid};
use crate::instrument::InstrPredicate;
use crate::monitor::Mon;
use crate::source::TraceSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod messages;
pub mod registry;

pub use messages::{Detach, DownSignal, RoutedMsg, TracerHandle, TracerId, TracerMsg};

/// Observation mode of a single traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcMode {
    /// Earlier events may still arrive routed; direct deliveries wait
    Priority,
    /// All events arrive directly from the trace source
    Direct,
}

/// Overall mode of a tracer: direct iff every traced process is direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Priority,
    Direct,
}

/// Where monitor reduction runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// On the tracer task, between two mailbox reads
    #[default]
    Inline,
    /// On a dedicated analyzer task with its own mailbox
    External,
}

/// The analyzer attached to a tracer, if any.
enum AnalyzerHandle {
    /// The root tracer only routes and instruments
    None,
    Inline(Box<Analyzer>),
    External(mpsc::UnboundedSender<AnalyzerMsg>),
}

/// Who observes this tracer's termination.
enum Supervisor {
    Tracer(TracerHandle),
    Bootstrap(mpsc::UnboundedSender<DownSignal>),
}

/// A tracer agent. Created by [`start`] (the root) or by its parent when a
/// spawn event matches the instrumentation predicate; destroys itself when
/// its traced set and routing table are both empty.
pub struct Tracer {
    id: TracerId,
    self_handle: TracerHandle,
    rx: mpsc::UnboundedReceiver<TracerMsg>,
    supervisor: Supervisor,
    analyzer: AnalyzerHandle,
    predicate: InstrPredicate,
    hook: Option<VerdictHook>,
    analysis: AnalysisMode,
    source: Arc<dyn TraceSource>,
    mode: Mode,
    traced: HashMap<Pid, ProcMode>,
    routes: HashMap<Pid, TracerHandle>,
    /// For children instrumented off a routed spawn: the observer that
    /// routed that spawn, where the child's detach must begin its sweep
    origins: HashMap<Pid, TracerHandle>,
    /// Non-routed messages parked while in priority mode, FIFO
    deferred: VecDeque<TracerMsg>,
    stats: EventStats,
    /// Set on instrumented tracers: assume observation of this process and
    /// announce the detach before reading the mailbox
    pending_detach: Option<Pid>,
    done: bool,
}

/// Bootstrapper's view of a running choreography.
pub struct Root {
    /// Address of the root tracer
    pub handle: TracerHandle,
    /// Delivers the root tracer's termination notice and statistics
    pub down: mpsc::UnboundedReceiver<DownSignal>,
}

/// Start the choreography for a target program whose top process is `root`.
///
/// The root tracer observes `root` directly, has no analyzer of its own,
/// and instruments descendants according to `predicate`. Returns the root
/// tracer's address and the bootstrapper-side down channel.
pub fn start(
    root: Pid,
    predicate: InstrPredicate,
    analysis: AnalysisMode,
    source: Arc<dyn TraceSource>,
    hook: Option<VerdictHook>,
) -> Root {
    let (down_tx, down_rx) = mpsc::unbounded_channel();
    let (mut tracer, handle) = Tracer::new(
        AnalyzerHandle::None,
        predicate,
        hook,
        analysis,
        source.clone(),
        Supervisor::Bootstrap(down_tx),
        Mode::Direct,
    );
    tracer.traced.insert(root, ProcMode::Direct);
    source.trace(root, handle.clone());
    tracing::info!(tracer = %tracer.id, %root, ?analysis, "root tracer started");
    tokio::spawn(tracer.run());
    Root {
        handle,
        down: down_rx,
    }
}

/// Release the auxiliary lookup tables kept for tests and reporting.
pub fn stop() {
    registry::clear();
}

impl Tracer {
    fn new(
        analyzer: AnalyzerHandle,
        predicate: InstrPredicate,
        hook: Option<VerdictHook>,
        analysis: AnalysisMode,
        source: Arc<dyn TraceSource>,
        supervisor: Supervisor,
        mode: Mode,
    ) -> (Tracer, TracerHandle) {
        let id = TracerId::fresh();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = TracerHandle::new(id, tx);
        let tracer = Tracer {
            id,
            self_handle: handle.clone(),
            rx,
            supervisor,
            analyzer,
            predicate,
            hook,
            analysis,
            source,
            mode,
            traced: HashMap::new(),
            routes: HashMap::new(),
            origins: HashMap::new(),
            deferred: VecDeque::new(),
            stats: EventStats::default(),
            pending_detach: None,
            done: false,
        };
        (tracer, handle)
    }

    /// Message loop. Runs until garbage collection, a closed mailbox, or a
    /// fatal error.
    pub async fn run(mut self) {
        tracing::debug!(tracer = %self.id, mode = ?self.mode, "tracer running");
        if let Some(target) = self.pending_detach.take() {
            self.assume(target);
        }
        self.publish();
        loop {
            if self.done {
                break;
            }
            let Some(msg) = self.next_msg().await else {
                break;
            };
            if let Err(e) = self.handle(msg) {
                tracing::error!(tracer = %self.id, "tracer aborting: {e:#}");
                break;
            }
            self.publish();
        }
        self.finish();
    }

    /// Deferred messages re-enter ahead of the mailbox once direct.
    async fn next_msg(&mut self) -> Option<TracerMsg> {
        if self.mode == Mode::Direct {
            if let Some(msg) = self.deferred.pop_front() {
                return Some(msg);
            }
        }
        self.rx.recv().await
    }

    /// Phase one of the detach protocol: preempt delivery of the target's
    /// events to this tracer, then announce the takeover to the parent.
    fn assume(&mut self, target: Pid) {
        if !self.source.preempt(target, self.self_handle.clone()) {
            tracing::debug!(tracer = %self.id, %target, "preempt on exited process");
        }
        if let Supervisor::Tracer(parent) = &self.supervisor {
            parent.send(TracerMsg::Detach(Detach {
                sender: self.self_handle.clone(),
                target,
            }));
        }
    }

    /// Dispatch one mailbox message according to the current mode.
    fn handle(&mut self, msg: TracerMsg) -> Result<()> {
        // selective receive: priority mode consumes only routed messages
        if self.mode == Mode::Priority && !msg.is_routed() {
            self.deferred.push_back(msg);
            return Ok(());
        }
        match msg {
            TracerMsg::Event(event) => self.handle_event(event, None),
            TracerMsg::Detach(detach) => {
                self.route_detach(detach);
                Ok(())
            }
            TracerMsg::Routed {
                router,
                msg: RoutedMsg::Event(event),
            } => match self.mode {
                Mode::Direct => self.forward_event(router, event),
                Mode::Priority => self.handle_event(event, Some(router)),
            },
            TracerMsg::Routed {
                msg: RoutedMsg::Detach(detach),
                ..
            } => {
                if self.mode == Mode::Priority && detach.sender.id == self.id {
                    self.handle_detach(detach);
                } else {
                    self.forward_detach(detach);
                }
                Ok(())
            }
            TracerMsg::Down(down) => {
                // roll the child's final counts into ours so the signal we
                // eventually send covers the whole subtree
                self.stats.absorb(&down.stats);
                tracing::info!(
                    tracer = %self.id,
                    child = %down.tracer,
                    stats = %down.stats,
                    "child tracer terminated"
                );
                Ok(())
            }
        }
    }

    /// React to a trace event this tracer is responsible for: route it
    /// onward, or analyze it and keep the local tables current.
    ///
    /// `router` is the original direct observer when the event arrived
    /// routed (priority mode); `None` when it arrived straight from the
    /// trace source.
    fn handle_event(&mut self, event: Event, router: Option<TracerHandle>) -> Result<()> {
        self.stats.record(event.kind());
        let src = event.src();
        match &event {
            Event::Spawn { child, entry, .. } => {
                let child = *child;
                let entry = entry.clone();
                if let Some(hop) = self.routes.get(&src).cloned() {
                    // the child's events will take the parent's path
                    self.routes.insert(child, hop.clone());
                    self.relay(&hop, router, event);
                    return Ok(());
                }
                self.analyze(&event)?;
                match (self.predicate)(&entry) {
                    Some(mon) => {
                        let handle = self
                            .spawn_child(child, mon)
                            .with_context(|| format!("instrumenting {entry} for {child}"))?;
                        if let Some(origin) = router {
                            // the child's detach must sweep from the
                            // observer that routed this spawn
                            self.origins.insert(child, origin);
                        }
                        self.routes.insert(child, handle);
                    }
                    None => {
                        let mode = match self.mode {
                            Mode::Direct => ProcMode::Direct,
                            Mode::Priority => ProcMode::Priority,
                        };
                        self.traced.insert(child, mode);
                        if let (Mode::Priority, Some(router)) = (self.mode, router) {
                            // take over the child's delivery ourselves and
                            // flush the routing chain above us
                            if !self.source.preempt(child, self.self_handle.clone()) {
                                tracing::debug!(tracer = %self.id, %child, "preempt on exited process");
                            }
                            router.send(TracerMsg::Detach(Detach {
                                sender: self.self_handle.clone(),
                                target: child,
                            }));
                        }
                    }
                }
                Ok(())
            }
            Event::Exit { .. } => {
                if let Some(hop) = self.routes.remove(&src) {
                    // last event of this process: the route dies with it
                    self.relay(&hop, router, event);
                    self.try_gc();
                } else {
                    self.analyze(&event)?;
                    self.traced.remove(&src);
                    self.refresh_mode();
                    self.try_gc();
                }
                Ok(())
            }
            _ => {
                if let Some(hop) = self.routes.get(&src).cloned() {
                    self.relay(&hop, router, event);
                } else {
                    self.analyze(&event)?;
                }
                Ok(())
            }
        }
    }

    /// Mandatory forwarding of a routed event in direct mode. A missing
    /// route here is an invariant violation: this tracer is on the path the
    /// upstream router chose.
    fn forward_event(&mut self, router: TracerHandle, event: Event) -> Result<()> {
        self.stats.record(event.kind());
        let src = event.src();
        let hop = self
            .routes
            .get(&src)
            .cloned()
            .with_context(|| format!("no route for routed event {event} at {}", self.id))?;
        match &event {
            Event::Spawn { child, .. } => {
                self.routes.insert(*child, hop.clone());
            }
            Event::Exit { .. } => {
                self.routes.remove(&src);
            }
            _ => {}
        }
        let exit = matches!(event, Event::Exit { .. });
        hop.send(TracerMsg::Routed {
            router,
            msg: RoutedMsg::Event(event),
        });
        if exit {
            self.try_gc();
        }
        Ok(())
    }

    /// A descendant announced it has taken over `target` (non-routed
    /// detach). If the instrumenting spawn was itself routed, the marker
    /// first climbs to the observer that routed it; otherwise this tracer
    /// is the top of the chain and the sweep starts here.
    fn route_detach(&mut self, detach: Detach) {
        if let Some(origin) = self.origins.remove(&detach.target) {
            origin.send(TracerMsg::Routed {
                router: self.self_handle.clone(),
                msg: RoutedMsg::Detach(detach),
            });
            return;
        }
        match self.routes.remove(&detach.target) {
            Some(hop) => {
                hop.send(TracerMsg::Routed {
                    router: self.self_handle.clone(),
                    msg: RoutedMsg::Detach(detach),
                });
                self.try_gc();
            }
            None => {
                // the target exited before its takeover completed
                tracing::debug!(
                    tracer = %self.id,
                    target = %detach.target,
                    "detach for departed process dropped"
                );
            }
        }
    }

    /// Pass a routed detach one hop further down, dropping this tracer's
    /// entry for the target. No route means the entry was already cleaned
    /// up by an earlier exit: harmless.
    fn forward_detach(&mut self, detach: Detach) {
        match self.routes.remove(&detach.target) {
            Some(hop) => {
                hop.send(TracerMsg::Routed {
                    router: self.self_handle.clone(),
                    msg: RoutedMsg::Detach(detach),
                });
                self.try_gc();
            }
            None => {
                tracing::debug!(
                    tracer = %self.id,
                    target = %detach.target,
                    "routed detach without route dropped"
                );
            }
        }
    }

    /// Our own detach made it around the loop: every ancestor has stopped
    /// routing the target, so its observation is now direct.
    fn handle_detach(&mut self, detach: Detach) {
        match self.traced.get_mut(&detach.target) {
            Some(mode) => {
                *mode = ProcMode::Direct;
                tracing::debug!(tracer = %self.id, target = %detach.target, "process now direct");
                self.refresh_mode();
            }
            None => {
                // exited while the marker was in flight
                tracing::debug!(
                    tracer = %self.id,
                    target = %detach.target,
                    "detach for departed process dropped"
                );
            }
        }
    }

    /// Wrap or re-wrap an event for the next hop, preserving the original
    /// router when there is one.
    fn relay(&self, hop: &TracerHandle, router: Option<TracerHandle>, event: Event) {
        let router = router.unwrap_or_else(|| self.self_handle.clone());
        hop.send(TracerMsg::Routed {
            router,
            msg: RoutedMsg::Event(event),
        });
    }

    /// Feed one event to this tracer's analyzer, if it has one.
    fn analyze(&mut self, event: &Event) -> Result<()> {
        match &mut self.analyzer {
            AnalyzerHandle::None => Ok(()),
            AnalyzerHandle::Inline(analyzer) => analyzer.observe(event),
            AnalyzerHandle::External(tx) => {
                let _ = tx.send(AnalyzerMsg::Event(event.clone()));
                Ok(())
            }
        }
    }

    /// Create and launch a tracer for `target`, monitored by `mon`.
    fn spawn_child(&self, target: Pid, mon: Mon) -> Result<TracerHandle> {
        let analyzer = match self.analysis {
            AnalysisMode::Inline => {
                let mut analyzer = match &self.hook {
                    Some(hook) => Analyzer::with_hook(hook.clone()),
                    None => Analyzer::new(),
                };
                analyzer.embed(mon)?;
                AnalyzerHandle::Inline(Box::new(analyzer))
            }
            AnalysisMode::External => {
                AnalyzerHandle::External(AnalyzerTask::spawn(mon, self.hook.clone())?)
            }
        };
        let (mut child, handle) = Tracer::new(
            analyzer,
            self.predicate.clone(),
            self.hook.clone(),
            self.analysis,
            self.source.clone(),
            Supervisor::Tracer(self.self_handle.clone()),
            Mode::Priority,
        );
        child.traced.insert(target, ProcMode::Priority);
        child.pending_detach = Some(target);
        tracing::info!(tracer = %self.id, child = %child.id, %target, "instrumented new tracer");
        tokio::spawn(child.run());
        Ok(handle)
    }

    /// Direct overall iff no traced process is still in priority.
    fn refresh_mode(&mut self) {
        if self.mode == Mode::Priority && self.traced.values().all(|m| *m == ProcMode::Direct) {
            self.mode = Mode::Direct;
            tracing::debug!(tracer = %self.id, "transitioned to direct mode");
        }
    }

    /// A tracer with nothing traced and nothing routed is done.
    fn try_gc(&mut self) {
        if self.traced.is_empty() && self.routes.is_empty() {
            self.done = true;
        }
    }

    /// Stop the analyzer, notify the supervisor, drop out of the registry.
    fn finish(self) {
        if let AnalyzerHandle::External(tx) = &self.analyzer {
            let _ = tx.send(AnalyzerMsg::Stop);
        }
        let signal = DownSignal {
            tracer: self.id,
            stats: self.stats,
        };
        match &self.supervisor {
            Supervisor::Tracer(parent) => {
                parent.send(TracerMsg::Down(signal));
            }
            Supervisor::Bootstrap(tx) => {
                let _ = tx.send(signal);
            }
        }
        registry::remove(self.id);
        tracing::info!(tracer = %self.id, stats = %self.stats, "tracer terminated");
    }

    fn publish(&self) {
        registry::publish(registry::TracerSnapshot {
            id: self.id,
            mode: self.mode,
            traced: self.traced.iter().map(|(p, m)| (*p, *m)).collect(),
            routes: self.routes.iter().map(|(p, h)| (*p, h.id)).collect(),
            stats: self.stats,
        });
    }
}
