// Analyzer - small-step reduction engine for monitor terms
//
// The analyzer advances a monitor one external event at a time. Between
// events it exhaustively applies silent (tau) rules so the externally
// visible term is always ready to consume the next event. Every rule
// application is witnessed by a proof entry; the accumulated log is kept in
// reverse chronological order, newest step first.
//
// Silent rules, in priority order: verdict short-circuits (mDisYL/R,
// mConNL/R), verdict discards (mDisNL/R, mConYL/R), recursion unfolding
// (mRec, mRecVar), then congruence through parallel nodes (mTauL, mTauR).
// Event rules: mVrd, mAct, mChsL/R, mPar.

use crate::events::Event;
use crate::monitor::{Ctx, Env, Mon, Verdict};
use anyhow::{bail, ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod proof;

pub use proof::{Action, Derivation, ProofEntry, Rule};

// ─────────────────────────────────────────────────────────────────────────────
// Reduction engine
// ─────────────────────────────────────────────────────────────────────────────

/// True when some silent rule applies somewhere reachable through parallel
/// nodes. Purely structural: no continuation is forced.
pub fn tau_applies(m: &Mon) -> bool {
    match m {
        Mon::Rec(..) | Mon::Var(..) => true,
        Mon::And(_, l, r) | Mon::Or(_, l, r) => {
            l.verdict().is_some()
                || r.verdict().is_some()
                || tau_applies(l)
                || tau_applies(r)
        }
        _ => false,
    }
}

/// True when the term is in ready form: no silent rule applies and the next
/// external event can be consumed directly.
pub fn is_ready(m: &Mon) -> bool {
    !tau_applies(m)
}

/// Apply exactly one silent rule. Callers guard with [`tau_applies`].
fn tau_step(m: Mon, id: &Derivation) -> Result<(ProofEntry, Mon)> {
    let from = m.to_string();
    match m {
        Mon::Or(env, l, r) => tau_step_par(false, env, *l, *r, id, from),
        Mon::And(env, l, r) => tau_step_par(true, env, *l, *r, id, from),
        Mon::Rec(env, unfold) => {
            // The unfolded body reduces under the binder's name and inherits
            // the context accumulated so far.
            let mut out = unfold();
            let oe = out.env_mut();
            oe.ns = env.var.clone().or_else(|| env.ns.clone());
            oe.ctx = env.ctx.clone();
            let entry = entry(id, Rule::MRec, Action::Tau, from, &out);
            Ok((entry, out))
        }
        Mon::Var(env, unfold) => {
            // Re-entering the binder: bindings made under its namespace
            // since the last unfolding go out of scope.
            let purged = env.ctx.without_ns(env.namespace());
            let mut out = unfold();
            let oe = out.env_mut();
            oe.ns = env.var.clone().or_else(|| env.ns.clone());
            oe.ctx = purged;
            let entry = entry(id, Rule::MRecVar, Action::Tau, from, &out);
            Ok((entry, out))
        }
        other => bail!("no silent rule applies to '{other}'"),
    }
}

/// Silent rules on a parallel node: verdict short-circuit and discard rules
/// first, then congruence into whichever child can still silently reduce.
fn tau_step_par(
    is_and: bool,
    env: Env,
    l: Mon,
    r: Mon,
    id: &Derivation,
    from: String,
) -> Result<(ProofEntry, Mon)> {
    let (short, keep_l, keep_r) = if is_and {
        (Verdict::No, Rule::MConNL, Rule::MConNR)
    } else {
        (Verdict::Yes, Rule::MDisYL, Rule::MDisYR)
    };
    let (discard_l, discard_r) = if is_and {
        (Rule::MConYL, Rule::MConYR)
    } else {
        (Rule::MDisNL, Rule::MDisNR)
    };

    // Short-circuit: the deciding verdict wins the whole composition.
    if l.verdict() == Some(short) {
        let out = l.inheriting(&env);
        return Ok((entry(id, keep_l, Action::Tau, from, &out), out));
    }
    if r.verdict() == Some(short) {
        let out = r.inheriting(&env);
        return Ok((entry(id, keep_r, Action::Tau, from, &out), out));
    }
    // Discard: the neutral verdict drops out, the other child continues.
    if l.verdict().is_some() {
        let out = r.inheriting(&env);
        return Ok((entry(id, discard_l, Action::Tau, from, &out), out));
    }
    if r.verdict().is_some() {
        let out = l.inheriting(&env);
        return Ok((entry(id, discard_r, Action::Tau, from, &out), out));
    }

    // Congruence: silent step on the left first, else on the right.
    if tau_applies(&l) {
        let (premise, l2) = tau_step(l.inheriting(&env), &id.premise())?;
        let mut env2 = env;
        env2.ctx = l2.env().ctx.clone();
        let out = rebuild_par(is_and, env2, l2, r);
        let step = entry(id, Rule::MTauL, Action::Tau, from, &out).with_premises(vec![premise]);
        Ok((step, out))
    } else if tau_applies(&r) {
        let (premise, r2) = tau_step(r.inheriting(&env), &id.premise())?;
        let mut env2 = env;
        env2.ctx = r2.env().ctx.clone();
        let out = rebuild_par(is_and, env2, l, r2);
        let step = entry(id, Rule::MTauR, Action::Tau, from, &out).with_premises(vec![premise]);
        Ok((step, out))
    } else {
        bail!("no silent rule applies under '{from}'")
    }
}

/// Reduce a term by one external event.
fn event_step(m: Mon, event: &Event, id: &Derivation) -> Result<(ProofEntry, Mon)> {
    let from = m.to_string();
    match m {
        Mon::Verdict(env, v) => {
            // Verdicts are irrevocable: the event is absorbed.
            let out = Mon::Verdict(env, v);
            Ok((ev_entry(id, Rule::MVrd, event, from, &out), out))
        }
        Mon::Act(env, guard, k) => {
            ensure!(
                guard(event),
                "act '{from}' rejects event {event}; the enclosing term should have dispatched it elsewhere"
            );
            let mut ctx = env.ctx.clone();
            if let Some(var) = &env.var {
                ctx.bind(env.namespace(), var.clone(), event.clone());
            }
            let mut out = k(event);
            let oe = out.env_mut();
            oe.ns = env.ns.clone();
            oe.ctx = ctx;
            Ok((ev_entry(id, Rule::MAct, event, from, &out), out))
        }
        Mon::Chs(env, l, r) => {
            ensure!(
                l.is_act() && r.is_act(),
                "malformed monitor: external choice over non-act children in '{from}'"
            );
            let hits_l = chs_guard(&l)(event);
            let hits_r = chs_guard(&r)(event);
            ensure!(
                hits_l != hits_r,
                "external choice '{from}' requires exactly one branch to accept {event} \
                 (left={hits_l}, right={hits_r})"
            );
            let (rule, chosen) = if hits_l {
                (Rule::MChsL, *l)
            } else {
                (Rule::MChsR, *r)
            };
            let (premise, out) = event_step(chosen.inheriting(&env), event, &id.premise())?;
            let step = ev_entry(id, rule, event, from, &out).with_premises(vec![premise]);
            Ok((step, out))
        }
        Mon::And(env, l, r) => par_event_step(true, env, *l, *r, event, id, from),
        Mon::Or(env, l, r) => par_event_step(false, env, *l, *r, event, id, from),
        Mon::Rec(..) | Mon::Var(..) => {
            bail!("event {event} delivered to unsaturated term '{from}'")
        }
    }
}

/// mPar: both children consume the event; their contexts are merged with
/// the left branch winning on conflicts.
fn par_event_step(
    is_and: bool,
    env: Env,
    l: Mon,
    r: Mon,
    event: &Event,
    id: &Derivation,
    from: String,
) -> Result<(ProofEntry, Mon)> {
    let (pl, l2) = event_step(l.inheriting(&env), event, &id.premise())?;
    let (pr, r2) = event_step(r.inheriting(&env), event, &pl.id.sibling())?;
    let merged = Ctx::merge(&l2.env().ctx, &r2.env().ctx);
    let mut env2 = env;
    env2.ctx = merged;
    let out = rebuild_par(is_and, env2, l2, r2);
    let step = ev_entry(id, Rule::MPar, event, from, &out).with_premises(vec![pl, pr]);
    Ok((step, out))
}

fn rebuild_par(is_and: bool, env: Env, l: Mon, r: Mon) -> Mon {
    if is_and {
        Mon::and(env, l, r)
    } else {
        Mon::or(env, l, r)
    }
}

fn chs_guard(m: &Mon) -> &crate::monitor::Guard {
    match m {
        Mon::Act(_, guard, _) => guard,
        _ => unreachable!("checked act shape above"),
    }
}

fn entry(id: &Derivation, rule: Rule, act: Action, from: String, to: &Mon) -> ProofEntry {
    ProofEntry::new(id.clone(), rule, act, from, to.to_string())
}

fn ev_entry(id: &Derivation, rule: Rule, event: &Event, from: String, to: &Mon) -> ProofEntry {
    entry(
        id,
        rule,
        Action::Event {
            event: event.clone(),
        },
        from,
        to,
    )
}

/// Apply silent rules to a fixed point. Returns the steps taken in
/// chronological order together with the ready-form term.
pub fn saturate(mut m: Mon) -> Result<(Vec<ProofEntry>, Mon)> {
    let mut entries = Vec::new();
    while tau_applies(&m) {
        let (step, next) = tau_step(m, &Derivation::top())?;
        tracing::trace!(rule = step.rule.name(), "silent step");
        entries.push(step);
        m = next;
    }
    Ok((entries, m))
}

/// Advance a ready-form monitor by one external event, then re-saturate.
///
/// Returns the steps taken, the event step first and every silent step
/// after it, in chronological order, and the next ready-form term. Fails only on
/// malformed terms or a term that is not in ready form.
pub fn analyze(event: &Event, m: Mon) -> Result<(Vec<ProofEntry>, Mon)> {
    ensure!(
        is_ready(&m),
        "analyze requires a tau-saturated monitor, got '{m}'"
    );
    let (first, next) = event_step(m, event, &Derivation::top())?;
    tracing::trace!(rule = first.rule.name(), event = %event, "event step");
    let (taus, out) = saturate(next)?;
    let mut entries = Vec::with_capacity(taus.len() + 1);
    entries.push(first);
    entries.extend(taus);
    Ok((entries, out))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stateful analyzer
// ─────────────────────────────────────────────────────────────────────────────

/// Report handed to the verdict hook exactly once per monitor, when the
/// first irrevocable verdict is reached.
#[derive(Debug, Clone, Serialize)]
pub struct VerdictReport {
    pub verdict: Verdict,
    /// Rendered terminal term
    pub monitor: String,
    pub at: DateTime<Utc>,
    /// Proof derivation log, newest step first
    pub proof: Vec<ProofEntry>,
}

/// Callback invoked when a monitor first reaches a verdict.
pub type VerdictHook = Arc<dyn Fn(&VerdictReport) + Send + Sync>;

/// Holds the ambient monitor of one analysis context: the current
/// (τ-saturated) term, the accumulated proof log and the verdict hook.
///
/// Tracers running inline analysis own one of these directly; external
/// analysis wraps one in an [`AnalyzerTask`].
pub struct Analyzer {
    mon: Option<Mon>,
    /// Reverse chronological: newest step first
    log: Vec<ProofEntry>,
    hook: Option<VerdictHook>,
    reported: bool,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            mon: None,
            log: Vec::new(),
            hook: None,
            reported: false,
        }
    }

    pub fn with_hook(hook: VerdictHook) -> Self {
        Self {
            hook: Some(hook),
            ..Self::new()
        }
    }

    /// Attach `m` as the ambient monitor, τ-saturating it first.
    pub fn embed(&mut self, m: Mon) -> Result<()> {
        let (entries, m) = saturate(m)?;
        self.prepend(entries);
        self.mon = Some(m);
        self.report_verdict();
        Ok(())
    }

    /// Advance the ambient monitor by one observed event.
    pub fn observe(&mut self, event: &Event) -> Result<()> {
        let m = self
            .mon
            .take()
            .context("no monitor embedded in this analyzer")?;
        let (entries, out) = analyze(event, m)?;
        self.prepend(entries);
        self.mon = Some(out);
        self.report_verdict();
        Ok(())
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.mon.as_ref().and_then(Mon::verdict)
    }

    pub fn monitor(&self) -> Option<&Mon> {
        self.mon.as_ref()
    }

    /// The proof log, newest step first.
    pub fn log(&self) -> &[ProofEntry] {
        &self.log
    }

    /// Newest batch goes in front; within the batch the last step taken
    /// ends up first.
    fn prepend(&mut self, entries: Vec<ProofEntry>) {
        let mut log = entries;
        log.reverse();
        log.append(&mut self.log);
        self.log = log;
    }

    fn report_verdict(&mut self) {
        if self.reported {
            return;
        }
        let Some(verdict) = self.verdict() else {
            return;
        };
        self.reported = true;
        let monitor = self
            .mon
            .as_ref()
            .map(Mon::to_string)
            .unwrap_or_else(|| verdict.to_string());
        tracing::info!(%verdict, %monitor, steps = self.log.len(), "monitor reached verdict");
        let report = VerdictReport {
            verdict,
            monitor,
            at: Utc::now(),
            proof: self.log.clone(),
        };
        if let Some(hook) = &self.hook {
            hook(&report);
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External analyzer task
// ─────────────────────────────────────────────────────────────────────────────

/// Mailbox protocol of an external analyzer.
#[derive(Debug)]
pub enum AnalyzerMsg {
    Event(Event),
    Stop,
}

/// An [`Analyzer`] running as its own task over a private mailbox.
pub struct AnalyzerTask {
    analyzer: Analyzer,
    rx: mpsc::UnboundedReceiver<AnalyzerMsg>,
}

impl AnalyzerTask {
    /// Embed `m` and spawn the analysis loop. Returns the mailbox sender the
    /// owning tracer feeds events and the final `Stop` through.
    pub fn spawn(m: Mon, hook: Option<VerdictHook>) -> Result<mpsc::UnboundedSender<AnalyzerMsg>> {
        let mut analyzer = match hook {
            Some(hook) => Analyzer::with_hook(hook),
            None => Analyzer::new(),
        };
        analyzer.embed(m).context("embedding monitor failed")?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = AnalyzerTask { analyzer, rx };
        tokio::spawn(task.run());
        Ok(tx)
    }

    /// Process events until stopped or the channel closes.
    ///
    /// A reduction error is fatal for this analyzer: it is logged and the
    /// task stops, mirroring how an inline analyzer aborts its tracer.
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                AnalyzerMsg::Event(event) => {
                    if let Err(e) = self.analyzer.observe(&event) {
                        tracing::error!("analyzer aborting: {e:#}");
                        break;
                    }
                }
                AnalyzerMsg::Stop => break,
            }
        }
        tracing::debug!("analyzer task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EntryPoint, Pid};
    use serde_json::json;
    use std::sync::Mutex;

    fn send(n: u64) -> Event {
        Event::Send {
            src: Pid(1),
            to: Pid(2),
            msg: json!(n),
        }
    }

    fn receive(n: u64) -> Event {
        Event::Receive {
            src: Pid(1),
            msg: json!(n),
        }
    }

    fn rules(entries: &[ProofEntry]) -> Vec<Rule> {
        entries.iter().map(|e| e.rule).collect()
    }

    // Disjunction short-circuit: `yes or act` saturates to yes, then the
    // verdict absorbs any event.
    #[test]
    fn test_disjunction_short_circuit() {
        let m = Mon::or(
            Env::new(),
            Mon::yes(),
            Mon::act(Env::new().with_var("x"), |_| true, |_| Mon::no()),
        );
        let mut analyzer = Analyzer::new();
        analyzer.embed(m).unwrap();
        assert_eq!(analyzer.verdict(), Some(Verdict::Yes));

        analyzer.observe(&send(1)).unwrap();
        assert_eq!(analyzer.verdict(), Some(Verdict::Yes));

        // Chronological order: the silent short-circuit, then absorption.
        let chronological: Vec<Rule> = analyzer.log().iter().rev().map(|e| e.rule).collect();
        assert_eq!(chronological, vec![Rule::MDisYL, Rule::MVrd]);
    }

    // Single act: the guard matches, the event value is captured under the
    // act's namespace, and the continuation runs with the binding visible.
    #[test]
    fn test_act_binds_event_under_namespace() {
        let env = Env::new().with_var("x").with_ns("ns1");
        let m = Mon::act(
            env,
            |e| matches!(e, Event::Send { msg, .. } if msg == &json!(42)),
            |_| Mon::yes(),
        );
        let event = Event::Send {
            src: Pid(3),
            to: Pid(4),
            msg: json!(42),
        };
        let (entries, out) = analyze(&event, m).unwrap();
        assert_eq!(rules(&entries), vec![Rule::MAct]);
        assert_eq!(out.verdict(), Some(Verdict::Yes));
        assert_eq!(out.env().ctx.get("ns1", "x"), Some(&event));
    }

    #[test]
    fn test_act_rejecting_event_is_an_error() {
        let m = Mon::act(Env::new(), |e| matches!(e, Event::Send { .. }), |_| {
            Mon::yes()
        });
        assert!(analyze(&receive(1), m).is_err());
    }

    // External choice commits to whichever branch's guard holds.
    #[test]
    fn test_external_choice_selects_branch() {
        let chs = || {
            Mon::chs(
                Env::new(),
                Mon::act(
                    Env::new().with_var("s"),
                    |e| matches!(e, Event::Send { .. }),
                    |_| Mon::yes(),
                ),
                Mon::act(
                    Env::new().with_var("r"),
                    |e| matches!(e, Event::Receive { .. }),
                    |_| Mon::no(),
                ),
            )
        };

        let (entries, out) = analyze(&send(1), chs()).unwrap();
        assert_eq!(entries[0].rule, Rule::MChsL);
        assert_eq!(rules(&entries[0].premises), vec![Rule::MAct]);
        assert_eq!(out.verdict(), Some(Verdict::Yes));

        let (entries, out) = analyze(&receive(1), chs()).unwrap();
        assert_eq!(entries[0].rule, Rule::MChsR);
        assert_eq!(out.verdict(), Some(Verdict::No));
    }

    #[test]
    fn test_external_choice_requires_exclusive_guards() {
        let both = Mon::chs(
            Env::new(),
            Mon::act(Env::new(), |_| true, |_| Mon::yes()),
            Mon::act(Env::new(), |_| true, |_| Mon::yes()),
        );
        assert!(analyze(&send(1), both).is_err());

        let neither = Mon::chs(
            Env::new(),
            Mon::act(Env::new(), |_| false, |_| Mon::yes()),
            Mon::act(Env::new(), |_| false, |_| Mon::yes()),
        );
        assert!(analyze(&send(1), neither).is_err());
    }

    #[test]
    fn test_external_choice_rejects_non_act_children() {
        let m = Mon::chs(Env::new(), Mon::yes(), Mon::act(Env::new(), |_| true, |_| Mon::yes()));
        assert!(analyze(&send(1), m).is_err());
    }

    // Recursion unfolding renames the namespace to the binder and the
    // variable occurrence re-unfolds after purging its namespace.
    #[test]
    fn test_rec_unfolds_under_binder_namespace() {
        let m = Mon::rec(Env::new().with_var("X"), || {
            Mon::and(
                Env::new(),
                Mon::act(
                    Env::new().with_var("y"),
                    |e| matches!(e, Event::Send { .. }),
                    |_| Mon::yes(),
                ),
                Mon::act(
                    Env::new().with_var("z"),
                    |_| true,
                    |_| Mon::yes(),
                ),
            )
        });
        let (entries, out) = saturate(m).unwrap();
        assert_eq!(rules(&entries), vec![Rule::MRec]);
        assert_eq!(out.env().ns.as_deref(), Some("X"));
        assert!(is_ready(&out));
    }

    #[test]
    fn test_var_purges_recursion_namespace() {
        // rec X. act(y). X : after one loop iteration, y's binding from
        // that iteration must be out of scope again.
        fn body() -> Mon {
            Mon::act(
                Env::new().with_var("y"),
                |_| true,
                |_| {
                    Mon::var(Env::new().with_var("X").with_ns("X"), || {
                        Mon::act(Env::new().with_var("done"), |_| true, |_| Mon::yes())
                    })
                },
            )
        }
        let m = Mon::rec(Env::new().with_var("X"), body);

        let mut analyzer = Analyzer::new();
        analyzer.embed(m).unwrap();
        // act(y) consumes the event, binding (X, y); the trailing var then
        // unfolds and purges namespace X.
        analyzer.observe(&send(7)).unwrap();

        let out = analyzer.monitor().unwrap();
        assert!(is_ready(out));
        assert_eq!(out.env().ctx.get("X", "y"), None);
        let chronological: Vec<Rule> = analyzer.log().iter().rev().map(|e| e.rule).collect();
        assert_eq!(chronological, vec![Rule::MRec, Rule::MAct, Rule::MRecVar]);
    }

    // Parallel reduction merges child contexts left-biased: a later
    // right-branch rebind of the same key does not override.
    #[test]
    fn test_parallel_merge_is_left_biased() {
        let m = Mon::and(
            Env::new(),
            Mon::act(Env::new().with_var("x"), |_| true, |_| {
                Mon::act(Env::new().with_var("lx"), |_| true, |_| Mon::yes())
            }),
            Mon::act(Env::new(), |_| true, |_| {
                Mon::act(Env::new().with_var("x"), |_| true, |_| Mon::yes())
            }),
        );
        let e1 = send(1);
        let e2 = send(2);

        let (entries, m) = analyze(&e1, m).unwrap();
        assert_eq!(entries[0].rule, Rule::MPar);
        assert_eq!(entries[0].premises.len(), 2);
        assert_eq!(m.env().ctx.get("global", "x"), Some(&e1));

        let (_, m) = analyze(&e2, m).unwrap();
        // The right branch rebound x while consuming e2, but the left
        // branch's earlier capture wins the merge.
        assert_eq!(m.env().ctx.get("global", "x"), Some(&e1));
        assert_eq!(m.env().ctx.get("global", "lx"), Some(&e2));
        assert_eq!(m.verdict(), Some(Verdict::Yes));
    }

    // Premise numbering: descending prepends, siblings increment the head.
    #[test]
    fn test_derivation_identifiers_in_premises() {
        let m = Mon::and(
            Env::new(),
            Mon::act(Env::new(), |_| true, |_| Mon::yes()),
            Mon::act(Env::new(), |_| true, |_| Mon::yes()),
        );
        let (entries, _) = analyze(&send(1), m).unwrap();
        let par = &entries[0];
        assert_eq!(par.id.0, vec![1]);
        assert_eq!(par.premises[0].id.0, vec![1, 1]);
        assert_eq!(par.premises[1].id.0, vec![2, 1]);
    }

    // Verdicts are absorbent: each further event appends exactly one mVrd
    // step and changes nothing.
    #[test]
    fn test_verdict_is_absorbent() {
        let mut analyzer = Analyzer::new();
        analyzer
            .embed(Mon::act(Env::new(), |_| true, |_| Mon::no()))
            .unwrap();
        analyzer.observe(&send(1)).unwrap();
        assert_eq!(analyzer.verdict(), Some(Verdict::No));
        let len_before = analyzer.log().len();

        for n in 2..5 {
            analyzer.observe(&send(n)).unwrap();
            assert_eq!(analyzer.verdict(), Some(Verdict::No));
        }
        assert_eq!(analyzer.log().len(), len_before + 3);
        assert!(analyzer.log()[..3].iter().all(|e| e.rule == Rule::MVrd));
    }

    #[test]
    fn test_analyze_requires_ready_form() {
        let m = Mon::rec(Env::new().with_var("X"), || Mon::yes());
        assert!(analyze(&send(1), m).is_err());
    }

    #[test]
    fn test_saturation_reaches_ready_form() {
        let m = Mon::or(
            Env::new(),
            Mon::no(),
            Mon::rec(Env::new().with_var("X"), || {
                Mon::act(Env::new(), |_| true, |_| Mon::yes())
            }),
        );
        let (entries, out) = saturate(m).unwrap();
        assert!(is_ready(&out));
        assert_eq!(rules(&entries), vec![Rule::MDisNL, Rule::MRec]);
    }

    // Identical inputs produce identical logs and identical terms.
    #[test]
    fn test_reduction_is_deterministic() {
        let build = || {
            Mon::and(
                Env::new(),
                Mon::chs(
                    Env::new(),
                    Mon::act(
                        Env::new().with_var("s"),
                        |e| matches!(e, Event::Send { .. }),
                        |_| Mon::yes(),
                    ),
                    Mon::act(
                        Env::new().with_var("r"),
                        |e| matches!(e, Event::Receive { .. }),
                        |_| Mon::yes(),
                    ),
                ),
                Mon::act(Env::new().with_var("x"), |_| true, |_| Mon::yes()),
            )
        };
        let events = [send(1), receive(2), send(3)];

        let run = || {
            let mut analyzer = Analyzer::new();
            analyzer.embed(build()).unwrap();
            for event in &events {
                analyzer.observe(event).unwrap();
            }
            (
                analyzer.log().to_vec(),
                analyzer.monitor().unwrap().to_string(),
            )
        };
        assert_eq!(run(), run());
    }

    // The hook fires exactly once, on the first verdict.
    #[test]
    fn test_verdict_hook_fires_once() {
        let seen: Arc<Mutex<Vec<Verdict>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: VerdictHook = Arc::new(move |report: &VerdictReport| {
            sink.lock().unwrap().push(report.verdict);
        });

        let mut analyzer = Analyzer::with_hook(hook);
        analyzer
            .embed(Mon::act(
                Env::new(),
                |e| matches!(e, Event::Send { .. }),
                |_| Mon::yes(),
            ))
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());

        analyzer.observe(&send(1)).unwrap();
        analyzer.observe(&send(2)).unwrap();
        analyzer.observe(&send(3)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Verdict::Yes]);
    }

    #[test]
    fn test_spawn_event_can_drive_guards() {
        let m = Mon::act(
            Env::new().with_var("child"),
            |e| matches!(e, Event::Spawn { entry, .. } if entry.function == "worker"),
            |_| Mon::yes(),
        );
        let event = Event::Spawn {
            src: Pid(1),
            child: Pid(2),
            entry: EntryPoint::new("pool", "worker", 2),
        };
        let (_, out) = analyze(&event, m).unwrap();
        assert_eq!(out.verdict(), Some(Verdict::Yes));
    }
}
