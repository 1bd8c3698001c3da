//! The monitor term algebra.
//!
//! A [`Mon`] is the runtime state of a formal property under evaluation: a
//! tagged recursive value in seven shapes. Continuations are suspended
//! closures behind `Arc` so a term can be cloned, shipped across task
//! boundaries and re-entered with a refreshed context. Recursion is
//! represented by thunks ([`Mon::Rec`], [`Mon::Var`]) whose evaluation
//! unfolds a fresh copy of the body, which keeps the value tree acyclic.

use crate::events::Event;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub mod env;

pub use env::{Binding, Ctx, Env, GLOBAL_NS};

/// Predicate over the next external event.
pub type Guard = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Suspended continuation of an act: applied to the consumed event.
pub type OnEvent = Arc<dyn Fn(&Event) -> Mon + Send + Sync>;

/// Suspended recursion body: evaluation unfolds one copy.
pub type Unfold = Arc<dyn Fn() -> Mon + Send + Sync>;

/// Irrevocable outcome of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The observed trace satisfies the property
    Yes,
    /// The observed trace violates the property
    No,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Yes => write!(f, "yes"),
            Verdict::No => write!(f, "no"),
        }
    }
}

/// A monitor term.
#[derive(Clone)]
pub enum Mon {
    /// Terminal verdict; absorbs every further event
    Verdict(Env, Verdict),
    /// Awaits one external event matching the guard
    Act(Env, Guard, OnEvent),
    /// External choice between two acts with mutually exclusive guards
    Chs(Env, Box<Mon>, Box<Mon>),
    /// Parallel conjunction
    And(Env, Box<Mon>, Box<Mon>),
    /// Parallel disjunction
    Or(Env, Box<Mon>, Box<Mon>),
    /// Recursion binder; unfolding names the binder's namespace
    Rec(Env, Unfold),
    /// Bound recursion variable; unfolding purges its namespace first
    Var(Env, Unfold),
}

impl Mon {
    pub fn yes() -> Self {
        Mon::Verdict(Env::new(), Verdict::Yes)
    }

    pub fn no() -> Self {
        Mon::Verdict(Env::new(), Verdict::No)
    }

    pub fn act<G, K>(env: Env, guard: G, k: K) -> Self
    where
        G: Fn(&Event) -> bool + Send + Sync + 'static,
        K: Fn(&Event) -> Mon + Send + Sync + 'static,
    {
        Mon::Act(env, Arc::new(guard), Arc::new(k))
    }

    pub fn chs(env: Env, left: Mon, right: Mon) -> Self {
        Mon::Chs(env, Box::new(left), Box::new(right))
    }

    pub fn and(env: Env, left: Mon, right: Mon) -> Self {
        Mon::And(env, Box::new(left), Box::new(right))
    }

    pub fn or(env: Env, left: Mon, right: Mon) -> Self {
        Mon::Or(env, Box::new(left), Box::new(right))
    }

    pub fn rec<K>(env: Env, unfold: K) -> Self
    where
        K: Fn() -> Mon + Send + Sync + 'static,
    {
        Mon::Rec(env, Arc::new(unfold))
    }

    pub fn var<K>(env: Env, unfold: K) -> Self
    where
        K: Fn() -> Mon + Send + Sync + 'static,
    {
        Mon::Var(env, Arc::new(unfold))
    }

    pub fn env(&self) -> &Env {
        match self {
            Mon::Verdict(env, _)
            | Mon::Act(env, _, _)
            | Mon::Chs(env, _, _)
            | Mon::And(env, _, _)
            | Mon::Or(env, _, _)
            | Mon::Rec(env, _)
            | Mon::Var(env, _) => env,
        }
    }

    pub fn env_mut(&mut self) -> &mut Env {
        match self {
            Mon::Verdict(env, _)
            | Mon::Act(env, _, _)
            | Mon::Chs(env, _, _)
            | Mon::And(env, _, _)
            | Mon::Or(env, _, _)
            | Mon::Rec(env, _)
            | Mon::Var(env, _) => env,
        }
    }

    /// The verdict, if this term is terminal.
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            Mon::Verdict(_, v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_act(&self) -> bool {
        matches!(self, Mon::Act(..))
    }

    /// Copy the parent's namespace and context in, consuming self. Every
    /// reduction branch applies this to the child it descends into.
    pub(crate) fn inheriting(mut self, parent: &Env) -> Mon {
        self.env_mut().inherit(parent);
        self
    }

    fn shape(&self) -> &'static str {
        match self {
            Mon::Verdict(..) => "verdict",
            Mon::Act(..) => "act",
            Mon::Chs(..) => "chs",
            Mon::And(..) => "and",
            Mon::Or(..) => "or",
            Mon::Rec(..) => "rec",
            Mon::Var(..) => "var",
        }
    }
}

/// Renders a term the way the proof log records it: the synthesis pass's
/// display string when present, a structural sketch otherwise.
impl fmt::Display for Mon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.env().label {
            return write!(f, "{label}");
        }
        match self {
            Mon::Verdict(_, v) => write!(f, "{v}"),
            Mon::Act(env, _, _) => match (&env.var, &env.pattern) {
                (_, Some(pattern)) => write!(f, "{pattern}.(..)"),
                (Some(var), None) => write!(f, "act({var}).(..)"),
                (None, None) => write!(f, "act(_).(..)"),
            },
            Mon::Chs(_, l, r) => write!(f, "{l} + {r}"),
            Mon::And(_, l, r) => write!(f, "{l} and {r}"),
            Mon::Or(_, l, r) => write!(f, "{l} or {r}"),
            Mon::Rec(env, _) => match &env.var {
                Some(var) => write!(f, "rec {var}.(..)"),
                None => write!(f, "rec _.(..)"),
            },
            Mon::Var(env, _) => match &env.var {
                Some(var) => write!(f, "{var}"),
                None => write!(f, "var(_)"),
            },
        }
    }
}

impl fmt::Debug for Mon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mon")
            .field("shape", &self.shape())
            .field("ns", &self.env().namespace())
            .field("display", &format!("{self}"))
            .finish()
    }
}
