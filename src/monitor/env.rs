//! Binder environments and binding contexts carried by monitor terms.
//!
//! Every monitor node carries an [`Env`]: display metadata produced by the
//! synthesis pass, the name of the variable an act binds, the namespace the
//! node currently reduces under, and the [`Ctx`] of values captured so far.
//! Contexts are small insertion-ordered lists rather than hash maps: merges
//! must be deterministic and left-biased, and lookups happen on a handful of
//! entries at most.

use crate::events::Event;
use serde::Serialize;
use std::fmt;

/// Name of the namespace used when a node carries no explicit one.
pub const GLOBAL_NS: &str = "global";

/// One captured binding: the event value recorded when an act consumed an
/// event, keyed by `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    pub ns: String,
    pub name: String,
    pub value: Event,
}

/// Insertion-ordered mapping from `(namespace, name)` to captured events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ctx {
    entries: Vec<Binding>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up the value bound under `(ns, name)`.
    pub fn get(&self, ns: &str, name: &str) -> Option<&Event> {
        self.entries
            .iter()
            .find(|b| b.ns == ns && b.name == name)
            .map(|b| &b.value)
    }

    /// Bind `(ns, name)` to `value`. An existing binding for the same key is
    /// updated in place, keeping its insertion position.
    pub fn bind(&mut self, ns: impl Into<String>, name: impl Into<String>, value: Event) {
        let ns = ns.into();
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|b| b.ns == ns && b.name == name)
        {
            Some(existing) => existing.value = value,
            None => self.entries.push(Binding { ns, name, value }),
        }
    }

    /// Merge two contexts from a parallel reduction. The left operand wins on
    /// duplicate keys; novel right-hand bindings are appended in their order.
    pub fn merge(left: &Ctx, right: &Ctx) -> Ctx {
        let mut merged = left.clone();
        for binding in &right.entries {
            if merged.get(&binding.ns, &binding.name).is_none() {
                merged.entries.push(binding.clone());
            }
        }
        merged
    }

    /// Drop every binding recorded under `ns`, keeping the rest in order.
    pub fn without_ns(&self, ns: &str) -> Ctx {
        Ctx {
            entries: self
                .entries
                .iter()
                .filter(|b| b.ns != ns)
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter()
    }
}

impl fmt::Display for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, b) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}.{} -> {}", b.ns, b.name, b.value)?;
        }
        write!(f, "}}")
    }
}

/// Metadata attached to every monitor node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    /// Display string produced by the synthesis pass
    pub label: Option<String>,
    /// Name of the variable this node binds (acts and recursion binders)
    pub var: Option<String>,
    /// Display pattern for the awaited event
    pub pattern: Option<String>,
    /// Namespace this node reduces under; `None` means the global namespace
    pub ns: Option<String>,
    /// Bindings captured on the path to this node
    pub ctx: Ctx,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_ns(mut self, ns: impl Into<String>) -> Self {
        self.ns = Some(ns.into());
        self
    }

    /// Effective namespace of this node.
    pub fn namespace(&self) -> &str {
        self.ns.as_deref().unwrap_or(GLOBAL_NS)
    }

    /// Overwrite this node's ambient namespace and context with the
    /// parent's. Applied to a child on every branch taken during reduction
    /// so bindings made higher up stay visible below.
    pub fn inherit(&mut self, parent: &Env) {
        self.ns = parent.ns.clone();
        self.ctx = parent.ctx.clone();
    }
}
