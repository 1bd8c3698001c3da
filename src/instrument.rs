// Instrumentation predicate - decides which spawned processes get monitors
//
// The predicate maps a spawned process's entry-point descriptor to a fresh
// monitor term, or to nothing when the process should merely be traced. It
// is consulted only on spawn events the tracer handles directly, and the
// tracer caches nothing about it.

use crate::events::EntryPoint;
use crate::monitor::Mon;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps an entry point to an optional fresh monitor.
pub type InstrPredicate = Arc<dyn Fn(&EntryPoint) -> Option<Mon> + Send + Sync>;

/// Produces one fresh monitor term per instrumented spawn.
pub type MonFactory = Arc<dyn Fn() -> Mon + Send + Sync>;

/// Predicate that never instruments: the whole system is observed by the
/// root tracer alone.
pub fn observe_only() -> InstrPredicate {
    Arc::new(|_| None)
}

/// Table-driven predicate keyed by `(module, function)`.
///
/// Arity is deliberately ignored: a property written for `server:loop`
/// applies to every arity the synthesis pass emitted it for.
#[derive(Default)]
pub struct PredicateMap {
    factories: HashMap<(String, String), MonFactory>,
}

impl PredicateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor factory for processes entering `module:function`.
    pub fn register<F>(
        mut self,
        module: impl Into<String>,
        function: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Mon + Send + Sync + 'static,
    {
        self.factories
            .insert((module.into(), function.into()), Arc::new(factory));
        self
    }

    pub fn into_predicate(self) -> InstrPredicate {
        let factories = self.factories;
        Arc::new(move |entry: &EntryPoint| {
            factories
                .get(&(entry.module.clone(), entry.function.clone()))
                .map(|factory| factory())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Verdict;

    #[test]
    fn test_observe_only_never_instruments() {
        let predicate = observe_only();
        assert!(predicate(&EntryPoint::new("m", "f", 3)).is_none());
    }

    #[test]
    fn test_table_matches_module_and_function() {
        let predicate = PredicateMap::new()
            .register("server", "loop", Mon::yes)
            .into_predicate();

        let hit = predicate(&EntryPoint::new("server", "loop", 2)).unwrap();
        assert_eq!(hit.verdict(), Some(Verdict::Yes));
        assert!(predicate(&EntryPoint::new("server", "init", 2)).is_none());
        assert!(predicate(&EntryPoint::new("client", "loop", 2)).is_none());
    }

    #[test]
    fn test_each_consultation_yields_a_fresh_term() {
        let predicate = PredicateMap::new()
            .register("server", "loop", || {
                Mon::act(Default::default(), |_| true, |_| Mon::yes())
            })
            .into_predicate();
        let entry = EntryPoint::new("server", "loop", 1);
        // two consultations, two independent terms
        assert!(predicate(&entry).is_some());
        assert!(predicate(&entry).is_some());
    }
}
