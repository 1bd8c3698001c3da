//! Proof derivation records.
//!
//! Every reduction step the analyzer takes is witnessed by a [`ProofEntry`]:
//! which rule fired, on which action, between which terms, and (for
//! congruence rules) the premise steps it was built from. Entries render
//! terms as strings at record time so the log stays a plain serializable
//! value after the closures inside the terms are gone.

use crate::events::Event;
use serde::Serialize;
use std::fmt;

/// Names of the small-step reduction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    /// Verdict absorbs an event
    MVrd,
    /// Act consumes its awaited event and binds it
    MAct,
    /// External choice commits to the left branch
    MChsL,
    /// External choice commits to the right branch
    MChsR,
    /// Parallel composition forwards an event to both children
    MPar,
    /// Disjunction short-circuits on a left `yes`
    MDisYL,
    /// Disjunction short-circuits on a right `yes`
    MDisYR,
    /// Disjunction discards a left `no`
    MDisNL,
    /// Disjunction discards a right `no`
    MDisNR,
    /// Conjunction discards a left `yes`
    MConYL,
    /// Conjunction discards a right `yes`
    MConYR,
    /// Conjunction short-circuits on a left `no`
    MConNL,
    /// Conjunction short-circuits on a right `no`
    MConNR,
    /// Recursion binder unfolds
    MRec,
    /// Recursion variable unfolds, purging its namespace
    MRecVar,
    /// Silent congruence through the left child
    MTauL,
    /// Silent congruence through the right child
    MTauR,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::MVrd => "mVrd",
            Rule::MAct => "mAct",
            Rule::MChsL => "mChsL",
            Rule::MChsR => "mChsR",
            Rule::MPar => "mPar",
            Rule::MDisYL => "mDisYL",
            Rule::MDisYR => "mDisYR",
            Rule::MDisNL => "mDisNL",
            Rule::MDisNR => "mDisNR",
            Rule::MConYL => "mConYL",
            Rule::MConYR => "mConYR",
            Rule::MConNL => "mConNL",
            Rule::MConNR => "mConNR",
            Rule::MRec => "mRec",
            Rule::MRecVar => "mRecVar",
            Rule::MTauL => "mTauL",
            Rule::MTauR => "mTauR",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The action a step reduced on: the silent action or one external event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Tau,
    Event { event: Event },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tau => write!(f, "tau"),
            Action::Event { event } => write!(f, "{event}"),
        }
    }
}

/// Position of a step in the proof tree.
///
/// The top step of a reduction is `[1]`. Descending into a premise prepends
/// `1`; a sibling premise at the same depth increments the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derivation(pub Vec<u32>);

impl Derivation {
    /// Identifier of a top-level reduction step.
    pub fn top() -> Self {
        Derivation(vec![1])
    }

    /// Identifier of the first premise one level below this step.
    pub fn premise(&self) -> Self {
        let mut id = Vec::with_capacity(self.0.len() + 1);
        id.push(1);
        id.extend_from_slice(&self.0);
        Derivation(id)
    }

    /// Identifier of the next sibling premise at the same depth.
    pub fn sibling(&self) -> Self {
        let mut id = self.0.clone();
        if let Some(head) = id.first_mut() {
            *head += 1;
        }
        Derivation(id)
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{n}")?;
        }
        write!(f, "]")
    }
}

/// One recorded rule application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProofEntry {
    pub id: Derivation,
    pub rule: Rule,
    #[serde(flatten)]
    pub act: Action,
    /// Source term, rendered
    pub from: String,
    /// Target term, rendered
    pub to: String,
    /// Premise steps, outermost rule last; zero, one or two entries
    pub premises: Vec<ProofEntry>,
}

impl ProofEntry {
    pub fn new(id: Derivation, rule: Rule, act: Action, from: String, to: String) -> Self {
        Self {
            id,
            rule,
            act,
            from,
            to,
            premises: Vec::new(),
        }
    }

    pub fn with_premises(mut self, premises: Vec<ProofEntry>) -> Self {
        self.premises = premises;
        self
    }
}

impl fmt::Display for ProofEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} --{}--> {}",
            self.id, self.rule, self.from, self.act, self.to
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_premise_prepends() {
        let top = Derivation::top();
        assert_eq!(top.0, vec![1]);
        assert_eq!(top.premise().0, vec![1, 1]);
        assert_eq!(top.premise().premise().0, vec![1, 1, 1]);
    }

    #[test]
    fn test_derivation_sibling_increments_head() {
        let first = Derivation::top().premise();
        let second = first.sibling();
        assert_eq!(second.0, vec![2, 1]);
        assert_eq!(second.sibling().0, vec![3, 1]);
    }

    #[test]
    fn test_derivation_display() {
        assert_eq!(Derivation(vec![2, 1]).to_string(), "[2,1]");
    }

    #[test]
    fn test_entry_serializes_flat_action() {
        let entry = ProofEntry::new(
            Derivation::top(),
            Rule::MRec,
            Action::Tau,
            "rec x.(..)".into(),
            "act(y).(..)".into(),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["rule"], "mRec");
        assert_eq!(json["action"], "tau");
        assert_eq!(json["premises"].as_array().unwrap().len(), 0);
    }
}
