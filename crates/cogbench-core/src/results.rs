//! Constraint results and evaluation records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintId, Outcome, Tier};
use crate::error::EvalError;
use crate::model::{CognitiveLevel, Mode, QuestionData};

/// Verdict of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// The constraint could not be decided (oracle unavailable).
    Indeterminate,
}

/// Why a result did not come from a normal predicate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTag {
    PredicateError,
    OracleUnavailable,
}

/// Outcome of one constraint on one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub id: ConstraintId,
    pub name: String,
    pub tier: Tier,
    pub verdict: Verdict,
    /// Continuous score in [0, 1], used by loose scoring.
    pub score: f64,
    /// Counts and scores behind the verdict.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, f64>,
    /// Text spans (concepts, markers, numbers) that matched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<ResultTag>,
}

impl ConstraintResult {
    pub fn from_outcome(id: ConstraintId, outcome: Outcome) -> Self {
        Self {
            id,
            name: id.name().to_string(),
            tier: id.tier(),
            verdict: if outcome.passed {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
            score: outcome.score.clamp(0.0, 1.0),
            evidence: outcome.evidence,
            matched: outcome.matched,
            reason: outcome.reason,
            tag: None,
        }
    }

    /// Build the result for a constraint that failed to run normally.
    ///
    /// Oracle failures become indeterminate; everything else is a failing
    /// verdict tagged `predicate_error`.
    pub fn from_error(id: ConstraintId, error: &EvalError) -> Self {
        let (verdict, tag) = match error {
            EvalError::OracleUnavailable(_) => {
                (Verdict::Indeterminate, ResultTag::OracleUnavailable)
            }
            _ => (Verdict::Fail, ResultTag::PredicateError),
        };
        Self {
            id,
            name: id.name().to_string(),
            tier: id.tier(),
            verdict,
            score: 0.0,
            evidence: BTreeMap::new(),
            matched: Vec::new(),
            reason: error.to_string(),
            tag: Some(tag),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn is_indeterminate(&self) -> bool {
        self.verdict == Verdict::Indeterminate
    }

    /// Loose criterion: determinate and scoring at least `floor`.
    pub fn loosely_passes(&self, floor: f64) -> bool {
        !self.is_indeterminate() && (self.passed() || self.score >= floor)
    }
}

/// Relaxed scoring policy for `loose_pass`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoosePolicy {
    /// Minimum score for a determinate result to count as a loose pass.
    pub score_floor: f64,
    /// Fraction of determinate results that must loosely pass.
    pub min_fraction: f64,
}

impl Default for LoosePolicy {
    fn default() -> Self {
        Self {
            score_floor: 0.5,
            min_fraction: 1.0,
        }
    }
}

/// All constraint results for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub question: QuestionData,
    /// Results in registry order.
    pub results: Vec<ConstraintResult>,
    /// Every applicable constraint passed; indeterminate counts as failing.
    pub strict_pass: bool,
    /// Relaxed criterion over determinate results only.
    pub loose_pass: bool,
    /// Loosely passing results over determinate results, if any were
    /// determinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loose_ratio: Option<f64>,
    pub registry_version: String,
    pub oracle_version: String,
}

impl EvaluationRecord {
    pub fn new(
        question: QuestionData,
        results: Vec<ConstraintResult>,
        policy: LoosePolicy,
        registry_version: &str,
        oracle_version: &str,
    ) -> Self {
        let strict_pass = !results.is_empty() && results.iter().all(|r| r.passed());

        let determinate = results.iter().filter(|r| !r.is_indeterminate()).count();
        let loose_ratio = (determinate > 0).then(|| {
            let loose = results
                .iter()
                .filter(|r| r.loosely_passes(policy.score_floor))
                .count();
            loose as f64 / determinate as f64
        });
        let loose_pass = loose_ratio.is_some_and(|ratio| ratio >= policy.min_fraction);

        Self {
            question,
            results,
            strict_pass,
            loose_pass,
            loose_ratio,
            registry_version: registry_version.to_string(),
            oracle_version: oracle_version.to_string(),
        }
    }

    pub fn result(&self, id: ConstraintId) -> Option<&ConstraintResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn constraint_ids(&self) -> Vec<ConstraintId> {
        self.results.iter().map(|r| r.id).collect()
    }

    pub fn indeterminate_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_indeterminate()).count()
    }

    pub fn predicate_error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.tag == Some(ResultTag::PredicateError))
            .count()
    }

    pub fn model(&self) -> &str {
        self.question.model()
    }

    pub fn level(&self) -> CognitiveLevel {
        self.question.level
    }

    pub fn mode(&self) -> Mode {
        self.question.mode
    }
}
