//! Constraints decided by the semantic oracle.
//!
//! The passage (cut to `premise_max_words`) is always the premise. These
//! constraints never call the oracle themselves: they name the pair they
//! need, the evaluator fetches the scores, and `check` only applies the
//! threshold.

use super::{CheckContext, Constraint, ConstraintId, Outcome};
use crate::error::PredicateError;
use crate::model::{Passage, QuestionData};
use crate::oracle::{OracleQuery, OracleScores};
use crate::settings::Thresholds;
use crate::text;

/// Which side of the question record is the hypothesis.
#[derive(Debug, Clone, Copy)]
enum Hypothesis {
    Question,
    Answer,
}

impl Hypothesis {
    fn text(self, question: &QuestionData) -> &str {
        match self {
            Hypothesis::Question => &question.question,
            Hypothesis::Answer => &question.answer,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Hypothesis::Question => "question",
            Hypothesis::Answer => "answer",
        }
    }
}

fn query(
    passage: &Passage,
    question: &QuestionData,
    hypothesis: Hypothesis,
    premise_max_words: usize,
) -> Option<OracleQuery> {
    let hypothesis = hypothesis.text(question).trim();
    if passage.text.trim().is_empty() || hypothesis.is_empty() {
        return None;
    }
    Some(OracleQuery::new(
        text::truncate_words(&passage.text, premise_max_words),
        hypothesis,
    ))
}

/// Either the scores the evaluator fetched, or a skip when nothing was
/// asked for.
fn scores<'a>(
    ctx: &CheckContext<'a>,
    hypothesis: Hypothesis,
    premise_max_words: usize,
) -> Result<Option<&'a OracleScores>, PredicateError> {
    if query(ctx.passage, ctx.question, hypothesis, premise_max_words).is_none() {
        return Ok(None);
    }
    ctx.oracle
        .map(Some)
        .ok_or_else(|| PredicateError::new("oracle scores were not supplied"))
}

/// D3: the answer is not contradicted by the passage.
pub struct AnswerSupported {
    max_contradiction: f64,
    premise_max_words: usize,
}

impl AnswerSupported {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            max_contradiction: t.contradiction_max,
            premise_max_words: t.premise_max_words,
        }
    }
}

impl Constraint for AnswerSupported {
    fn id(&self) -> ConstraintId {
        ConstraintId::D3
    }

    fn oracle_query(&self, question: &QuestionData, passage: &Passage) -> Option<OracleQuery> {
        query(passage, question, Hypothesis::Answer, self.premise_max_words)
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let Some(scores) = scores(ctx, Hypothesis::Answer, self.premise_max_words)? else {
            return Ok(Outcome::skipped("missing passage or answer"));
        };
        let c = scores.contradiction;
        let outcome = if c < self.max_contradiction {
            Outcome::pass(
                1.0 - c,
                format!("contradiction {c:.3} below {}", self.max_contradiction),
            )
        } else {
            Outcome::fail(
                1.0 - c,
                format!(
                    "answer contradicts passage: contradiction {c:.3} (need < {})",
                    self.max_contradiction
                ),
            )
        };
        Ok(with_scores(outcome, scores))
    }
}

/// Shared shape of the novelty constraints (P2, C2).
struct NoveltyCheck {
    min_novelty: f64,
    premise_max_words: usize,
    hypothesis: Hypothesis,
}

impl NoveltyCheck {
    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let Some(scores) = scores(ctx, self.hypothesis, self.premise_max_words)? else {
            return Ok(Outcome::skipped(format!(
                "missing passage or {}",
                self.hypothesis.label()
            )));
        };
        let n = scores.novelty;
        let what = self.hypothesis.label();
        let outcome = if n >= self.min_novelty {
            Outcome::pass(n, format!("{what} is novel: novelty {n:.3}"))
        } else {
            Outcome::fail(
                n,
                format!(
                    "{what} too close to passage: novelty {n:.3} (need >= {})",
                    self.min_novelty
                ),
            )
        };
        Ok(with_scores(outcome, scores))
    }
}

/// P2: the question sets up a scenario the passage does not contain.
pub struct NewScenario(NoveltyCheck);

impl NewScenario {
    pub fn new(t: &Thresholds) -> Self {
        Self(NoveltyCheck {
            min_novelty: t.apply_novelty_min,
            premise_max_words: t.premise_max_words,
            hypothesis: Hypothesis::Question,
        })
    }
}

impl Constraint for NewScenario {
    fn id(&self) -> ConstraintId {
        ConstraintId::P2
    }

    fn oracle_query(&self, question: &QuestionData, passage: &Passage) -> Option<OracleQuery> {
        query(passage, question, self.0.hypothesis, self.0.premise_max_words)
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        self.0.check(ctx)
    }
}

/// C2: the answer creates something the passage does not already say.
pub struct NovelCreation(NoveltyCheck);

impl NovelCreation {
    pub fn new(t: &Thresholds) -> Self {
        Self(NoveltyCheck {
            min_novelty: t.create_novelty_min,
            premise_max_words: t.premise_max_words,
            hypothesis: Hypothesis::Answer,
        })
    }
}

impl Constraint for NovelCreation {
    fn id(&self) -> ConstraintId {
        ConstraintId::C2
    }

    fn oracle_query(&self, question: &QuestionData, passage: &Passage) -> Option<OracleQuery> {
        query(passage, question, self.0.hypothesis, self.0.premise_max_words)
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        self.0.check(ctx)
    }
}

fn with_scores(outcome: Outcome, scores: &OracleScores) -> Outcome {
    outcome
        .with_evidence("entailment", scores.entailment)
        .with_evidence("contradiction", scores.contradiction)
        .with_evidence("novelty", scores.novelty)
}
