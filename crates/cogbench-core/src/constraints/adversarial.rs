//! Constraints active only in adversarial mode.
//!
//! An adversarial question targets one level but was generated with the
//! verbs of another (`vocab_level`). These replace the target level's
//! vocabulary constraint.

use super::{CheckContext, Constraint, ConstraintId, Outcome};
use crate::error::PredicateError;
use crate::model::Mode;
use crate::settings::{Lexicon, LexiconError, PerLevel};
use crate::text::MarkerSet;

fn compile_verbs(lexicon: &Lexicon) -> Result<PerLevel<MarkerSet>, LexiconError> {
    Ok(PerLevel {
        remember: Lexicon::compile("verbs.remember", &lexicon.verbs.remember)?,
        understand: Lexicon::compile("verbs.understand", &lexicon.verbs.understand)?,
        apply: Lexicon::compile("verbs.apply", &lexicon.verbs.apply)?,
        analyze: Lexicon::compile("verbs.analyze", &lexicon.verbs.analyze)?,
        evaluate: Lexicon::compile("verbs.evaluate", &lexicon.verbs.evaluate)?,
        create: Lexicon::compile("verbs.create", &lexicon.verbs.create)?,
    })
}

/// AV: the question carries the instructed level's vocabulary.
pub struct AdversarialVocabulary {
    verbs: PerLevel<MarkerSet>,
}

impl AdversarialVocabulary {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        Ok(Self {
            verbs: compile_verbs(lexicon)?,
        })
    }
}

impl Constraint for AdversarialVocabulary {
    fn id(&self) -> ConstraintId {
        ConstraintId::AV
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let q = ctx.question;
        let vocab_level = match (q.mode, q.vocab_level) {
            (Mode::Adversarial, Some(level)) => level,
            _ => return Ok(Outcome::skipped("not an adversarial question")),
        };
        let verbs = self.verbs.get(vocab_level);
        if verbs.is_empty() {
            return Ok(Outcome::skipped(format!("no verbs configured for {vocab_level}")));
        }
        match verbs.first_match(&q.question) {
            Some(verb) => Ok(Outcome::pass(1.0, format!("uses {vocab_level} verb '{verb}'"))
                .with_matched([verb])),
            None => Ok(Outcome::fail(
                0.0,
                format!("does not use the instructed {vocab_level} vocabulary"),
            )),
        }
    }
}

/// AN: the question avoids its own target level's verbs.
///
/// Failing is soft (score 0.5): the question followed the instruction but
/// leaned on the easy cue as well.
pub struct NoTargetVocabulary {
    verbs: PerLevel<MarkerSet>,
}

impl NoTargetVocabulary {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        Ok(Self {
            verbs: compile_verbs(lexicon)?,
        })
    }
}

impl Constraint for NoTargetVocabulary {
    fn id(&self) -> ConstraintId {
        ConstraintId::AN
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let q = ctx.question;
        if q.mode != Mode::Adversarial {
            return Ok(Outcome::skipped("not an adversarial question"));
        }
        let verbs = self.verbs.get(q.level);
        if verbs.is_empty() {
            return Ok(Outcome::skipped(format!("no verbs configured for {}", q.level)));
        }
        match verbs.first_match(&q.question) {
            None => Ok(Outcome::pass(1.0, format!("avoids {} vocabulary", q.level))),
            Some(verb) => Ok(Outcome::fail(
                0.5,
                format!("uses target {} verb '{verb}'", q.level),
            )
            .with_matched([verb])),
        }
    }
}
