//! Constraints applied at every level.

use std::collections::HashMap;

use super::{referenced_concepts, scoped_text, CheckContext, Constraint, ConstraintId, Outcome};
use crate::error::PredicateError;
use crate::model::CognitiveLevel;
use crate::settings::{ConceptScope, Lexicon, LexiconError, Thresholds};
use crate::text::{self, MarkerSet};

/// U1: the output is a question or a task prompt.
pub struct IsQuestion {
    task_starters: Vec<String>,
    response_endings: Vec<String>,
    question_words: MarkerSet,
}

impl IsQuestion {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        let normalize = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|s| text::normalize_phrase(s))
                .filter(|s| !s.is_empty())
                .collect()
        };
        Ok(Self {
            task_starters: normalize(&lexicon.task_starters),
            response_endings: normalize(&lexicon.response_endings),
            question_words: Lexicon::compile("question_words", &lexicon.question_words)?,
        })
    }
}

fn is_boundary(c: Option<char>) -> bool {
    c.map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}

impl Constraint for IsQuestion {
    fn id(&self) -> ConstraintId {
        ConstraintId::U1
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let trimmed = ctx.question.question.trim();
        if trimmed.is_empty() {
            return Ok(Outcome::fail(0.0, "empty question"));
        }
        if trimmed.ends_with('?') {
            return Ok(Outcome::pass(1.0, "ends with '?'").with_matched(["?"]));
        }

        let lower = text::normalize_phrase(trimmed);
        if let Some(starter) = self
            .task_starters
            .iter()
            .find(|s| lower.starts_with(s.as_str()) && is_boundary(lower[s.len()..].chars().next()))
        {
            return Ok(Outcome::pass(0.8, format!("task prompt starting with '{starter}'"))
                .with_matched([starter.as_str()]));
        }

        let without_period = lower.trim_end_matches('.');
        if let Some(ending) = self.response_endings.iter().find(|e| {
            without_period.ends_with(e.as_str())
                && is_boundary(
                    without_period[..without_period.len() - e.len()]
                        .chars()
                        .next_back(),
                )
        }) {
            return Ok(Outcome::pass(0.7, format!("response-request ending '{ending}'"))
                .with_matched([ending.as_str()]));
        }

        if let Some(word) = self.question_words.first_match(&lower) {
            return Ok(Outcome::pass(0.6, format!("contains question word '{word}'"))
                .with_matched([word]));
        }

        Ok(Outcome::fail(
            0.0,
            "does not end with '?' and has no task or interrogative structure",
        ))
    }
}

/// U2: the question length is within bounds.
pub struct WordCount {
    min_words: usize,
    min_words_remember: usize,
    max_words: usize,
}

impl WordCount {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            min_words: t.question_min_words,
            min_words_remember: t.question_min_words_remember,
            max_words: t.question_max_words,
        }
    }
}

impl Constraint for WordCount {
    fn id(&self) -> ConstraintId {
        ConstraintId::U2
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let n = text::word_count(&ctx.question.question);
        let min = if ctx.question.level == CognitiveLevel::Remember {
            self.min_words_remember
        } else {
            self.min_words
        };

        let outcome = if n < min {
            Outcome::fail(n as f64 / min.max(1) as f64, format!("too short: {n} words (min {min})"))
        } else if n > self.max_words {
            Outcome::fail(
                self.max_words as f64 / n as f64,
                format!("too long: {n} words (max {})", self.max_words),
            )
        } else {
            Outcome::pass(1.0, format!("{n} words"))
        };
        Ok(outcome.with_evidence("words", n as f64))
    }
}

/// U3: the question is about the passage.
pub struct PassageRelevance {
    min_concepts: usize,
    scope: ConceptScope,
}

impl PassageRelevance {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            min_concepts: t.relevance_min_concepts,
            scope: t.relevance_scope,
        }
    }
}

impl Constraint for PassageRelevance {
    fn id(&self) -> ConstraintId {
        ConstraintId::U3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        if ctx.passage.key_concepts.is_empty() {
            return Ok(Outcome::skipped("passage has no key concepts"));
        }
        let haystack = scoped_text(ctx.question, self.scope);
        let found = referenced_concepts(&haystack, ctx.passage)?;
        let n = found.len();
        let min = self.min_concepts.max(1);
        let score = (n as f64 / min as f64).min(1.0);

        let outcome = if n >= min {
            Outcome::pass(score, format!("{n} key concepts referenced (min {min})"))
        } else {
            Outcome::fail(score, format!("only {n} key concept(s) referenced (need {min})"))
        };
        Ok(outcome
            .with_evidence("concepts", n as f64)
            .with_matched(found))
    }
}

/// U4: the output is not degenerate.
pub struct NoDegenerate {
    max_repeat: usize,
    min_chars: usize,
    stop_words: Vec<String>,
}

impl NoDegenerate {
    pub fn new(t: &Thresholds, lexicon: &Lexicon) -> Self {
        Self {
            max_repeat: t.max_word_repeat,
            min_chars: t.min_output_chars,
            stop_words: lexicon
                .repetition_stop_words
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
        }
    }
}

impl Constraint for NoDegenerate {
    fn id(&self) -> ConstraintId {
        ConstraintId::U4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let trimmed = ctx.question.question.trim();
        if trimmed.is_empty() {
            return Ok(Outcome::fail(0.0, "empty output"));
        }
        if trimmed.chars().count() < self.min_chars {
            return Ok(Outcome::fail(0.0, format!("output too short: '{trimmed}'")));
        }

        let words = text::words(trimmed);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut worst: Option<(&str, usize)> = None;
        for word in words.iter().map(String::as_str) {
            if self.stop_words.iter().any(|s| s == word) {
                continue;
            }
            let count = counts.entry(word).or_insert(0);
            *count += 1;
            if worst.map_or(true, |(_, c)| *count > c) {
                worst = Some((word, *count));
            }
        }

        match worst {
            Some((word, count)) if count > self.max_repeat => Ok(Outcome::fail(
                self.max_repeat as f64 / count as f64,
                format!("'{word}' repeated {count} times (max {})", self.max_repeat),
            )
            .with_evidence("max_repeat", count as f64)
            .with_matched([word])),
            Some((_, count)) => {
                Ok(Outcome::pass(1.0, "no degenerate patterns").with_evidence("max_repeat", count as f64))
            }
            None => Ok(Outcome::pass(1.0, "no degenerate patterns")),
        }
    }
}
