//! Core data model types for cogbench.
//!
//! Passages are supplied by the upstream passage-preparation step and
//! questions by the generation/extraction step. Both are immutable once
//! loaded; the evaluator only ever reads them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::text;

/// Bloom's-taxonomy cognitive level a question targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl CognitiveLevel {
    /// All levels in taxonomy order.
    pub const ALL: [CognitiveLevel; 6] = [
        CognitiveLevel::Remember,
        CognitiveLevel::Understand,
        CognitiveLevel::Apply,
        CognitiveLevel::Analyze,
        CognitiveLevel::Evaluate,
        CognitiveLevel::Create,
    ];

    /// 1-based position in the taxonomy.
    pub fn number(self) -> u8 {
        match self {
            CognitiveLevel::Remember => 1,
            CognitiveLevel::Understand => 2,
            CognitiveLevel::Apply => 3,
            CognitiveLevel::Analyze => 4,
            CognitiveLevel::Evaluate => 5,
            CognitiveLevel::Create => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CognitiveLevel::Remember => "Remember",
            CognitiveLevel::Understand => "Understand",
            CognitiveLevel::Apply => "Apply",
            CognitiveLevel::Analyze => "Analyze",
            CognitiveLevel::Evaluate => "Evaluate",
            CognitiveLevel::Create => "Create",
        }
    }
}

impl fmt::Display for CognitiveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} {}", self.number(), self.name())
    }
}

impl FromStr for CognitiveLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.trim_start_matches(['L', 'l']).parse::<u8>() {
            return Self::from_number(n).ok_or_else(|| format!("level out of range: {n}"));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown cognitive level: {trimmed}"))
    }
}

/// Generation mode of a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The generator was free to use level-appropriate vocabulary.
    #[default]
    Standard,
    /// The generator was told to phrase the question with another level's
    /// vocabulary.
    Adversarial,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Standard => write!(f, "standard"),
            Mode::Adversarial => write!(f, "adversarial"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Mode::Standard),
            "adversarial" => Ok(Mode::Adversarial),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// A source passage with its precomputed vocabularies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Unique identifier referenced by questions.
    pub passage_id: String,
    /// Subject area (e.g. "biology").
    #[serde(default)]
    pub subject: String,
    /// Section title, when the source had one.
    #[serde(default)]
    pub title: String,
    /// Full passage text.
    pub text: String,
    /// Deduplicated, normalized key concepts.
    #[serde(default)]
    pub key_concepts: Vec<String>,
    /// Named techniques, laws, and principles referenced in the text.
    #[serde(default)]
    pub methods_principles: Vec<String>,
}

impl Passage {
    /// Normalize the concept and method vocabularies.
    ///
    /// Concepts are lowercased, stop-words dropped, and singular/plural
    /// variants of the same lemma merged (first occurrence wins).
    pub fn normalized(mut self) -> Self {
        self.key_concepts = text::dedup_concepts(&self.key_concepts);
        let mut seen = std::collections::HashSet::new();
        self.methods_principles = self
            .methods_principles
            .iter()
            .map(|m| text::normalize_phrase(m))
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        self
    }
}

/// Who produced a question, and when.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Generating model identifier.
    pub model: String,
    /// Generation timestamp, when the generator recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

/// One generated question/answer pair to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionData {
    /// Stable identifier, used for checkpoint resume.
    pub question_id: String,
    /// Passage the question was generated from.
    pub passage_id: String,
    /// Target cognitive level.
    pub level: CognitiveLevel,
    /// Generation mode.
    #[serde(default)]
    pub mode: Mode,
    /// In adversarial mode, the level whose vocabulary the generator was
    /// instructed to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_level: Option<CognitiveLevel>,
    /// Generated question text.
    pub question: String,
    /// Generated reference answer.
    #[serde(default)]
    pub answer: String,
    /// Subject of the source passage, copied for reporting.
    #[serde(default)]
    pub subject: String,
    pub provenance: Provenance,
}

impl QuestionData {
    /// Check the fields the evaluator relies on.
    pub fn validate(&self) -> Result<(), EvalError> {
        let malformed = |reason: &str| EvalError::MalformedInput {
            question_id: self.question_id.clone(),
            reason: reason.to_string(),
        };
        if self.question_id.trim().is_empty() {
            return Err(malformed("missing question_id"));
        }
        if self.passage_id.trim().is_empty() {
            return Err(malformed("missing passage_id"));
        }
        if self.question.trim().is_empty() {
            return Err(malformed("empty question text"));
        }
        if self.mode == Mode::Adversarial && self.vocab_level.is_none() {
            return Err(malformed("adversarial question without vocab_level"));
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.provenance.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_numbering_and_parse() {
        assert_eq!(CognitiveLevel::Remember.number(), 1);
        assert_eq!(CognitiveLevel::from_number(6), Some(CognitiveLevel::Create));
        assert_eq!(CognitiveLevel::from_number(0), None);
        assert_eq!(CognitiveLevel::from_number(7), None);
        assert_eq!("3".parse::<CognitiveLevel>().unwrap(), CognitiveLevel::Apply);
        assert_eq!("L4".parse::<CognitiveLevel>().unwrap(), CognitiveLevel::Analyze);
        assert_eq!(
            "evaluate".parse::<CognitiveLevel>().unwrap(),
            CognitiveLevel::Evaluate
        );
        assert!("synthesize".parse::<CognitiveLevel>().is_err());
    }

    #[test]
    fn mode_display_and_parse() {
        assert_eq!(Mode::Adversarial.to_string(), "adversarial");
        assert_eq!("Standard".parse::<Mode>().unwrap(), Mode::Standard);
        assert!("hybrid".parse::<Mode>().is_err());
    }

    #[test]
    fn passage_normalization_merges_plurals() {
        let passage = Passage {
            passage_id: "bio-1".into(),
            subject: "biology".into(),
            title: String::new(),
            text: "Cells divide.".into(),
            key_concepts: vec!["Cell".into(), "cells".into(), "the".into(), "Mitosis".into()],
            methods_principles: vec!["Mendel's law".into(), "mendel's law".into()],
        }
        .normalized();
        assert_eq!(passage.key_concepts, vec!["cell", "mitosis"]);
        assert_eq!(passage.methods_principles, vec!["mendel's law"]);
    }

    #[test]
    fn validate_rejects_adversarial_without_vocab_level() {
        let q = QuestionData {
            question_id: "q1".into(),
            passage_id: "p1".into(),
            level: CognitiveLevel::Analyze,
            mode: Mode::Adversarial,
            vocab_level: None,
            question: "What is a cell?".into(),
            answer: String::new(),
            subject: String::new(),
            provenance: Provenance::default(),
        };
        let err = q.validate().unwrap_err();
        assert!(matches!(err, EvalError::MalformedInput { .. }));
    }
}
