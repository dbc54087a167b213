//! The constraint library.
//!
//! Every constraint is a stateless predicate over a question, its passage,
//! and (for semantic constraints) the oracle scores for one premise and
//! hypothesis pair. Constraints are built once from [`Settings`] and shared
//! across all concurrent evaluations.

mod adversarial;
mod semantic;
mod structural;
mod universal;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PredicateError;
use crate::model::{Passage, QuestionData};
use crate::oracle::{OracleQuery, OracleScores};
use crate::settings::Settings;

pub use adversarial::{AdversarialVocabulary, NoTargetVocabulary};
pub use semantic::{AnswerSupported, NovelCreation, NewScenario};
pub use structural::{
    AnswerCoverage, AnswerExtractable, AnswerNotCopied, Argumentation, AsksMeaning,
    AsksRelationship, EvidenceRequest, LevelVocabulary, MethodReference, MultipleConcepts,
    PresentsClaim, ShortAnswer, SingleConcept, Specifications, SpecificResult,
    SubstantialAnswer,
};
pub use universal::{IsQuestion, NoDegenerate, PassageRelevance, WordCount};

/// Stable identifier of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintId {
    U1,
    U2,
    U3,
    U4,
    R1,
    R2,
    R3,
    R4,
    D1,
    D2,
    D3,
    D4,
    P1,
    P2,
    P3,
    P4,
    A1,
    A2,
    A3,
    A4,
    E1,
    E2,
    E3,
    E4,
    C1,
    C2,
    C3,
    C4,
    AV,
    AN,
}

/// Constraint family, used for reporting breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Universal,
    Structural,
    Semantic,
    Adversarial,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Universal => "universal",
            Tier::Structural => "structural",
            Tier::Semantic => "semantic",
            Tier::Adversarial => "adversarial",
        };
        f.write_str(s)
    }
}

impl ConstraintId {
    pub const ALL: [ConstraintId; 30] = [
        ConstraintId::U1,
        ConstraintId::U2,
        ConstraintId::U3,
        ConstraintId::U4,
        ConstraintId::R1,
        ConstraintId::R2,
        ConstraintId::R3,
        ConstraintId::R4,
        ConstraintId::D1,
        ConstraintId::D2,
        ConstraintId::D3,
        ConstraintId::D4,
        ConstraintId::P1,
        ConstraintId::P2,
        ConstraintId::P3,
        ConstraintId::P4,
        ConstraintId::A1,
        ConstraintId::A2,
        ConstraintId::A3,
        ConstraintId::A4,
        ConstraintId::E1,
        ConstraintId::E2,
        ConstraintId::E3,
        ConstraintId::E4,
        ConstraintId::C1,
        ConstraintId::C2,
        ConstraintId::C3,
        ConstraintId::C4,
        ConstraintId::AV,
        ConstraintId::AN,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintId::U1 => "U1",
            ConstraintId::U2 => "U2",
            ConstraintId::U3 => "U3",
            ConstraintId::U4 => "U4",
            ConstraintId::R1 => "R1",
            ConstraintId::R2 => "R2",
            ConstraintId::R3 => "R3",
            ConstraintId::R4 => "R4",
            ConstraintId::D1 => "D1",
            ConstraintId::D2 => "D2",
            ConstraintId::D3 => "D3",
            ConstraintId::D4 => "D4",
            ConstraintId::P1 => "P1",
            ConstraintId::P2 => "P2",
            ConstraintId::P3 => "P3",
            ConstraintId::P4 => "P4",
            ConstraintId::A1 => "A1",
            ConstraintId::A2 => "A2",
            ConstraintId::A3 => "A3",
            ConstraintId::A4 => "A4",
            ConstraintId::E1 => "E1",
            ConstraintId::E2 => "E2",
            ConstraintId::E3 => "E3",
            ConstraintId::E4 => "E4",
            ConstraintId::C1 => "C1",
            ConstraintId::C2 => "C2",
            ConstraintId::C3 => "C3",
            ConstraintId::C4 => "C4",
            ConstraintId::AV => "AV",
            ConstraintId::AN => "AN",
        }
    }

    /// Machine-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ConstraintId::U1 => "is_question",
            ConstraintId::U2 => "word_count",
            ConstraintId::U3 => "passage_relevance",
            ConstraintId::U4 => "no_degenerate",
            ConstraintId::R1 => "remember_vocabulary",
            ConstraintId::R2 => "single_concept",
            ConstraintId::R3 => "short_answer",
            ConstraintId::R4 => "answer_extractable",
            ConstraintId::D1 => "understand_vocabulary",
            ConstraintId::D2 => "answer_not_copied",
            ConstraintId::D3 => "answer_supported",
            ConstraintId::D4 => "asks_meaning",
            ConstraintId::P1 => "apply_vocabulary",
            ConstraintId::P2 => "new_scenario",
            ConstraintId::P3 => "method_reference",
            ConstraintId::P4 => "specific_result",
            ConstraintId::A1 => "analyze_vocabulary",
            ConstraintId::A2 => "multiple_concepts",
            ConstraintId::A3 => "asks_relationship",
            ConstraintId::A4 => "answer_coverage",
            ConstraintId::E1 => "evaluate_vocabulary",
            ConstraintId::E2 => "presents_claim",
            ConstraintId::E3 => "evidence_request",
            ConstraintId::E4 => "answer_argumentation",
            ConstraintId::C1 => "create_vocabulary",
            ConstraintId::C2 => "novel_creation",
            ConstraintId::C3 => "specifications",
            ConstraintId::C4 => "substantial_answer",
            ConstraintId::AV => "adversarial_vocabulary",
            ConstraintId::AN => "no_target_vocabulary",
        }
    }

    /// One-line description for registry listings.
    pub fn description(self) -> &'static str {
        match self {
            ConstraintId::U1 => "ends with '?' or has task/interrogative structure",
            ConstraintId::U2 => "question word count within bounds",
            ConstraintId::U3 => "references at least N distinct passage concepts",
            ConstraintId::U4 => "non-empty with no excessive word repetition",
            ConstraintId::R1 => "uses Remember verbs or recall phrasing",
            ConstraintId::R2 => "targets at most one distinct concept",
            ConstraintId::R3 => "answer is short and factual",
            ConstraintId::R4 => "answer content is extractable from the passage",
            ConstraintId::D1 => "uses Understand verbs or comprehension phrasing",
            ConstraintId::D2 => "answer paraphrases rather than copies the passage",
            ConstraintId::D3 => "answer is not contradicted by the passage",
            ConstraintId::D4 => "asks about meaning rather than bare facts",
            ConstraintId::P1 => "uses Apply verbs or scenario phrasing",
            ConstraintId::P2 => "question presents a scenario not in the passage",
            ConstraintId::P3 => "references a passage concept, method, or principle",
            ConstraintId::P4 => "answer contains a specific result",
            ConstraintId::A1 => "uses Analyze verbs or analytical phrasing",
            ConstraintId::A2 => "connects at least two distinct concepts",
            ConstraintId::A3 => "asks about a relationship between ideas",
            ConstraintId::A4 => "answer covers every concept the question names",
            ConstraintId::E1 => "uses Evaluate verbs",
            ConstraintId::E2 => "presents a claim or judgment to evaluate",
            ConstraintId::E3 => "asks for evidence-based reasoning",
            ConstraintId::E4 => "answer argues with a contrastive connective",
            ConstraintId::C1 => "uses Create verbs",
            ConstraintId::C2 => "answer produces something not in the passage",
            ConstraintId::C3 => "specifies requirements for the creation",
            ConstraintId::C4 => "answer is substantial",
            ConstraintId::AV => "uses the instructed mismatched level's vocabulary",
            ConstraintId::AN => "does not smuggle in the target level's vocabulary",
        }
    }

    pub fn tier(self) -> Tier {
        match self {
            ConstraintId::U1 | ConstraintId::U2 | ConstraintId::U3 | ConstraintId::U4 => {
                Tier::Universal
            }
            ConstraintId::D3 | ConstraintId::P2 | ConstraintId::C2 => Tier::Semantic,
            ConstraintId::AV | ConstraintId::AN => Tier::Adversarial,
            _ => Tier::Structural,
        }
    }

    pub fn is_adversarial(self) -> bool {
        self.tier() == Tier::Adversarial
    }

    pub fn is_semantic(self) -> bool {
        self.tier() == Tier::Semantic
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConstraintId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ConstraintId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(needle) || id.name() == needle)
            .ok_or_else(|| format!("unknown constraint: {needle}"))
    }
}

/// Inputs of one predicate call.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub question: &'a QuestionData,
    pub passage: &'a Passage,
    /// Scores for the pair this constraint asked for, if it asked.
    pub oracle: Option<&'a OracleScores>,
}

/// A predicate's verdict before it is stamped with id, name, and tier.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub passed: bool,
    pub score: f64,
    pub reason: String,
    pub evidence: BTreeMap<String, f64>,
    pub matched: Vec<String>,
}

impl Outcome {
    pub fn pass(score: f64, reason: impl Into<String>) -> Self {
        Self::new(true, score, reason)
    }

    pub fn fail(score: f64, reason: impl Into<String>) -> Self {
        Self::new(false, score, reason)
    }

    /// A passing outcome for inputs the constraint does not apply to.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(true, 1.0, format!("skipped: {}", reason.into()))
    }

    fn new(passed: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            passed,
            score,
            reason: reason.into(),
            evidence: BTreeMap::new(),
            matched: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, key: &str, value: f64) -> Self {
        self.evidence.insert(key.to_string(), value);
        self
    }

    pub fn with_matched<I, S>(mut self, matched: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matched.extend(matched.into_iter().map(Into::into));
        self
    }
}

/// A single pass/fail predicate.
pub trait Constraint: Send + Sync {
    fn id(&self) -> ConstraintId;

    /// The oracle pair this constraint needs scored, if any.
    ///
    /// Returning `None` means the constraint decides from text alone.
    fn oracle_query(&self, _question: &QuestionData, _passage: &Passage) -> Option<OracleQuery> {
        None
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError>;
}

/// Every constraint, built from one set of settings.
pub struct ConstraintLibrary {
    constraints: BTreeMap<ConstraintId, Box<dyn Constraint>>,
}

impl fmt::Debug for ConstraintLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintLibrary")
            .field("constraints", &self.constraints.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConstraintLibrary {
    /// Build all constraints. Fails if a marker list is unusable.
    pub fn new(settings: &Settings) -> Result<Self> {
        settings
            .lexicon
            .validate()
            .context("invalid lexicon in settings")?;

        let mut constraints = BTreeMap::new();
        for id in ConstraintId::ALL {
            let constraint = build(id, settings)
                .with_context(|| format!("failed to build constraint {id} ({})", id.name()))?;
            constraints.insert(id, constraint);
        }
        Ok(Self { constraints })
    }

    pub fn get(&self, id: ConstraintId) -> Option<&dyn Constraint> {
        self.constraints.get(&id).map(|c| c.as_ref())
    }

    pub fn ids(&self) -> impl Iterator<Item = ConstraintId> + '_ {
        self.constraints.keys().copied()
    }
}

fn build(id: ConstraintId, settings: &Settings) -> Result<Box<dyn Constraint>> {
    let t = &settings.thresholds;
    let lex = &settings.lexicon;
    use crate::model::CognitiveLevel as L;

    let constraint: Box<dyn Constraint> = match id {
        ConstraintId::U1 => Box::new(IsQuestion::new(lex)?),
        ConstraintId::U2 => Box::new(WordCount::new(t)),
        ConstraintId::U3 => Box::new(PassageRelevance::new(t)),
        ConstraintId::U4 => Box::new(NoDegenerate::new(t, lex)),
        ConstraintId::R1 => Box::new(LevelVocabulary::new(id, L::Remember, lex)?),
        ConstraintId::R2 => Box::new(SingleConcept::new(t)),
        ConstraintId::R3 => Box::new(ShortAnswer::new(t)),
        ConstraintId::R4 => Box::new(AnswerExtractable::new(t, lex)),
        ConstraintId::D1 => Box::new(LevelVocabulary::new(id, L::Understand, lex)?),
        ConstraintId::D2 => Box::new(AnswerNotCopied::new(t)),
        ConstraintId::D3 => Box::new(AnswerSupported::new(t)),
        ConstraintId::D4 => Box::new(AsksMeaning::new(lex)?),
        ConstraintId::P1 => Box::new(LevelVocabulary::new(id, L::Apply, lex)?),
        ConstraintId::P2 => Box::new(NewScenario::new(t)),
        ConstraintId::P3 => Box::new(MethodReference::new(t)),
        ConstraintId::P4 => Box::new(SpecificResult::new(lex)?),
        ConstraintId::A1 => Box::new(LevelVocabulary::new(id, L::Analyze, lex)?),
        ConstraintId::A2 => Box::new(MultipleConcepts::new(t, lex)?),
        ConstraintId::A3 => Box::new(AsksRelationship::new(lex)?),
        ConstraintId::A4 => Box::new(AnswerCoverage),
        ConstraintId::E1 => Box::new(LevelVocabulary::new(id, L::Evaluate, lex)?),
        ConstraintId::E2 => Box::new(PresentsClaim::new(lex)?),
        ConstraintId::E3 => Box::new(EvidenceRequest::new(lex)?),
        ConstraintId::E4 => Box::new(Argumentation::new(lex)?),
        ConstraintId::C1 => Box::new(LevelVocabulary::new(id, L::Create, lex)?),
        ConstraintId::C2 => Box::new(NovelCreation::new(t)),
        ConstraintId::C3 => Box::new(Specifications::new(t, lex)?),
        ConstraintId::C4 => Box::new(SubstantialAnswer::new(t)),
        ConstraintId::AV => Box::new(AdversarialVocabulary::new(lex)?),
        ConstraintId::AN => Box::new(NoTargetVocabulary::new(lex)?),
    };
    Ok(constraint)
}

/// Concepts of the passage referenced in `text`, substring duplicates
/// removed.
pub(crate) fn referenced_concepts(
    text: &str,
    passage: &Passage,
) -> Result<Vec<String>, PredicateError> {
    let found = crate::text::find_concepts(text, &passage.key_concepts)
        .map_err(|e| PredicateError::new(format!("concept pattern: {e}")))?;
    Ok(crate::text::distinct_concepts(&found))
}

/// Question text, or question and answer joined, per scope.
pub(crate) fn scoped_text(
    question: &QuestionData,
    scope: crate::settings::ConceptScope,
) -> String {
    match scope {
        crate::settings::ConceptScope::Question => question.question.clone(),
        crate::settings::ConceptScope::QuestionAndAnswer => {
            format!("{} {}", question.question, question.answer)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::{CognitiveLevel, Mode, Passage, Provenance, QuestionData};

    pub fn passage(concepts: &[&str]) -> Passage {
        Passage {
            passage_id: "bio-1".into(),
            subject: "biology".into(),
            title: "Cellular Respiration".into(),
            text: "Mitochondria are organelles that produce energy for the cell. \
                   Cellular respiration converts glucose into ATP through glycolysis, \
                   the Krebs cycle, and oxidative phosphorylation."
                .into(),
            key_concepts: concepts.iter().map(|c| c.to_string()).collect(),
            methods_principles: vec!["oxidative phosphorylation".into()],
        }
    }

    pub fn question(level: CognitiveLevel, question: &str, answer: &str) -> QuestionData {
        QuestionData {
            question_id: "q-1".into(),
            passage_id: "bio-1".into(),
            level,
            mode: Mode::Standard,
            vocab_level: None,
            question: question.into(),
            answer: answer.into(),
            subject: "biology".into(),
            provenance: Provenance {
                model: "test-model".into(),
                generated_at: None,
            },
        }
    }
}
