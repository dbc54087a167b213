//! Level-specific lexical constraints.
//!
//! These decide from text alone: verb and marker lists, concept counts,
//! word counts, and overlap with the passage.

use regex::Regex;

use super::{referenced_concepts, scoped_text, CheckContext, Constraint, ConstraintId, Outcome};
use crate::error::PredicateError;
use crate::model::CognitiveLevel;
use crate::settings::{ConceptScope, Lexicon, LexiconError, Thresholds};
use crate::text::{self, MarkerSet};

/// Shared shape of constraints that pass when a marker list matches.
struct MarkerCheck {
    markers: MarkerSet,
    what: &'static str,
}

impl MarkerCheck {
    fn new(list: &'static str, markers: &[String], what: &'static str) -> Result<Self, LexiconError> {
        Ok(Self {
            markers: Lexicon::compile(list, markers)?,
            what,
        })
    }

    fn check(&self, haystack: &str) -> Outcome {
        match self.markers.first_match(haystack) {
            Some(marker) => {
                Outcome::pass(1.0, format!("contains {} '{marker}'", self.what)).with_matched([marker])
            }
            None => Outcome::fail(0.0, format!("no {} found", self.what)),
        }
    }
}

/// R1, D1, P1, A1, E1, C1: the question uses its level's vocabulary.
pub struct LevelVocabulary {
    id: ConstraintId,
    level: CognitiveLevel,
    verbs: MarkerSet,
    phrasings: MarkerSet,
}

impl LevelVocabulary {
    pub fn new(id: ConstraintId, level: CognitiveLevel, lexicon: &Lexicon) -> Result<Self, LexiconError> {
        Ok(Self {
            id,
            level,
            verbs: Lexicon::compile("verbs", lexicon.verbs.get(level))?,
            phrasings: Lexicon::compile("phrasings", lexicon.phrasings.get(level))?,
        })
    }
}

impl Constraint for LevelVocabulary {
    fn id(&self) -> ConstraintId {
        self.id
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let q = &ctx.question.question;
        if let Some(verb) = self.verbs.first_match(q) {
            return Ok(Outcome::pass(1.0, format!("{} verb '{verb}'", self.level.name()))
                .with_matched([verb]));
        }
        if let Some(phrase) = self.phrasings.first_match(q) {
            return Ok(Outcome::pass(0.9, format!("{} phrasing '{phrase}'", self.level.name()))
                .with_matched([phrase]));
        }
        Ok(Outcome::fail(
            0.0,
            format!("no {} verbs or phrasing found", self.level.name()),
        ))
    }
}

/// R2: a recall question targets a single concept.
pub struct SingleConcept {
    max_concepts: usize,
    scope: ConceptScope,
}

impl SingleConcept {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            max_concepts: t.single_concept_max,
            scope: t.single_concept_scope,
        }
    }
}

impl Constraint for SingleConcept {
    fn id(&self) -> ConstraintId {
        ConstraintId::R2
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        if ctx.passage.key_concepts.is_empty() {
            return Ok(Outcome::skipped("passage has no key concepts"));
        }
        let found = referenced_concepts(&scoped_text(ctx.question, self.scope), ctx.passage)?;
        let n = found.len();
        let outcome = if n <= self.max_concepts {
            Outcome::pass(1.0, format!("{n} concept(s) (max {})", self.max_concepts))
        } else {
            Outcome::fail(
                self.max_concepts as f64 / n as f64,
                format!("{n} concepts (max {})", self.max_concepts),
            )
        };
        Ok(outcome.with_evidence("concepts", n as f64).with_matched(found))
    }
}

/// R3: the answer is short.
pub struct ShortAnswer {
    max_words: usize,
}

impl ShortAnswer {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            max_words: t.remember_max_answer_words,
        }
    }
}

impl Constraint for ShortAnswer {
    fn id(&self) -> ConstraintId {
        ConstraintId::R3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let n = text::word_count(&ctx.question.answer);
        let outcome = if n <= self.max_words {
            Outcome::pass(1.0, format!("answer is {n} words (max {})", self.max_words))
        } else {
            Outcome::fail(
                self.max_words as f64 / n as f64,
                format!("answer is {n} words (max {})", self.max_words),
            )
        };
        Ok(outcome.with_evidence("answer_words", n as f64))
    }
}

/// R4: the answer can be found in the passage.
pub struct AnswerExtractable {
    min_overlap: f64,
    stop_words: Vec<String>,
}

impl AnswerExtractable {
    pub fn new(t: &Thresholds, lexicon: &Lexicon) -> Self {
        Self {
            min_overlap: t.remember_min_passage_overlap,
            stop_words: lexicon.extractable_stop_words.clone(),
        }
    }
}

impl Constraint for AnswerExtractable {
    fn id(&self) -> ConstraintId {
        ConstraintId::R4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let content: Vec<String> = text::words(&ctx.question.answer)
            .into_iter()
            .filter(|w| !self.stop_words.contains(w))
            .collect();
        if content.is_empty() {
            return Ok(Outcome::skipped("answer has no content words"));
        }
        let overlap = text::stem_overlap(&content, &text::words(&ctx.passage.text));
        let pct = overlap * 100.0;
        let outcome = if overlap >= self.min_overlap {
            Outcome::pass(overlap, format!("{pct:.0}% of answer stems found in passage"))
        } else {
            Outcome::fail(
                overlap,
                format!(
                    "only {pct:.0}% of answer stems found in passage (need {:.0}%)",
                    self.min_overlap * 100.0
                ),
            )
        };
        Ok(outcome.with_evidence("overlap", overlap))
    }
}

/// D2: the answer paraphrases instead of copying.
pub struct AnswerNotCopied {
    min_words: usize,
    max_overlap: f64,
    ngram: usize,
}

impl AnswerNotCopied {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            min_words: t.copy_min_answer_words,
            max_overlap: t.copy_max_ngram_overlap,
            ngram: t.copy_ngram_size,
        }
    }
}

impl Constraint for AnswerNotCopied {
    fn id(&self) -> ConstraintId {
        ConstraintId::D2
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let answer = text::words(&ctx.question.answer);
        if answer.len() < self.min_words {
            return Ok(Outcome::skipped(format!(
                "answer shorter than {} words",
                self.min_words
            )));
        }
        let overlap = text::ngram_overlap(&answer, &text::words(&ctx.passage.text), self.ngram);
        let pct = overlap * 100.0;
        let outcome = if overlap < self.max_overlap {
            Outcome::pass(1.0 - overlap, format!("{pct:.0}% {}-gram overlap", self.ngram))
        } else {
            Outcome::fail(
                1.0 - overlap,
                format!(
                    "{pct:.0}% {}-gram overlap with passage (max {:.0}%)",
                    self.ngram,
                    self.max_overlap * 100.0
                ),
            )
        };
        Ok(outcome.with_evidence("ngram_overlap", overlap))
    }
}

/// D4: the question asks about meaning.
pub struct AsksMeaning(MarkerCheck);

impl AsksMeaning {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        MarkerCheck::new("meaning_markers", &lexicon.meaning_markers, "meaning marker").map(Self)
    }
}

impl Constraint for AsksMeaning {
    fn id(&self) -> ConstraintId {
        ConstraintId::D4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        Ok(self.0.check(&ctx.question.question))
    }
}

/// P3: the scenario is grounded in passage content.
pub struct MethodReference {
    min_overlap: f64,
    max_method_words: usize,
    min_method_chars: usize,
}

impl MethodReference {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            min_overlap: t.method_reference_min_overlap,
            max_method_words: t.method_max_words,
            min_method_chars: t.method_min_chars,
        }
    }
}

impl Constraint for MethodReference {
    fn id(&self) -> ConstraintId {
        ConstraintId::P3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let combined = scoped_text(ctx.question, ConceptScope::QuestionAndAnswer);
        let passage = ctx.passage;

        let concepts = referenced_concepts(&combined, passage)?;
        if !concepts.is_empty() {
            return Ok(Outcome::pass(1.0, "references passage concepts")
                .with_evidence("concepts", concepts.len() as f64)
                .with_matched(concepts));
        }

        let methods: Vec<&String> = passage
            .methods_principles
            .iter()
            .filter(|m| {
                m.split_whitespace().count() <= self.max_method_words
                    && m.chars().count() >= self.min_method_chars
            })
            .collect();
        let found = text::find_concepts(&combined, &methods)
            .map_err(|e| PredicateError::new(format!("method pattern: {e}")))?;
        if let Some(method) = found.first() {
            return Ok(Outcome::pass(1.0, format!("references method '{method}'"))
                .with_matched(found.iter().take(1).cloned()));
        }

        let passage_words = text::words(&passage.text);
        if !passage_words.is_empty() {
            let overlap = text::stem_overlap(&text::alpha_tokens(&combined), &passage_words);
            if overlap >= self.min_overlap {
                return Ok(Outcome::pass(
                    0.8,
                    format!("shares {:.0}% vocabulary with passage", overlap * 100.0),
                )
                .with_evidence("overlap", overlap));
            }
        }

        if passage.key_concepts.is_empty() && passage.methods_principles.is_empty() {
            return Ok(Outcome::skipped("passage has no concepts or methods"));
        }
        Ok(Outcome::fail(0.0, "no passage concept, method, or shared vocabulary"))
    }
}

/// P4: the answer commits to a specific result.
pub struct SpecificResult {
    markers: MarkerSet,
}

impl SpecificResult {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        Ok(Self {
            markers: Lexicon::compile("result_markers", &lexicon.result_markers)?,
        })
    }
}

impl Constraint for SpecificResult {
    fn id(&self) -> ConstraintId {
        ConstraintId::P4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let answer = &ctx.question.answer;
        let numbers = text::numeric_specificity(answer);
        if !numbers.is_empty() {
            return Ok(Outcome::pass(1.0, format!("specific value '{}'", numbers[0]))
                .with_evidence("numbers", numbers.len() as f64)
                .with_matched(numbers));
        }
        if let Some(marker) = self.markers.first_match(answer) {
            return Ok(Outcome::pass(0.9, format!("result marker '{marker}'")).with_matched([marker]));
        }
        Ok(Outcome::fail(0.0, "answer has no specific number or stated result"))
    }
}

/// A2: question and answer connect several concepts.
pub struct MultipleConcepts {
    min_concepts: usize,
    acronyms: Vec<(Regex, String, String)>,
}

impl MultipleConcepts {
    pub fn new(t: &Thresholds, lexicon: &Lexicon) -> Result<Self, LexiconError> {
        let mut acronyms = Vec::with_capacity(lexicon.acronyms.len());
        for (acronym, expansion) in &lexicon.acronyms {
            let acronym = text::normalize_phrase(acronym);
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(&acronym))).map_err(|e| {
                LexiconError::InvalidPattern {
                    list: "acronyms",
                    message: e.to_string(),
                }
            })?;
            acronyms.push((re, acronym, text::normalize_phrase(expansion)));
        }
        Ok(Self {
            min_concepts: t.analyze_min_concepts,
            acronyms,
        })
    }

    fn acronym_matches(&self, haystack: &str, concept: &str) -> bool {
        self.acronyms.iter().any(|(re, acronym, expansion)| {
            re.is_match(haystack)
                && (concept.split_whitespace().any(|w| w == acronym)
                    || concept == expansion
                    || concept.contains(expansion.as_str()))
        })
    }
}

impl Constraint for MultipleConcepts {
    fn id(&self) -> ConstraintId {
        ConstraintId::A2
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let passage = ctx.passage;
        if passage.key_concepts.is_empty() {
            return Ok(Outcome::skipped("passage has no key concepts"));
        }
        let combined = scoped_text(ctx.question, ConceptScope::QuestionAndAnswer).to_lowercase();
        let mut found = text::find_concepts(&combined, &passage.key_concepts)
            .map_err(|e| PredicateError::new(format!("concept pattern: {e}")))?;
        for concept in &passage.key_concepts {
            let concept = text::normalize_phrase(concept);
            if !found.contains(&concept) && self.acronym_matches(&combined, &concept) {
                found.push(concept);
            }
        }
        let found = text::distinct_concepts(&found);

        let n = found.len();
        let min = self.min_concepts.max(1);
        let score = (n as f64 / min as f64).min(1.0);
        let outcome = if n >= min {
            Outcome::pass(score, format!("{n} distinct concepts (min {min})"))
        } else {
            Outcome::fail(score, format!("only {n} distinct concept(s) (need {min})"))
        };
        Ok(outcome.with_evidence("concepts", n as f64).with_matched(found))
    }
}

/// A3: the question asks about a relationship.
pub struct AsksRelationship(MarkerCheck);

impl AsksRelationship {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        MarkerCheck::new(
            "relationship_markers",
            &lexicon.relationship_markers,
            "relationship marker",
        )
        .map(Self)
    }
}

impl Constraint for AsksRelationship {
    fn id(&self) -> ConstraintId {
        ConstraintId::A3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        Ok(self.0.check(&ctx.question.question))
    }
}

/// A4: the answer addresses every concept the question names.
pub struct AnswerCoverage;

impl Constraint for AnswerCoverage {
    fn id(&self) -> ConstraintId {
        ConstraintId::A4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        if ctx.passage.key_concepts.is_empty() {
            return Ok(Outcome::skipped("passage has no key concepts"));
        }
        let asked = referenced_concepts(&ctx.question.question, ctx.passage)?;
        if asked.is_empty() {
            return Ok(Outcome::skipped("question names no passage concepts"));
        }
        let covered = text::find_concepts(&ctx.question.answer, &asked)
            .map_err(|e| PredicateError::new(format!("concept pattern: {e}")))?;
        let missing: Vec<&String> = asked.iter().filter(|c| !covered.contains(c)).collect();
        let coverage = covered.len() as f64 / asked.len() as f64;

        let outcome = if missing.is_empty() {
            Outcome::pass(coverage, format!("answer covers all {} concepts", asked.len()))
        } else {
            let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            Outcome::fail(coverage, format!("answer misses {}", names.join(", ")))
        };
        Ok(outcome
            .with_evidence("covered", covered.len() as f64)
            .with_evidence("asked", asked.len() as f64)
            .with_matched(covered))
    }
}

/// E2: the question presents a claim to judge.
pub struct PresentsClaim(MarkerCheck);

impl PresentsClaim {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        MarkerCheck::new("claim_markers", &lexicon.claim_markers, "claim marker").map(Self)
    }
}

impl Constraint for PresentsClaim {
    fn id(&self) -> ConstraintId {
        ConstraintId::E2
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        Ok(self.0.check(&ctx.question.question))
    }
}

/// E3: the question asks for evidence.
pub struct EvidenceRequest(MarkerCheck);

impl EvidenceRequest {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        MarkerCheck::new("evidence_markers", &lexicon.evidence_markers, "evidence request").map(Self)
    }
}

impl Constraint for EvidenceRequest {
    fn id(&self) -> ConstraintId {
        ConstraintId::E3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        Ok(self.0.check(&ctx.question.question))
    }
}

/// E4: the answer argues with a contrastive connective.
pub struct Argumentation(MarkerCheck);

impl Argumentation {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        MarkerCheck::new(
            "contrastive_markers",
            &lexicon.contrastive_markers,
            "contrastive connective",
        )
        .map(Self)
    }
}

impl Constraint for Argumentation {
    fn id(&self) -> ConstraintId {
        ConstraintId::E4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        Ok(self.0.check(&ctx.question.answer))
    }
}

/// C3: the question specifies what to produce.
pub struct Specifications {
    markers: MarkerSet,
    min_markers: usize,
}

impl Specifications {
    pub fn new(t: &Thresholds, lexicon: &Lexicon) -> Result<Self, LexiconError> {
        Ok(Self {
            markers: Lexicon::compile("spec_markers", &lexicon.spec_markers)?,
            min_markers: t.create_min_spec_markers,
        })
    }
}

impl Constraint for Specifications {
    fn id(&self) -> ConstraintId {
        ConstraintId::C3
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let found = self.markers.all_matches(&ctx.question.question);
        let n = found.len();
        let min = self.min_markers.max(1);
        let score = (n as f64 / min as f64).min(1.0);
        let outcome = if n >= min {
            Outcome::pass(score, format!("{n} specification markers (min {min})"))
        } else {
            Outcome::fail(score, format!("only {n} specification marker(s) (need {min})"))
        };
        Ok(outcome.with_evidence("markers", n as f64).with_matched(found))
    }
}

/// C4: the answer is substantial.
pub struct SubstantialAnswer {
    min_words: usize,
}

impl SubstantialAnswer {
    pub fn new(t: &Thresholds) -> Self {
        Self {
            min_words: t.create_min_answer_words,
        }
    }
}

impl Constraint for SubstantialAnswer {
    fn id(&self) -> ConstraintId {
        ConstraintId::C4
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<Outcome, PredicateError> {
        let n = text::word_count(&ctx.question.answer);
        let score = (n as f64 / self.min_words.max(1) as f64).min(1.0);
        let outcome = if n > self.min_words {
            Outcome::pass(score, format!("answer is {n} words"))
        } else {
            Outcome::fail(
                score,
                format!("answer is only {n} words (need more than {})", self.min_words),
            )
        };
        Ok(outcome.with_evidence("answer_words", n as f64))
    }
}
