//! Named, overridable settings for every threshold and marker list.
//!
//! All structs deserialize with defaults, so a `cogbench.toml` only needs to
//! name the values it changes:
//!
//! ```toml
//! [settings.thresholds]
//! relevance_scope = "question_and_answer"
//!
//! [settings.metrics]
//! bootstrap_resamples = 2000
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::CognitiveLevel;
use crate::registry::RegistryConfig;
use crate::results::LoosePolicy;
use crate::text::MarkerSet;

/// Everything the evaluator and metrics engine can be tuned with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub lexicon: Lexicon,
    pub evaluator: EvaluatorSettings,
    pub metrics: MetricsSettings,
    pub registry: RegistryConfig,
}

/// One value per cognitive level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerLevel<T> {
    pub remember: T,
    pub understand: T,
    pub apply: T,
    pub analyze: T,
    pub evaluate: T,
    pub create: T,
}

impl<T> PerLevel<T> {
    pub fn get(&self, level: CognitiveLevel) -> &T {
        match level {
            CognitiveLevel::Remember => &self.remember,
            CognitiveLevel::Understand => &self.understand,
            CognitiveLevel::Apply => &self.apply,
            CognitiveLevel::Analyze => &self.analyze,
            CognitiveLevel::Evaluate => &self.evaluate,
            CognitiveLevel::Create => &self.create,
        }
    }

    pub fn get_mut(&mut self, level: CognitiveLevel) -> &mut T {
        match level {
            CognitiveLevel::Remember => &mut self.remember,
            CognitiveLevel::Understand => &mut self.understand,
            CognitiveLevel::Apply => &mut self.apply,
            CognitiveLevel::Analyze => &mut self.analyze,
            CognitiveLevel::Evaluate => &mut self.evaluate,
            CognitiveLevel::Create => &mut self.create,
        }
    }

    /// Iterate in taxonomy order.
    pub fn iter(&self) -> impl Iterator<Item = (CognitiveLevel, &T)> {
        CognitiveLevel::ALL.into_iter().map(move |l| (l, self.get(l)))
    }

    pub fn from_fn(mut f: impl FnMut(CognitiveLevel) -> T) -> Self {
        Self {
            remember: f(CognitiveLevel::Remember),
            understand: f(CognitiveLevel::Understand),
            apply: f(CognitiveLevel::Apply),
            analyze: f(CognitiveLevel::Analyze),
            evaluate: f(CognitiveLevel::Evaluate),
            create: f(CognitiveLevel::Create),
        }
    }
}

/// Which text a concept-count constraint looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptScope {
    #[default]
    Question,
    QuestionAndAnswer,
}

/// Numeric cutoffs for the constraint library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    // Universal
    pub question_min_words: usize,
    pub question_min_words_remember: usize,
    pub question_max_words: usize,
    pub relevance_min_concepts: usize,
    pub relevance_scope: ConceptScope,
    pub max_word_repeat: usize,
    pub min_output_chars: usize,

    // Remember
    pub single_concept_max: usize,
    pub single_concept_scope: ConceptScope,
    pub remember_max_answer_words: usize,
    pub remember_min_passage_overlap: f64,

    // Understand
    pub copy_min_answer_words: usize,
    pub copy_max_ngram_overlap: f64,
    pub copy_ngram_size: usize,
    pub contradiction_max: f64,

    // Apply
    pub apply_novelty_min: f64,
    pub method_reference_min_overlap: f64,
    pub method_max_words: usize,
    pub method_min_chars: usize,

    // Analyze
    pub analyze_min_concepts: usize,

    // Create
    pub create_novelty_min: f64,
    pub create_min_spec_markers: usize,
    pub create_min_answer_words: usize,

    /// Premises are cut to this many words before they reach the oracle.
    pub premise_max_words: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            question_min_words: 10,
            question_min_words_remember: 5,
            question_max_words: 150,
            relevance_min_concepts: 2,
            relevance_scope: ConceptScope::Question,
            max_word_repeat: 3,
            min_output_chars: 5,
            single_concept_max: 1,
            single_concept_scope: ConceptScope::Question,
            remember_max_answer_words: 20,
            remember_min_passage_overlap: 0.60,
            copy_min_answer_words: 5,
            copy_max_ngram_overlap: 0.70,
            copy_ngram_size: 3,
            contradiction_max: 0.50,
            apply_novelty_min: 0.55,
            method_reference_min_overlap: 0.20,
            method_max_words: 5,
            method_min_chars: 4,
            analyze_min_concepts: 2,
            create_novelty_min: 0.60,
            create_min_spec_markers: 2,
            create_min_answer_words: 50,
            premise_max_words: 400,
        }
    }
}

/// Evaluator concurrency, oracle access, and loose scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorSettings {
    /// Questions evaluated concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Deadline for one batched oracle call.
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
    /// Concurrent calls allowed into the oracle backend.
    #[serde(default = "default_oracle_max_concurrency")]
    pub oracle_max_concurrency: usize,
    #[serde(default = "default_loose_score_floor")]
    pub loose_score_floor: f64,
    #[serde(default = "default_loose_min_fraction")]
    pub loose_min_fraction: f64,
}

fn default_parallelism() -> usize {
    4
}
fn default_oracle_timeout_ms() -> u64 {
    30_000
}
fn default_oracle_max_concurrency() -> usize {
    1
}
fn default_loose_score_floor() -> f64 {
    0.5
}
fn default_loose_min_fraction() -> f64 {
    1.0
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            oracle_max_concurrency: default_oracle_max_concurrency(),
            loose_score_floor: default_loose_score_floor(),
            loose_min_fraction: default_loose_min_fraction(),
        }
    }
}

impl EvaluatorSettings {
    pub fn loose_policy(&self) -> LoosePolicy {
        LoosePolicy {
            score_floor: self.loose_score_floor,
            min_fraction: self.loose_min_fraction,
        }
    }
}

/// Bootstrap, discrimination, and tension parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub bootstrap_resamples: usize,
    pub bootstrap_seed: u64,
    pub confidence_level: f64,
    /// Constraints passing less often than this are flagged.
    pub discrimination_low: f64,
    /// Constraints passing more often than this are flagged.
    pub discrimination_high: f64,
    pub tension_joint_max: f64,
    pub tension_individual_min: f64,
    /// Groups smaller than this are not checked for tension.
    pub tension_min_records: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            bootstrap_resamples: 1000,
            bootstrap_seed: 42,
            confidence_level: 0.95,
            discrimination_low: 0.10,
            discrimination_high: 0.95,
            tension_joint_max: 0.05,
            tension_individual_min: 0.25,
            tension_min_records: 5,
        }
    }
}

/// Verb and marker lists used by the lexical constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Canonical Bloom's verbs per level.
    pub verbs: PerLevel<Vec<String>>,
    /// Natural phrasings accepted by a level's vocabulary constraint in
    /// addition to its verbs.
    pub phrasings: PerLevel<Vec<String>>,
    pub task_starters: Vec<String>,
    pub response_endings: Vec<String>,
    pub question_words: Vec<String>,
    pub meaning_markers: Vec<String>,
    pub result_markers: Vec<String>,
    pub relationship_markers: Vec<String>,
    pub claim_markers: Vec<String>,
    pub evidence_markers: Vec<String>,
    pub contrastive_markers: Vec<String>,
    pub spec_markers: Vec<String>,
    /// Acronym to expansion, used when counting analyze concepts.
    pub acronyms: BTreeMap<String, String>,
    /// Ignored when looking for degenerate repetition.
    pub repetition_stop_words: Vec<String>,
    /// Ignored when measuring answer extractability.
    pub extractable_stop_words: Vec<String>,
    /// Connectives that make a marker list trivially satisfiable.
    pub generic_markers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        let verbs = PerLevel {
            remember: strings(&[
                "define", "list", "recall", "identify", "name", "state", "what is", "who", "when",
                "where", "which", "label", "recognize", "match", "select", "memorize",
            ]),
            understand: strings(&[
                "explain", "describe", "summarize", "interpret", "paraphrase", "illustrate",
                "discuss", "classify", "compare", "distinguish", "infer", "predict", "restate",
                "translate",
            ]),
            apply: strings(&[
                "calculate", "solve", "apply", "demonstrate", "implement", "use", "compute",
                "determine", "execute", "practice", "operate", "sketch", "modify",
            ]),
            analyze: strings(&[
                "compare", "contrast", "examine", "differentiate", "categorize", "distinguish",
                "relate", "analyze", "organize", "deconstruct", "attribute", "outline",
                "investigate",
            ]),
            evaluate: strings(&[
                "assess", "critique", "judge", "justify", "argue", "defend", "evaluate",
                "recommend", "to what extent", "appraise", "prioritize", "rate", "support",
                "conclude",
            ]),
            create: strings(&[
                "design", "develop", "propose", "construct", "formulate", "synthesize", "create",
                "devise", "plan", "compose", "invent", "produce", "generate", "elaborate",
            ]),
        };

        let phrasings = PerLevel {
            remember: strings(&[
                "what are", "what was", "what were", "what does", "what do", "what did",
                "what type", "what kind", "what part", "what process", "what term",
                "what percentage", "what year", "how many", "how much", "how long", "when did",
                "when was", "where is", "where does", "who discovered", "which of",
            ]),
            understand: strings(&[
                "why is", "why are", "why does", "why do", "why did", "how does", "how do",
                "how is", "how are", "what is the purpose", "what is the role",
                "what is the significance", "what is the meaning", "what happens when",
                "what happens if", "what is the effect", "in what way", "in your own words",
                "what does it mean",
            ]),
            apply: strings(&[
                "suppose", "assuming", "imagine", "given that", "consider a", "if a", "if an",
                "if you", "how would you", "how could you", "what would happen if",
                "what steps", "what method", "a researcher", "a student", "an engineer",
                "find the", "estimate the", "what is the value",
            ]),
            analyze: strings(&[
                "what is the relationship", "what is the connection", "what is the difference",
                "what are the differences", "what role does", "differ from", "different from",
                "similar to", "compared to", "what factors", "what contributes",
                "the relationship between", "the difference between",
            ]),
            evaluate: Vec::new(),
            create: Vec::new(),
        };

        Self {
            verbs,
            phrasings,
            task_starters: strings(&[
                "evaluate", "assess", "critique", "judge", "argue", "defend", "design", "develop",
                "propose", "construct", "formulate", "create", "devise", "plan", "compose",
                "synthesize",
            ]),
            response_endings: strings(&[
                "your argument", "your position", "your response", "your reasoning",
                "your answer", "your analysis", "your view", "your opinion", "your stance",
                "the passage", "from the passage", "based on the passage", "with evidence",
                "with examples",
            ]),
            question_words: strings(&[
                "how", "why", "what", "which", "when", "where", "who", "can", "could", "would",
                "should", "does", "do", "is",
            ]),
            meaning_markers: strings(&[
                "how", "why", "explain", "describe", "what does", "what do", "in your own words",
                "in what way", "meaning of",
            ]),
            result_markers: strings(&[
                "step", "result", "outcome", "solution", "therefore", "thus", "hence",
                "consequently", "equals", "yields", "as a result", "this means",
                "the answer is", "the value is",
            ]),
            relationship_markers: strings(&[
                "between", "differ", "different", "difference", "relate", "relationship",
                "compare", "versus", "whereas", "affect", "influence", "impact", "connection",
                "similar", "similarity", "in contrast", "as opposed to", "on the other hand",
            ]),
            claim_markers: strings(&[
                "do you agree", "to what extent", "is it justified", "is it true",
                "is it valid", "would you recommend", "is it appropriate",
                "argue for or against", "defend or refute", "is it reasonable", "critique",
                "evaluate the claim", "assess whether", "some argue", "the claim",
                "one could argue", "claims that", "the argument", "should", "is it accurate",
                "is it fair", "justify your", "strengths and weaknesses",
                "advantages and disadvantages", "pros and cons", "how effective",
                "how significant", "how valid", "what are the limitations",
                "what are the implications", "evaluate whether", "critically assess",
                "critically evaluate", "weigh the", "merit of", "your position",
                "your stance", "your opinion", "take a position",
            ]),
            evidence_markers: strings(&[
                "based on", "evidence", "criteria", "justify", "support", "why or why not",
                "provide reasons", "give evidence", "what evidence", "using examples",
                "with reference to",
            ]),
            contrastive_markers: strings(&[
                "however", "although", "even though", "on the other hand", "nevertheless",
                "nonetheless", "conversely", "in contrast", "by contrast", "despite",
                "in spite of", "whereas", "notwithstanding", "on the contrary", "on one hand",
            ]),
            spec_markers: strings(&[
                "must", "should", "include", "at least", "using", "ensure", "incorporate",
                "consider", "address", "consisting of", "requirement", "criteria",
            ]),
            acronyms: [
                ("rer", "rough endoplasmic reticulum"),
                ("ser", "smooth endoplasmic reticulum"),
                ("er", "endoplasmic reticulum"),
                ("dna", "deoxyribonucleic acid"),
                ("rna", "ribonucleic acid"),
                ("mrna", "messenger rna"),
                ("trna", "transfer rna"),
                ("atp", "adenosine triphosphate"),
                ("adp", "adenosine diphosphate"),
                ("nadh", "nicotinamide adenine dinucleotide"),
                ("gdp", "gross domestic product"),
                ("cns", "central nervous system"),
                ("pns", "peripheral nervous system"),
            ]
            .into_iter()
            .map(|(a, e)| (a.to_string(), e.to_string()))
            .collect(),
            repetition_stop_words: strings(&[
                "the", "a", "an", "is", "are", "was", "were", "of", "in", "to", "and", "or",
                "for", "on", "at", "by", "with", "that", "this", "it", "from", "as", "be", "has",
                "have", "had", "not", "but", "what", "how", "do", "does", "did", "can", "if",
                "which", "their", "its", "they", "you", "your",
            ]),
            extractable_stop_words: strings(&[
                "the", "a", "an", "is", "are", "was", "were", "of", "in", "to", "and", "or",
                "for", "on", "at", "by", "with", "it",
            ]),
            generic_markers: strings(&["but", "while", "and", "or", "so", "yet", "also"]),
        }
    }
}

/// A marker list that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexiconError {
    #[error("marker list '{list}' contains the generic connective '{marker}'")]
    GenericMarker { list: &'static str, marker: String },

    #[error("marker list '{list}' is empty")]
    EmptyList { list: &'static str },

    #[error("marker list '{list}' has an invalid entry: {message}")]
    InvalidPattern { list: &'static str, message: String },
}

impl Lexicon {
    /// Discourse-marker lists, by name, that must stay free of generic
    /// connectives.
    pub fn discourse_lists(&self) -> [(&'static str, &[String]); 5] {
        [
            ("contrastive_markers", self.contrastive_markers.as_slice()),
            ("relationship_markers", self.relationship_markers.as_slice()),
            ("claim_markers", self.claim_markers.as_slice()),
            ("evidence_markers", self.evidence_markers.as_slice()),
            ("spec_markers", self.spec_markers.as_slice()),
        ]
    }

    /// Reject marker lists that are empty, and discourse lists that contain
    /// a generic connective.
    pub fn validate(&self) -> Result<(), LexiconError> {
        for (list, markers) in [
            ("meaning_markers", self.meaning_markers.as_slice()),
            ("result_markers", self.result_markers.as_slice()),
        ] {
            if markers.iter().all(|m| m.trim().is_empty()) {
                return Err(LexiconError::EmptyList { list });
            }
        }
        for (list, markers) in self.discourse_lists() {
            if markers.iter().all(|m| m.trim().is_empty()) {
                return Err(LexiconError::EmptyList { list });
            }
            for marker in markers {
                let normalized = crate::text::normalize_phrase(marker);
                if self
                    .generic_markers
                    .iter()
                    .any(|g| crate::text::normalize_phrase(g) == normalized)
                {
                    return Err(LexiconError::GenericMarker {
                        list,
                        marker: normalized,
                    });
                }
            }
        }
        Ok(())
    }

    /// Compile one list, naming it in the error.
    pub fn compile(list: &'static str, markers: &[String]) -> Result<MarkerSet, LexiconError> {
        MarkerSet::new(markers).map_err(|e| LexiconError::InvalidPattern {
            list,
            message: e.to_string(),
        })
    }

    /// Verbs for one level.
    pub fn verbs_for(&self, level: CognitiveLevel) -> &[String] {
        self.verbs.get(level)
    }
}
