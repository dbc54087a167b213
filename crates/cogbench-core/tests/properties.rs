//! End-to-end properties of the evaluator and metrics engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cogbench_core::constraints::{CheckContext, ConstraintId, ConstraintLibrary};
use cogbench_core::engine::Evaluator;
use cogbench_core::error::OracleError;
use cogbench_core::model::{CognitiveLevel, Mode, Passage, Provenance, QuestionData};
use cogbench_core::oracle::{OracleQuery, OracleScores, SemanticOracle, SharedOracle};
use cogbench_core::passages::PassageStore;
use cogbench_core::registry::Registry;
use cogbench_core::results::Verdict;
use cogbench_core::settings::{EvaluatorSettings, Settings};
use cogbench_core::statistics::{compute_metrics, RateEstimate};
use cogbench_core::text;

struct StubOracle {
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubOracle {
    fn new() -> Self {
        Self {
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SemanticOracle for StubOracle {
    fn model_version(&self) -> &str {
        "stub-nli-1"
    }

    async fn score(&self, _query: &OracleQuery) -> Result<OracleScores, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(OracleScores::from_probabilities(0.2, 0.7, 0.1))
    }
}

fn passage() -> Passage {
    Passage {
        passage_id: "bio-1".into(),
        subject: "biology".into(),
        title: String::new(),
        text: "Mitochondria are organelles that produce energy for the cell. Cellular \
               respiration converts glucose into ATP."
            .into(),
        key_concepts: vec!["mitochondria".into(), "energy".into(), "cell".into()],
        methods_principles: vec!["cellular respiration".into()],
    }
}

fn question(id: &str, level: CognitiveLevel, mode: Mode, q: &str, a: &str) -> QuestionData {
    QuestionData {
        question_id: id.into(),
        passage_id: "bio-1".into(),
        level,
        mode,
        vocab_level: (mode == Mode::Adversarial).then_some(CognitiveLevel::Remember),
        question: q.into(),
        answer: a.into(),
        subject: String::new(),
        provenance: Provenance {
            model: "model-a".into(),
            generated_at: None,
        },
    }
}

fn evaluator(oracle: StubOracle, evaluator: EvaluatorSettings) -> Evaluator {
    let settings = Settings::default();
    Evaluator::new(
        Arc::new(ConstraintLibrary::new(&settings).unwrap()),
        Arc::new(Registry::builtin()),
        Arc::new(SharedOracle::new(Arc::new(oracle), &evaluator)),
        evaluator,
    )
}

fn every_level_and_mode() -> Vec<QuestionData> {
    let mut out = Vec::new();
    for mode in [Mode::Standard, Mode::Adversarial] {
        for level in CognitiveLevel::ALL {
            out.push(question(
                &format!("{mode}-{}", level.number()),
                level,
                mode,
                "Identify how mitochondria turn glucose into energy for the cell?",
                "They run cellular respiration, producing about 36 ATP per glucose.",
            ));
        }
    }
    out
}

#[tokio::test]
async fn result_count_matches_registry() {
    let ev = evaluator(StubOracle::new(), EvaluatorSettings::default());
    let store = PassageStore::new([passage()]).unwrap();
    let run = ev.evaluate(&every_level_and_mode(), &store).await;
    assert_eq!(run.records.len(), 12);
    for record in &run.records {
        let expected = ev.registry().constraints_for(record.level(), record.mode());
        assert_eq!(record.results.len(), ev.registry().count(record.level(), record.mode()));
        assert_eq!(record.constraint_ids(), expected);
    }
}

#[tokio::test]
async fn adversarial_records_have_no_vocabulary_constraints() {
    let ev = evaluator(StubOracle::new(), EvaluatorSettings::default());
    let store = PassageStore::new([passage()]).unwrap();
    let run = ev.evaluate(&every_level_and_mode(), &store).await;
    for record in run.records.iter().filter(|r| r.mode() == Mode::Adversarial) {
        for id in [
            ConstraintId::R1,
            ConstraintId::D1,
            ConstraintId::P1,
            ConstraintId::A1,
            ConstraintId::E1,
            ConstraintId::C1,
        ] {
            assert!(record.result(id).is_none(), "{id} in {}", record.question.question_id);
        }
        assert!(record.result(ConstraintId::AV).is_some());
        assert!(record.result(ConstraintId::AN).is_some());
    }
}

#[tokio::test]
async fn evaluation_is_deterministic_across_parallelism() {
    let store = PassageStore::new([passage()]).unwrap();
    let questions = every_level_and_mode();
    let serial = evaluator(
        StubOracle::new(),
        EvaluatorSettings {
            parallelism: 1,
            ..EvaluatorSettings::default()
        },
    );
    let parallel = evaluator(
        StubOracle::new(),
        EvaluatorSettings {
            parallelism: 8,
            ..EvaluatorSettings::default()
        },
    );
    let a = serde_json::to_string(&serial.evaluate(&questions, &store).await.records).unwrap();
    let b = serde_json::to_string(&parallel.evaluate(&questions, &store).await.records).unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn shared_oracle_is_called_once_per_distinct_pair() {
    let oracle = Arc::new(StubOracle::new());
    let settings = Settings::default();
    let ev = Evaluator::new(
        Arc::new(ConstraintLibrary::new(&settings).unwrap()),
        Arc::new(Registry::builtin()),
        Arc::new(SharedOracle::new(oracle.clone(), &settings.evaluator)),
        settings.evaluator.clone(),
    );
    let store = PassageStore::new([passage()]).unwrap();
    let q = question(
        "q",
        CognitiveLevel::Understand,
        Mode::Standard,
        "Explain why mitochondria matter for cell energy?",
        "They convert glucose into ATP.",
    );
    ev.evaluate(&[q.clone(), q], &store).await;
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cell_never_matches_cellular_and_concepts_are_deduplicated() {
    let found = text::find_concepts("How does cellular respiration work?", &["cell"]).unwrap();
    assert!(found.is_empty());
    let found = text::find_concepts("How do cells divide?", &["cell"]).unwrap();
    assert_eq!(found, vec!["cell"]);

    let store = PassageStore::new([Passage {
        key_concepts: vec!["Cell".into(), "cells".into(), "Processes".into(), "process".into()],
        ..passage()
    }])
    .unwrap();
    let concepts = &store.by_id("bio-1").unwrap().key_concepts;
    assert_eq!(concepts, &vec!["cell".to_string(), "processes".to_string()]);
}

#[test]
fn bootstrap_interval_narrows_with_more_records() {
    let settings = Settings::default().metrics;
    let width = |n: usize| {
        let outcomes: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
        let estimate = RateEstimate::from_outcomes(&outcomes, &settings);
        assert!((0.0..=1.0).contains(&estimate.rate));
        estimate.ci_high - estimate.ci_low
    };
    let (small, medium, large) = (width(10), width(40), width(160));
    assert!(small >= medium, "{small} < {medium}");
    assert!(medium >= large, "{medium} < {large}");
}

#[test]
fn contrastive_markers_reject_generic_connectives() {
    let settings = Settings::default();
    let library = ConstraintLibrary::new(&settings).unwrap();
    let e4 = library.get(ConstraintId::E4).unwrap();
    let p = passage();
    let check = |answer: &str| {
        let q = question("q", CognitiveLevel::Evaluate, Mode::Standard, "Is this a sound claim?", answer);
        e4.check(&CheckContext {
            question: &q,
            passage: &p,
            oracle: None,
        })
        .unwrap()
        .passed
    };
    assert!(!check("It is efficient but costly."));
    assert!(!check("It is efficient while costly."));
    assert!(check("It is efficient; however, it is costly."));
    assert!(check("Although it is efficient, it is costly."));
    assert!(check("It is efficient. Nevertheless, it is costly."));
}

#[test]
fn numeric_specificity_needs_more_than_a_single_digit() {
    let settings = Settings::default();
    let library = ConstraintLibrary::new(&settings).unwrap();
    let p4 = library.get(ConstraintId::P4).unwrap();
    let p = passage();
    let check = |answer: &str| {
        let q = question("q", CognitiveLevel::Apply, Mode::Standard, "Predict the yield?", answer);
        p4.check(&CheckContext {
            question: &q,
            passage: &p,
            oracle: None,
        })
        .unwrap()
        .passed
    };
    assert!(!check("It makes 1 molecule."));
    assert!(check("Yield rises by 23%."));
    assert!(check("The ratio is 3.14."));
    assert!(check("It makes 42 molecules."));
}

#[tokio::test]
async fn single_concept_and_relevance_are_both_recorded() {
    let ev = evaluator(StubOracle::new(), EvaluatorSettings::default());
    let store = PassageStore::new([passage()]).unwrap();
    let q = question("q", CognitiveLevel::Remember, Mode::Standard, "What is mitochondria?", "An organelle.");
    let record = ev.evaluate_one(&q, &store).await.unwrap();
    assert_eq!(record.result(ConstraintId::R2).unwrap().verdict, Verdict::Pass);
    assert_eq!(record.result(ConstraintId::U3).unwrap().verdict, Verdict::Fail);
    assert!(!record.strict_pass);

    let summary = compute_metrics(&[record]);
    assert_eq!(summary.records, 1);
}

#[tokio::test(start_paused = true)]
async fn oracle_timeout_is_indeterminate_and_excluded_from_loose() {
    let oracle = StubOracle {
        delay: Some(Duration::from_secs(60)),
        calls: AtomicUsize::new(0),
    };
    let ev = evaluator(
        oracle,
        EvaluatorSettings {
            oracle_timeout_ms: 100,
            ..EvaluatorSettings::default()
        },
    );
    let store = PassageStore::new([passage()]).unwrap();
    let q = question(
        "q",
        CognitiveLevel::Understand,
        Mode::Standard,
        "Explain what it means that mitochondria supply energy to the cell?",
        "The organelle converts glucose into usable ATP through respiration steps.",
    );
    let record = ev.evaluate_one(&q, &store).await.unwrap();
    let d3 = record.result(ConstraintId::D3).unwrap();
    assert_eq!(d3.verdict, Verdict::Indeterminate);
    assert!(!record.strict_pass);

    let determinate = record.results.len() - 1;
    let loose = record
        .results
        .iter()
        .filter(|r| r.loosely_passes(0.5))
        .count();
    let ratio = record.loose_ratio.unwrap();
    assert!((ratio - loose as f64 / determinate as f64).abs() < 1e-12);
}
