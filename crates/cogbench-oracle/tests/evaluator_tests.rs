//! Evaluator runs over the sample data with a mock oracle backend.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cogbench_core::constraints::{ConstraintId, ConstraintLibrary};
use cogbench_core::engine::{EvaluationRun, Evaluator};
use cogbench_core::error::OracleError;
use cogbench_core::model::CognitiveLevel;
use cogbench_core::oracle::{OracleScores, SharedOracle};
use cogbench_core::parser::{load_generations, load_passages};
use cogbench_core::registry::Registry;
use cogbench_core::results::{EvaluationRecord, Verdict};
use cogbench_core::settings::Settings;
use cogbench_oracle::mock::MockOracle;

const PASSAGES: &str = "../../data/sample/passages";
const STANDARD: &str = "../../data/sample/generations/llama3_standard.json";

async fn run_with(mock: Arc<MockOracle>) -> EvaluationRun {
    let settings = Settings::default();
    let evaluator = Evaluator::new(
        Arc::new(ConstraintLibrary::new(&settings).unwrap()),
        Arc::new(Registry::builtin()),
        Arc::new(SharedOracle::new(mock, &settings.evaluator)),
        settings.evaluator.clone(),
    );
    let passages = load_passages(Path::new(PASSAGES)).unwrap();
    let batch = load_generations(Path::new(STANDARD)).unwrap();
    evaluator.evaluate(&batch.questions, &passages).await
}

fn at_level(run: &EvaluationRun, level: CognitiveLevel) -> &EvaluationRecord {
    run.records.iter().find(|r| r.level() == level).unwrap()
}

#[tokio::test]
async fn scores_are_routed_by_hypothesis() {
    let mut responses = HashMap::new();
    responses.insert(
        "acceleration".to_string(),
        OracleScores::from_probabilities(0.9, 0.05, 0.05),
    );
    let mock = Arc::new(MockOracle::new(responses));
    let run = run_with(mock.clone()).await;

    assert_eq!(run.records.len(), 6);
    assert!(mock.call_count() > 0);
    assert!(run.records.iter().all(|r| r.oracle_version == "mock-nli"));

    // Entailed by the passage, so the scenario is not new.
    let apply = at_level(&run, CognitiveLevel::Apply);
    assert_eq!(apply.result(ConstraintId::P2).unwrap().verdict, Verdict::Fail);
    assert!(!apply.strict_pass);

    let understand = at_level(&run, CognitiveLevel::Understand);
    assert_eq!(understand.result(ConstraintId::D3).unwrap().verdict, Verdict::Pass);
    let create = at_level(&run, CognitiveLevel::Create);
    assert_eq!(create.result(ConstraintId::C2).unwrap().verdict, Verdict::Pass);
}

#[tokio::test]
async fn failing_backend_leaves_semantic_results_indeterminate() {
    let mock = Arc::new(MockOracle::failing(OracleError::Unavailable(
        "connection refused".into(),
    )));
    let run = run_with(mock.clone()).await;

    assert_eq!(run.records.len(), 6);
    for (level, id) in [
        (CognitiveLevel::Understand, ConstraintId::D3),
        (CognitiveLevel::Apply, ConstraintId::P2),
        (CognitiveLevel::Create, ConstraintId::C2),
    ] {
        let record = at_level(&run, level);
        assert_eq!(record.result(id).unwrap().verdict, Verdict::Indeterminate);
        assert!(record.indeterminate_count() >= 1);
    }
    assert!(run.accounting.indeterminate_results >= 3);
    assert!(mock.last_query().is_some());
}
