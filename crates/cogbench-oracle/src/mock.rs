//! Mock oracle for testing the evaluator without a classifier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use cogbench_core::error::OracleError;
use cogbench_core::oracle::{OracleQuery, OracleScores, SemanticOracle};

/// Returns scores chosen by hypothesis content.
pub struct MockOracle {
    /// Hypothesis substring to scores. Checked in key order.
    responses: HashMap<String, OracleScores>,
    default_scores: OracleScores,
    failure: Option<OracleError>,
    call_count: AtomicU32,
    last_query: Mutex<Option<OracleQuery>>,
}

impl MockOracle {
    pub fn new(responses: HashMap<String, OracleScores>) -> Self {
        Self {
            responses,
            default_scores: OracleScores::from_probabilities(0.34, 0.33, 0.33),
            failure: None,
            call_count: AtomicU32::new(0),
            last_query: Mutex::new(None),
        }
    }

    /// A mock that returns the same scores for everything.
    pub fn with_fixed_scores(scores: OracleScores) -> Self {
        Self {
            default_scores: scores,
            ..Self::new(HashMap::new())
        }
    }

    /// A mock whose every call fails with `error`.
    pub fn failing(error: OracleError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(HashMap::new())
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_query(&self) -> Option<OracleQuery> {
        self.last_query.lock().clone()
    }
}

#[async_trait]
impl SemanticOracle for MockOracle {
    fn model_version(&self) -> &str {
        "mock-nli"
    }

    async fn score(&self, query: &OracleQuery) -> Result<OracleScores, OracleError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_query.lock() = Some(query.clone());

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let mut keys: Vec<&String> = self.responses.keys().collect();
        keys.sort();
        Ok(keys
            .into_iter()
            .find(|key| query.hypothesis.contains(key.as_str()))
            .and_then(|key| self.responses.get(key).copied())
            .unwrap_or(self.default_scores))
    }
}
