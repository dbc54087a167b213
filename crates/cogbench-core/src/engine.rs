//! Evaluation orchestrator.
//!
//! Selects the registry's constraint list for each question, fetches the
//! oracle scores its semantic constraints need in one batched call, runs
//! every predicate, and assembles records in input order.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::checkpoint::Checkpoint;
use crate::constraints::{CheckContext, ConstraintId, ConstraintLibrary};
use crate::error::{EvalError, OracleError};
use crate::model::QuestionData;
use crate::oracle::{OracleQuery, OracleScores, SharedOracle};
use crate::passages::PassageStore;
use crate::registry::Registry;
use crate::results::{ConstraintResult, EvaluationRecord};
use crate::settings::EvaluatorSettings;

/// Why a question produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MalformedInput,
    PassageNotFound,
}

/// A question that was not evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedQuestion {
    /// Position in the input.
    pub index: usize,
    pub question_id: String,
    pub reason: SkipReason,
    pub message: String,
}

impl SkippedQuestion {
    pub fn new(index: usize, reason: SkipReason, error: &EvalError) -> Self {
        let question_id = match error {
            EvalError::MalformedInput { question_id, .. }
            | EvalError::PassageNotFound { question_id, .. } => question_id.clone(),
            _ => String::new(),
        };
        Self {
            index,
            question_id,
            reason,
            message: error.to_string(),
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAccounting {
    /// Questions submitted, including malformed entries from the loader.
    pub total: usize,
    /// Records computed in this run.
    pub evaluated: usize,
    /// Records reused from a checkpoint.
    pub resumed: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Constraint results left indeterminate by the oracle.
    pub indeterminate_results: usize,
    pub predicate_errors: usize,
}

impl RunAccounting {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Output of [`Evaluator::evaluate`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationRun {
    /// Records in input order.
    pub records: Vec<EvaluationRecord>,
    pub skipped: Vec<SkippedQuestion>,
    pub accounting: RunAccounting,
}

impl EvaluationRun {
    /// Fold in entries the loader already rejected.
    pub fn absorb_malformed(&mut self, malformed: Vec<SkippedQuestion>) {
        self.accounting.total += malformed.len();
        for skipped in &malformed {
            *self.accounting.skipped.entry(skipped.reason).or_insert(0) += 1;
        }
        self.skipped.extend(malformed);
        self.skipped.sort_by_key(|s| s.index);
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, total: usize);
    fn on_record_complete(&self, record: &EvaluationRecord, resumed: bool);
    fn on_record_skipped(&self, skipped: &SkippedQuestion);
    fn on_run_complete(&self, accounting: &RunAccounting, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_run_start(&self, _: usize) {}
    fn on_record_complete(&self, _: &EvaluationRecord, _: bool) {}
    fn on_record_skipped(&self, _: &SkippedQuestion) {}
    fn on_run_complete(&self, _: &RunAccounting, _: Duration) {}
}

/// Runs the registry's constraints over questions.
pub struct Evaluator {
    library: Arc<ConstraintLibrary>,
    registry: Arc<Registry>,
    oracle: Arc<SharedOracle>,
    settings: EvaluatorSettings,
    checkpoint: Option<Arc<Checkpoint>>,
}

impl Evaluator {
    pub fn new(
        library: Arc<ConstraintLibrary>,
        registry: Arc<Registry>,
        oracle: Arc<SharedOracle>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            library,
            registry,
            oracle,
            settings,
            checkpoint: None,
        }
    }

    /// Persist each record as it completes and reuse matching stored ones.
    pub fn with_checkpoint(mut self, checkpoint: Arc<Checkpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn oracle(&self) -> &SharedOracle {
        &self.oracle
    }

    pub async fn evaluate(&self, questions: &[QuestionData], passages: &PassageStore) -> EvaluationRun {
        self.evaluate_with_progress(questions, passages, &NoopReporter)
            .await
    }

    pub async fn evaluate_with_progress(
        &self,
        questions: &[QuestionData],
        passages: &PassageStore,
        progress: &dyn ProgressReporter,
    ) -> EvaluationRun {
        let start = Instant::now();
        progress.on_run_start(questions.len());
        let mut resumable = self.resumable_records();

        let semaphore = Arc::new(Semaphore::new(self.settings.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();
        let mut reused: Vec<(usize, EvaluationRecord)> = Vec::new();

        for (index, question) in questions.iter().enumerate() {
            if let Some(record) = resumable
                .remove(&question.question_id)
                .filter(|r| same_question(&r.question, question))
            {
                reused.push((index, record));
                continue;
            }
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire().await;
                (index, self.evaluate_one(question, passages).await)
            });
        }

        let mut run = EvaluationRun {
            accounting: RunAccounting {
                total: questions.len(),
                ..RunAccounting::default()
            },
            ..EvaluationRun::default()
        };
        let mut completed: Vec<(usize, EvaluationRecord)> = Vec::with_capacity(questions.len());

        for (index, record) in reused {
            progress.on_record_complete(&record, true);
            run.accounting.resumed += 1;
            completed.push((index, record));
        }

        while let Some((index, result)) = futures.next().await {
            match result {
                Ok(record) => {
                    if let Some(checkpoint) = &self.checkpoint {
                        if let Err(e) = checkpoint.append(&record) {
                            tracing::error!(
                                question_id = %record.question.question_id,
                                "checkpoint write failed: {e:#}"
                            );
                        }
                    }
                    progress.on_record_complete(&record, false);
                    run.accounting.evaluated += 1;
                    completed.push((index, record));
                }
                Err(error) => {
                    let reason = match &error {
                        EvalError::PassageNotFound { .. } => SkipReason::PassageNotFound,
                        _ => SkipReason::MalformedInput,
                    };
                    tracing::warn!(index, %error, "skipping question");
                    let skipped = SkippedQuestion::new(index, reason, &error);
                    progress.on_record_skipped(&skipped);
                    *run.accounting.skipped.entry(reason).or_insert(0) += 1;
                    run.skipped.push(skipped);
                }
            }
        }

        completed.sort_by_key(|(index, _)| *index);
        run.skipped.sort_by_key(|s| s.index);
        run.records = completed.into_iter().map(|(_, record)| record).collect();
        run.accounting.indeterminate_results =
            run.records.iter().map(|r| r.indeterminate_count()).sum();
        run.accounting.predicate_errors =
            run.records.iter().map(|r| r.predicate_error_count()).sum();

        tracing::info!(
            evaluated = run.accounting.evaluated,
            resumed = run.accounting.resumed,
            skipped = run.accounting.skipped_total(),
            "evaluation run complete"
        );
        progress.on_run_complete(&run.accounting, start.elapsed());
        run
    }

    /// Evaluate a single question.
    pub async fn evaluate_one(
        &self,
        question: &QuestionData,
        passages: &PassageStore,
    ) -> Result<EvaluationRecord, EvalError> {
        question.validate()?;
        let passage = passages.get(question)?;
        let ids = self.registry.constraints_for(question.level, question.mode);

        let queries: Vec<Option<OracleQuery>> = ids
            .iter()
            .map(|id| {
                self.library
                    .get(*id)
                    .and_then(|c| c.oracle_query(question, passage))
            })
            .collect();
        let scores = self.fetch_scores(&queries).await;

        let results = ids
            .iter()
            .zip(&queries)
            .map(|(id, query)| {
                let oracle = match query.as_ref().map(|q| scores.get(q)) {
                    None => None,
                    Some(Some(Ok(score))) => Some(score),
                    Some(Some(Err(e))) => {
                        return ConstraintResult::from_error(*id, &EvalError::OracleUnavailable(e.clone()))
                    }
                    Some(None) => {
                        let e = OracleError::Unavailable("score was not fetched".into());
                        return ConstraintResult::from_error(*id, &EvalError::OracleUnavailable(e));
                    }
                };
                let ctx = CheckContext {
                    question,
                    passage,
                    oracle,
                };
                self.run_constraint(*id, &ctx)
            })
            .collect();

        let mut question = question.clone();
        if question.subject.trim().is_empty() {
            question.subject = passage.subject.clone();
        }
        Ok(EvaluationRecord::new(
            question,
            results,
            self.settings.loose_policy(),
            self.registry.version(),
            self.oracle.model_version(),
        ))
    }

    async fn fetch_scores(
        &self,
        queries: &[Option<OracleQuery>],
    ) -> HashMap<OracleQuery, Result<OracleScores, OracleError>> {
        let mut distinct: Vec<OracleQuery> = Vec::new();
        for query in queries.iter().flatten() {
            if !distinct.contains(query) {
                distinct.push(query.clone());
            }
        }
        if distinct.is_empty() {
            return HashMap::new();
        }
        let results = self.oracle.score_many(&distinct).await;
        distinct.into_iter().zip(results).collect()
    }

    fn run_constraint(&self, id: ConstraintId, ctx: &CheckContext<'_>) -> ConstraintResult {
        let Some(constraint) = self.library.get(id) else {
            return ConstraintResult::from_error(
                id,
                &EvalError::PredicateError {
                    constraint: id,
                    message: "constraint is not in the library".into(),
                },
            );
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| constraint.check(ctx)));
        let message = match outcome {
            Ok(Ok(outcome)) => return ConstraintResult::from_outcome(id, outcome),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .map_or_else(|| "panicked".to_string(), |m| format!("panicked: {m}")),
        };
        tracing::warn!(
            question_id = %ctx.question.question_id,
            constraint = %id,
            %message,
            "constraint failed internally"
        );
        ConstraintResult::from_error(id, &EvalError::PredicateError { constraint: id, message })
    }

    /// Stored records computed under the current registry and oracle.
    fn resumable_records(&self) -> HashMap<String, EvaluationRecord> {
        let Some(checkpoint) = &self.checkpoint else {
            return HashMap::new();
        };
        let records = match checkpoint.records() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("ignoring unreadable checkpoint: {e:#}");
                return HashMap::new();
            }
        };
        let total = records.len();
        let usable: HashMap<String, EvaluationRecord> = records
            .into_iter()
            .filter(|r| {
                r.registry_version == self.registry.version()
                    && r.oracle_version == self.oracle.model_version()
            })
            .map(|r| (r.question.question_id.clone(), r))
            .collect();
        tracing::info!(
            stored = total,
            usable = usable.len(),
            path = %checkpoint.path().display(),
            "loaded checkpoint"
        );
        usable
    }
}

/// A stored record belongs to this question if its inputs are unchanged.
fn same_question(stored: &QuestionData, current: &QuestionData) -> bool {
    stored.passage_id == current.passage_id
        && stored.level == current.level
        && stored.mode == current.mode
        && stored.vocab_level == current.vocab_level
        && stored.question == current.question
        && stored.answer == current.answer
        && stored.provenance.model == current.provenance.model
}
