//! Error types for the evaluation engine.
//!
//! Per-record failures (`EvalError`) are recovered locally by the evaluator
//! and show up in the run accounting. Only loading the passage store, the
//! settings, or the registry can abort a run.

use thiserror::Error;

use crate::constraints::ConstraintId;
use crate::model::CognitiveLevel;

/// Failures of the semantic oracle.
///
/// Every variant is treated as "oracle unavailable" by the evaluator: the
/// affected semantic constraints become indeterminate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// The classifier could not be loaded or reached.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded the configured deadline. This is an unavailable
    /// condition; it is kept apart so callers can count timeouts.
    #[error("oracle unavailable: timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The backend answered, but not with usable scores.
    #[error("oracle returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl OracleError {
    /// Returns `true` if the call was abandoned because of the deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, OracleError::Timeout { .. })
    }
}

/// Per-record evaluation failures.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// A question record is missing required fields.
    #[error("malformed input ({question_id}): {reason}")]
    MalformedInput { question_id: String, reason: String },

    /// A question references a passage that is not in the store.
    #[error("passage '{passage_id}' not found for question {question_id}")]
    PassageNotFound {
        passage_id: String,
        question_id: String,
    },

    /// The semantic oracle could not produce scores.
    #[error(transparent)]
    OracleUnavailable(#[from] OracleError),

    /// A single constraint implementation failed internally.
    #[error("constraint {constraint} failed internally: {message}")]
    PredicateError {
        constraint: ConstraintId,
        message: String,
    },
}

/// Error returned by a predicate that could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct PredicateError(pub String);

impl PredicateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Structural problems in a registry table. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("registry version must not be empty")]
    MissingVersion,

    #[error("no constraints configured for level {0}")]
    EmptyLevel(CognitiveLevel),

    #[error("constraint {id} listed more than once for level {level}")]
    Duplicate {
        id: ConstraintId,
        level: CognitiveLevel,
    },

    #[error("adversarial-only constraint {0} must not appear in a level or universal table")]
    MisplacedAdversarial(ConstraintId),

    #[error("constraint {0} is flagged as vocabulary but is not adversarial-removable (universal or adversarial)")]
    InvalidVocabulary(ConstraintId),
}
