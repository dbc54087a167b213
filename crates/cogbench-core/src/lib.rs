//! cogbench-core: deterministic constraint evaluation for Bloom's-taxonomy
//! question generation.
//!
//! This crate holds the data model, the constraint library and registry,
//! the semantic oracle contract, the evaluator, and the metrics engine. The
//! two public entry points are [`engine::Evaluator::evaluate`] and
//! [`statistics::compute_metrics`].

pub mod checkpoint;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod model;
pub mod oracle;
pub mod parser;
pub mod passages;
pub mod registry;
pub mod report;
pub mod results;
pub mod settings;
pub mod statistics;
pub mod text;
