//! The `cogbench evaluate` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tracing::warn;

use cogbench_core::checkpoint::Checkpoint;
use cogbench_core::constraints::ConstraintLibrary;
use cogbench_core::engine::{Evaluator, ProgressReporter, RunAccounting, SkippedQuestion};
use cogbench_core::parser;
use cogbench_core::report::{checkpoint_path, EvaluationBatch};
use cogbench_core::results::EvaluationRecord;
use cogbench_core::statistics::MetricsSummary;
use cogbench_oracle::create_oracle;

use super::{load_config_and_registry, percent};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_run_start(&self, total: usize) {
        eprintln!("Evaluating {total} questions\n");
    }

    fn on_record_complete(&self, record: &EvaluationRecord, resumed: bool) {
        let passed = record.results.iter().filter(|r| r.passed()).count();
        let indeterminate = record.indeterminate_count();
        let verdict = if record.strict_pass { "PASS" } else { "FAIL" };
        let suffix = if resumed { " (resumed)" } else { "" };
        let indeterminate = if indeterminate > 0 {
            format!(", {indeterminate} indeterminate")
        } else {
            String::new()
        };
        eprintln!(
            "  {} :: {} {verdict} {passed}/{}{indeterminate}{suffix}",
            record.question.question_id,
            record.level(),
            record.results.len(),
        );
    }

    fn on_record_skipped(&self, skipped: &SkippedQuestion) {
        eprintln!("  SKIP: #{} {}: {}", skipped.index, skipped.question_id, skipped.message);
    }

    fn on_run_complete(&self, accounting: &RunAccounting, elapsed: Duration) {
        eprintln!(
            "\nComplete: {} evaluated, {} resumed, {} skipped of {} ({:.1}s)",
            accounting.evaluated,
            accounting.resumed,
            accounting.skipped_total(),
            accounting.total,
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    generations: PathBuf,
    passages: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
    parallelism: Option<usize>,
    resume: bool,
) -> Result<()> {
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
    }

    let (config, registry) = load_config_and_registry(config_path.as_deref())?;
    let mut settings = config.settings.clone();
    if let Some(p) = parallelism {
        settings.evaluator.parallelism = p;
    }

    let library = ConstraintLibrary::new(&settings)?;
    let store = parser::load_passages(&passages)?;
    let batch = parser::load_generations(&generations)?;
    let oracle = create_oracle(&config.oracle, &settings.evaluator);

    let output = output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create output directory: {}", output.display()))?;

    let checkpoint_file = checkpoint_path(&output, &batch.model, batch.mode);
    if !resume && checkpoint_file.exists() {
        std::fs::remove_file(&checkpoint_file).with_context(|| {
            format!("failed to remove stale checkpoint: {}", checkpoint_file.display())
        })?;
    }
    let checkpoint = Arc::new(Checkpoint::open(&checkpoint_file)?);

    eprintln!(
        "cogbench v{}: {} ({}) with registry {} and oracle {}",
        env!("CARGO_PKG_VERSION"),
        batch.model,
        batch.mode,
        registry.version(),
        oracle.model_version()
    );
    if !batch.malformed.is_empty() {
        eprintln!("  {} malformed generation(s) will be skipped", batch.malformed.len());
    }

    let evaluator = Evaluator::new(
        Arc::new(library),
        Arc::new(registry),
        Arc::new(oracle),
        settings.evaluator.clone(),
    )
    .with_checkpoint(checkpoint);

    let mut run = evaluator
        .evaluate_with_progress(&batch.questions, &store, &ConsoleReporter)
        .await;
    run.absorb_malformed(batch.malformed);

    let stats = evaluator.oracle().stats();
    tracing::debug!(hits = stats.hits, misses = stats.misses, cached = stats.cached, "oracle cache");

    let result = EvaluationBatch::from_run(
        batch.model,
        batch.mode,
        evaluator.registry().version(),
        evaluator.oracle().model_version(),
        run,
    );

    print_summary(&result.metrics(&settings), &result);

    let path = output.join(result.file_name());
    result.save_json(&path)?;
    eprintln!("Results saved to: {}", path.display());

    if let Err(e) = std::fs::remove_file(&checkpoint_file) {
        warn!(path = %checkpoint_file.display(), "failed to remove checkpoint: {e}");
    }
    Ok(())
}

fn print_summary(summary: &MetricsSummary, batch: &EvaluationBatch) {
    let Some(mode) = summary
        .models
        .get(&batch.model)
        .and_then(|m| m.modes.get(&batch.mode))
    else {
        eprintln!("\nNo records evaluated.");
        return;
    };

    let mut table = Table::new();
    table.set_header(vec![
        "Level",
        "Records",
        "Strict",
        "Loose",
        "Constraint-level",
        "Indeterminate",
    ]);
    for (level, group) in &mode.by_level {
        table.add_row(vec![
            Cell::new(level),
            Cell::new(group.records),
            Cell::new(percent(group.strict.rate)),
            Cell::new(percent(group.loose.rate)),
            Cell::new(percent(group.constraint_level.rate)),
            Cell::new(group.indeterminate_results),
        ]);
    }
    let overall = &mode.overall;
    table.add_row(vec![
        Cell::new("All"),
        Cell::new(overall.records),
        Cell::new(percent(overall.strict.rate)),
        Cell::new(percent(overall.loose.rate)),
        Cell::new(percent(overall.constraint_level.rate)),
        Cell::new(overall.indeterminate_results),
    ]);

    eprintln!("\n{table}");
}
