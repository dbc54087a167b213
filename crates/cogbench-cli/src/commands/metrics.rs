//! The `cogbench metrics` command.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use cogbench_core::report::load_batches;
use cogbench_core::results::EvaluationRecord;
use cogbench_core::statistics::{compute_metrics_with, MetricsSummary, RateEstimate};
use cogbench_oracle::config::load_config_from;

use super::percent;

pub fn execute(
    evaluations: Vec<PathBuf>,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let batches = load_batches(&evaluations)?;
    anyhow::ensure!(!batches.is_empty(), "no evaluation batches found");

    let records: Vec<EvaluationRecord> = batches.into_iter().flat_map(|b| b.records).collect();
    let summary = compute_metrics_with(&records, &config.settings);

    let rendered = match format.as_str() {
        "json" => serde_json::to_string_pretty(&summary)?,
        "text" => render_text(&summary),
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("failed to write metrics to {}", path.display()))?;
            eprintln!("Metrics saved to: {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn with_ci(estimate: &RateEstimate) -> String {
    format!(
        "{} [{}, {}]",
        percent(estimate.rate),
        percent(estimate.ci_low),
        percent(estimate.ci_high)
    )
}

fn render_text(summary: &MetricsSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Metrics over {} records", summary.records);

    for (model, metrics) in &summary.models {
        for (mode, group) in &metrics.modes {
            let _ = writeln!(out, "\n{model} ({mode})");
            let mut table = Table::new();
            table.set_header(vec!["Level", "N", "Strict", "Loose", "Constraint-level", "Primary"]);
            for (level, m) in &group.by_level {
                table.add_row(vec![
                    Cell::new(level),
                    Cell::new(m.records),
                    Cell::new(with_ci(&m.strict)),
                    Cell::new(with_ci(&m.loose)),
                    Cell::new(percent(m.constraint_level.rate)),
                    Cell::new(percent(m.primary_constraint_level.rate)),
                ]);
            }
            let overall = &group.overall;
            table.add_row(vec![
                Cell::new("All"),
                Cell::new(overall.records),
                Cell::new(with_ci(&overall.strict)),
                Cell::new(with_ci(&overall.loose)),
                Cell::new(percent(overall.constraint_level.rate)),
                Cell::new(percent(overall.primary_constraint_level.rate)),
            ]);
            let _ = writeln!(out, "{table}");

            if !group.by_tier.is_empty() {
                let tiers: Vec<String> = group
                    .by_tier
                    .iter()
                    .map(|(tier, t)| format!("{tier} {}", percent(t.pass_rate)))
                    .collect();
                let _ = writeln!(out, "Tiers: {}", tiers.join(", "));
            }
        }

        if let Some(gap) = &metrics.adversarial_gap {
            let _ = writeln!(
                out,
                "Adversarial gap: {} standard vs {} adversarial ({:+.1} pts)",
                percent(gap.standard_rate),
                percent(gap.adversarial_rate),
                gap.gap * 100.0
            );
        }
    }

    if !summary.discrimination.is_empty() {
        let _ = writeln!(out, "\nLow-discrimination constraints:");
        for flag in &summary.discrimination {
            let _ = writeln!(
                out,
                "  {} {} (n={}, {:?})",
                flag.id,
                percent(flag.pass_rate),
                flag.n,
                flag.kind
            );
        }
    }

    if !summary.tensions.is_empty() {
        let _ = writeln!(out, "\nConstraint tensions:");
        for t in &summary.tensions {
            let _ = writeln!(
                out,
                "  {} {} {}: {} {} / {} {}, both {} (n={})",
                t.model,
                t.level,
                t.mode,
                t.first,
                percent(t.first_rate),
                t.second,
                percent(t.second_rate),
                percent(t.joint_rate),
                t.n
            );
        }
    }

    out
}
