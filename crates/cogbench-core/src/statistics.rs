//! Metrics over evaluation records.
//!
//! Strict and loose prompt-level rates, constraint-level rates, and
//! per-constraint statistics for every (model, mode) and
//! (model, level, mode) group, with seeded percentile-bootstrap confidence
//! intervals. Everything is keyed by ordered maps, so the same records
//! always produce the same summary.

use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::constraints::{ConstraintId, Tier};
use crate::model::{CognitiveLevel, Mode};
use crate::results::{EvaluationRecord, Verdict};
use crate::settings::{MetricsSettings, Settings};

/// A proportion with its bootstrap confidence interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub rate: f64,
    pub n: usize,
    pub n_pass: usize,
    pub ci_low: f64,
    pub ci_high: f64,
}

impl RateEstimate {
    /// Estimate a rate from pass/fail outcomes.
    pub fn from_outcomes(outcomes: &[bool], settings: &MetricsSettings) -> Self {
        let n = outcomes.len();
        let n_pass = outcomes.iter().filter(|p| **p).count();
        let values: Vec<f64> = outcomes.iter().map(|p| if *p { 1.0 } else { 0.0 }).collect();
        let (ci_low, ci_high) = bootstrap_ci(
            &values,
            settings.bootstrap_resamples,
            settings.bootstrap_seed,
            settings.confidence_level,
        );
        Self {
            rate: if n == 0 { 0.0 } else { n_pass as f64 / n as f64 },
            n,
            n_pass,
            ci_low,
            ci_high,
        }
    }
}

/// Percentile bootstrap interval of the mean.
///
/// Resamples with replacement from a `ChaCha8Rng` seeded with `seed`;
/// bounds use linear interpolation between order statistics. Fewer than two
/// values give a degenerate interval at the mean.
pub fn bootstrap_ci(values: &[f64], resamples: usize, seed: u64, confidence: f64) -> (f64, f64) {
    if values.len() < 2 || resamples == 0 {
        let m = mean(values);
        return (m, m);
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = values.len();
    let mut means: Vec<f64> = (0..resamples)
        .map(|_| (0..n).map(|_| values[rng.gen_range(0..n)]).sum::<f64>() / n as f64)
        .collect();
    means.sort_by(f64::total_cmp);

    let alpha = ((1.0 - confidence) / 2.0).clamp(0.0, 0.5);
    (percentile(&means, alpha), percentile(&means, 1.0 - alpha))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Linear-interpolated percentile of sorted data, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let pos = q * (len - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Verdict counts for one constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintStats {
    pub n_pass: usize,
    pub n_fail: usize,
    pub n_indeterminate: usize,
    /// Passes over determinate results.
    pub pass_rate: f64,
}

impl ConstraintStats {
    fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Pass => self.n_pass += 1,
            Verdict::Fail => self.n_fail += 1,
            Verdict::Indeterminate => self.n_indeterminate += 1,
        }
    }

    fn finish(&mut self) {
        let determinate = self.n_pass + self.n_fail;
        self.pass_rate = if determinate == 0 {
            0.0
        } else {
            self.n_pass as f64 / determinate as f64
        };
    }

    pub fn determinate(&self) -> usize {
        self.n_pass + self.n_fail
    }
}

/// Rates for one group of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub records: usize,
    /// Share of records where every constraint passed.
    pub strict: RateEstimate,
    pub loose: RateEstimate,
    /// Share of determinate constraint results that passed.
    pub constraint_level: RateEstimate,
    /// Share of determinate results scoring at least the loose floor.
    pub constraint_level_loose: RateEstimate,
    /// Constraint-level rate without the flagged sanity-check constraints.
    pub primary_constraint_level: RateEstimate,
    pub constraints: BTreeMap<ConstraintId, ConstraintStats>,
    pub indeterminate_results: usize,
}

/// Strict rate for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetrics {
    pub n: usize,
    pub n_pass: usize,
    pub strict_rate: f64,
}

/// Pass counts for one constraint tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMetrics {
    pub n_pass: usize,
    pub n_total: usize,
    pub n_indeterminate: usize,
    pub pass_rate: f64,
}

/// Everything for one (model, mode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeMetrics {
    pub overall: GroupMetrics,
    pub by_level: BTreeMap<CognitiveLevel, GroupMetrics>,
    pub by_subject: BTreeMap<String, SubjectMetrics>,
    pub by_tier: BTreeMap<Tier, TierMetrics>,
}

/// Standard minus adversarial strict rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdversarialGap {
    pub standard_rate: f64,
    pub adversarial_rate: f64,
    pub gap: f64,
    /// Only levels present in both modes.
    pub by_level: BTreeMap<CognitiveLevel, LevelGap>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelGap {
    pub standard: f64,
    pub adversarial: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub modes: BTreeMap<Mode, ModeMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adversarial_gap: Option<AdversarialGap>,
}

/// Which side of the discrimination band a constraint fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discrimination {
    /// Almost nothing passes.
    TooStrict,
    /// Almost everything passes.
    TooLenient,
}

/// A constraint whose overall pass rate makes it a sanity check rather
/// than a discriminating measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminationFlag {
    pub id: ConstraintId,
    pub pass_rate: f64,
    pub n: usize,
    pub kind: Discrimination,
}

/// Two co-applied constraints that individually pass but almost never
/// pass together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensionFlag {
    pub model: String,
    pub level: CognitiveLevel,
    pub mode: Mode,
    pub first: ConstraintId,
    pub second: ConstraintId,
    /// Records where both were determinate.
    pub n: usize,
    pub first_rate: f64,
    pub second_rate: f64,
    pub joint_rate: f64,
}

/// Output of [`compute_metrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub records: usize,
    pub models: BTreeMap<String, ModelMetrics>,
    pub discrimination: Vec<DiscriminationFlag>,
    pub tensions: Vec<TensionFlag>,
}

/// Compute metrics with default settings.
pub fn compute_metrics(records: &[EvaluationRecord]) -> MetricsSummary {
    compute_metrics_with(records, &Settings::default())
}

/// Compute metrics using the metrics settings and the loose score floor
/// from `settings`.
pub fn compute_metrics_with(records: &[EvaluationRecord], settings: &Settings) -> MetricsSummary {
    let metrics = &settings.metrics;
    let floor = settings.evaluator.loose_score_floor;

    let discrimination = discrimination_flags(records, metrics);
    let sanity: BTreeSet<ConstraintId> = discrimination.iter().map(|f| f.id).collect();

    let mut grouped: BTreeMap<&str, BTreeMap<Mode, Vec<&EvaluationRecord>>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.model())
            .or_default()
            .entry(record.mode())
            .or_default()
            .push(record);
    }

    let mut models = BTreeMap::new();
    let mut tensions = Vec::new();
    for (model, modes) in grouped {
        let mut model_metrics = ModelMetrics::default();
        for (mode, group) in modes {
            let mut by_level_records: BTreeMap<CognitiveLevel, Vec<&EvaluationRecord>> =
                BTreeMap::new();
            for record in &group {
                by_level_records.entry(record.level()).or_default().push(record);
            }

            let mut by_level = BTreeMap::new();
            for (level, level_records) in &by_level_records {
                by_level.insert(*level, group_metrics(level_records, metrics, floor, &sanity));
                tensions.extend(tension_flags(model, *level, mode, level_records, metrics));
            }

            model_metrics.modes.insert(
                mode,
                ModeMetrics {
                    overall: group_metrics(&group, metrics, floor, &sanity),
                    by_level,
                    by_subject: subject_breakdown(&group),
                    by_tier: tier_breakdown(&group),
                },
            );
        }
        model_metrics.adversarial_gap = adversarial_gap(&model_metrics.modes);
        models.insert(model.to_string(), model_metrics);
    }

    MetricsSummary {
        records: records.len(),
        models,
        discrimination,
        tensions,
    }
}

fn group_metrics(
    records: &[&EvaluationRecord],
    settings: &MetricsSettings,
    floor: f64,
    sanity: &BTreeSet<ConstraintId>,
) -> GroupMetrics {
    let strict: Vec<bool> = records.iter().map(|r| r.strict_pass).collect();
    let loose: Vec<bool> = records.iter().map(|r| r.loose_pass).collect();

    let mut constraint_outcomes = Vec::new();
    let mut loose_outcomes = Vec::new();
    let mut primary_outcomes = Vec::new();
    let mut constraints: BTreeMap<ConstraintId, ConstraintStats> = BTreeMap::new();
    let mut indeterminate_results = 0;
    for record in records {
        for result in &record.results {
            constraints.entry(result.id).or_default().add(result.verdict);
            if result.is_indeterminate() {
                indeterminate_results += 1;
                continue;
            }
            constraint_outcomes.push(result.passed());
            loose_outcomes.push(result.loosely_passes(floor));
            if !sanity.contains(&result.id) {
                primary_outcomes.push(result.passed());
            }
        }
    }
    constraints.values_mut().for_each(ConstraintStats::finish);

    GroupMetrics {
        records: records.len(),
        strict: RateEstimate::from_outcomes(&strict, settings),
        loose: RateEstimate::from_outcomes(&loose, settings),
        constraint_level: RateEstimate::from_outcomes(&constraint_outcomes, settings),
        constraint_level_loose: RateEstimate::from_outcomes(&loose_outcomes, settings),
        primary_constraint_level: RateEstimate::from_outcomes(&primary_outcomes, settings),
        constraints,
        indeterminate_results,
    }
}

fn subject_breakdown(records: &[&EvaluationRecord]) -> BTreeMap<String, SubjectMetrics> {
    let mut out: BTreeMap<String, SubjectMetrics> = BTreeMap::new();
    for record in records {
        let subject = match record.question.subject.trim() {
            "" => "unknown",
            s => s,
        };
        let entry = out.entry(subject.to_string()).or_default();
        entry.n += 1;
        if record.strict_pass {
            entry.n_pass += 1;
        }
    }
    for entry in out.values_mut() {
        entry.strict_rate = entry.n_pass as f64 / entry.n as f64;
    }
    out
}

fn tier_breakdown(records: &[&EvaluationRecord]) -> BTreeMap<Tier, TierMetrics> {
    let mut out: BTreeMap<Tier, TierMetrics> = BTreeMap::new();
    for result in records.iter().flat_map(|r| &r.results) {
        let entry = out.entry(result.tier).or_default();
        match result.verdict {
            Verdict::Indeterminate => entry.n_indeterminate += 1,
            verdict => {
                entry.n_total += 1;
                if verdict == Verdict::Pass {
                    entry.n_pass += 1;
                }
            }
        }
    }
    for entry in out.values_mut() {
        entry.pass_rate = if entry.n_total == 0 {
            0.0
        } else {
            entry.n_pass as f64 / entry.n_total as f64
        };
    }
    out
}

/// Constraints whose pass rate over all records is outside the band.
fn discrimination_flags(records: &[EvaluationRecord], settings: &MetricsSettings) -> Vec<DiscriminationFlag> {
    let mut stats: BTreeMap<ConstraintId, ConstraintStats> = BTreeMap::new();
    for result in records.iter().flat_map(|r| &r.results) {
        stats.entry(result.id).or_default().add(result.verdict);
    }
    stats
        .into_iter()
        .filter_map(|(id, mut s)| {
            s.finish();
            if s.determinate() == 0 {
                return None;
            }
            let kind = if s.pass_rate < settings.discrimination_low {
                Discrimination::TooStrict
            } else if s.pass_rate > settings.discrimination_high {
                Discrimination::TooLenient
            } else {
                return None;
            };
            Some(DiscriminationFlag {
                id,
                pass_rate: s.pass_rate,
                n: s.determinate(),
                kind,
            })
        })
        .collect()
}

fn tension_flags(
    model: &str,
    level: CognitiveLevel,
    mode: Mode,
    records: &[&EvaluationRecord],
    settings: &MetricsSettings,
) -> Vec<TensionFlag> {
    if records.len() < settings.tension_min_records.max(1) {
        return Vec::new();
    }
    let ids: BTreeSet<ConstraintId> = records
        .iter()
        .flat_map(|r| r.results.iter().map(|c| c.id))
        .collect();
    let ids: Vec<ConstraintId> = ids.into_iter().collect();

    let mut flags = Vec::new();
    for (i, first) in ids.iter().enumerate() {
        for second in &ids[i + 1..] {
            let mut n = 0;
            let (mut first_pass, mut second_pass, mut joint) = (0, 0, 0);
            for record in records {
                let (Some(a), Some(b)) = (record.result(*first), record.result(*second)) else {
                    continue;
                };
                if a.is_indeterminate() || b.is_indeterminate() {
                    continue;
                }
                n += 1;
                first_pass += usize::from(a.passed());
                second_pass += usize::from(b.passed());
                joint += usize::from(a.passed() && b.passed());
            }
            if n < settings.tension_min_records.max(1) {
                continue;
            }
            let rate = |count: usize| count as f64 / n as f64;
            let (first_rate, second_rate, joint_rate) = (rate(first_pass), rate(second_pass), rate(joint));
            if joint_rate <= settings.tension_joint_max
                && first_rate >= settings.tension_individual_min
                && second_rate >= settings.tension_individual_min
            {
                flags.push(TensionFlag {
                    model: model.to_string(),
                    level,
                    mode,
                    first: *first,
                    second: *second,
                    n,
                    first_rate,
                    second_rate,
                    joint_rate,
                });
            }
        }
    }
    flags
}

fn adversarial_gap(modes: &BTreeMap<Mode, ModeMetrics>) -> Option<AdversarialGap> {
    let standard = modes.get(&Mode::Standard)?;
    let adversarial = modes.get(&Mode::Adversarial)?;
    let by_level = standard
        .by_level
        .iter()
        .filter_map(|(level, s)| {
            let a = adversarial.by_level.get(level)?;
            Some((
                *level,
                LevelGap {
                    standard: s.strict.rate,
                    adversarial: a.strict.rate,
                    gap: s.strict.rate - a.strict.rate,
                },
            ))
        })
        .collect();
    Some(AdversarialGap {
        standard_rate: standard.overall.strict.rate,
        adversarial_rate: adversarial.overall.strict.rate,
        gap: standard.overall.strict.rate - adversarial.overall.strict.rate,
        by_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::test_support::question;
    use crate::constraints::Outcome;
    use crate::results::{ConstraintResult, LoosePolicy};

    fn record(
        model: &str,
        level: CognitiveLevel,
        mode: Mode,
        verdicts: &[(ConstraintId, bool)],
    ) -> EvaluationRecord {
        let mut q = question(level, "Why?", "Because.");
        q.provenance.model = model.into();
        q.mode = mode;
        if mode == Mode::Adversarial {
            q.vocab_level = Some(CognitiveLevel::Remember);
        }
        let results = verdicts
            .iter()
            .map(|(id, pass)| {
                let outcome = if *pass {
                    Outcome::pass(1.0, "ok")
                } else {
                    Outcome::fail(0.0, "no")
                };
                ConstraintResult::from_outcome(*id, outcome)
            })
            .collect();
        EvaluationRecord::new(q, results, LoosePolicy::default(), "reg", "oracle")
    }

    #[test]
    fn bootstrap_is_deterministic_and_brackets_mean() {
        let values: Vec<f64> = (0..40).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let a = bootstrap_ci(&values, 1000, 42, 0.95);
        let b = bootstrap_ci(&values, 1000, 42, 0.95);
        assert_eq!(a, b);
        assert!(a.0 <= 0.25 && 0.25 <= a.1);
        assert!(a.0 > 0.0 && a.1 < 0.6);
        assert_ne!(a, bootstrap_ci(&values, 1000, 7, 0.95));
    }

    #[test]
    fn bootstrap_degenerate_for_small_samples() {
        assert_eq!(bootstrap_ci(&[], 1000, 42, 0.95), (0.0, 0.0));
        assert_eq!(bootstrap_ci(&[1.0], 1000, 42, 0.95), (1.0, 1.0));
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0];
        assert!((percentile(&sorted, 0.5) - 1.5).abs() < 1e-12);
        assert_eq!(percentile(&sorted, 0.0), 0.0);
        assert_eq!(percentile(&sorted, 1.0), 3.0);
    }

    #[test]
    fn strict_and_constraint_rates() {
        use ConstraintId::*;
        let records = vec![
            record("m", CognitiveLevel::Remember, Mode::Standard, &[(U1, true), (R1, true)]),
            record("m", CognitiveLevel::Remember, Mode::Standard, &[(U1, true), (R1, false)]),
        ];
        let summary = compute_metrics(&records);
        let overall = &summary.models["m"].modes[&Mode::Standard].overall;
        assert_eq!(overall.records, 2);
        assert_eq!(overall.strict.n_pass, 1);
        assert!((overall.strict.rate - 0.5).abs() < 1e-12);
        assert_eq!(overall.constraint_level.n, 4);
        assert_eq!(overall.constraint_level.n_pass, 3);
        assert_eq!(overall.constraints[&R1].n_fail, 1);
        assert!((overall.constraints[&U1].pass_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn discrimination_flags_and_primary_rate() {
        use ConstraintId::*;
        let records: Vec<_> = (0..20)
            .map(|i| record("m", CognitiveLevel::Apply, Mode::Standard, &[(U1, true), (P1, i % 2 == 0)]))
            .collect();
        let summary = compute_metrics(&records);
        assert_eq!(summary.discrimination.len(), 1);
        assert_eq!(summary.discrimination[0].id, U1);
        assert_eq!(summary.discrimination[0].kind, Discrimination::TooLenient);
        let overall = &summary.models["m"].modes[&Mode::Standard].overall;
        assert_eq!(overall.primary_constraint_level.n, 20);
        assert!((overall.primary_constraint_level.rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tension_between_mutually_exclusive_constraints() {
        use ConstraintId::*;
        let records: Vec<_> = (0..10)
            .map(|i| {
                let single = i % 2 == 0;
                record(
                    "m",
                    CognitiveLevel::Remember,
                    Mode::Standard,
                    &[(U1, true), (U3, !single), (R2, single)],
                )
            })
            .collect();
        let summary = compute_metrics(&records);
        let pairs: Vec<(ConstraintId, ConstraintId)> =
            summary.tensions.iter().map(|t| (t.first, t.second)).collect();
        assert_eq!(pairs, vec![(U3, R2)]);
        assert_eq!(summary.tensions[0].joint_rate, 0.0);
        assert_eq!(summary.tensions[0].n, 10);
    }

    #[test]
    fn adversarial_gap_per_level() {
        use ConstraintId::*;
        let records = vec![
            record("m", CognitiveLevel::Analyze, Mode::Standard, &[(U1, true)]),
            record("m", CognitiveLevel::Analyze, Mode::Adversarial, &[(U1, false)]),
            record("m", CognitiveLevel::Create, Mode::Standard, &[(U1, true)]),
        ];
        let gap = compute_metrics(&records).models["m"].adversarial_gap.clone().unwrap();
        assert!((gap.gap - 1.0).abs() < 1e-12);
        assert_eq!(gap.by_level.len(), 1);
        assert!((gap.by_level[&CognitiveLevel::Analyze].gap - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_yields_empty_summary() {
        let summary = compute_metrics(&[]);
        assert_eq!(summary.records, 0);
        assert!(summary.models.is_empty());
        assert!(summary.tensions.is_empty());
    }

    #[test]
    fn summary_serializes_with_string_keys() {
        let records = vec![record(
            "m",
            CognitiveLevel::Understand,
            Mode::Standard,
            &[(ConstraintId::D1, true)],
        )];
        let json = serde_json::to_string(&compute_metrics(&records)).unwrap();
        assert!(json.contains("\"understand\""));
        assert!(json.contains("\"D1\""));
        let back: MetricsSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.records, 1);
    }
}
