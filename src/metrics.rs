//! Reduction of per-persona evaluations into an iteration summary.

use std::collections::HashSet;

use chrono::Utc;

use crate::types::{Evaluation, IterationSummary, MAX_SUMMARY_FAILURES};

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarize one iteration's evaluations.
///
/// Averages and the pass rate are rounded to two decimals. Failure
/// descriptions are deduplicated in first-seen order and capped. An empty
/// batch summarizes to zeros.
pub fn calculate_summary(
    evaluations: &[Evaluation],
    iteration: u32,
    script_version: u32,
) -> IterationSummary {
    let total = evaluations.len();
    let mean = |f: fn(&Evaluation) -> f64| -> f64 {
        if total == 0 {
            0.0
        } else {
            evaluations.iter().map(f).sum::<f64>() / total as f64
        }
    };

    let avg_negotiation = mean(|e| e.metrics.negotiation_effectiveness.score);
    let avg_relevance = mean(|e| e.metrics.response_relevance.score);
    let avg_overall = mean(|e| e.overall_score);
    let pass_rate = if total == 0 {
        0.0
    } else {
        evaluations.iter().filter(|e| e.passed).count() as f64 / total as f64 * 100.0
    };

    let mut seen = HashSet::new();
    let failure_patterns: Vec<String> = evaluations
        .iter()
        .flat_map(|e| e.failures.iter())
        .map(|f| f.description.clone())
        .filter(|d| seen.insert(d.clone()))
        .take(MAX_SUMMARY_FAILURES)
        .collect();

    IterationSummary {
        iteration,
        script_version,
        avg_negotiation_score: round2(avg_negotiation),
        avg_relevance_score: round2(avg_relevance),
        avg_overall_score: round2(avg_overall),
        pass_rate: round2(pass_rate),
        total_personas: total,
        failure_patterns,
        timestamp: Utc::now(),
    }
}
