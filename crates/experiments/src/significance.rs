//! Significance estimation: how confident we are that the leading variant
//! is genuinely better than the rest.
//!
//! Two estimators are available behind [`SignificanceEstimator`]: the fast
//! heuristic dashboards are calibrated against, and a pooled two-proportion
//! z-test.

use campaign_core::types::{PrimaryMetric, TestGroup, Variant};
use campaign_core::SignificanceMethod;
use std::sync::Arc;

/// Upper bound on any reported significance.
pub const MAX_SIGNIFICANCE: f64 = 0.999;

/// Observations at which the heuristic stops discounting for sample size.
const SATURATION_SAMPLES: f64 = 200.0;
/// Effect size at which the heuristic reaches half of its scale.
const EFFECT_HALF_POINT: f64 = 0.05;
const EFFECT_SCALE: f64 = 1.25;

pub trait SignificanceEstimator: Send + Sync {
    /// Confidence in `[0, MAX_SIGNIFICANCE]` (or exactly 1 for a lone
    /// variant) that `variants[best]` beats the pooled remainder on `metric`.
    fn estimate(&self, variants: &[Variant], best: usize, metric: PrimaryMetric) -> f64;

    fn name(&self) -> &'static str;
}

/// Build the estimator selected in configuration.
pub fn estimator_for(method: SignificanceMethod) -> Arc<dyn SignificanceEstimator> {
    match method {
        SignificanceMethod::Heuristic => Arc::new(HeuristicEstimator),
        SignificanceMethod::ZTest => Arc::new(ZTestEstimator),
    }
}

/// Best variant of a group together with its significance.
pub fn score_leader(group: &TestGroup, estimator: &dyn SignificanceEstimator) -> Option<(usize, f64)> {
    let best = group.best_variant_index()?;
    let significance = estimator.estimate(&group.variants, best, group.primary_metric());
    Some((best, significance))
}

/// Pooled counts for the best variant and everybody else.
struct Split {
    best_count: u64,
    best_sent: u64,
    others_count: u64,
    others_sent: u64,
}

impl Split {
    fn new(variants: &[Variant], best: usize, metric: PrimaryMetric) -> Self {
        let leader = &variants[best];
        let (others_count, others_sent) = variants
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != best)
            .fold((0u64, 0u64), |(count, sent), (_, v)| {
                (count + metric.count(v), sent + v.sent)
            });
        Self {
            best_count: metric.count(leader),
            best_sent: leader.sent,
            others_count,
            others_sent,
        }
    }

    fn best_rate(&self) -> f64 {
        self.best_count as f64 / self.best_sent as f64
    }

    fn others_rate(&self) -> f64 {
        self.others_count as f64 / self.others_sent as f64
    }
}

/// Interpretable approximation: effect size squashed into `[0, 1)` and
/// discounted until 200 observations have been collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl SignificanceEstimator for HeuristicEstimator {
    fn estimate(&self, variants: &[Variant], best: usize, metric: PrimaryMetric) -> f64 {
        if best >= variants.len() {
            return 0.0;
        }
        if variants.len() == 1 {
            return 1.0;
        }
        let split = Split::new(variants, best, metric);
        if split.best_sent == 0 || split.others_sent == 0 {
            return 0.0;
        }

        let effect = (split.best_rate() - split.others_rate()).abs();
        let total = (split.best_sent + split.others_sent) as f64;
        let sample_factor = (total / SATURATION_SAMPLES).sqrt().min(1.0);
        let significance = sample_factor * (effect / (effect + EFFECT_HALF_POINT)) * EFFECT_SCALE;

        significance.clamp(0.0, MAX_SIGNIFICANCE)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Pooled two-proportion z-test of the leader against the rest;
/// significance is `1 - p`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZTestEstimator;

impl SignificanceEstimator for ZTestEstimator {
    fn estimate(&self, variants: &[Variant], best: usize, metric: PrimaryMetric) -> f64 {
        if best >= variants.len() {
            return 0.0;
        }
        if variants.len() == 1 {
            return 1.0;
        }
        let split = Split::new(variants, best, metric);
        if split.best_sent == 0 || split.others_sent == 0 {
            return 0.0;
        }

        let p_value = two_proportion_p_value(
            split.best_count,
            split.best_sent,
            split.others_count,
            split.others_sent,
        );
        (1.0 - p_value).clamp(0.0, MAX_SIGNIFICANCE)
    }

    fn name(&self) -> &'static str {
        "z_test"
    }
}

/// Two-sided p-value using the Abramowitz-Stegun normal tail approximation.
fn two_proportion_p_value(x1: u64, n1: u64, x2: u64, n2: u64) -> f64 {
    let p1 = x1 as f64 / n1 as f64;
    let p2 = x2 as f64 / n2 as f64;
    let pooled = (x1 + x2) as f64 / (n1 + n2) as f64;
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return 1.0;
    }
    let z = (p1 - p2).abs() / se;
    let t = 1.0 / (1.0 + 0.2316419 * z);
    let d = 0.3989422804014327;
    let tail = d
        * (-z * z / 2.0).exp()
        * (t * (0.3193815
            + t * (-0.3565638 + t * (1.781478 + t * (-1.821256 + t * 1.330274)))));
    (2.0 * tail).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::types::VariantContent;

    fn variant(sent: u64, opened: u64) -> Variant {
        let mut v = Variant::new("v", VariantContent::default());
        v.sent = sent;
        v.opened = opened;
        v.recompute_rates();
        v
    }

    #[test]
    fn test_heuristic_matches_worked_example() {
        // A: 60 sent / 18 opens, B: 60 sent / 9 opens
        let variants = vec![variant(60, 18), variant(60, 9)];
        let sig = HeuristicEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate);
        let expected = (120.0f64 / 200.0).sqrt() * (0.15 / 0.20) * 1.25;
        assert!((sig - expected).abs() < 1e-9);
        assert!(sig > 0.72 && sig < 0.73);
    }

    #[test]
    fn test_heuristic_caps_at_max() {
        let variants = vec![variant(400, 200), variant(400, 80)];
        let sig = HeuristicEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate);
        assert_eq!(sig, MAX_SIGNIFICANCE);
    }

    #[test]
    fn test_zero_sends_guard() {
        let variants = vec![variant(0, 0), variant(50, 10)];
        assert_eq!(HeuristicEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate), 0.0);
        assert_eq!(HeuristicEstimator.estimate(&variants, 1, PrimaryMetric::OpenRate), 0.0);
        assert_eq!(ZTestEstimator.estimate(&variants, 1, PrimaryMetric::OpenRate), 0.0);
    }

    #[test]
    fn test_single_variant_is_trivially_significant() {
        let variants = vec![variant(10, 3)];
        assert_eq!(HeuristicEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate), 1.0);
        assert_eq!(ZTestEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate), 1.0);
    }

    #[test]
    fn test_identical_rates_give_zero() {
        let variants = vec![variant(100, 20), variant(100, 20)];
        assert_eq!(HeuristicEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate), 0.0);
        let z = ZTestEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate);
        assert!(z < 0.01);
    }

    #[test]
    fn test_small_samples_are_discounted() {
        let small = vec![variant(10, 5), variant(10, 1)];
        let large = vec![variant(100, 50), variant(100, 10)];
        let s = HeuristicEstimator.estimate(&small, 0, PrimaryMetric::OpenRate);
        let l = HeuristicEstimator.estimate(&large, 0, PrimaryMetric::OpenRate);
        assert!(s < l);
    }

    #[test]
    fn test_z_test_detects_large_effect() {
        let variants = vec![variant(400, 200), variant(400, 80)];
        let sig = ZTestEstimator.estimate(&variants, 0, PrimaryMetric::OpenRate);
        assert!(sig > 0.99);
        assert!(sig <= MAX_SIGNIFICANCE);
    }

    #[test]
    fn test_out_of_range_best_is_zero() {
        let variants = vec![variant(10, 1), variant(10, 2)];
        assert_eq!(HeuristicEstimator.estimate(&variants, 5, PrimaryMetric::OpenRate), 0.0);
    }

    #[test]
    fn test_estimator_for_config() {
        assert_eq!(estimator_for(SignificanceMethod::Heuristic).name(), "heuristic");
        assert_eq!(estimator_for(SignificanceMethod::ZTest).name(), "z_test");
    }
}
