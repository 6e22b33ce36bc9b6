//! Shared scoring utilities: factor normalization, composite weighting,
//! edge computation, signal assignment, confidence banding, risk flags,
//! reasons extraction and the visibility tier rule.
//!
//! Every factor subscore lives on the common 0–100 scale where 50 is
//! neutral; composites are clamped weighted sums.

use std::collections::BTreeMap;

use crate::domain::{ConfidenceBand, Signal, VisibilityTier};
use crate::markets::spec::{MarketSpec, OutputType};

pub fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Linear factor score: `(x - lo) / (hi - lo) * 100`, clamped to [0, 100].
/// Missing inputs are neutral.
pub fn factor_score_linear(x: Option<f64>, lo: f64, hi: f64) -> f64 {
    let Some(x) = x else {
        return 50.0;
    };
    if (hi - lo).abs() < f64::EPSILON {
        return 50.0;
    }
    clamp((x - lo) / (hi - lo) * 100.0, 0.0, 100.0)
}

/// Relative-slope score for hot/cold deltas: normalizes the delta by the
/// player's own baseline so high-baseline players are not penalized for
/// stable production.
pub fn factor_score_relative_slope(
    delta: f64,
    baseline: f64,
    floor: f64,
    scale: f64,
    lo_cap: f64,
    hi_cap: f64,
) -> f64 {
    clamp(50.0 + delta / baseline.max(floor) * scale, lo_cap, hi_cap)
}

/// Platoon advantage centered around the average of the two splits.
pub fn platoon_advantage(split_rate: Option<f64>, other_rate: Option<f64>) -> f64 {
    let (Some(split), Some(other)) = (split_rate, other_rate) else {
        return 50.0;
    };
    let avg = (split + other) / 2.0;
    if avg <= 0.0 {
        return 50.0;
    }
    clamp(50.0 + (split - avg) / avg * 150.0, 20.0, 80.0)
}

/// Percentile rank of `x` within a same-date reference population.
pub fn percentile_score(values: &[f64], x: Option<f64>) -> f64 {
    let Some(x) = x else {
        return 50.0;
    };
    if values.is_empty() {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v < x).count();
    below as f64 / values.len() as f64 * 100.0
}

/// Clamped weighted sum over factor subscores; absent factors count as
/// neutral 50.
pub fn composite_score(factors: &BTreeMap<String, f64>, weights: &[(&str, f64)]) -> f64 {
    let mut score = 0.0;
    for (key, weight) in weights {
        score += factors.get(*key).copied().unwrap_or(50.0) * weight;
    }
    clamp(score, 0.0, 100.0)
}

/// Signed edge in percent. Probability markets compare model probability
/// to the implied probability; projection markets compare projection to
/// line (undefined at line = 0, which the caller flags as
/// `logic:line_zero`). Hybrid prefers the probability edge.
pub fn compute_edge(
    output_type: OutputType,
    model_prob: Option<f64>,
    model_projection: Option<f64>,
    implied_prob: Option<f64>,
    line: Option<f64>,
) -> Option<f64> {
    let prob_edge = probability_edge_pct(model_prob, implied_prob);
    let proj_edge = projection_edge_pct(model_projection, line);
    match output_type {
        OutputType::Probability => prob_edge,
        OutputType::Projection => proj_edge,
        OutputType::Hybrid => prob_edge.or(proj_edge),
    }
}

pub fn probability_edge_pct(model_prob: Option<f64>, implied_prob: Option<f64>) -> Option<f64> {
    Some((model_prob? - implied_prob?) * 100.0)
}

pub fn projection_edge_pct(projection: Option<f64>, line: Option<f64>) -> Option<f64> {
    let line = line?;
    if line == 0.0 {
        return None;
    }
    Some((projection? - line) / line.abs() * 100.0)
}

/// Signal assignment. Full mode (edge present) requires both score and
/// edge thresholds; score-only mode applies the score thresholds alone.
/// FADE mirrors BET on the negative side.
pub fn assign_signal(spec: &MarketSpec, model_score: f64, edge_pct: Option<f64>) -> Signal {
    let t = &spec.thresholds;
    match edge_pct {
        Some(edge) => {
            if model_score >= t.bet_min_score && edge >= t.bet_min_edge_pct {
                Signal::Bet
            } else if model_score >= t.lean_min_score && edge >= t.lean_min_edge_pct {
                Signal::Lean
            } else if model_score <= t.fade_max_score && edge <= t.fade_max_edge_pct {
                Signal::Fade
            } else {
                Signal::Skip
            }
        }
        None => {
            if model_score >= t.bet_min_score {
                Signal::Bet
            } else if model_score >= t.lean_min_score {
                Signal::Lean
            } else if model_score <= t.fade_max_score {
                Signal::Fade
            } else {
                Signal::Skip
            }
        }
    }
}

/// Base banding HIGH ≥ 78, MEDIUM ≥ 60, else LOW; two or more risk flags
/// pull a HIGH down a step, three or more pull MEDIUM down as well.
pub fn confidence_band(model_score: f64, risk_flag_count: usize) -> ConfidenceBand {
    let mut band = if model_score >= 78.0 {
        ConfidenceBand::High
    } else if model_score >= 60.0 {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    };
    if risk_flag_count >= 2 && band == ConfidenceBand::High {
        band = band.degraded();
    }
    if risk_flag_count >= 3 && band == ConfidenceBand::Medium {
        band = band.degraded();
    }
    band
}

/// FREE iff BET with a HIGH band; everything else is PRO.
pub fn visibility_tier(signal: Signal, band: ConfidenceBand) -> VisibilityTier {
    if signal == Signal::Bet && band == ConfidenceBand::High {
        VisibilityTier::Free
    } else {
        VisibilityTier::Pro
    }
}

/// Machine-readable degraded-input tags.
#[derive(Debug, Clone, Default)]
pub struct RiskFlagBuilder {
    flags: Vec<String>,
}

impl RiskFlagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(mut self, input: &str) -> Self {
        self.flags.push(format!("missing:{input}"));
        self
    }

    pub fn missing_all<'a>(mut self, inputs: impl IntoIterator<Item = &'a str>) -> Self {
        for input in inputs {
            self.flags.push(format!("missing:{input}"));
        }
        self
    }

    pub fn stale(mut self, input: &str) -> Self {
        self.flags.push(format!("stale:{input}"));
        self
    }

    pub fn lineup_pending(mut self, pending: bool) -> Self {
        if pending {
            self.flags.push("lineup_pending".to_string());
        }
        self
    }

    pub fn weather_pending(mut self, pending: bool) -> Self {
        if pending {
            self.flags.push("weather_pending".to_string());
        }
        self
    }

    pub fn logic(mut self, tag: &str) -> Self {
        self.flags.push(format!("logic:{tag}"));
        self
    }

    pub fn build(self) -> Vec<String> {
        self.flags
    }
}

/// Top-K factor contributions phrased as short tags, strongest deviation
/// from neutral first.
pub fn build_reasons(factors: &BTreeMap<String, f64>, top_k: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = factors.iter().map(|(k, v)| (k, *v)).collect();
    ranked.sort_by(|a, b| {
        (b.1 - 50.0)
            .abs()
            .partial_cmp(&(a.1 - 50.0).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
        .into_iter()
        .take(top_k)
        .map(|(key, value)| {
            let label = key.trim_end_matches("_score").replace('_', " ");
            if value >= 50.0 {
                format!("strong {label} ({value:.0})")
            } else {
                format!("weak {label} ({value:.0})")
            }
        })
        .collect()
}

/// Expected plate appearances by lineup slot; league-average fallback for
/// unknown slots. Unconfirmed lineups cost 5%.
pub fn expected_pa(batting_order: Option<i64>, confirmed: bool) -> f64 {
    let base = match batting_order {
        Some(1) => 4.8,
        Some(2) => 4.7,
        Some(3) => 4.55,
        Some(4) => 4.45,
        Some(5) => 4.3,
        Some(6) => 4.15,
        Some(7) => 4.0,
        Some(8) => 3.85,
        Some(9) => 3.75,
        _ => 4.1,
    };
    if confirmed {
        base
    } else {
        base * 0.95
    }
}

/// P(X <= k) for X ~ Poisson(lambda).
pub fn poisson_cdf(k: i64, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let mut term = (-lambda).exp();
    let mut total = term;
    for i in 1..=k.max(0) {
        term *= lambda / i as f64;
        total += term;
    }
    clamp(total, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Market;
    use crate::markets::spec::{spec_for, DEFAULT_THRESHOLDS, MARKET_SPECS};

    fn default_spec() -> MarketSpec {
        let mut spec = *spec_for(Market::Ml);
        spec.thresholds = DEFAULT_THRESHOLDS;
        spec
    }

    #[test]
    fn test_factor_score_linear() {
        assert_eq!(factor_score_linear(Some(0.5), 0.0, 1.0), 50.0);
        assert_eq!(factor_score_linear(Some(2.0), 0.0, 1.0), 100.0);
        assert_eq!(factor_score_linear(Some(-1.0), 0.0, 1.0), 0.0);
        assert_eq!(factor_score_linear(None, 0.0, 1.0), 50.0);
    }

    #[test]
    fn test_relative_slope_protects_high_baseline() {
        // same absolute delta scores closer to neutral for a higher baseline
        let low_base = factor_score_relative_slope(-0.02, 0.10, 0.05, 100.0, 10.0, 90.0);
        let high_base = factor_score_relative_slope(-0.02, 0.30, 0.05, 100.0, 10.0, 90.0);
        assert!(high_base > low_base);
        assert!(high_base < 50.0);
    }

    #[test]
    fn test_platoon_advantage_band() {
        let adv = platoon_advantage(Some(0.30), Some(0.20));
        assert!(adv > 50.0 && adv <= 80.0);
        let dis = platoon_advantage(Some(0.20), Some(0.30));
        assert!(dis < 50.0 && dis >= 20.0);
        assert_eq!(platoon_advantage(None, Some(0.25)), 50.0);
    }

    #[test]
    fn test_percentile_score() {
        let pop = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_score(&pop, Some(5.0)), 100.0);
        assert_eq!(percentile_score(&pop, Some(2.5)), 50.0);
        assert_eq!(percentile_score(&pop, Some(0.0)), 0.0);
        assert_eq!(percentile_score(&[], Some(1.0)), 50.0);
    }

    // Worked example: composite 82.0, model_prob 0.24, best price +320
    // (implied 0.238): edge 0.2% misses the BET edge threshold in full
    // mode; score-only mode takes 82 >= 75 as BET.
    #[test]
    fn test_signal_full_vs_score_only_mode() {
        let spec = default_spec();
        let edge = probability_edge_pct(Some(0.24), Some(0.238)).unwrap();
        assert!((edge - 0.2).abs() < 1e-9);
        assert_eq!(assign_signal(&spec, 82.0, Some(edge)), Signal::Skip);
        assert_eq!(assign_signal(&spec, 82.0, None), Signal::Bet);
    }

    // Worked example: K UNDER at score 34 and edge -14% fades.
    #[test]
    fn test_signal_fade() {
        let spec = default_spec();
        let edge = probability_edge_pct(Some(0.38), Some(0.52)).unwrap();
        assert!((edge - -14.0).abs() < 1e-9);
        assert_eq!(assign_signal(&spec, 34.0, Some(edge)), Signal::Fade);
        // band stays LOW under risk flags
        assert_eq!(confidence_band(34.0, 2), ConfidenceBand::Low);
    }

    #[test]
    fn test_confidence_band_degrade() {
        assert_eq!(confidence_band(82.0, 0), ConfidenceBand::High);
        assert_eq!(confidence_band(82.0, 2), ConfidenceBand::Medium);
        assert_eq!(confidence_band(82.0, 3), ConfidenceBand::Low);
        assert_eq!(confidence_band(65.0, 2), ConfidenceBand::Medium);
        assert_eq!(confidence_band(65.0, 3), ConfidenceBand::Low);
    }

    #[test]
    fn test_visibility_tier_rule() {
        assert_eq!(
            visibility_tier(Signal::Bet, ConfidenceBand::High),
            VisibilityTier::Free
        );
        assert_eq!(
            visibility_tier(Signal::Bet, ConfidenceBand::Medium),
            VisibilityTier::Pro
        );
        assert_eq!(
            visibility_tier(Signal::Lean, ConfidenceBand::High),
            VisibilityTier::Pro
        );
    }

    #[test]
    fn test_projection_edge_line_zero_undefined() {
        assert_eq!(projection_edge_pct(Some(5.0), Some(0.0)), None);
        let edge = projection_edge_pct(Some(6.0), Some(5.0)).unwrap();
        assert!((edge - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_edge_hybrid_prefers_probability() {
        let edge = compute_edge(
            OutputType::Hybrid,
            Some(0.5),
            Some(8.0),
            Some(0.4),
            Some(7.0),
        );
        assert!((edge.unwrap() - 10.0).abs() < 1e-9);
        // falls back to projection when no odds
        let edge = compute_edge(OutputType::Hybrid, Some(0.5), Some(8.0), None, Some(8.0));
        assert!((edge.unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_flags_shape() {
        let flags = RiskFlagBuilder::new()
            .missing("opposing_pitcher_features")
            .lineup_pending(true)
            .weather_pending(false)
            .logic("line_zero")
            .build();
        assert_eq!(
            flags,
            vec![
                "missing:opposing_pitcher_features",
                "lineup_pending",
                "logic:line_zero"
            ]
        );
    }

    #[test]
    fn test_build_reasons_orders_by_deviation() {
        let mut factors = BTreeMap::new();
        factors.insert("barrel_score".to_string(), 85.0);
        factors.insert("context_score".to_string(), 52.0);
        factors.insert("contact_score".to_string(), 20.0);
        let reasons = build_reasons(&factors, 2);
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].contains("barrel"));
        assert!(reasons[1].contains("weak contact"));
    }

    #[test]
    fn test_composite_uses_neutral_for_missing() {
        let factors = BTreeMap::from([("a_score".to_string(), 100.0)]);
        let score = composite_score(&factors, &[("a_score", 0.5), ("b_score", 0.5)]);
        assert_eq!(score, 75.0);
    }

    #[test]
    fn test_poisson_cdf() {
        // lambda=1: P(X<=0) = e^-1
        assert!((poisson_cdf(0, 1.0) - (-1.0f64).exp()).abs() < 1e-12);
        assert!(poisson_cdf(10, 1.0) > 0.9999);
        assert_eq!(poisson_cdf(0, 0.0), 1.0);
    }

    #[test]
    fn test_expected_pa_table() {
        assert_eq!(expected_pa(Some(1), true), 4.8);
        assert_eq!(expected_pa(Some(9), true), 3.75);
        assert_eq!(expected_pa(None, true), 4.1);
        assert!(expected_pa(Some(3), false) < expected_pa(Some(3), true));
    }

    #[test]
    fn test_every_spec_signal_consistency() {
        // BET thresholds sit above LEAN, FADE mirrors below
        for spec in &MARKET_SPECS {
            let t = &spec.thresholds;
            assert!(t.bet_min_score > t.lean_min_score);
            assert!(t.bet_min_edge_pct > t.lean_min_edge_pct);
            assert!(t.fade_max_score < t.lean_min_score);
            assert!(t.fade_max_edge_pct < 0.0);
        }
    }
}
