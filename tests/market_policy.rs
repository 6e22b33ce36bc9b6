//! Cross-module policy checks: the documented end-to-end scenarios for
//! signal assignment, settlement payouts, closing-line value and the
//! best-available marker, exercised through the public API.

use mlbpredicts::domain::{BetResult, ConfidenceBand, Market, SelectionSide, Signal, VisibilityTier};
use mlbpredicts::grading::{payout_for_settlement, settle_selection};
use mlbpredicts::markets::engine::{
    assign_signal, confidence_band, probability_edge_pct, visibility_tier,
};
use mlbpredicts::markets::spec::{spec_for, MarketSpec, DEFAULT_THRESHOLDS};
use mlbpredicts::odds::{american_to_decimal, american_to_implied, decimal_to_american};

fn with_default_thresholds(market: Market) -> MarketSpec {
    let mut spec = *spec_for(market);
    spec.thresholds = DEFAULT_THRESHOLDS;
    spec
}

// Scenario: batter 592450 on 2024-07-04, composite 82.0, model_prob 0.24,
// best price +320 (implied 0.238). Edge 0.2% sits under the 5% BET edge
// threshold, so full mode skips; score-only mode bets on 82 >= 75.
#[test]
fn hr_yes_full_mode_skips_thin_edge() {
    let spec = with_default_thresholds(Market::Hr);
    let implied = american_to_implied(320).unwrap();
    assert!((implied - 0.238).abs() < 0.001);

    let edge = probability_edge_pct(Some(0.24), Some(implied)).unwrap();
    assert!(edge < 5.0 && edge > 0.0);
    assert_eq!(assign_signal(&spec, 82.0, Some(edge)), Signal::Skip);
    assert_eq!(assign_signal(&spec, 82.0, None), Signal::Bet);
}

// Scenario: pitcher 477132, K line 6.5, model_prob 0.38 against implied
// 0.52: edge -14%, score 34 with two risk flags. FADE with a LOW band.
#[test]
fn k_under_fades_with_low_band() {
    let spec = with_default_thresholds(Market::K);
    let edge = probability_edge_pct(Some(0.38), Some(0.52)).unwrap();
    assert!((edge - -14.0).abs() < 1e-9);

    let signal = assign_signal(&spec, 34.0, Some(edge));
    assert_eq!(signal, Signal::Fade);

    let band = confidence_band(34.0, 2);
    assert_eq!(band, ConfidenceBand::Low);
    assert_eq!(visibility_tier(signal, band), VisibilityTier::Pro);
}

// Scenario: bet logged at +150 (implied 0.400), closing at -110
// (implied 0.524): CLV is -0.124 and a win pays 1.5 units.
#[test]
fn clv_capture_and_unit_payout() {
    let open_implied = american_to_implied(150).unwrap();
    let close_implied = american_to_implied(-110).unwrap();
    assert!((open_implied - 0.400).abs() < 1e-9);
    assert!((close_implied - 0.5238).abs() < 0.0001);

    let clv = open_implied - close_implied;
    assert!((clv - -0.124).abs() < 0.001);

    let (payout, profit) = payout_for_settlement(1.0, Some(150), BetResult::Win);
    assert_eq!(profit, Some(1.5));
    assert_eq!(payout, Some(2.5));
}

// Scenario: three books at +320, +340, +300; +340 carries the lowest
// implied probability (0.2273) and wins the best-available marker.
#[test]
fn best_available_is_lowest_implied() {
    let prices = [320, 340, 300];
    let best = prices
        .iter()
        .min_by(|a, b| {
            american_to_implied(**a)
                .unwrap()
                .partial_cmp(&american_to_implied(**b).unwrap())
                .unwrap()
        })
        .copied()
        .unwrap();
    assert_eq!(best, 340);
    assert!((american_to_implied(340).unwrap() - 0.2273).abs() < 0.0001);
}

#[test]
fn odds_roundtrip_identity_on_integer_prices() {
    for price in [-500, -240, -110, -105, 100, 101, 150, 320, 340, 900, 10_000] {
        let decimal = american_to_decimal(price).unwrap();
        assert_eq!(decimal_to_american(decimal), Some(price), "price {price}");
        let implied = american_to_implied(price).unwrap();
        assert!(implied > 0.0 && implied < 1.0);
    }
}

// Half-line totals never push; integer lines push iff realized == line.
#[test]
fn push_policy_boundaries() {
    assert_eq!(
        settle_selection(Market::Total, Some(SelectionSide::Over), Some(8.5), Some(8.0)),
        BetResult::Loss
    );
    assert_eq!(
        settle_selection(Market::Total, Some(SelectionSide::Over), Some(8.5), Some(9.0)),
        BetResult::Win
    );
    assert_eq!(
        settle_selection(Market::Total, Some(SelectionSide::Over), Some(9.0), Some(9.0)),
        BetResult::Push
    );
    assert_eq!(
        settle_selection(Market::Total, Some(SelectionSide::Under), Some(9.0), Some(9.0)),
        BetResult::Push
    );
}

// The FREE tier is exactly BET + HIGH across every combination.
#[test]
fn visibility_tier_truth_table() {
    for signal in [Signal::Bet, Signal::Lean, Signal::Fade, Signal::Skip] {
        for band in [ConfidenceBand::High, ConfidenceBand::Medium, ConfidenceBand::Low] {
            let tier = visibility_tier(signal, band);
            if signal == Signal::Bet && band == ConfidenceBand::High {
                assert_eq!(tier, VisibilityTier::Free);
            } else {
                assert_eq!(tier, VisibilityTier::Pro);
            }
        }
    }
}

// Signal consistency sweep: assigned signals always satisfy the market's
// thresholds given (score, edge).
#[test]
fn signal_threshold_consistency_sweep() {
    for market in Market::ALL {
        let spec = spec_for(market);
        let t = &spec.thresholds;
        for score in [0.0, 20.0, 35.0, 50.0, 62.0, 75.0, 82.0, 100.0] {
            for edge in [-12.0, -4.0, -1.0, 0.0, 2.6, 5.5, 11.0] {
                match assign_signal(spec, score, Some(edge)) {
                    Signal::Bet => {
                        assert!(score >= t.bet_min_score && edge >= t.bet_min_edge_pct)
                    }
                    Signal::Lean => {
                        assert!(score >= t.lean_min_score && edge >= t.lean_min_edge_pct)
                    }
                    Signal::Fade => {
                        assert!(score <= t.fade_max_score && edge <= t.fade_max_edge_pct)
                    }
                    Signal::Skip => {}
                }
            }
        }
    }
}
