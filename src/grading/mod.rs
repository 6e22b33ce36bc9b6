//! Grading and settlement: market-agnostic dispatch to per-market outcome
//! extractors, `market_outcomes` upserts, bet settlement and closing-line
//! value capture.

pub mod clv;
pub mod game_markets;
pub mod player_props;

use chrono::NaiveDate;
use reqwest::Client;
use tracing::info;

use crate::config::{ApiConfig, ClosingLinePolicy};
use crate::domain::{BetResult, Market, SelectionSide};
use crate::error::Result;
use crate::store::{date_str, now_ts, SqlValue, Store};

// =============================================================================
// Settlement math
// =============================================================================

/// Settle one selection against its realized outcome value.
///
/// Push policy: integer lines push on an exact match; half lines cannot
/// push. ML outcomes store 1 for home win, 0 for away, 0.5 for a tie.
pub fn settle_selection(
    market: Market,
    side: Option<SelectionSide>,
    line: Option<f64>,
    outcome_value: Option<f64>,
) -> BetResult {
    let Some(value) = outcome_value else {
        return BetResult::Pending;
    };
    let side = match side {
        Some(side) => side,
        // HR without an explicit side is the YES convention
        None if market == Market::Hr => SelectionSide::Yes,
        None => return BetResult::Pending,
    };

    match side {
        SelectionSide::Over | SelectionSide::Under => {
            let Some(line) = line else {
                return BetResult::Pending;
            };
            if value > line {
                if side == SelectionSide::Over {
                    BetResult::Win
                } else {
                    BetResult::Loss
                }
            } else if value < line {
                if side == SelectionSide::Under {
                    BetResult::Win
                } else {
                    BetResult::Loss
                }
            } else {
                BetResult::Push
            }
        }
        SelectionSide::Yes | SelectionSide::No => {
            let hit = value >= 1.0;
            if hit == (side == SelectionSide::Yes) {
                BetResult::Win
            } else {
                BetResult::Loss
            }
        }
        SelectionSide::Home | SelectionSide::Away => {
            if (value - 0.5).abs() < f64::EPSILON {
                return BetResult::Push;
            }
            let home_won = value >= 1.0;
            if home_won == (side == SelectionSide::Home) {
                BetResult::Win
            } else {
                BetResult::Loss
            }
        }
    }
}

/// `(payout, profit)` under the 1-unit stake convention: decimal odds − 1
/// on a win, −stake on a loss, zero on push/void.
pub fn payout_for_settlement(
    stake: f64,
    american_odds: Option<i64>,
    settlement: BetResult,
) -> (Option<f64>, Option<f64>) {
    match settlement {
        BetResult::Pending => (None, None),
        BetResult::Push | BetResult::Void => (Some(stake), Some(0.0)),
        BetResult::Loss => (Some(0.0), Some(-stake)),
        BetResult::Win => {
            let Some(odds) = american_odds.filter(|o| *o != 0) else {
                return (None, None);
            };
            let profit = if odds > 0 {
                stake * odds as f64 / 100.0
            } else {
                stake * 100.0 / odds.unsigned_abs() as f64
            };
            (
                Some(((stake + profit) * 10_000.0).round() / 10_000.0),
                Some((profit * 10_000.0).round() / 10_000.0),
            )
        }
    }
}

// =============================================================================
// Selection candidates and outcome rows
// =============================================================================

/// One selection to grade, harvested from active model scores and
/// pending bets.
#[derive(Debug, Clone)]
pub struct SelectionCandidate {
    pub game_date: NaiveDate,
    pub market: Market,
    pub game_id: i64,
    pub entity_type: Option<String>,
    pub player_id: Option<i64>,
    pub team_id: Option<String>,
    pub selection_key: String,
    pub side: Option<SelectionSide>,
    pub bet_type: Option<String>,
    pub line: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OutcomeRow {
    pub candidate: SelectionCandidate,
    pub outcome_value: f64,
    pub outcome_text: String,
}

async fn selection_candidates(store: &Store, date: NaiveDate) -> Result<Vec<SelectionCandidate>> {
    let mut candidates = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let score_rows = store
        .fetch_all(
            "SELECT game_date, market, game_id, entity_type, player_id, team_id,
                    selection_key, side, bet_type, line
             FROM model_scores
             WHERE game_date = $1 AND is_active = 1",
            &[SqlValue::from(date)],
        )
        .await?;
    let bet_rows = store
        .fetch_all(
            "SELECT game_date, market, game_id, CAST(NULL AS TEXT) AS entity_type, player_id,
                    team_id, selection_key, side, bet_type, line
             FROM bets
             WHERE game_date = $1 AND result = 'pending'",
            &[SqlValue::from(date)],
        )
        .await?;

    for row in score_rows.iter().chain(bet_rows.iter()) {
        let Some(market) = Market::parse(&row.text("market")?) else {
            continue;
        };
        let Some(game_id) = row.opt_i64("game_id")? else {
            continue;
        };
        let selection_key = row.text("selection_key")?;
        if !seen.insert((market, game_id, selection_key.clone())) {
            continue;
        }
        candidates.push(SelectionCandidate {
            game_date: date,
            market,
            game_id,
            entity_type: row.opt_text("entity_type")?,
            player_id: row.opt_i64("player_id")?,
            team_id: row.opt_text("team_id")?,
            selection_key,
            side: row.opt_text("side")?.as_deref().and_then(SelectionSide::parse),
            bet_type: row.opt_text("bet_type")?,
            line: row.opt_f64("line")?,
        });
    }
    Ok(candidates)
}

async fn upsert_outcomes(store: &Store, outcomes: &[OutcomeRow]) -> Result<u64> {
    if outcomes.is_empty() {
        return Ok(0);
    }
    let settled_at = now_ts();
    let columns = [
        "game_date",
        "market",
        "game_id",
        "entity_type",
        "player_id",
        "team_id",
        "selection_key",
        "side",
        "bet_type",
        "line",
        "outcome_value",
        "outcome_text",
        "settled_at",
    ];
    let rows: Vec<Vec<SqlValue>> = outcomes
        .iter()
        .map(|o| {
            let c = &o.candidate;
            vec![
                SqlValue::from(c.game_date),
                SqlValue::from(c.market.as_str()),
                SqlValue::from(c.game_id),
                SqlValue::from(c.entity_type.clone()),
                SqlValue::from(c.player_id),
                SqlValue::from(c.team_id.clone()),
                SqlValue::from(c.selection_key.clone()),
                SqlValue::from(c.side.map(|s| s.as_str())),
                SqlValue::from(c.bet_type.clone()),
                SqlValue::from(c.line),
                SqlValue::from(o.outcome_value),
                SqlValue::from(o.outcome_text.clone()),
                SqlValue::from(settled_at.clone()),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "market_outcomes",
            &columns,
            &["market", "game_id", "selection_key"],
            &rows,
        )
        .await
}

// =============================================================================
// Bet settlement + CLV
// =============================================================================

#[derive(Debug, Default)]
pub struct GradeSummary {
    pub selections_considered: usize,
    pub player_outcomes: usize,
    pub game_outcomes: usize,
    pub outcomes_upserted: u64,
    pub pending_bets: usize,
    pub settled: usize,
    pub still_pending: usize,
}

async fn settle_bets(
    store: &Store,
    date: NaiveDate,
    outcomes: &[OutcomeRow],
    policy: ClosingLinePolicy,
) -> Result<(usize, usize, usize)> {
    let pending = store
        .fetch_all(
            "SELECT id, market, game_id, selection_key, side, line, stake, odds,
                    implied_prob_open
             FROM bets
             WHERE game_date = $1 AND result = 'pending'",
            &[SqlValue::from(date)],
        )
        .await?;
    if pending.is_empty() {
        return Ok((0, 0, 0));
    }

    let by_selection: std::collections::HashMap<(Market, i64, &str), &OutcomeRow> = outcomes
        .iter()
        .map(|o| {
            (
                (
                    o.candidate.market,
                    o.candidate.game_id,
                    o.candidate.selection_key.as_str(),
                ),
                o,
            )
        })
        .collect();

    let mut settled = 0usize;
    let mut still_pending = 0usize;
    for bet in &pending {
        let Some(market) = Market::parse(&bet.text("market")?) else {
            still_pending += 1;
            continue;
        };
        let game_id = bet.opt_i64("game_id")?.unwrap_or(0);
        let selection_key = bet.text("selection_key")?;
        let Some(outcome) = by_selection.get(&(market, game_id, selection_key.as_str())) else {
            still_pending += 1;
            continue;
        };

        let side = bet.opt_text("side")?.as_deref().and_then(SelectionSide::parse);
        let line = bet.opt_f64("line")?;
        let settlement = settle_selection(market, side, line, Some(outcome.outcome_value));
        if settlement == BetResult::Pending {
            still_pending += 1;
            continue;
        }

        let stake = bet.opt_f64("stake")?.unwrap_or(1.0);
        let odds = bet.opt_i64("odds")?;
        let (payout, profit) = payout_for_settlement(stake, odds, settlement);

        // closing line per the configured policy, for CLV
        let closing = clv::resolve_closing_line(store, date, market, &selection_key, policy).await?;
        let implied_open = bet
            .opt_f64("implied_prob_open")?
            .or_else(|| odds.and_then(crate::odds::american_to_implied));
        let implied_close = closing.as_ref().and_then(|c| c.implied_probability);
        let clv_value = match (implied_open, implied_close) {
            (Some(open), Some(close)) => Some(open - close),
            _ => None,
        };
        let line_delta = match (line, closing.as_ref().and_then(|c| c.line)) {
            (Some(open_line), Some(close_line)) => Some(close_line - open_line),
            _ => None,
        };

        store
            .execute(
                "UPDATE bets
                 SET result = $1, payout = $2, profit_units = $3,
                     implied_prob_close = $4, clv_open_to_close = $5, line_delta = $6,
                     settled_at = $7
                 WHERE id = $8",
                &[
                    SqlValue::from(settlement.as_str()),
                    SqlValue::from(payout),
                    SqlValue::from(profit),
                    SqlValue::from(implied_close),
                    SqlValue::from(clv_value),
                    SqlValue::from(line_delta),
                    SqlValue::from(now_ts()),
                    SqlValue::from(bet.i64("id")?),
                ],
            )
            .await?;
        settled += 1;
    }
    Ok((pending.len(), settled, still_pending))
}

/// Grade every gradeable selection for a date: extract outcomes, write
/// `market_outcomes`, settle pending bets and capture CLV. Games whose
/// status is not final/cancelled are refused, not errors.
pub async fn grade_date(
    store: &Store,
    client: &Client,
    api_cfg: &ApiConfig,
    date: NaiveDate,
    policy: ClosingLinePolicy,
) -> Result<GradeSummary> {
    let candidates = selection_candidates(store, date).await?;
    let mut summary = GradeSummary {
        selections_considered: candidates.len(),
        ..Default::default()
    };

    let player_outcomes =
        player_props::grade_player_prop_outcomes(store, client, api_cfg, &candidates).await?;
    let game_outcomes =
        game_markets::grade_game_market_outcomes(store, client, api_cfg, &candidates).await?;
    summary.player_outcomes = player_outcomes.len();
    summary.game_outcomes = game_outcomes.len();

    let mut all = player_outcomes;
    all.extend(game_outcomes);
    summary.outcomes_upserted = upsert_outcomes(store, &all).await?;

    let (pending, settled, still_pending) = settle_bets(store, date, &all, policy).await?;
    summary.pending_bets = pending;
    summary.settled = settled;
    summary.still_pending = still_pending;

    info!(
        date = %date_str(date),
        selections = summary.selections_considered,
        outcomes = summary.outcomes_upserted,
        settled = summary.settled,
        "grading complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_under_with_push() {
        // integer line pushes on exact
        assert_eq!(
            settle_selection(Market::Total, Some(SelectionSide::Over), Some(9.0), Some(9.0)),
            BetResult::Push
        );
        // half line cannot push
        assert_eq!(
            settle_selection(Market::K, Some(SelectionSide::Over), Some(6.5), Some(7.0)),
            BetResult::Win
        );
        assert_eq!(
            settle_selection(Market::K, Some(SelectionSide::Under), Some(6.5), Some(7.0)),
            BetResult::Loss
        );
    }

    #[test]
    fn test_yes_no_settlement() {
        assert_eq!(
            settle_selection(Market::Hr, Some(SelectionSide::Yes), None, Some(1.0)),
            BetResult::Win
        );
        assert_eq!(
            settle_selection(Market::Hr, Some(SelectionSide::Yes), None, Some(0.0)),
            BetResult::Loss
        );
        assert_eq!(
            settle_selection(Market::Hr, Some(SelectionSide::No), None, Some(2.0)),
            BetResult::Loss
        );
        // HR side defaults to YES
        assert_eq!(
            settle_selection(Market::Hr, None, None, Some(1.0)),
            BetResult::Win
        );
    }

    #[test]
    fn test_moneyline_settlement() {
        assert_eq!(
            settle_selection(Market::Ml, Some(SelectionSide::Home), None, Some(1.0)),
            BetResult::Win
        );
        assert_eq!(
            settle_selection(Market::Ml, Some(SelectionSide::Away), None, Some(1.0)),
            BetResult::Loss
        );
        assert_eq!(
            settle_selection(Market::Ml, Some(SelectionSide::Away), None, Some(0.0)),
            BetResult::Win
        );
        // ties push
        assert_eq!(
            settle_selection(Market::F5Ml, Some(SelectionSide::Home), None, Some(0.5)),
            BetResult::Push
        );
    }

    #[test]
    fn test_missing_outcome_is_pending() {
        assert_eq!(
            settle_selection(Market::K, Some(SelectionSide::Over), Some(6.5), None),
            BetResult::Pending
        );
    }

    // Worked example: a win at +150 pays 1.5 units on a 1-unit stake.
    #[test]
    fn test_payout_win_plus_odds() {
        let (payout, profit) = payout_for_settlement(1.0, Some(150), BetResult::Win);
        assert_eq!(profit, Some(1.5));
        assert_eq!(payout, Some(2.5));
    }

    #[test]
    fn test_payout_win_minus_odds() {
        let (_, profit) = payout_for_settlement(1.0, Some(-110), BetResult::Win);
        assert!((profit.unwrap() - 100.0 / 110.0).abs() < 1e-4);
    }

    #[test]
    fn test_payout_loss_push_void() {
        assert_eq!(
            payout_for_settlement(1.0, Some(150), BetResult::Loss),
            (Some(0.0), Some(-1.0))
        );
        assert_eq!(
            payout_for_settlement(1.0, Some(150), BetResult::Push),
            (Some(1.0), Some(0.0))
        );
        assert_eq!(
            payout_for_settlement(1.0, None, BetResult::Void),
            (Some(1.0), Some(0.0))
        );
    }
}
