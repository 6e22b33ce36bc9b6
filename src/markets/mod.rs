//! Market model dispatch: the spec registry, the common capability set
//! every model implements, and the scored-selection row they all emit.
//!
//! The registry is a process-local constant built at startup; markets
//! resolve to model objects, never to string-keyed lookups at score time.

pub mod context;
pub mod engine;
pub mod spec;

mod f5;
mod game_common;
mod hits;
mod hr;
mod k;
mod ml;
mod outs;
mod tb;
mod team_total;
mod totals;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use crate::domain::{ConfidenceBand, EntityType, Market, SelectionSide, Signal, VisibilityTier};
use crate::error::Result;
use crate::markets::context::DateData;
use crate::markets::spec::{spec_for, MarketSpec};
use crate::store::Store;

/// One scored selection row, drafted in memory before persistence.
#[derive(Debug, Clone)]
pub struct ScoredSelection {
    pub market: Market,
    pub entity_type: EntityType,
    pub game_id: i64,
    pub event_id: Option<String>,
    pub player_id: Option<i64>,
    pub player_name: Option<String>,
    pub team_id: Option<String>,
    pub opponent_team_id: Option<String>,
    pub selection_key: String,
    pub side: Option<SelectionSide>,
    pub bet_type: String,
    pub line: Option<f64>,
    pub model_score: f64,
    pub model_prob: Option<f64>,
    pub model_projection: Option<f64>,
    pub book_implied_prob: Option<f64>,
    pub edge: Option<f64>,
    pub signal: Signal,
    pub confidence_band: ConfidenceBand,
    pub visibility_tier: VisibilityTier,
    pub factors: BTreeMap<String, f64>,
    pub calibration: Option<String>,
    pub reasons: Vec<String>,
    pub risk_flags: Vec<String>,
    pub lineup_confirmed: bool,
    pub weather_final: bool,
}

impl ScoredSelection {
    /// Factors serialized for storage, including the calibration mapping
    /// so backtests can re-calibrate.
    pub fn factors_json(&self) -> serde_json::Value {
        let mut value = json!(self.factors);
        if let Some(calibration) = &self.calibration {
            value["calibration"] = json!(calibration);
        }
        value
    }
}

/// Common capability set implemented by every market model.
#[async_trait]
pub trait MarketModel: Send + Sync {
    fn market(&self) -> Market;

    fn spec(&self) -> &'static MarketSpec {
        spec_for(self.market())
    }

    /// Score every selection this market offers for the date. Odds are
    /// optional input: rows without a priced selection carry null book
    /// fields and a score-only signal.
    async fn score(
        &self,
        store: &Store,
        date: NaiveDate,
        data: &DateData,
    ) -> Result<Vec<ScoredSelection>>;
}

/// Process-local model registry, one entry per market.
pub struct ModelRegistry {
    models: Vec<Box<dyn MarketModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: vec![
                Box::new(hr::HrModel),
                Box::new(k::KModel),
                Box::new(hits::HitsModel::ones()),
                Box::new(hits::HitsModel::lines()),
                Box::new(tb::TbModel),
                Box::new(outs::OutsModel),
                Box::new(ml::MlModel),
                Box::new(totals::TotalsModel),
                Box::new(f5::F5MlModel),
                Box::new(f5::F5TotalModel),
                Box::new(team_total::TeamTotalModel),
            ],
        }
    }

    pub fn get(&self, market: Market) -> Option<&dyn MarketModel> {
        self.models
            .iter()
            .find(|m| m.market() == market)
            .map(|m| m.as_ref())
    }

    pub fn markets(&self) -> Vec<Market> {
        self.models.iter().map(|m| m.market()).collect()
    }

    pub fn lineup_sensitive_markets(&self) -> Vec<Market> {
        self.models
            .iter()
            .filter(|m| m.spec().lineup_sensitive())
            .map(|m| m.market())
            .collect()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_market() {
        let registry = ModelRegistry::new();
        for market in Market::ALL {
            assert!(registry.get(market).is_some(), "missing model for {market}");
        }
        assert_eq!(registry.markets().len(), Market::ALL.len());
    }

    #[test]
    fn test_factors_json_carries_calibration() {
        let row = ScoredSelection {
            market: Market::Hr,
            entity_type: EntityType::Batter,
            game_id: 1,
            event_id: None,
            player_id: Some(592450),
            player_name: None,
            team_id: None,
            opponent_team_id: None,
            selection_key: "HR|player:592450|YES".into(),
            side: Some(SelectionSide::Yes),
            bet_type: "HR_YES".into(),
            line: None,
            model_score: 82.0,
            model_prob: Some(0.24),
            model_projection: None,
            book_implied_prob: None,
            edge: None,
            signal: Signal::Bet,
            confidence_band: ConfidenceBand::High,
            visibility_tier: VisibilityTier::Free,
            factors: BTreeMap::from([("barrel_score".to_string(), 82.0)]),
            calibration: Some("linear:0.02+0.33*score/100".into()),
            reasons: vec![],
            risk_flags: vec![],
            lineup_confirmed: true,
            weather_final: true,
        };
        let json = row.factors_json();
        assert_eq!(json["barrel_score"], 82.0);
        assert_eq!(json["calibration"], "linear:0.02+0.33*score/100");
    }
}
