//! Market specification registry: one immutable record per market code,
//! built into the binary and looked up at startup.

use crate::domain::{EntityType, Market};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Probability,
    Projection,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMethod {
    ProbVsImplied,
    ProjectionVsLine,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineupRequirement {
    Required,
    Recommended,
    NotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDataPolicy {
    DegradeConfidence,
    Skip,
    StoreWithRiskFlags,
}

/// Signal thresholds. Scores are on the 0–100 composite scale, edges in
/// percent. FADE mirrors BET on the negative side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub bet_min_score: f64,
    pub bet_min_edge_pct: f64,
    pub lean_min_score: f64,
    pub lean_min_edge_pct: f64,
    pub fade_max_score: f64,
    pub fade_max_edge_pct: f64,
}

pub const DEFAULT_THRESHOLDS: Thresholds = Thresholds {
    bet_min_score: 75.0,
    bet_min_edge_pct: 5.0,
    lean_min_score: 60.0,
    lean_min_edge_pct: 2.5,
    fade_max_score: 35.0,
    fade_max_edge_pct: -3.0,
};

pub const CONSERVATIVE_THRESHOLDS: Thresholds = Thresholds {
    bet_min_score: 78.0,
    bet_min_edge_pct: 6.0,
    lean_min_score: 64.0,
    lean_min_edge_pct: 3.5,
    fade_max_score: 32.0,
    fade_max_edge_pct: -4.0,
};

pub const AGGRESSIVE_THRESHOLDS: Thresholds = Thresholds {
    bet_min_score: 72.0,
    bet_min_edge_pct: 4.0,
    lean_min_score: 58.0,
    lean_min_edge_pct: 2.0,
    fade_max_score: 38.0,
    fade_max_edge_pct: -2.5,
};

#[derive(Debug, Clone, Copy)]
pub struct MarketSpec {
    pub market: Market,
    pub entity_type: EntityType,
    pub required_feature_tables: &'static [&'static str],
    pub output_type: OutputType,
    pub edge_method: EdgeMethod,
    pub thresholds: Thresholds,
    pub lineup_requirement: LineupRequirement,
    pub missing_data_policy: MissingDataPolicy,
    pub weather_recommended: bool,
}

impl MarketSpec {
    pub fn lineup_sensitive(&self) -> bool {
        self.lineup_requirement != LineupRequirement::NotRequired
    }
}

const BATTER_TABLES: &[&str] = &[
    "batter_daily_features",
    "pitcher_daily_features",
    "game_context_features",
];
const PITCHER_TABLES: &[&str] = &[
    "pitcher_daily_features",
    "team_daily_features",
    "game_context_features",
];
const GAME_TABLES: &[&str] = &[
    "pitcher_daily_features",
    "team_daily_features",
    "game_context_features",
];
const TEAM_TABLES: &[&str] = &[
    "team_daily_features",
    "pitcher_daily_features",
    "game_context_features",
];

pub const MARKET_SPECS: [MarketSpec; 11] = [
    MarketSpec {
        market: Market::Hr,
        entity_type: EntityType::Batter,
        required_feature_tables: BATTER_TABLES,
        output_type: OutputType::Probability,
        edge_method: EdgeMethod::ProbVsImplied,
        thresholds: CONSERVATIVE_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::K,
        entity_type: EntityType::Pitcher,
        required_feature_tables: PITCHER_TABLES,
        output_type: OutputType::Hybrid,
        edge_method: EdgeMethod::Hybrid,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::Hits1P,
        entity_type: EntityType::Batter,
        required_feature_tables: BATTER_TABLES,
        output_type: OutputType::Probability,
        edge_method: EdgeMethod::ProbVsImplied,
        thresholds: AGGRESSIVE_THRESHOLDS,
        lineup_requirement: LineupRequirement::Required,
        missing_data_policy: MissingDataPolicy::DegradeConfidence,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::HitsLine,
        entity_type: EntityType::Batter,
        required_feature_tables: BATTER_TABLES,
        output_type: OutputType::Hybrid,
        edge_method: EdgeMethod::Hybrid,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Required,
        missing_data_policy: MissingDataPolicy::DegradeConfidence,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::TbLine,
        entity_type: EntityType::Batter,
        required_feature_tables: BATTER_TABLES,
        output_type: OutputType::Hybrid,
        edge_method: EdgeMethod::Hybrid,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Required,
        missing_data_policy: MissingDataPolicy::DegradeConfidence,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::OutsRecorded,
        entity_type: EntityType::Pitcher,
        required_feature_tables: PITCHER_TABLES,
        output_type: OutputType::Projection,
        edge_method: EdgeMethod::ProjectionVsLine,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::Ml,
        entity_type: EntityType::Game,
        required_feature_tables: GAME_TABLES,
        output_type: OutputType::Probability,
        edge_method: EdgeMethod::ProbVsImplied,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::Total,
        entity_type: EntityType::Game,
        required_feature_tables: GAME_TABLES,
        output_type: OutputType::Projection,
        edge_method: EdgeMethod::ProjectionVsLine,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::F5Ml,
        entity_type: EntityType::Game,
        required_feature_tables: GAME_TABLES,
        output_type: OutputType::Probability,
        edge_method: EdgeMethod::ProbVsImplied,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::F5Total,
        entity_type: EntityType::Game,
        required_feature_tables: GAME_TABLES,
        output_type: OutputType::Projection,
        edge_method: EdgeMethod::ProjectionVsLine,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
    MarketSpec {
        market: Market::TeamTotal,
        entity_type: EntityType::Team,
        required_feature_tables: TEAM_TABLES,
        output_type: OutputType::Projection,
        edge_method: EdgeMethod::ProjectionVsLine,
        thresholds: DEFAULT_THRESHOLDS,
        lineup_requirement: LineupRequirement::Recommended,
        missing_data_policy: MissingDataPolicy::StoreWithRiskFlags,
        weather_recommended: true,
    },
];

pub fn spec_for(market: Market) -> &'static MarketSpec {
    MARKET_SPECS
        .iter()
        .find(|s| s.market == market)
        .expect("every market has a spec")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_market_has_a_spec() {
        for market in Market::ALL {
            let spec = spec_for(market);
            assert_eq!(spec.market, market);
            assert!(!spec.required_feature_tables.is_empty());
        }
    }

    #[test]
    fn test_preset_assignment() {
        assert_eq!(spec_for(Market::Hr).thresholds, CONSERVATIVE_THRESHOLDS);
        assert_eq!(spec_for(Market::Hits1P).thresholds, AGGRESSIVE_THRESHOLDS);
        assert_eq!(spec_for(Market::Ml).thresholds, DEFAULT_THRESHOLDS);
    }

    #[test]
    fn test_lineup_sensitivity() {
        assert!(spec_for(Market::Hits1P).lineup_sensitive());
        assert!(spec_for(Market::Hr).lineup_sensitive());
    }
}
