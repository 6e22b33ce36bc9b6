//! Core domain types shared across fetchers, feature builders, models and
//! the grader.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Market: the eleven supported market codes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    Hr,
    K,
    Hits1P,
    HitsLine,
    TbLine,
    OutsRecorded,
    Ml,
    Total,
    F5Ml,
    F5Total,
    TeamTotal,
}

impl Market {
    pub const ALL: [Market; 11] = [
        Market::Hr,
        Market::K,
        Market::Hits1P,
        Market::HitsLine,
        Market::TbLine,
        Market::OutsRecorded,
        Market::Ml,
        Market::Total,
        Market::F5Ml,
        Market::F5Total,
        Market::TeamTotal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hr => "HR",
            Self::K => "K",
            Self::Hits1P => "HITS_1P",
            Self::HitsLine => "HITS_LINE",
            Self::TbLine => "TB_LINE",
            Self::OutsRecorded => "OUTS_RECORDED",
            Self::Ml => "ML",
            Self::Total => "TOTAL",
            Self::F5Ml => "F5_ML",
            Self::F5Total => "F5_TOTAL",
            Self::TeamTotal => "TEAM_TOTAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "HR" => Some(Self::Hr),
            "K" | "KS" | "SO" => Some(Self::K),
            "HITS_1P" => Some(Self::Hits1P),
            "HITS_LINE" => Some(Self::HitsLine),
            "TB_LINE" => Some(Self::TbLine),
            "OUTS_RECORDED" => Some(Self::OutsRecorded),
            "ML" => Some(Self::Ml),
            "TOTAL" | "TOTALS" => Some(Self::Total),
            "F5_ML" | "F5ML" => Some(Self::F5Ml),
            "F5_TOTAL" | "F5TOTAL" => Some(Self::F5Total),
            "TEAM_TOTAL" => Some(Self::TeamTotal),
            _ => None,
        }
    }

    pub fn is_player_prop(self) -> bool {
        matches!(
            self,
            Self::Hr | Self::K | Self::Hits1P | Self::HitsLine | Self::TbLine | Self::OutsRecorded
        )
    }

    pub fn is_game_market(self) -> bool {
        !self.is_player_prop()
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EntityType
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Batter,
    Pitcher,
    Team,
    Game,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batter => "batter",
            Self::Pitcher => "pitcher",
            Self::Team => "team",
            Self::Game => "game",
        }
    }
}

// =============================================================================
// Signal / confidence / visibility
// =============================================================================

/// Ordered signal tiers. BET is the strongest positive recommendation,
/// FADE the negative counterpart, LEAN moderate, SKIP no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Bet,
    Lean,
    Fade,
    Skip,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bet => "BET",
            Self::Lean => "LEAN",
            Self::Fade => "FADE",
            Self::Skip => "SKIP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BET" => Some(Self::Bet),
            "LEAN" => Some(Self::Lean),
            "FADE" => Some(Self::Fade),
            "SKIP" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// One step down (HIGH → MEDIUM → LOW → LOW).
    pub fn degraded(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityTier {
    Free,
    Pro,
}

impl VisibilityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
        }
    }
}

// =============================================================================
// SelectionSide: one bettable side of a selection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionSide {
    Over,
    Under,
    Yes,
    No,
    Home,
    Away,
}

impl SelectionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Over => "OVER",
            Self::Under => "UNDER",
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Home => "HOME",
            Self::Away => "AWAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OVER" => Some(Self::Over),
            "UNDER" => Some(Self::Under),
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            "HOME" => Some(Self::Home),
            "AWAY" => Some(Self::Away),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Over => Self::Under,
            Self::Under => Self::Over,
            Self::Yes => Self::No,
            Self::No => Self::Yes,
            Self::Home => Self::Away,
            Self::Away => Self::Home,
        }
    }
}

// =============================================================================
// GameStatus: forward-only state machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
    Cancelled,
    Postponed,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Final => "final",
            Self::Cancelled => "cancelled",
            Self::Postponed => "postponed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" | "pre-game" | "warmup" => Some(Self::Scheduled),
            "live" | "in progress" => Some(Self::Live),
            "final" | "game over" | "completed" | "completed early" => Some(Self::Final),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "postponed" => Some(Self::Postponed),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::Live => 1,
            Self::Postponed => 2,
            Self::Cancelled => 3,
            Self::Final => 3,
        }
    }

    /// Game status only ever moves forward across re-fetches.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        if self == next {
            return true;
        }
        next.rank() > self.rank() || (self == Self::Postponed && next == Self::Scheduled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Final | Self::Cancelled)
    }
}

// =============================================================================
// BetResult
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
    Push,
    Void,
}

impl BetResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Push => "push",
            Self::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "win" => Some(Self::Win),
            "loss" => Some(Self::Loss),
            "push" => Some(Self::Push),
            "void" => Some(Self::Void),
            _ => None,
        }
    }

    pub fn is_settled(self) -> bool {
        self != Self::Pending
    }
}

// =============================================================================
// Game row
// =============================================================================

/// One scheduled or completed game. `(game_date, home_team, away_team)`
/// identifies one game per date; `game_id` is the stable MLB identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub game_time: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub stadium_id: Option<i64>,
    pub home_pitcher_id: Option<i64>,
    pub away_pitcher_id: Option<i64>,
    pub home_pitcher_name: Option<String>,
    pub away_pitcher_name: Option<String>,
    pub home_pitcher_hand: Option<String>,
    pub away_pitcher_hand: Option<String>,
    pub umpire_name: Option<String>,
    pub status: GameStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

impl Game {
    /// Opposing starter for a batting team, if the team plays in this game.
    pub fn opposing_pitcher(&self, batting_team: &str) -> Option<i64> {
        if batting_team == self.home_team {
            self.away_pitcher_id
        } else if batting_team == self.away_team {
            self.home_pitcher_id
        } else {
            None
        }
    }

    pub fn opposing_pitcher_hand(&self, batting_team: &str) -> Option<&str> {
        if batting_team == self.home_team {
            self.away_pitcher_hand.as_deref()
        } else if batting_team == self.away_team {
            self.home_pitcher_hand.as_deref()
        } else {
            None
        }
    }

    pub fn opponent_of(&self, team: &str) -> Option<&str> {
        if team == self.home_team {
            Some(self.away_team.as_str())
        } else if team == self.away_team {
            Some(self.home_team.as_str())
        } else {
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_roundtrip() {
        for market in Market::ALL {
            assert_eq!(Market::parse(market.as_str()), Some(market));
        }
        assert_eq!(Market::parse("totals"), Some(Market::Total));
        assert!(Market::parse("RBI").is_none());
    }

    #[test]
    fn test_status_forward_only() {
        use GameStatus::*;
        assert!(Scheduled.can_transition_to(Live));
        assert!(Scheduled.can_transition_to(Final));
        assert!(Live.can_transition_to(Final));
        assert!(!Final.can_transition_to(Scheduled));
        assert!(!Final.can_transition_to(Live));
        // postponed games get rescheduled
        assert!(Postponed.can_transition_to(Scheduled));
    }

    #[test]
    fn test_confidence_degrade_saturates() {
        assert_eq!(ConfidenceBand::High.degraded(), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::Medium.degraded(), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::Low.degraded(), ConfidenceBand::Low);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(SelectionSide::Over.opposite(), SelectionSide::Under);
        assert_eq!(SelectionSide::Yes.opposite(), SelectionSide::No);
        assert_eq!(SelectionSide::Home.opposite(), SelectionSide::Away);
    }

    #[test]
    fn test_opposing_pitcher_lookup() {
        let game = Game {
            game_id: 776123,
            game_date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            game_time: None,
            home_team: "NYY".into(),
            away_team: "BOS".into(),
            stadium_id: Some(19),
            home_pitcher_id: Some(111),
            away_pitcher_id: Some(222),
            home_pitcher_name: None,
            away_pitcher_name: None,
            home_pitcher_hand: Some("R".into()),
            away_pitcher_hand: Some("L".into()),
            umpire_name: None,
            status: GameStatus::Scheduled,
            home_score: None,
            away_score: None,
        };
        assert_eq!(game.opposing_pitcher("NYY"), Some(222));
        assert_eq!(game.opposing_pitcher("BOS"), Some(111));
        assert_eq!(game.opposing_pitcher("LAD"), None);
        assert_eq!(game.opposing_pitcher_hand("NYY"), Some("L"));
    }
}
