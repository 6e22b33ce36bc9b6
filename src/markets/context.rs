//! Per-date scoring context: games, feature snapshots, lineups and
//! best-available odds, loaded once and shared by every model scoring
//! that date.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::{Game, Market, SelectionSide};
use crate::error::Result;
use crate::features::batter::{self, BatterFeatures};
use crate::features::game_context::{self, GameContext};
use crate::features::pitcher::{self, PitcherFeatures};
use crate::features::team::{self, TeamFeatures};
use crate::fetch::schedule::games_for_date;
use crate::store::{SqlValue, Store};

/// One priced selection side from `market_odds`.
#[derive(Debug, Clone)]
pub struct OddsRow {
    pub game_id: Option<i64>,
    pub event_id: Option<String>,
    pub player_id: Option<i64>,
    pub player_name: Option<String>,
    pub team_id: Option<String>,
    pub opponent_team_id: Option<String>,
    pub selection_key: String,
    pub side: Option<SelectionSide>,
    pub bet_type: Option<String>,
    pub line: Option<f64>,
    pub price_american: i64,
    pub implied_probability: Option<f64>,
    pub sportsbook: String,
}

#[derive(Debug, Clone, Default)]
pub struct LineupEntry {
    pub team_id: Option<String>,
    pub batting_order: Option<i64>,
    pub confirmed: bool,
}

pub struct DateData {
    pub date: NaiveDate,
    pub games: Vec<Game>,
    pub batters: HashMap<i64, BatterFeatures>,
    pub pitchers: HashMap<i64, PitcherFeatures>,
    pub teams: HashMap<String, TeamFeatures>,
    pub contexts: HashMap<i64, GameContext>,
    /// Active lineup entry per (game_id, player_id).
    pub lineups: HashMap<(i64, i64), LineupEntry>,
}

impl DateData {
    pub async fn load(store: &Store, date: NaiveDate) -> Result<Self> {
        let games = games_for_date(store, date).await?;
        let batters = batter::load_for_date(store, date).await?;
        let pitchers = pitcher::load_for_date(store, date).await?;
        let teams = team::load_for_date(store, date).await?;
        let contexts = game_context::load_for_date(store, date).await?;

        let mut lineups = HashMap::new();
        let rows = store
            .fetch_all(
                "SELECT game_id, team_id, player_id, batting_order, confirmed
                 FROM lineups
                 WHERE game_date = $1 AND active_version = 1",
                &[SqlValue::from(date)],
            )
            .await?;
        for row in &rows {
            lineups.insert(
                (row.i64("game_id")?, row.i64("player_id")?),
                LineupEntry {
                    team_id: row.opt_text("team_id")?,
                    batting_order: row.opt_i64("batting_order")?,
                    confirmed: row.flag("confirmed")?,
                },
            );
        }

        Ok(Self {
            date,
            games,
            batters,
            pitchers,
            teams,
            contexts,
            lineups,
        })
    }

    pub fn context(&self, game_id: i64) -> Option<&GameContext> {
        self.contexts.get(&game_id)
    }

    pub fn lineup(&self, game_id: i64, player_id: i64) -> LineupEntry {
        self.lineups.get(&(game_id, player_id)).cloned().unwrap_or_default()
    }

    pub fn lineups_confirmed(&self, game_id: i64) -> bool {
        self.context(game_id)
            .map(|c| c.lineups_confirmed_home && c.lineups_confirmed_away)
            .unwrap_or(false)
    }

    pub fn weather_final(&self, game_id: i64) -> bool {
        self.context(game_id)
            .map(|c| c.weather_temp_f.is_some())
            .unwrap_or(false)
    }

    /// Scoring population for batter markets in one game: players with
    /// features whose team plays here. Confirmed lineup members come
    /// first; without a lineup the probable pool (recent-appearance
    /// feature rows) stands in.
    pub fn batter_universe(&self, game: &Game) -> Vec<(i64, String)> {
        let mut lineup_members: Vec<(i64, String)> = Vec::new();
        for ((game_id, player_id), entry) in &self.lineups {
            if *game_id != game.game_id {
                continue;
            }
            let team = entry
                .team_id
                .clone()
                .or_else(|| self.batters.get(player_id).and_then(|f| f.team_id.clone()));
            if let Some(team) = team {
                lineup_members.push((*player_id, team));
            }
        }
        if !lineup_members.is_empty() {
            lineup_members.sort_unstable();
            lineup_members.dedup();
            return lineup_members;
        }

        let mut probable: Vec<(i64, String)> = self
            .batters
            .values()
            .filter_map(|f| {
                let team = f.team_id.clone()?;
                if team == game.home_team || team == game.away_team {
                    Some((f.player_id, team))
                } else {
                    None
                }
            })
            .collect();
        probable.sort_unstable();
        probable
    }

    /// Probable starters for pitcher markets: both sides.
    pub fn pitcher_universe(&self, game: &Game) -> Vec<(i64, String, String)> {
        let mut out = Vec::new();
        if let Some(id) = game.home_pitcher_id {
            out.push((id, game.home_team.clone(), game.away_team.clone()));
        }
        if let Some(id) = game.away_pitcher_id {
            out.push((id, game.away_team.clone(), game.home_team.clone()));
        }
        out
    }
}

/// Load the best-available odds rows for one market and date, keyed for
/// model joins. Only rows carrying `is_best_available = 1` are returned,
/// one per selection key.
pub async fn best_odds_for_market(
    store: &Store,
    date: NaiveDate,
    market: Market,
) -> Result<Vec<OddsRow>> {
    let rows = store
        .fetch_all(
            "SELECT game_id, event_id, player_id, player_name, team_id, opponent_team_id,
                    selection_key, side, bet_type, line, price_american, implied_probability,
                    sportsbook
             FROM market_odds
             WHERE game_date = $1 AND market = $2 AND is_best_available = 1",
            &[SqlValue::from(date), SqlValue::from(market.as_str())],
        )
        .await?;
    rows.iter()
        .map(|row| {
            Ok(OddsRow {
                game_id: row.opt_i64("game_id")?,
                event_id: row.opt_text("event_id")?,
                player_id: row.opt_i64("player_id")?,
                player_name: row.opt_text("player_name")?,
                team_id: row.opt_text("team_id")?,
                opponent_team_id: row.opt_text("opponent_team_id")?,
                selection_key: row.text("selection_key")?,
                side: row.opt_text("side")?.as_deref().and_then(SelectionSide::parse),
                bet_type: row.opt_text("bet_type")?,
                line: row.opt_f64("line")?,
                price_american: row.i64("price_american")?,
                implied_probability: row.opt_f64("implied_probability")?,
                sportsbook: row.text("sportsbook")?,
            })
        })
        .collect()
}

/// Group odds rows per player for prop markets.
pub fn odds_by_player(rows: &[OddsRow], game_id: i64) -> HashMap<i64, Vec<&OddsRow>> {
    let mut map: HashMap<i64, Vec<&OddsRow>> = HashMap::new();
    for row in rows {
        if row.game_id == Some(game_id) {
            if let Some(pid) = row.player_id {
                map.entry(pid).or_default().push(row);
            }
        }
    }
    map
}

/// Index odds rows by side for game markets.
pub fn odds_by_side(rows: &[OddsRow], game_id: i64) -> HashMap<SelectionSide, &OddsRow> {
    let mut map = HashMap::new();
    for row in rows {
        if row.game_id == Some(game_id) {
            if let Some(side) = row.side {
                map.entry(side).or_insert(row);
            }
        }
    }
    map
}
