//! Batter daily feature snapshots.
//!
//! Pool priority per date: active lineups, then batter prop odds, then
//! batters recently seen for the scheduled teams. Every metric reads the
//! latest window row with `stat_date <= game_date`.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::error::Result;
use crate::features::{BuilderSummary, FEATURE_LOOKBACK_DAYS};
use crate::store::{date_str, SqlValue, Store, StoreRow};

#[derive(Debug, Clone, Default)]
pub struct BatterFeatures {
    pub player_id: i64,
    pub team_id: Option<String>,
    pub bats: Option<String>,
    pub pa_7: Option<f64>,
    pub pa_14: Option<f64>,
    pub pa_30: Option<f64>,
    pub k_pct_7: Option<f64>,
    pub k_pct_14: Option<f64>,
    pub k_pct_30: Option<f64>,
    pub bb_pct_7: Option<f64>,
    pub bb_pct_14: Option<f64>,
    pub bb_pct_30: Option<f64>,
    pub barrel_pct_7: Option<f64>,
    pub barrel_pct_14: Option<f64>,
    pub barrel_pct_30: Option<f64>,
    pub hard_hit_pct_7: Option<f64>,
    pub hard_hit_pct_14: Option<f64>,
    pub hard_hit_pct_30: Option<f64>,
    pub avg_exit_velo_7: Option<f64>,
    pub avg_exit_velo_14: Option<f64>,
    pub avg_exit_velo_30: Option<f64>,
    pub avg_launch_angle_7: Option<f64>,
    pub avg_launch_angle_14: Option<f64>,
    pub avg_launch_angle_30: Option<f64>,
    pub sweet_spot_pct_7: Option<f64>,
    pub sweet_spot_pct_14: Option<f64>,
    pub sweet_spot_pct_30: Option<f64>,
    pub fly_ball_pct_7: Option<f64>,
    pub fly_ball_pct_14: Option<f64>,
    pub fly_ball_pct_30: Option<f64>,
    pub line_drive_pct_7: Option<f64>,
    pub line_drive_pct_14: Option<f64>,
    pub line_drive_pct_30: Option<f64>,
    pub gb_pct_7: Option<f64>,
    pub gb_pct_14: Option<f64>,
    pub gb_pct_30: Option<f64>,
    pub pull_pct_7: Option<f64>,
    pub pull_pct_14: Option<f64>,
    pub pull_pct_30: Option<f64>,
    pub iso_7: Option<f64>,
    pub iso_14: Option<f64>,
    pub iso_30: Option<f64>,
    pub slg_7: Option<f64>,
    pub slg_14: Option<f64>,
    pub slg_30: Option<f64>,
    pub ba_7: Option<f64>,
    pub ba_14: Option<f64>,
    pub ba_30: Option<f64>,
    pub hit_rate_7: Option<f64>,
    pub hit_rate_14: Option<f64>,
    pub hit_rate_30: Option<f64>,
    pub tb_per_pa_7: Option<f64>,
    pub tb_per_pa_14: Option<f64>,
    pub tb_per_pa_30: Option<f64>,
    pub hr_rate_7: Option<f64>,
    pub hr_rate_14: Option<f64>,
    pub hr_rate_30: Option<f64>,
    pub singles_rate_14: Option<f64>,
    pub singles_rate_30: Option<f64>,
    pub doubles_rate_14: Option<f64>,
    pub doubles_rate_30: Option<f64>,
    pub triples_rate_14: Option<f64>,
    pub triples_rate_30: Option<f64>,
    pub walk_rate_14: Option<f64>,
    pub walk_rate_30: Option<f64>,
    pub iso_vs_lhp: Option<f64>,
    pub iso_vs_rhp: Option<f64>,
    pub hit_rate_vs_lhp: Option<f64>,
    pub hit_rate_vs_rhp: Option<f64>,
    pub k_pct_vs_lhp: Option<f64>,
    pub k_pct_vs_rhp: Option<f64>,
    pub hot_cold_delta_iso: Option<f64>,
    pub hot_cold_delta_hit_rate: Option<f64>,
    pub recent_lineup_slot: Option<i64>,
}

/// One window row from `batter_stats`, reduced to what the builder reads.
#[derive(Debug, Clone, Default)]
struct WindowRow {
    team: Option<String>,
    bat_hand: Option<String>,
    pa: Option<f64>,
    ab: Option<f64>,
    singles: Option<f64>,
    doubles: Option<f64>,
    triples: Option<f64>,
    hrs: Option<f64>,
    k_pct: Option<f64>,
    bb_pct: Option<f64>,
    barrel_pct: Option<f64>,
    hard_hit_pct: Option<f64>,
    avg_exit_velo: Option<f64>,
    avg_launch_angle: Option<f64>,
    sweet_spot_pct: Option<f64>,
    fly_ball_pct: Option<f64>,
    line_drive_pct: Option<f64>,
    ground_ball_pct: Option<f64>,
    pull_pct: Option<f64>,
    iso_power: Option<f64>,
    slg: Option<f64>,
    iso_vs_lhp: Option<f64>,
    iso_vs_rhp: Option<f64>,
    hit_rate_vs_lhp: Option<f64>,
    hit_rate_vs_rhp: Option<f64>,
    k_pct_vs_lhp: Option<f64>,
    k_pct_vs_rhp: Option<f64>,
}

impl WindowRow {
    fn from_store(row: &StoreRow) -> Result<Self> {
        Ok(Self {
            team: row.opt_text("team")?,
            bat_hand: row.opt_text("bat_hand")?,
            pa: row.opt_i64("pa")?.map(|v| v as f64),
            ab: row.opt_i64("ab")?.map(|v| v as f64),
            singles: row.opt_i64("singles")?.map(|v| v as f64),
            doubles: row.opt_i64("doubles")?.map(|v| v as f64),
            triples: row.opt_i64("triples")?.map(|v| v as f64),
            hrs: row.opt_i64("hrs")?.map(|v| v as f64),
            k_pct: row.opt_f64("k_pct")?,
            bb_pct: row.opt_f64("bb_pct")?,
            barrel_pct: row.opt_f64("barrel_pct")?,
            hard_hit_pct: row.opt_f64("hard_hit_pct")?,
            avg_exit_velo: row.opt_f64("avg_exit_velo")?,
            avg_launch_angle: row.opt_f64("avg_launch_angle")?,
            sweet_spot_pct: row.opt_f64("sweet_spot_pct")?,
            fly_ball_pct: row.opt_f64("fly_ball_pct")?,
            line_drive_pct: row.opt_f64("line_drive_pct")?,
            ground_ball_pct: row.opt_f64("ground_ball_pct")?,
            pull_pct: row.opt_f64("pull_pct")?,
            iso_power: row.opt_f64("iso_power")?,
            slg: row.opt_f64("slg")?,
            iso_vs_lhp: row.opt_f64("iso_vs_lhp")?,
            iso_vs_rhp: row.opt_f64("iso_vs_rhp")?,
            hit_rate_vs_lhp: row.opt_f64("hit_rate_vs_lhp")?,
            hit_rate_vs_rhp: row.opt_f64("hit_rate_vs_rhp")?,
            k_pct_vs_lhp: row.opt_f64("k_pct_vs_lhp")?,
            k_pct_vs_rhp: row.opt_f64("k_pct_vs_rhp")?,
        })
    }

    fn hits(&self) -> Option<f64> {
        Some(self.singles? + self.doubles? + self.triples? + self.hrs?)
    }

    fn ba(&self) -> Option<f64> {
        let ab = self.ab?;
        if ab <= 0.0 {
            return None;
        }
        Some(self.hits()? / ab)
    }

    fn tb_per_pa(&self) -> Option<f64> {
        let pa = self.pa?;
        if pa <= 0.0 {
            return None;
        }
        Some((self.singles? + 2.0 * self.doubles? + 3.0 * self.triples? + 4.0 * self.hrs?) / pa)
    }

    fn per_pa(&self, count: Option<f64>) -> Option<f64> {
        let pa = self.pa?;
        if pa <= 0.0 {
            return None;
        }
        Some(count? / pa)
    }
}

// ---------------------------------------------------------------------------
// player pool
// ---------------------------------------------------------------------------

async fn lineup_pool(store: &Store, date: NaiveDate) -> Result<HashMap<i64, Option<String>>> {
    let rows = store
        .fetch_all(
            "SELECT DISTINCT player_id, team_id FROM lineups
             WHERE game_date = $1 AND active_version = 1",
            &[SqlValue::from(date)],
        )
        .await?;
    rows.iter()
        .map(|r| Ok((r.i64("player_id")?, r.opt_text("team_id")?)))
        .collect()
}

async fn odds_pool(store: &Store, date: NaiveDate) -> Result<HashMap<i64, Option<String>>> {
    let rows = store
        .fetch_all(
            "SELECT DISTINCT player_id, team_id FROM market_odds
             WHERE game_date = $1 AND entity_type = 'batter' AND player_id IS NOT NULL",
            &[SqlValue::from(date)],
        )
        .await?;
    rows.iter()
        .map(|r| Ok((r.i64("player_id")?, r.opt_text("team_id")?)))
        .collect()
}

async fn recent_team_pool(store: &Store, date: NaiveDate) -> Result<HashMap<i64, Option<String>>> {
    let lower = date - Duration::days(FEATURE_LOOKBACK_DAYS);
    let rows = store
        .fetch_all(
            "SELECT DISTINCT s.player_id, s.team
             FROM batter_stats s
             WHERE s.stat_date > $1 AND s.stat_date <= $2
               AND s.team IN (
                   SELECT home_team FROM games WHERE game_date = $3
                   UNION
                   SELECT away_team FROM games WHERE game_date = $3
               )",
            &[
                SqlValue::from(lower),
                SqlValue::from(date),
                SqlValue::from(date),
            ],
        )
        .await?;
    rows.iter()
        .map(|r| Ok((r.i64("player_id")?, r.opt_text("team")?)))
        .collect()
}

/// Source priority: lineups over odds over recent team pool.
fn merge_pools(
    lineup: HashMap<i64, Option<String>>,
    odds: HashMap<i64, Option<String>>,
    recent: HashMap<i64, Option<String>>,
) -> HashMap<i64, Option<String>> {
    let mut merged = recent;
    for (pid, team) in odds {
        let entry = merged.entry(pid).or_insert(None);
        if team.is_some() {
            *entry = team;
        }
    }
    for (pid, team) in lineup {
        let entry = merged.entry(pid).or_insert(None);
        if team.is_some() {
            *entry = team;
        }
    }
    merged
}

async fn latest_windows(
    store: &Store,
    date: NaiveDate,
) -> Result<HashMap<i64, HashMap<i64, WindowRow>>> {
    let lower = date - Duration::days(FEATURE_LOOKBACK_DAYS);
    let rows = store
        .fetch_all(
            "SELECT * FROM batter_stats
             WHERE stat_date > $1 AND stat_date <= $2 AND window_days IN (7, 14, 30)
             ORDER BY player_id, window_days, stat_date DESC",
            &[SqlValue::from(lower), SqlValue::from(date)],
        )
        .await?;

    let mut latest: HashMap<i64, HashMap<i64, WindowRow>> = HashMap::new();
    for row in &rows {
        let pid = row.i64("player_id")?;
        let window = row.i64("window_days")?;
        let per_player = latest.entry(pid).or_default();
        per_player
            .entry(window)
            .or_insert(WindowRow::from_store(row)?);
    }
    Ok(latest)
}

async fn recent_lineup_slots(store: &Store, date: NaiveDate) -> Result<HashMap<i64, i64>> {
    let rows = store
        .fetch_all(
            "SELECT player_id, batting_order, CAST(COUNT(*) AS BIGINT) AS cnt
             FROM lineups
             WHERE game_date < $1 AND batting_order IS NOT NULL AND active_version = 1
             GROUP BY player_id, batting_order
             ORDER BY player_id, cnt DESC, batting_order ASC",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut slots = HashMap::new();
    for row in &rows {
        let pid = row.i64("player_id")?;
        slots.entry(pid).or_insert(row.i64("batting_order")?);
    }
    Ok(slots)
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

fn build_row(
    player_id: i64,
    team_hint: Option<String>,
    windows: &HashMap<i64, WindowRow>,
    slot: Option<i64>,
) -> BatterFeatures {
    let empty = WindowRow::default();
    let w7 = windows.get(&7).unwrap_or(&empty);
    let w14 = windows.get(&14).unwrap_or(&empty);
    let w30 = windows.get(&30).unwrap_or(&empty);

    let pick = |f: fn(&WindowRow) -> Option<String>| {
        f(w30).or_else(|| f(w14)).or_else(|| f(w7))
    };
    let team = pick(|w| w.team.clone()).or(team_hint);
    let bats = pick(|w| w.bat_hand.clone());

    let iso7 = w7.iso_power;
    let iso30 = w30.iso_power;
    let hit7 = w7.ba();
    let hit30 = w30.ba();

    BatterFeatures {
        player_id,
        team_id: team,
        bats,
        pa_7: w7.pa,
        pa_14: w14.pa,
        pa_30: w30.pa,
        k_pct_7: w7.k_pct,
        k_pct_14: w14.k_pct,
        k_pct_30: w30.k_pct,
        bb_pct_7: w7.bb_pct,
        bb_pct_14: w14.bb_pct,
        bb_pct_30: w30.bb_pct,
        barrel_pct_7: w7.barrel_pct,
        barrel_pct_14: w14.barrel_pct,
        barrel_pct_30: w30.barrel_pct,
        hard_hit_pct_7: w7.hard_hit_pct,
        hard_hit_pct_14: w14.hard_hit_pct,
        hard_hit_pct_30: w30.hard_hit_pct,
        avg_exit_velo_7: w7.avg_exit_velo,
        avg_exit_velo_14: w14.avg_exit_velo,
        avg_exit_velo_30: w30.avg_exit_velo,
        avg_launch_angle_7: w7.avg_launch_angle,
        avg_launch_angle_14: w14.avg_launch_angle,
        avg_launch_angle_30: w30.avg_launch_angle,
        sweet_spot_pct_7: w7.sweet_spot_pct,
        sweet_spot_pct_14: w14.sweet_spot_pct,
        sweet_spot_pct_30: w30.sweet_spot_pct,
        fly_ball_pct_7: w7.fly_ball_pct,
        fly_ball_pct_14: w14.fly_ball_pct,
        fly_ball_pct_30: w30.fly_ball_pct,
        line_drive_pct_7: w7.line_drive_pct,
        line_drive_pct_14: w14.line_drive_pct,
        line_drive_pct_30: w30.line_drive_pct,
        gb_pct_7: w7.ground_ball_pct,
        gb_pct_14: w14.ground_ball_pct,
        gb_pct_30: w30.ground_ball_pct,
        pull_pct_7: w7.pull_pct,
        pull_pct_14: w14.pull_pct,
        pull_pct_30: w30.pull_pct,
        iso_7: iso7,
        iso_14: w14.iso_power,
        iso_30: iso30,
        slg_7: w7.slg,
        slg_14: w14.slg,
        slg_30: w30.slg,
        ba_7: hit7,
        ba_14: w14.ba(),
        ba_30: hit30,
        hit_rate_7: hit7,
        hit_rate_14: w14.ba(),
        hit_rate_30: hit30,
        tb_per_pa_7: w7.tb_per_pa(),
        tb_per_pa_14: w14.tb_per_pa(),
        tb_per_pa_30: w30.tb_per_pa(),
        hr_rate_7: w7.per_pa(w7.hrs),
        hr_rate_14: w14.per_pa(w14.hrs),
        hr_rate_30: w30.per_pa(w30.hrs),
        singles_rate_14: w14.per_pa(w14.singles),
        singles_rate_30: w30.per_pa(w30.singles),
        doubles_rate_14: w14.per_pa(w14.doubles),
        doubles_rate_30: w30.per_pa(w30.doubles),
        triples_rate_14: w14.per_pa(w14.triples),
        triples_rate_30: w30.per_pa(w30.triples),
        walk_rate_14: w14.bb_pct.map(|v| v / 100.0),
        walk_rate_30: w30.bb_pct.map(|v| v / 100.0),
        iso_vs_lhp: w30.iso_vs_lhp.or(w14.iso_vs_lhp).or(iso30),
        iso_vs_rhp: w30.iso_vs_rhp.or(w14.iso_vs_rhp).or(iso30),
        hit_rate_vs_lhp: w30.hit_rate_vs_lhp.or(w14.hit_rate_vs_lhp).or(hit30),
        hit_rate_vs_rhp: w30.hit_rate_vs_rhp.or(w14.hit_rate_vs_rhp).or(hit30),
        k_pct_vs_lhp: w30.k_pct_vs_lhp.or(w14.k_pct_vs_lhp).or(w30.k_pct),
        k_pct_vs_rhp: w30.k_pct_vs_rhp.or(w14.k_pct_vs_rhp).or(w30.k_pct),
        hot_cold_delta_iso: match (iso7, iso30) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        },
        hot_cold_delta_hit_rate: match (hit7, hit30) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        },
        recent_lineup_slot: slot,
    }
}

pub async fn build_batter_features(store: &Store, date: NaiveDate) -> Result<BuilderSummary> {
    let lineup = lineup_pool(store, date).await?;
    let odds = odds_pool(store, date).await?;
    let recent = recent_team_pool(store, date).await?;
    info!(
        date = %date_str(date),
        lineup = lineup.len(),
        odds = odds.len(),
        recent = recent.len(),
        "batter pool assembled"
    );
    let pool = merge_pools(lineup, odds, recent);
    if pool.is_empty() {
        warn!(date = %date_str(date), "no relevant batters for date");
        return Ok(BuilderSummary {
            warnings: vec!["no relevant batter pool for date".into()],
            ..Default::default()
        });
    }

    let windows = latest_windows(store, date).await?;
    let slots = recent_lineup_slots(store, date).await?;

    let mut features = Vec::new();
    let mut missing = 0usize;
    let mut player_ids: Vec<i64> = pool.keys().copied().collect();
    player_ids.sort_unstable();
    for player_id in player_ids {
        match windows.get(&player_id) {
            Some(w) if !w.is_empty() => features.push(build_row(
                player_id,
                pool.get(&player_id).cloned().flatten(),
                w,
                slots.get(&player_id).copied(),
            )),
            _ => missing += 1,
        }
    }

    let upserted = persist(store, date, &features).await?;
    let mut warnings = Vec::new();
    if missing > 0 {
        warnings.push(format!("{missing} pooled batter(s) had no window stats before date"));
    }
    info!(
        date = %date_str(date),
        generated = features.len(),
        upserted,
        missing,
        "batter features built"
    );
    Ok(BuilderSummary {
        rows_generated: features.len(),
        rows_upserted: upserted,
        warnings,
    })
}

async fn persist(store: &Store, date: NaiveDate, features: &[BatterFeatures]) -> Result<u64> {
    if features.is_empty() {
        return Ok(0);
    }
    let columns = [
        "game_date", "player_id", "team_id", "bats",
        "pa_7", "pa_14", "pa_30",
        "k_pct_7", "k_pct_14", "k_pct_30",
        "bb_pct_7", "bb_pct_14", "bb_pct_30",
        "barrel_pct_7", "barrel_pct_14", "barrel_pct_30",
        "hard_hit_pct_7", "hard_hit_pct_14", "hard_hit_pct_30",
        "avg_exit_velo_7", "avg_exit_velo_14", "avg_exit_velo_30",
        "avg_launch_angle_7", "avg_launch_angle_14", "avg_launch_angle_30",
        "sweet_spot_pct_7", "sweet_spot_pct_14", "sweet_spot_pct_30",
        "fly_ball_pct_7", "fly_ball_pct_14", "fly_ball_pct_30",
        "line_drive_pct_7", "line_drive_pct_14", "line_drive_pct_30",
        "gb_pct_7", "gb_pct_14", "gb_pct_30",
        "pull_pct_7", "pull_pct_14", "pull_pct_30",
        "iso_7", "iso_14", "iso_30",
        "slg_7", "slg_14", "slg_30",
        "ba_7", "ba_14", "ba_30",
        "hit_rate_7", "hit_rate_14", "hit_rate_30",
        "tb_per_pa_7", "tb_per_pa_14", "tb_per_pa_30",
        "hr_rate_7", "hr_rate_14", "hr_rate_30",
        "singles_rate_14", "singles_rate_30",
        "doubles_rate_14", "doubles_rate_30",
        "triples_rate_14", "triples_rate_30",
        "walk_rate_14", "walk_rate_30",
        "iso_vs_lhp", "iso_vs_rhp",
        "hit_rate_vs_lhp", "hit_rate_vs_rhp",
        "k_pct_vs_lhp", "k_pct_vs_rhp",
        "hot_cold_delta_iso", "hot_cold_delta_hit_rate",
        "recent_lineup_slot",
    ];
    let rows: Vec<Vec<SqlValue>> = features
        .iter()
        .map(|f| {
            vec![
                SqlValue::from(date),
                SqlValue::from(f.player_id),
                SqlValue::from(f.team_id.clone()),
                SqlValue::from(f.bats.clone()),
                SqlValue::from(f.pa_7), SqlValue::from(f.pa_14), SqlValue::from(f.pa_30),
                SqlValue::from(f.k_pct_7), SqlValue::from(f.k_pct_14), SqlValue::from(f.k_pct_30),
                SqlValue::from(f.bb_pct_7), SqlValue::from(f.bb_pct_14), SqlValue::from(f.bb_pct_30),
                SqlValue::from(f.barrel_pct_7), SqlValue::from(f.barrel_pct_14), SqlValue::from(f.barrel_pct_30),
                SqlValue::from(f.hard_hit_pct_7), SqlValue::from(f.hard_hit_pct_14), SqlValue::from(f.hard_hit_pct_30),
                SqlValue::from(f.avg_exit_velo_7), SqlValue::from(f.avg_exit_velo_14), SqlValue::from(f.avg_exit_velo_30),
                SqlValue::from(f.avg_launch_angle_7), SqlValue::from(f.avg_launch_angle_14), SqlValue::from(f.avg_launch_angle_30),
                SqlValue::from(f.sweet_spot_pct_7), SqlValue::from(f.sweet_spot_pct_14), SqlValue::from(f.sweet_spot_pct_30),
                SqlValue::from(f.fly_ball_pct_7), SqlValue::from(f.fly_ball_pct_14), SqlValue::from(f.fly_ball_pct_30),
                SqlValue::from(f.line_drive_pct_7), SqlValue::from(f.line_drive_pct_14), SqlValue::from(f.line_drive_pct_30),
                SqlValue::from(f.gb_pct_7), SqlValue::from(f.gb_pct_14), SqlValue::from(f.gb_pct_30),
                SqlValue::from(f.pull_pct_7), SqlValue::from(f.pull_pct_14), SqlValue::from(f.pull_pct_30),
                SqlValue::from(f.iso_7), SqlValue::from(f.iso_14), SqlValue::from(f.iso_30),
                SqlValue::from(f.slg_7), SqlValue::from(f.slg_14), SqlValue::from(f.slg_30),
                SqlValue::from(f.ba_7), SqlValue::from(f.ba_14), SqlValue::from(f.ba_30),
                SqlValue::from(f.hit_rate_7), SqlValue::from(f.hit_rate_14), SqlValue::from(f.hit_rate_30),
                SqlValue::from(f.tb_per_pa_7), SqlValue::from(f.tb_per_pa_14), SqlValue::from(f.tb_per_pa_30),
                SqlValue::from(f.hr_rate_7), SqlValue::from(f.hr_rate_14), SqlValue::from(f.hr_rate_30),
                SqlValue::from(f.singles_rate_14), SqlValue::from(f.singles_rate_30),
                SqlValue::from(f.doubles_rate_14), SqlValue::from(f.doubles_rate_30),
                SqlValue::from(f.triples_rate_14), SqlValue::from(f.triples_rate_30),
                SqlValue::from(f.walk_rate_14), SqlValue::from(f.walk_rate_30),
                SqlValue::from(f.iso_vs_lhp), SqlValue::from(f.iso_vs_rhp),
                SqlValue::from(f.hit_rate_vs_lhp), SqlValue::from(f.hit_rate_vs_rhp),
                SqlValue::from(f.k_pct_vs_lhp), SqlValue::from(f.k_pct_vs_rhp),
                SqlValue::from(f.hot_cold_delta_iso), SqlValue::from(f.hot_cold_delta_hit_rate),
                SqlValue::from(f.recent_lineup_slot),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "batter_daily_features",
            &columns,
            &["game_date", "player_id"],
            &rows,
        )
        .await
}

/// Load the feature snapshot for a date, keyed by player.
pub async fn load_for_date(store: &Store, date: NaiveDate) -> Result<HashMap<i64, BatterFeatures>> {
    let rows = store
        .fetch_all(
            "SELECT * FROM batter_daily_features WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut map = HashMap::new();
    for row in &rows {
        let f = BatterFeatures {
            player_id: row.i64("player_id")?,
            team_id: row.opt_text("team_id")?,
            bats: row.opt_text("bats")?,
            pa_7: row.opt_f64("pa_7")?,
            pa_14: row.opt_f64("pa_14")?,
            pa_30: row.opt_f64("pa_30")?,
            k_pct_7: row.opt_f64("k_pct_7")?,
            k_pct_14: row.opt_f64("k_pct_14")?,
            k_pct_30: row.opt_f64("k_pct_30")?,
            bb_pct_7: row.opt_f64("bb_pct_7")?,
            bb_pct_14: row.opt_f64("bb_pct_14")?,
            bb_pct_30: row.opt_f64("bb_pct_30")?,
            barrel_pct_7: row.opt_f64("barrel_pct_7")?,
            barrel_pct_14: row.opt_f64("barrel_pct_14")?,
            barrel_pct_30: row.opt_f64("barrel_pct_30")?,
            hard_hit_pct_7: row.opt_f64("hard_hit_pct_7")?,
            hard_hit_pct_14: row.opt_f64("hard_hit_pct_14")?,
            hard_hit_pct_30: row.opt_f64("hard_hit_pct_30")?,
            avg_exit_velo_7: row.opt_f64("avg_exit_velo_7")?,
            avg_exit_velo_14: row.opt_f64("avg_exit_velo_14")?,
            avg_exit_velo_30: row.opt_f64("avg_exit_velo_30")?,
            avg_launch_angle_7: row.opt_f64("avg_launch_angle_7")?,
            avg_launch_angle_14: row.opt_f64("avg_launch_angle_14")?,
            avg_launch_angle_30: row.opt_f64("avg_launch_angle_30")?,
            sweet_spot_pct_7: row.opt_f64("sweet_spot_pct_7")?,
            sweet_spot_pct_14: row.opt_f64("sweet_spot_pct_14")?,
            sweet_spot_pct_30: row.opt_f64("sweet_spot_pct_30")?,
            fly_ball_pct_7: row.opt_f64("fly_ball_pct_7")?,
            fly_ball_pct_14: row.opt_f64("fly_ball_pct_14")?,
            fly_ball_pct_30: row.opt_f64("fly_ball_pct_30")?,
            line_drive_pct_7: row.opt_f64("line_drive_pct_7")?,
            line_drive_pct_14: row.opt_f64("line_drive_pct_14")?,
            line_drive_pct_30: row.opt_f64("line_drive_pct_30")?,
            gb_pct_7: row.opt_f64("gb_pct_7")?,
            gb_pct_14: row.opt_f64("gb_pct_14")?,
            gb_pct_30: row.opt_f64("gb_pct_30")?,
            pull_pct_7: row.opt_f64("pull_pct_7")?,
            pull_pct_14: row.opt_f64("pull_pct_14")?,
            pull_pct_30: row.opt_f64("pull_pct_30")?,
            iso_7: row.opt_f64("iso_7")?,
            iso_14: row.opt_f64("iso_14")?,
            iso_30: row.opt_f64("iso_30")?,
            slg_7: row.opt_f64("slg_7")?,
            slg_14: row.opt_f64("slg_14")?,
            slg_30: row.opt_f64("slg_30")?,
            ba_7: row.opt_f64("ba_7")?,
            ba_14: row.opt_f64("ba_14")?,
            ba_30: row.opt_f64("ba_30")?,
            hit_rate_7: row.opt_f64("hit_rate_7")?,
            hit_rate_14: row.opt_f64("hit_rate_14")?,
            hit_rate_30: row.opt_f64("hit_rate_30")?,
            tb_per_pa_7: row.opt_f64("tb_per_pa_7")?,
            tb_per_pa_14: row.opt_f64("tb_per_pa_14")?,
            tb_per_pa_30: row.opt_f64("tb_per_pa_30")?,
            hr_rate_7: row.opt_f64("hr_rate_7")?,
            hr_rate_14: row.opt_f64("hr_rate_14")?,
            hr_rate_30: row.opt_f64("hr_rate_30")?,
            singles_rate_14: row.opt_f64("singles_rate_14")?,
            singles_rate_30: row.opt_f64("singles_rate_30")?,
            doubles_rate_14: row.opt_f64("doubles_rate_14")?,
            doubles_rate_30: row.opt_f64("doubles_rate_30")?,
            triples_rate_14: row.opt_f64("triples_rate_14")?,
            triples_rate_30: row.opt_f64("triples_rate_30")?,
            walk_rate_14: row.opt_f64("walk_rate_14")?,
            walk_rate_30: row.opt_f64("walk_rate_30")?,
            iso_vs_lhp: row.opt_f64("iso_vs_lhp")?,
            iso_vs_rhp: row.opt_f64("iso_vs_rhp")?,
            hit_rate_vs_lhp: row.opt_f64("hit_rate_vs_lhp")?,
            hit_rate_vs_rhp: row.opt_f64("hit_rate_vs_rhp")?,
            k_pct_vs_lhp: row.opt_f64("k_pct_vs_lhp")?,
            k_pct_vs_rhp: row.opt_f64("k_pct_vs_rhp")?,
            hot_cold_delta_iso: row.opt_f64("hot_cold_delta_iso")?,
            hot_cold_delta_hit_rate: row.opt_f64("hot_cold_delta_hit_rate")?,
            recent_lineup_slot: row.opt_i64("recent_lineup_slot")?,
        };
        map.insert(f.player_id, f);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_pool_priority() {
        let lineup = HashMap::from([(1, Some("NYY".to_string()))]);
        let odds = HashMap::from([(1, Some("BOS".to_string())), (2, Some("BOS".to_string()))]);
        let recent = HashMap::from([(2, None), (3, Some("LAD".to_string()))]);
        let merged = merge_pools(lineup, odds, recent);
        assert_eq!(merged[&1].as_deref(), Some("NYY")); // lineup wins
        assert_eq!(merged[&2].as_deref(), Some("BOS")); // odds fill the gap
        assert_eq!(merged[&3].as_deref(), Some("LAD"));
    }

    #[test]
    fn test_hot_cold_delta_needs_both_windows() {
        let mut windows = HashMap::new();
        windows.insert(
            7,
            WindowRow {
                iso_power: Some(0.250),
                ..Default::default()
            },
        );
        let row = build_row(1, None, &windows, None);
        assert_eq!(row.hot_cold_delta_iso, None);

        windows.insert(
            30,
            WindowRow {
                iso_power: Some(0.180),
                ..Default::default()
            },
        );
        let row = build_row(1, None, &windows, None);
        let delta = row.hot_cold_delta_iso.unwrap();
        assert!((delta - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_derived_rates_from_counts() {
        let w = WindowRow {
            pa: Some(40.0),
            ab: Some(36.0),
            singles: Some(6.0),
            doubles: Some(3.0),
            triples: Some(0.0),
            hrs: Some(3.0),
            ..Default::default()
        };
        // BA = 12/36
        assert!((w.ba().unwrap() - 12.0 / 36.0).abs() < 1e-9);
        // TB = 6 + 6 + 0 + 12 = 24; per PA = 0.6
        assert!((w.tb_per_pa().unwrap() - 0.6).abs() < 1e-9);
        assert!((w.per_pa(w.hrs).unwrap() - 3.0 / 40.0).abs() < 1e-9);
    }
}
