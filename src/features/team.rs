//! Team daily feature snapshots: offense windows, runs per game and
//! bullpen proxies (pitchers on the roster excluding that day's probable
//! starters).

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::error::Result;
use crate::features::{BuilderSummary, FEATURE_LOOKBACK_DAYS};
use crate::store::{date_str, SqlValue, Store};

#[derive(Debug, Clone, Default)]
pub struct TeamFeatures {
    pub team_id: String,
    pub opponent_team_id: Option<String>,
    pub offense_k_pct_14: Option<f64>,
    pub offense_k_pct_30: Option<f64>,
    pub offense_bb_pct_14: Option<f64>,
    pub offense_bb_pct_30: Option<f64>,
    pub offense_iso_14: Option<f64>,
    pub offense_iso_30: Option<f64>,
    pub offense_ba_14: Option<f64>,
    pub offense_ba_30: Option<f64>,
    pub offense_obp_14: Option<f64>,
    pub offense_obp_30: Option<f64>,
    pub offense_slg_14: Option<f64>,
    pub offense_slg_30: Option<f64>,
    pub offense_hit_rate_14: Option<f64>,
    pub offense_hit_rate_30: Option<f64>,
    pub offense_tb_per_pa_14: Option<f64>,
    pub offense_tb_per_pa_30: Option<f64>,
    pub runs_per_game_14: Option<f64>,
    pub runs_per_game_30: Option<f64>,
    pub hr_rate_14: Option<f64>,
    pub hr_rate_30: Option<f64>,
    pub bullpen_era_proxy_14: Option<f64>,
    pub bullpen_whip_proxy_14: Option<f64>,
    pub bullpen_k_pct_14: Option<f64>,
    pub bullpen_hr9_14: Option<f64>,
    pub bullpen_high_lev_tier: Option<i64>,
}

#[derive(Debug, Default)]
struct OffenseTotals {
    pa: f64,
    ab: f64,
    hits: f64,
    tb: f64,
    walks: f64,
    hrs: f64,
    weighted_k: f64,
    weighted_bb: f64,
    weighted_iso: f64,
    weighted_slg: f64,
    weight_pa: f64,
    weight_ab: f64,
}

impl OffenseTotals {
    fn finish(self) -> OffenseAgg {
        let nz = |v: f64| if v > 0.0 { Some(v) } else { None };
        OffenseAgg {
            k_pct: nz(self.weight_pa).map(|w| self.weighted_k / w),
            bb_pct: nz(self.weight_pa).map(|w| self.weighted_bb / w),
            iso: nz(self.weight_pa).map(|w| self.weighted_iso / w),
            ba: nz(self.ab).map(|ab| self.hits / ab),
            obp: nz(self.pa).map(|pa| (self.hits + self.walks) / pa),
            slg: nz(self.weight_ab).map(|w| self.weighted_slg / w),
            tb_per_pa: nz(self.pa).map(|pa| self.tb / pa),
            hr_rate: nz(self.pa).map(|pa| self.hrs / pa),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct OffenseAgg {
    k_pct: Option<f64>,
    bb_pct: Option<f64>,
    iso: Option<f64>,
    ba: Option<f64>,
    obp: Option<f64>,
    slg: Option<f64>,
    tb_per_pa: Option<f64>,
    hr_rate: Option<f64>,
}

async fn teams_on_date(store: &Store, date: NaiveDate) -> Result<HashMap<String, Option<String>>> {
    let rows = store
        .fetch_all(
            "SELECT home_team, away_team FROM games WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut teams = HashMap::new();
    for row in &rows {
        let home = row.text("home_team")?;
        let away = row.text("away_team")?;
        teams.insert(home.clone(), Some(away.clone()));
        teams.insert(away, Some(home));
    }
    Ok(teams)
}

/// Latest window row per batter on a team, PA-weighted into team offense.
async fn offense_window(
    store: &Store,
    team_id: &str,
    date: NaiveDate,
    window: i64,
) -> Result<OffenseAgg> {
    let lower = date - Duration::days(FEATURE_LOOKBACK_DAYS);
    let rows = store
        .fetch_all(
            "SELECT player_id, stat_date, pa, ab, singles, doubles, triples, hrs, k_pct, bb_pct
             FROM batter_stats
             WHERE team = $1 AND window_days = $2 AND stat_date > $3 AND stat_date <= $4
             ORDER BY player_id, stat_date DESC",
            &[
                SqlValue::from(team_id),
                SqlValue::from(window),
                SqlValue::from(lower),
                SqlValue::from(date),
            ],
        )
        .await?;

    let mut seen: HashMap<i64, ()> = HashMap::new();
    let mut totals = OffenseTotals::default();
    for row in &rows {
        let pid = row.i64("player_id")?;
        if seen.insert(pid, ()).is_some() {
            continue; // keep only the latest row per player
        }
        let pa = row.opt_i64("pa")?.unwrap_or(0) as f64;
        let ab = row.opt_i64("ab")?.unwrap_or(0) as f64;
        let singles = row.opt_i64("singles")?.unwrap_or(0) as f64;
        let doubles = row.opt_i64("doubles")?.unwrap_or(0) as f64;
        let triples = row.opt_i64("triples")?.unwrap_or(0) as f64;
        let hrs = row.opt_i64("hrs")?.unwrap_or(0) as f64;
        let hits = singles + doubles + triples + hrs;
        let tb = singles + 2.0 * doubles + 3.0 * triples + 4.0 * hrs;
        let k_pct = row.opt_f64("k_pct")?;
        let bb_pct = row.opt_f64("bb_pct")?;

        totals.pa += pa;
        totals.ab += ab;
        totals.hits += hits;
        totals.tb += tb;
        totals.hrs += hrs;
        if let Some(bb) = bb_pct {
            totals.walks += bb / 100.0 * pa;
        }
        if pa > 0.0 {
            totals.weight_pa += pa;
            if let Some(k) = k_pct {
                totals.weighted_k += k * pa;
            }
            if let Some(bb) = bb_pct {
                totals.weighted_bb += bb * pa;
            }
            if ab > 0.0 {
                let iso = tb / ab - hits / ab;
                totals.weighted_iso += iso * pa;
            }
        }
        if ab > 0.0 {
            totals.weight_ab += ab;
            totals.weighted_slg += tb / ab * ab;
        }
    }
    Ok(totals.finish())
}

async fn runs_per_game(
    store: &Store,
    team_id: &str,
    date: NaiveDate,
    window: i64,
) -> Result<Option<f64>> {
    let lower = date - Duration::days(window);
    let rows = store
        .fetch_all(
            "SELECT home_team, away_team, home_score, away_score
             FROM games
             WHERE game_date >= $1 AND game_date < $2 AND status = 'final'
               AND (home_team = $3 OR away_team = $3)",
            &[
                SqlValue::from(lower),
                SqlValue::from(date),
                SqlValue::from(team_id),
            ],
        )
        .await?;
    let mut runs = Vec::new();
    for row in &rows {
        let score = if row.text("home_team")? == team_id {
            row.opt_i64("home_score")?
        } else {
            row.opt_i64("away_score")?
        };
        if let Some(score) = score {
            runs.push(score as f64);
        }
    }
    if runs.is_empty() {
        return Ok(None);
    }
    Ok(Some(runs.iter().sum::<f64>() / runs.len() as f64))
}

#[derive(Debug, Default)]
struct BullpenAgg {
    era_proxy: Option<f64>,
    whip_proxy: Option<f64>,
    k_pct: Option<f64>,
    hr9: Option<f64>,
    high_lev_tier: Option<i64>,
}

/// Bullpen proxies from 14-day pitcher windows, batters-faced weighted,
/// excluding the team's probable starters for the target date.
async fn bullpen_window(
    store: &Store,
    team_id: &str,
    date: NaiveDate,
    exclude: &[i64],
) -> Result<BullpenAgg> {
    let lower = date - Duration::days(FEATURE_LOOKBACK_DAYS);
    let rows = store
        .fetch_all(
            "SELECT player_id, batters_faced, hr_per_9, k_pct, bb_pct
             FROM pitcher_stats
             WHERE team = $1 AND window_days = 14 AND stat_date > $2 AND stat_date <= $3
             ORDER BY player_id, stat_date DESC",
            &[
                SqlValue::from(team_id),
                SqlValue::from(lower),
                SqlValue::from(date),
            ],
        )
        .await?;

    let mut seen: HashMap<i64, ()> = HashMap::new();
    let mut weight = 0f64;
    let mut weighted_hr9 = 0f64;
    let mut weighted_k = 0f64;
    let mut weighted_bb = 0f64;
    let mut elite_arms = 0i64;
    for row in &rows {
        let pid = row.i64("player_id")?;
        if exclude.contains(&pid) || seen.insert(pid, ()).is_some() {
            continue;
        }
        let bf = (row.opt_i64("batters_faced")?.unwrap_or(0) as f64).max(1.0);
        weight += bf;
        if let Some(hr9) = row.opt_f64("hr_per_9")? {
            weighted_hr9 += hr9 * bf;
        }
        if let Some(k) = row.opt_f64("k_pct")? {
            weighted_k += k * bf;
            if k >= 28.0 && bf >= 20.0 {
                elite_arms += 1;
            }
        }
        if let Some(bb) = row.opt_f64("bb_pct")? {
            weighted_bb += bb * bf;
        }
    }

    if weight <= 0.0 {
        return Ok(BullpenAgg::default());
    }
    let hr9 = if weighted_hr9 > 0.0 { Some(weighted_hr9 / weight) } else { None };
    let bb_rate = if weighted_bb > 0.0 {
        Some(weighted_bb / weight / 100.0)
    } else {
        None
    };
    Ok(BullpenAgg {
        // HR suppression stands in for ERA until earned runs are tracked.
        era_proxy: hr9,
        whip_proxy: bb_rate.map(|bb| 1.0 + bb * 1.5),
        k_pct: if weighted_k > 0.0 { Some(weighted_k / weight) } else { None },
        hr9,
        high_lev_tier: Some(elite_arms.min(3)),
    })
}

async fn probable_starter_ids(store: &Store, team_id: &str, date: NaiveDate) -> Result<Vec<i64>> {
    let rows = store
        .fetch_all(
            "SELECT home_team, away_team, home_pitcher_id, away_pitcher_id
             FROM games WHERE game_date = $1 AND (home_team = $2 OR away_team = $2)",
            &[SqlValue::from(date), SqlValue::from(team_id)],
        )
        .await?;
    let mut ids = Vec::new();
    for row in &rows {
        if row.text("home_team")? == team_id {
            ids.extend(row.opt_i64("home_pitcher_id")?);
        } else {
            ids.extend(row.opt_i64("away_pitcher_id")?);
        }
    }
    Ok(ids)
}

pub async fn build_team_features(store: &Store, date: NaiveDate) -> Result<BuilderSummary> {
    let teams = teams_on_date(store, date).await?;
    if teams.is_empty() {
        warn!(date = %date_str(date), "no scheduled teams for date");
        return Ok(BuilderSummary {
            warnings: vec!["no games/teams found for date".into()],
            ..Default::default()
        });
    }

    let mut features = Vec::new();
    let mut warnings = Vec::new();
    let mut team_ids: Vec<String> = teams.keys().cloned().collect();
    team_ids.sort();
    for team_id in &team_ids {
        let off14 = offense_window(store, team_id, date, 14).await?;
        let off30 = offense_window(store, team_id, date, 30).await?;
        if off14.ba.is_none() {
            warnings.push(format!("{team_id}: no_14d_batter_stats"));
        }
        let starters = probable_starter_ids(store, team_id, date).await?;
        let bullpen = bullpen_window(store, team_id, date, &starters).await?;
        if bullpen.hr9.is_none() {
            warnings.push(format!("{team_id}: no_14d_pitcher_stats_for_bullpen_proxy"));
        }

        features.push(TeamFeatures {
            team_id: team_id.clone(),
            opponent_team_id: teams.get(team_id).cloned().flatten(),
            offense_k_pct_14: off14.k_pct,
            offense_k_pct_30: off30.k_pct,
            offense_bb_pct_14: off14.bb_pct,
            offense_bb_pct_30: off30.bb_pct,
            offense_iso_14: off14.iso,
            offense_iso_30: off30.iso,
            offense_ba_14: off14.ba,
            offense_ba_30: off30.ba,
            offense_obp_14: off14.obp,
            offense_obp_30: off30.obp,
            offense_slg_14: off14.slg,
            offense_slg_30: off30.slg,
            offense_hit_rate_14: off14.ba,
            offense_hit_rate_30: off30.ba,
            offense_tb_per_pa_14: off14.tb_per_pa,
            offense_tb_per_pa_30: off30.tb_per_pa,
            runs_per_game_14: runs_per_game(store, team_id, date, 14).await?,
            runs_per_game_30: runs_per_game(store, team_id, date, 30).await?,
            hr_rate_14: off14.hr_rate,
            hr_rate_30: off30.hr_rate,
            bullpen_era_proxy_14: bullpen.era_proxy,
            bullpen_whip_proxy_14: bullpen.whip_proxy,
            bullpen_k_pct_14: bullpen.k_pct,
            bullpen_hr9_14: bullpen.hr9,
            bullpen_high_lev_tier: bullpen.high_lev_tier,
        });
    }

    let upserted = persist(store, date, &features).await?;
    info!(
        date = %date_str(date),
        generated = features.len(),
        upserted,
        warnings = warnings.len(),
        "team features built"
    );
    Ok(BuilderSummary {
        rows_generated: features.len(),
        rows_upserted: upserted,
        warnings,
    })
}

async fn persist(store: &Store, date: NaiveDate, features: &[TeamFeatures]) -> Result<u64> {
    if features.is_empty() {
        return Ok(0);
    }
    let columns = [
        "game_date", "team_id", "opponent_team_id",
        "offense_k_pct_14", "offense_k_pct_30",
        "offense_bb_pct_14", "offense_bb_pct_30",
        "offense_iso_14", "offense_iso_30",
        "offense_ba_14", "offense_ba_30",
        "offense_obp_14", "offense_obp_30",
        "offense_slg_14", "offense_slg_30",
        "offense_hit_rate_14", "offense_hit_rate_30",
        "offense_tb_per_pa_14", "offense_tb_per_pa_30",
        "runs_per_game_14", "runs_per_game_30",
        "hr_rate_14", "hr_rate_30",
        "bullpen_era_proxy_14", "bullpen_whip_proxy_14",
        "bullpen_k_pct_14", "bullpen_hr9_14",
        "bullpen_high_lev_tier",
    ];
    let rows: Vec<Vec<SqlValue>> = features
        .iter()
        .map(|f| {
            vec![
                SqlValue::from(date),
                SqlValue::from(f.team_id.clone()),
                SqlValue::from(f.opponent_team_id.clone()),
                SqlValue::from(f.offense_k_pct_14), SqlValue::from(f.offense_k_pct_30),
                SqlValue::from(f.offense_bb_pct_14), SqlValue::from(f.offense_bb_pct_30),
                SqlValue::from(f.offense_iso_14), SqlValue::from(f.offense_iso_30),
                SqlValue::from(f.offense_ba_14), SqlValue::from(f.offense_ba_30),
                SqlValue::from(f.offense_obp_14), SqlValue::from(f.offense_obp_30),
                SqlValue::from(f.offense_slg_14), SqlValue::from(f.offense_slg_30),
                SqlValue::from(f.offense_hit_rate_14), SqlValue::from(f.offense_hit_rate_30),
                SqlValue::from(f.offense_tb_per_pa_14), SqlValue::from(f.offense_tb_per_pa_30),
                SqlValue::from(f.runs_per_game_14), SqlValue::from(f.runs_per_game_30),
                SqlValue::from(f.hr_rate_14), SqlValue::from(f.hr_rate_30),
                SqlValue::from(f.bullpen_era_proxy_14), SqlValue::from(f.bullpen_whip_proxy_14),
                SqlValue::from(f.bullpen_k_pct_14), SqlValue::from(f.bullpen_hr9_14),
                SqlValue::from(f.bullpen_high_lev_tier),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "team_daily_features",
            &columns,
            &["game_date", "team_id"],
            &rows,
        )
        .await
}

/// Load the team feature snapshot for a date, keyed by team abbreviation.
pub async fn load_for_date(store: &Store, date: NaiveDate) -> Result<HashMap<String, TeamFeatures>> {
    let rows = store
        .fetch_all(
            "SELECT * FROM team_daily_features WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut map = HashMap::new();
    for row in &rows {
        let f = TeamFeatures {
            team_id: row.text("team_id")?,
            opponent_team_id: row.opt_text("opponent_team_id")?,
            offense_k_pct_14: row.opt_f64("offense_k_pct_14")?,
            offense_k_pct_30: row.opt_f64("offense_k_pct_30")?,
            offense_bb_pct_14: row.opt_f64("offense_bb_pct_14")?,
            offense_bb_pct_30: row.opt_f64("offense_bb_pct_30")?,
            offense_iso_14: row.opt_f64("offense_iso_14")?,
            offense_iso_30: row.opt_f64("offense_iso_30")?,
            offense_ba_14: row.opt_f64("offense_ba_14")?,
            offense_ba_30: row.opt_f64("offense_ba_30")?,
            offense_obp_14: row.opt_f64("offense_obp_14")?,
            offense_obp_30: row.opt_f64("offense_obp_30")?,
            offense_slg_14: row.opt_f64("offense_slg_14")?,
            offense_slg_30: row.opt_f64("offense_slg_30")?,
            offense_hit_rate_14: row.opt_f64("offense_hit_rate_14")?,
            offense_hit_rate_30: row.opt_f64("offense_hit_rate_30")?,
            offense_tb_per_pa_14: row.opt_f64("offense_tb_per_pa_14")?,
            offense_tb_per_pa_30: row.opt_f64("offense_tb_per_pa_30")?,
            runs_per_game_14: row.opt_f64("runs_per_game_14")?,
            runs_per_game_30: row.opt_f64("runs_per_game_30")?,
            hr_rate_14: row.opt_f64("hr_rate_14")?,
            hr_rate_30: row.opt_f64("hr_rate_30")?,
            bullpen_era_proxy_14: row.opt_f64("bullpen_era_proxy_14")?,
            bullpen_whip_proxy_14: row.opt_f64("bullpen_whip_proxy_14")?,
            bullpen_k_pct_14: row.opt_f64("bullpen_k_pct_14")?,
            bullpen_hr9_14: row.opt_f64("bullpen_hr9_14")?,
            bullpen_high_lev_tier: row.opt_i64("bullpen_high_lev_tier")?,
        };
        map.insert(f.team_id.clone(), f);
    }
    Ok(map)
}
