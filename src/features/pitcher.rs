//! Pitcher daily feature snapshots for probable starters.
//!
//! Last-5-start aggregates and times-through-order metrics come from
//! `pitcher_game_log`; window metrics from `pitcher_stats` at 14/30 days.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use crate::error::Result;
use crate::features::{BuilderSummary, FEATURE_LOOKBACK_DAYS};
use crate::store::{date_str, SqlValue, Store, StoreRow};

#[derive(Debug, Clone, Default)]
pub struct PitcherFeatures {
    pub pitcher_id: i64,
    pub team_id: Option<String>,
    pub throws: Option<String>,
    pub batters_faced_14: Option<f64>,
    pub batters_faced_30: Option<f64>,
    pub k_pct_14: Option<f64>,
    pub k_pct_30: Option<f64>,
    pub bb_pct_14: Option<f64>,
    pub bb_pct_30: Option<f64>,
    pub hr_per_9_14: Option<f64>,
    pub hr_per_9_30: Option<f64>,
    pub hr_per_fb_14: Option<f64>,
    pub hr_per_fb_30: Option<f64>,
    pub hard_hit_pct_allowed_14: Option<f64>,
    pub hard_hit_pct_allowed_30: Option<f64>,
    pub barrel_pct_allowed_14: Option<f64>,
    pub barrel_pct_allowed_30: Option<f64>,
    pub avg_exit_velo_allowed_14: Option<f64>,
    pub avg_exit_velo_allowed_30: Option<f64>,
    pub fly_ball_pct_allowed_14: Option<f64>,
    pub fly_ball_pct_allowed_30: Option<f64>,
    pub whiff_pct_14: Option<f64>,
    pub whiff_pct_30: Option<f64>,
    pub chase_pct_14: Option<f64>,
    pub chase_pct_30: Option<f64>,
    pub avg_fastball_velo_14: Option<f64>,
    pub avg_fastball_velo_30: Option<f64>,
    pub fastball_velo_trend_14: Option<f64>,
    pub outs_recorded_avg_last_5: Option<f64>,
    pub pitches_avg_last_5: Option<f64>,
    pub starter_role_confidence: Option<f64>,
    pub split_k_pct_vs_lhh: Option<f64>,
    pub split_k_pct_vs_rhh: Option<f64>,
    pub split_hr_allowed_rate_vs_lhh: Option<f64>,
    pub split_hr_allowed_rate_vs_rhh: Option<f64>,
    pub tto_k_decay_pct: Option<f64>,
    pub tto_hr_increase_pct: Option<f64>,
    pub tto_endurance_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct WindowRow {
    team: Option<String>,
    pitch_hand: Option<String>,
    batters_faced: Option<f64>,
    k_pct: Option<f64>,
    bb_pct: Option<f64>,
    hr_per_9: Option<f64>,
    hr_per_fb: Option<f64>,
    hard_hit_pct_against: Option<f64>,
    barrel_pct_against: Option<f64>,
    avg_exit_velo_against: Option<f64>,
    fly_ball_pct: Option<f64>,
    whiff_pct: Option<f64>,
    chase_pct: Option<f64>,
    avg_fastball_velo: Option<f64>,
    fastball_velo_trend: Option<f64>,
    k_pct_vs_lhb: Option<f64>,
    k_pct_vs_rhb: Option<f64>,
    hr_per_9_vs_lhb: Option<f64>,
    hr_per_9_vs_rhb: Option<f64>,
}

impl WindowRow {
    fn from_store(row: &StoreRow) -> Result<Self> {
        Ok(Self {
            team: row.opt_text("team")?,
            pitch_hand: row.opt_text("pitch_hand")?,
            batters_faced: row.opt_i64("batters_faced")?.map(|v| v as f64),
            k_pct: row.opt_f64("k_pct")?,
            bb_pct: row.opt_f64("bb_pct")?,
            hr_per_9: row.opt_f64("hr_per_9")?,
            hr_per_fb: row.opt_f64("hr_per_fb")?,
            hard_hit_pct_against: row.opt_f64("hard_hit_pct_against")?,
            barrel_pct_against: row.opt_f64("barrel_pct_against")?,
            avg_exit_velo_against: row.opt_f64("avg_exit_velo_against")?,
            fly_ball_pct: row.opt_f64("fly_ball_pct")?,
            whiff_pct: row.opt_f64("whiff_pct")?,
            chase_pct: row.opt_f64("chase_pct")?,
            avg_fastball_velo: row.opt_f64("avg_fastball_velo")?,
            fastball_velo_trend: row.opt_f64("fastball_velo_trend")?,
            k_pct_vs_lhb: row.opt_f64("k_pct_vs_lhb")?,
            k_pct_vs_rhb: row.opt_f64("k_pct_vs_rhb")?,
            hr_per_9_vs_lhb: row.opt_f64("hr_per_9_vs_lhb")?,
            hr_per_9_vs_rhb: row.opt_f64("hr_per_9_vs_rhb")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct StartAggregates {
    outs_avg_last_5: Option<f64>,
    pitches_avg_last_5: Option<f64>,
    tto_k_decay_pct: Option<f64>,
    tto_hr_increase_pct: Option<f64>,
    tto_endurance_score: Option<f64>,
}

/// Role-confidence ladder from recent batters faced.
fn starter_role_confidence(bf_14: Option<f64>, bf_30: Option<f64>) -> f64 {
    match (bf_14, bf_30) {
        (None, None) => 0.2,
        (_, Some(bf30)) => {
            if bf30 >= 80.0 {
                0.9
            } else if bf30 >= 50.0 {
                0.75
            } else if bf30 >= 20.0 {
                0.55
            } else {
                0.35
            }
        }
        (Some(bf14), None) => {
            if bf14 >= 40.0 {
                0.7
            } else if bf14 >= 20.0 {
                0.5
            } else {
                0.35
            }
        }
    }
}

/// Times-through-order metrics from per-start buckets.
///
/// `k_decay = (k%_TTO1 − k%_TTO3) / k%_TTO1 × 100` (positive = the
/// pitcher loses strikeouts the third time through), `hr_increase` is the
/// analogous HR-rate growth, and the endurance score centers 50 at
/// league-typical decay (18%) and HR growth (25%).
fn tto_metrics(
    bf1: f64,
    k1: f64,
    hr1: f64,
    bf3: f64,
    k3: f64,
    hr3: f64,
) -> (Option<f64>, Option<f64>, Option<f64>) {
    if bf1 < 20.0 || bf3 < 10.0 {
        return (None, None, None);
    }
    let k_rate1 = k1 / bf1;
    let k_rate3 = k3 / bf3;
    let hr_rate1 = hr1 / bf1;
    let hr_rate3 = hr3 / bf3;

    let k_decay = if k_rate1 > 0.0 {
        Some((k_rate1 - k_rate3) / k_rate1 * 100.0)
    } else {
        None
    };
    let hr_increase = Some((hr_rate3 - hr_rate1) / hr_rate1.max(0.01) * 100.0);

    let endurance = {
        let decay = k_decay.unwrap_or(18.0);
        let growth = hr_increase.unwrap_or(25.0);
        (50.0 + (18.0 - decay) * 1.5 - (growth - 25.0) * 0.2).clamp(0.0, 100.0)
    };
    (k_decay, hr_increase, Some(endurance))
}

async fn probable_starters(store: &Store, date: NaiveDate) -> Result<HashMap<i64, String>> {
    let rows = store
        .fetch_all(
            "SELECT home_pitcher_id, away_pitcher_id, home_team, away_team
             FROM games WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut starters = HashMap::new();
    for row in &rows {
        if let Some(id) = row.opt_i64("home_pitcher_id")? {
            starters.insert(id, row.text("home_team")?);
        }
        if let Some(id) = row.opt_i64("away_pitcher_id")? {
            starters.insert(id, row.text("away_team")?);
        }
    }
    Ok(starters)
}

async fn latest_windows(
    store: &Store,
    pitcher_ids: &[i64],
    date: NaiveDate,
) -> Result<HashMap<i64, HashMap<i64, WindowRow>>> {
    if pitcher_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let lower = date - Duration::days(FEATURE_LOOKBACK_DAYS);
    let placeholders: Vec<String> = (0..pitcher_ids.len()).map(|i| format!("${}", i + 3)).collect();
    let sql = format!(
        "SELECT * FROM pitcher_stats
         WHERE stat_date > $1 AND stat_date <= $2 AND window_days IN (14, 30)
           AND player_id IN ({})
         ORDER BY player_id, window_days, stat_date DESC",
        placeholders.join(", ")
    );
    let mut params = vec![SqlValue::from(lower), SqlValue::from(date)];
    params.extend(pitcher_ids.iter().map(|id| SqlValue::from(*id)));
    let rows = store.fetch_all(&sql, &params).await?;

    let mut latest: HashMap<i64, HashMap<i64, WindowRow>> = HashMap::new();
    for row in &rows {
        let pid = row.i64("player_id")?;
        let window = row.i64("window_days")?;
        latest
            .entry(pid)
            .or_default()
            .entry(window)
            .or_insert(WindowRow::from_store(row)?);
    }
    Ok(latest)
}

async fn start_aggregates(
    store: &Store,
    pitcher_id: i64,
    date: NaiveDate,
) -> Result<StartAggregates> {
    let rows = store
        .fetch_all(
            "SELECT outs_recorded, pitches, bf_tto1, k_tto1, hr_tto1, bf_tto3, k_tto3, hr_tto3
             FROM pitcher_game_log
             WHERE pitcher_id = $1 AND game_date < $2 AND is_start = 1
             ORDER BY game_date DESC
             LIMIT 10",
            &[SqlValue::from(pitcher_id), SqlValue::from(date)],
        )
        .await?;
    if rows.is_empty() {
        return Ok(StartAggregates::default());
    }

    let last5: Vec<&StoreRow> = rows.iter().take(5).collect();
    let n = last5.len() as f64;
    let outs_sum: i64 = last5
        .iter()
        .map(|r| r.opt_i64("outs_recorded").unwrap_or(None).unwrap_or(0))
        .sum();
    let pitches_sum: i64 = last5
        .iter()
        .map(|r| r.opt_i64("pitches").unwrap_or(None).unwrap_or(0))
        .sum();

    let mut bf1 = 0f64;
    let mut k1 = 0f64;
    let mut hr1 = 0f64;
    let mut bf3 = 0f64;
    let mut k3 = 0f64;
    let mut hr3 = 0f64;
    for row in &rows {
        bf1 += row.opt_i64("bf_tto1")?.unwrap_or(0) as f64;
        k1 += row.opt_i64("k_tto1")?.unwrap_or(0) as f64;
        hr1 += row.opt_i64("hr_tto1")?.unwrap_or(0) as f64;
        bf3 += row.opt_i64("bf_tto3")?.unwrap_or(0) as f64;
        k3 += row.opt_i64("k_tto3")?.unwrap_or(0) as f64;
        hr3 += row.opt_i64("hr_tto3")?.unwrap_or(0) as f64;
    }
    let (decay, increase, endurance) = tto_metrics(bf1, k1, hr1, bf3, k3, hr3);

    Ok(StartAggregates {
        outs_avg_last_5: Some(outs_sum as f64 / n),
        pitches_avg_last_5: Some(pitches_sum as f64 / n),
        tto_k_decay_pct: decay,
        tto_hr_increase_pct: increase,
        tto_endurance_score: endurance,
    })
}

pub async fn build_pitcher_features(store: &Store, date: NaiveDate) -> Result<BuilderSummary> {
    let starters = probable_starters(store, date).await?;
    if starters.is_empty() {
        warn!(date = %date_str(date), "no probable starters for date");
        return Ok(BuilderSummary {
            warnings: vec!["no probable starters found for date".into()],
            ..Default::default()
        });
    }

    let mut pitcher_ids: Vec<i64> = starters.keys().copied().collect();
    pitcher_ids.sort_unstable();
    let windows = latest_windows(store, &pitcher_ids, date).await?;

    let mut features = Vec::new();
    let mut missing = 0usize;
    let mut partial = 0usize;
    for pitcher_id in &pitcher_ids {
        let Some(per_window) = windows.get(pitcher_id) else {
            missing += 1;
            continue;
        };
        let empty = WindowRow::default();
        let w14 = per_window.get(&14).unwrap_or(&empty);
        let w30 = per_window.get(&30).unwrap_or(&empty);
        if per_window.len() < 2 {
            partial += 1;
        }

        let starts = start_aggregates(store, *pitcher_id, date).await?;
        features.push(PitcherFeatures {
            pitcher_id: *pitcher_id,
            team_id: w30
                .team
                .clone()
                .or_else(|| w14.team.clone())
                .or_else(|| starters.get(pitcher_id).cloned()),
            throws: w30.pitch_hand.clone().or_else(|| w14.pitch_hand.clone()),
            batters_faced_14: w14.batters_faced,
            batters_faced_30: w30.batters_faced,
            k_pct_14: w14.k_pct,
            k_pct_30: w30.k_pct,
            bb_pct_14: w14.bb_pct,
            bb_pct_30: w30.bb_pct,
            hr_per_9_14: w14.hr_per_9,
            hr_per_9_30: w30.hr_per_9,
            hr_per_fb_14: w14.hr_per_fb,
            hr_per_fb_30: w30.hr_per_fb,
            hard_hit_pct_allowed_14: w14.hard_hit_pct_against,
            hard_hit_pct_allowed_30: w30.hard_hit_pct_against,
            barrel_pct_allowed_14: w14.barrel_pct_against,
            barrel_pct_allowed_30: w30.barrel_pct_against,
            avg_exit_velo_allowed_14: w14.avg_exit_velo_against,
            avg_exit_velo_allowed_30: w30.avg_exit_velo_against,
            fly_ball_pct_allowed_14: w14.fly_ball_pct,
            fly_ball_pct_allowed_30: w30.fly_ball_pct,
            whiff_pct_14: w14.whiff_pct,
            whiff_pct_30: w30.whiff_pct,
            chase_pct_14: w14.chase_pct,
            chase_pct_30: w30.chase_pct,
            avg_fastball_velo_14: w14.avg_fastball_velo,
            avg_fastball_velo_30: w30.avg_fastball_velo,
            fastball_velo_trend_14: w14.fastball_velo_trend,
            outs_recorded_avg_last_5: starts.outs_avg_last_5,
            pitches_avg_last_5: starts.pitches_avg_last_5,
            starter_role_confidence: Some(starter_role_confidence(
                w14.batters_faced,
                w30.batters_faced,
            )),
            split_k_pct_vs_lhh: w30.k_pct_vs_lhb.or(w14.k_pct_vs_lhb),
            split_k_pct_vs_rhh: w30.k_pct_vs_rhb.or(w14.k_pct_vs_rhb),
            split_hr_allowed_rate_vs_lhh: w30.hr_per_9_vs_lhb.or(w14.hr_per_9_vs_lhb),
            split_hr_allowed_rate_vs_rhh: w30.hr_per_9_vs_rhb.or(w14.hr_per_9_vs_rhb),
            tto_k_decay_pct: starts.tto_k_decay_pct,
            tto_hr_increase_pct: starts.tto_hr_increase_pct,
            tto_endurance_score: starts.tto_endurance_score,
        });
    }

    let upserted = persist(store, date, &features).await?;
    let mut warnings = Vec::new();
    if missing > 0 {
        warnings.push(format!("{missing} probable starter(s) had no prior pitcher_stats"));
    }
    if partial > 0 {
        warnings.push(format!("{partial} starter row(s) missing a 14d or 30d window"));
    }
    info!(
        date = %date_str(date),
        generated = features.len(),
        upserted,
        partial,
        missing,
        "pitcher features built"
    );
    Ok(BuilderSummary {
        rows_generated: features.len(),
        rows_upserted: upserted,
        warnings,
    })
}

async fn persist(store: &Store, date: NaiveDate, features: &[PitcherFeatures]) -> Result<u64> {
    if features.is_empty() {
        return Ok(0);
    }
    let columns = [
        "game_date", "pitcher_id", "team_id", "throws",
        "batters_faced_14", "batters_faced_30",
        "k_pct_14", "k_pct_30",
        "bb_pct_14", "bb_pct_30",
        "hr_per_9_14", "hr_per_9_30",
        "hr_per_fb_14", "hr_per_fb_30",
        "hard_hit_pct_allowed_14", "hard_hit_pct_allowed_30",
        "barrel_pct_allowed_14", "barrel_pct_allowed_30",
        "avg_exit_velo_allowed_14", "avg_exit_velo_allowed_30",
        "fly_ball_pct_allowed_14", "fly_ball_pct_allowed_30",
        "whiff_pct_14", "whiff_pct_30",
        "chase_pct_14", "chase_pct_30",
        "avg_fastball_velo_14", "avg_fastball_velo_30",
        "fastball_velo_trend_14",
        "outs_recorded_avg_last_5", "pitches_avg_last_5",
        "starter_role_confidence",
        "split_k_pct_vs_lhh", "split_k_pct_vs_rhh",
        "split_hr_allowed_rate_vs_lhh", "split_hr_allowed_rate_vs_rhh",
        "tto_k_decay_pct", "tto_hr_increase_pct", "tto_endurance_score",
    ];
    let rows: Vec<Vec<SqlValue>> = features
        .iter()
        .map(|f| {
            vec![
                SqlValue::from(date),
                SqlValue::from(f.pitcher_id),
                SqlValue::from(f.team_id.clone()),
                SqlValue::from(f.throws.clone()),
                SqlValue::from(f.batters_faced_14), SqlValue::from(f.batters_faced_30),
                SqlValue::from(f.k_pct_14), SqlValue::from(f.k_pct_30),
                SqlValue::from(f.bb_pct_14), SqlValue::from(f.bb_pct_30),
                SqlValue::from(f.hr_per_9_14), SqlValue::from(f.hr_per_9_30),
                SqlValue::from(f.hr_per_fb_14), SqlValue::from(f.hr_per_fb_30),
                SqlValue::from(f.hard_hit_pct_allowed_14), SqlValue::from(f.hard_hit_pct_allowed_30),
                SqlValue::from(f.barrel_pct_allowed_14), SqlValue::from(f.barrel_pct_allowed_30),
                SqlValue::from(f.avg_exit_velo_allowed_14), SqlValue::from(f.avg_exit_velo_allowed_30),
                SqlValue::from(f.fly_ball_pct_allowed_14), SqlValue::from(f.fly_ball_pct_allowed_30),
                SqlValue::from(f.whiff_pct_14), SqlValue::from(f.whiff_pct_30),
                SqlValue::from(f.chase_pct_14), SqlValue::from(f.chase_pct_30),
                SqlValue::from(f.avg_fastball_velo_14), SqlValue::from(f.avg_fastball_velo_30),
                SqlValue::from(f.fastball_velo_trend_14),
                SqlValue::from(f.outs_recorded_avg_last_5), SqlValue::from(f.pitches_avg_last_5),
                SqlValue::from(f.starter_role_confidence),
                SqlValue::from(f.split_k_pct_vs_lhh), SqlValue::from(f.split_k_pct_vs_rhh),
                SqlValue::from(f.split_hr_allowed_rate_vs_lhh), SqlValue::from(f.split_hr_allowed_rate_vs_rhh),
                SqlValue::from(f.tto_k_decay_pct), SqlValue::from(f.tto_hr_increase_pct),
                SqlValue::from(f.tto_endurance_score),
            ]
        })
        .collect();
    store
        .upsert_batch(
            "pitcher_daily_features",
            &columns,
            &["game_date", "pitcher_id"],
            &rows,
        )
        .await
}

/// Load the pitcher feature snapshot for a date, keyed by pitcher.
pub async fn load_for_date(store: &Store, date: NaiveDate) -> Result<HashMap<i64, PitcherFeatures>> {
    let rows = store
        .fetch_all(
            "SELECT * FROM pitcher_daily_features WHERE game_date = $1",
            &[SqlValue::from(date)],
        )
        .await?;
    let mut map = HashMap::new();
    for row in &rows {
        let f = PitcherFeatures {
            pitcher_id: row.i64("pitcher_id")?,
            team_id: row.opt_text("team_id")?,
            throws: row.opt_text("throws")?,
            batters_faced_14: row.opt_f64("batters_faced_14")?,
            batters_faced_30: row.opt_f64("batters_faced_30")?,
            k_pct_14: row.opt_f64("k_pct_14")?,
            k_pct_30: row.opt_f64("k_pct_30")?,
            bb_pct_14: row.opt_f64("bb_pct_14")?,
            bb_pct_30: row.opt_f64("bb_pct_30")?,
            hr_per_9_14: row.opt_f64("hr_per_9_14")?,
            hr_per_9_30: row.opt_f64("hr_per_9_30")?,
            hr_per_fb_14: row.opt_f64("hr_per_fb_14")?,
            hr_per_fb_30: row.opt_f64("hr_per_fb_30")?,
            hard_hit_pct_allowed_14: row.opt_f64("hard_hit_pct_allowed_14")?,
            hard_hit_pct_allowed_30: row.opt_f64("hard_hit_pct_allowed_30")?,
            barrel_pct_allowed_14: row.opt_f64("barrel_pct_allowed_14")?,
            barrel_pct_allowed_30: row.opt_f64("barrel_pct_allowed_30")?,
            avg_exit_velo_allowed_14: row.opt_f64("avg_exit_velo_allowed_14")?,
            avg_exit_velo_allowed_30: row.opt_f64("avg_exit_velo_allowed_30")?,
            fly_ball_pct_allowed_14: row.opt_f64("fly_ball_pct_allowed_14")?,
            fly_ball_pct_allowed_30: row.opt_f64("fly_ball_pct_allowed_30")?,
            whiff_pct_14: row.opt_f64("whiff_pct_14")?,
            whiff_pct_30: row.opt_f64("whiff_pct_30")?,
            chase_pct_14: row.opt_f64("chase_pct_14")?,
            chase_pct_30: row.opt_f64("chase_pct_30")?,
            avg_fastball_velo_14: row.opt_f64("avg_fastball_velo_14")?,
            avg_fastball_velo_30: row.opt_f64("avg_fastball_velo_30")?,
            fastball_velo_trend_14: row.opt_f64("fastball_velo_trend_14")?,
            outs_recorded_avg_last_5: row.opt_f64("outs_recorded_avg_last_5")?,
            pitches_avg_last_5: row.opt_f64("pitches_avg_last_5")?,
            starter_role_confidence: row.opt_f64("starter_role_confidence")?,
            split_k_pct_vs_lhh: row.opt_f64("split_k_pct_vs_lhh")?,
            split_k_pct_vs_rhh: row.opt_f64("split_k_pct_vs_rhh")?,
            split_hr_allowed_rate_vs_lhh: row.opt_f64("split_hr_allowed_rate_vs_lhh")?,
            split_hr_allowed_rate_vs_rhh: row.opt_f64("split_hr_allowed_rate_vs_rhh")?,
            tto_k_decay_pct: row.opt_f64("tto_k_decay_pct")?,
            tto_hr_increase_pct: row.opt_f64("tto_hr_increase_pct")?,
            tto_endurance_score: row.opt_f64("tto_endurance_score")?,
        };
        map.insert(f.pitcher_id, f);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_confidence_ladder() {
        assert_eq!(starter_role_confidence(None, None), 0.2);
        assert_eq!(starter_role_confidence(Some(50.0), Some(90.0)), 0.9);
        assert_eq!(starter_role_confidence(Some(50.0), Some(60.0)), 0.75);
        assert_eq!(starter_role_confidence(Some(10.0), Some(25.0)), 0.55);
        assert_eq!(starter_role_confidence(Some(10.0), Some(5.0)), 0.35);
        assert_eq!(starter_role_confidence(Some(45.0), None), 0.7);
        assert_eq!(starter_role_confidence(Some(25.0), None), 0.5);
    }

    #[test]
    fn test_tto_metrics() {
        // TTO1: 30% K rate, TTO3: 20% → decay = 33.3%
        let (decay, increase, endurance) = tto_metrics(100.0, 30.0, 3.0, 50.0, 10.0, 2.5);
        let decay = decay.unwrap();
        assert!((decay - (0.30 - 0.20) / 0.30 * 100.0).abs() < 1e-6);
        // HR rate grows from 3% to 5%
        assert!(increase.unwrap() > 0.0);
        let endurance = endurance.unwrap();
        assert!((0.0..=100.0).contains(&endurance));
        // heavy decay scores below neutral
        assert!(endurance < 50.0);
    }

    #[test]
    fn test_tto_metrics_small_sample_is_null() {
        let (decay, increase, endurance) = tto_metrics(10.0, 3.0, 1.0, 2.0, 0.0, 0.0);
        assert!(decay.is_none() && increase.is_none() && endurance.is_none());
    }
}
