//! Rolling window statistics derived from raw pitch events.
//!
//! This is backfill Phase 1: pitch events for a date span are aggregated
//! into per-player daily lines, then into `batter_stats` / `pitcher_stats`
//! window rows plus the per-game logs the grader and feature builders
//! read (`pitcher_game_log`, `batter_game_outcomes`).
//!
//! Window rows are keyed `(player_id, stat_date, window_days)` where
//! `stat_date` is the as-of date: a row at `stat_date = D` aggregates the
//! player's daily lines in `[D - W, D)`; the right endpoint is open, so
//! no event from `game_date >= D` ever contributes. Rows are emitted at
//! the day after each appearance, which is the earliest date the new
//! appearance may legally influence.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use tracing::info;

use crate::error::Result;
use crate::store::{date_str, SqlValue, Store};

pub const BATTER_WINDOWS: [i64; 3] = [7, 14, 30];
pub const PITCHER_WINDOWS: [i64; 2] = [14, 30];

/// Below this many plate appearances a window's rate stats are stored as
/// NULL rather than noisy zeros.
pub const MIN_WINDOW_PA: i64 = 10;

const NON_AB_EVENTS: [&str; 6] = [
    "walk",
    "intent_walk",
    "hit_by_pitch",
    "sac_fly",
    "sac_bunt",
    "catcher_interf",
];

const SWING_DESCRIPTIONS: [&str; 9] = [
    "swinging_strike",
    "swinging_strike_blocked",
    "foul",
    "foul_tip",
    "hit_into_play",
    "hit_into_play_score",
    "hit_into_play_no_out",
    "foul_bunt",
    "missed_bunt",
];

const WHIFF_DESCRIPTIONS: [&str; 3] = ["swinging_strike", "swinging_strike_blocked", "missed_bunt"];

const FASTBALL_TYPES: [&str; 5] = ["FF", "FA", "FT", "SI", "FC"];

fn outs_for_event(event: &str) -> i64 {
    match event {
        "field_out" | "force_out" | "fielders_choice_out" | "strikeout" | "sac_fly"
        | "sac_bunt" | "bunt_groundout" | "bunt_pop_out" | "bunt_lineout" | "lineout"
        | "flyout" | "pop_out" => 1,
        "grounded_into_double_play" | "double_play" | "strikeout_double_play"
        | "sac_fly_double_play" => 2,
        "triple_play" => 3,
        _ => 0,
    }
}

// =============================================================================
// Daily aggregates
// =============================================================================

#[derive(Debug, Clone, Default)]
struct BatterDay {
    player_name: String,
    team: String,
    opponent: String,
    bat_hand: String,
    pa: i64,
    ab: i64,
    singles: i64,
    doubles: i64,
    triples: i64,
    hrs: i64,
    ks: i64,
    bbs: i64,
    batted: i64,
    barrels: i64,
    hard_hit: i64,
    ev_sum: f64,
    ev_max: f64,
    la_sum: f64,
    sweet_spot: i64,
    fly_balls: i64,
    line_drives: i64,
    ground_balls: i64,
    pull_fly_balls: i64,
    // splits vs pitcher hand
    lhp: SplitDay,
    rhp: SplitDay,
}

#[derive(Debug, Clone, Copy, Default)]
struct SplitDay {
    pa: i64,
    ab: i64,
    singles: i64,
    doubles: i64,
    triples: i64,
    hrs: i64,
    ks: i64,
    batted: i64,
    barrels: i64,
    outs: i64,
}

#[derive(Debug, Clone, Default)]
struct PitcherDay {
    player_name: String,
    team: String,
    opponent: String,
    pitch_hand: String,
    games: i64,
    pitches: i64,
    pa: i64,
    singles: i64,
    doubles: i64,
    triples: i64,
    hrs: i64,
    ks: i64,
    outs_recorded: i64,
    batted: i64,
    barrels: i64,
    hard_hit: i64,
    ev_sum: f64,
    la_sum: f64,
    fly_balls: i64,
    swings: i64,
    whiffs: i64,
    in_zone_pitches: i64,
    out_zone_pitches: i64,
    chase_swings: i64,
    fb_velo_sum: f64,
    fb_velo_count: i64,
    lhb: SplitDay,
    rhb: SplitDay,
}

#[derive(Debug, Clone, Default)]
struct PitcherGame {
    game_id: i64,
    game_date: NaiveDate,
    team: String,
    opponent: String,
    outs_recorded: i64,
    pitches: i64,
    batters_faced: i64,
    ks: i64,
    hrs_allowed: i64,
    bf_tto1: i64,
    k_tto1: i64,
    hr_tto1: i64,
    bf_tto3: i64,
    k_tto3: i64,
    hr_tto3: i64,
    // distinct batters in order of first appearance, for TTO bucketing
    batter_order: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
struct BatterGame {
    game_id: i64,
    game_date: NaiveDate,
    player_name: String,
    team: String,
    opponent: String,
    pa: i64,
    singles: i64,
    doubles: i64,
    triples: i64,
    hrs: i64,
    ks: i64,
}

#[derive(Debug, Default)]
struct Aggregates {
    batter_days: BTreeMap<(i64, NaiveDate), BatterDay>,
    pitcher_days: BTreeMap<(i64, NaiveDate), PitcherDay>,
    pitcher_games: HashMap<(i64, i64), PitcherGame>,
    batter_games: HashMap<(i64, i64), BatterGame>,
    // max-workload pitcher per (game, defensive team) infers the starter
    workloads: HashMap<(i64, String, i64), i64>,
}

struct EventRow {
    game_id: i64,
    game_date: NaiveDate,
    bat_team: Option<String>,
    def_team: Option<String>,
    batter_id: Option<i64>,
    pitcher_id: Option<i64>,
    batter_name: Option<String>,
    pitcher_name: Option<String>,
    stand: Option<String>,
    p_throws: Option<String>,
    events: Option<String>,
    description: Option<String>,
    pitch_type: Option<String>,
    release_speed: Option<f64>,
    zone: Option<i64>,
    launch_speed: Option<f64>,
    launch_angle: Option<f64>,
    launch_speed_angle: Option<i64>,
    hc_x: Option<f64>,
}

async fn load_events(store: &Store, start: NaiveDate, end: NaiveDate) -> Result<Vec<EventRow>> {
    let rows = store
        .fetch_all(
            "SELECT game_id, game_date, bat_team, def_team, batter_id, pitcher_id,
                    batter_name, pitcher_name, stand, p_throws, events, description,
                    pitch_type, release_speed, zone, launch_speed, launch_angle,
                    launch_speed_angle, hc_x
             FROM pitch_events
             WHERE game_date >= $1 AND game_date <= $2
             ORDER BY game_id, event_seq",
            &[SqlValue::from(start), SqlValue::from(end)],
        )
        .await?;
    rows.iter()
        .map(|r| {
            Ok(EventRow {
                game_id: r.i64("game_id")?,
                game_date: r.date("game_date")?,
                bat_team: r.opt_text("bat_team")?,
                def_team: r.opt_text("def_team")?,
                batter_id: r.opt_i64("batter_id")?,
                pitcher_id: r.opt_i64("pitcher_id")?,
                batter_name: r.opt_text("batter_name")?,
                pitcher_name: r.opt_text("pitcher_name")?,
                stand: r.opt_text("stand")?,
                p_throws: r.opt_text("p_throws")?,
                events: r.opt_text("events")?,
                description: r.opt_text("description")?,
                pitch_type: r.opt_text("pitch_type")?,
                release_speed: r.opt_f64("release_speed")?,
                zone: r.opt_i64("zone")?,
                launch_speed: r.opt_f64("launch_speed")?,
                launch_angle: r.opt_f64("launch_angle")?,
                launch_speed_angle: r.opt_i64("launch_speed_angle")?,
                hc_x: r.opt_f64("hc_x")?,
            })
        })
        .collect()
}

fn accumulate(events: &[EventRow]) -> Aggregates {
    let mut agg = Aggregates::default();

    for ev in events {
        let event = ev.events.as_deref().unwrap_or("");
        let desc = ev.description.as_deref().unwrap_or("");
        let is_pa = !event.is_empty();
        let is_ab = is_pa && !NON_AB_EVENTS.contains(&event);
        let is_single = event == "single";
        let is_double = event == "double";
        let is_triple = event == "triple";
        let is_hr = event == "home_run";
        let is_k = event.starts_with("strikeout");
        let is_bb = matches!(event, "walk" | "intent_walk" | "hit_by_pitch");
        let is_batted = ev.launch_speed.is_some();
        let is_barrel = ev.launch_speed_angle == Some(6);
        let is_hard_hit = ev.launch_speed.is_some_and(|v| v >= 95.0);
        let la = ev.launch_angle;
        let is_sweet_spot = is_batted && la.is_some_and(|a| (8.0..=32.0).contains(&a));
        let is_fly_ball = is_batted && la.is_some_and(|a| a > 25.0);
        let is_line_drive = is_batted && la.is_some_and(|a| (10.0..=25.0).contains(&a));
        let is_ground_ball = is_batted && la.is_some_and(|a| a < 10.0);
        let stand = ev.stand.as_deref().unwrap_or("");
        let is_pull_fly = is_fly_ball
            && match (stand, ev.hc_x) {
                ("R", Some(x)) => x < 126.0,
                ("L", Some(x)) => x > 126.0,
                _ => false,
            };
        let outs = outs_for_event(event);
        let is_swing = SWING_DESCRIPTIONS.contains(&desc);
        let is_whiff = WHIFF_DESCRIPTIONS.contains(&desc);
        let in_zone = ev.zone.is_some_and(|z| (1..=9).contains(&z));
        let out_zone = ev.zone.is_some() && !in_zone;
        let is_fastball = ev
            .pitch_type
            .as_deref()
            .is_some_and(|p| FASTBALL_TYPES.contains(&p))
            && ev.release_speed.is_some();

        // ---- batter side ----
        if let Some(batter_id) = ev.batter_id {
            let day = agg
                .batter_days
                .entry((batter_id, ev.game_date))
                .or_default();
            if let Some(name) = &ev.batter_name {
                day.player_name = name.clone();
            }
            if let Some(team) = &ev.bat_team {
                day.team = team.clone();
            }
            if let Some(opp) = &ev.def_team {
                day.opponent = opp.clone();
            }
            if matches!(stand, "L" | "R" | "S") {
                day.bat_hand = stand.to_string();
            }
            day.pa += is_pa as i64;
            day.ab += is_ab as i64;
            day.singles += is_single as i64;
            day.doubles += is_double as i64;
            day.triples += is_triple as i64;
            day.hrs += is_hr as i64;
            day.ks += is_k as i64;
            day.bbs += is_bb as i64;
            if is_batted {
                day.batted += 1;
                let ev_speed = ev.launch_speed.unwrap_or(0.0);
                day.ev_sum += ev_speed;
                day.ev_max = day.ev_max.max(ev_speed);
                day.la_sum += la.unwrap_or(0.0);
            }
            day.barrels += is_barrel as i64;
            day.hard_hit += is_hard_hit as i64;
            day.sweet_spot += is_sweet_spot as i64;
            day.fly_balls += is_fly_ball as i64;
            day.line_drives += is_line_drive as i64;
            day.ground_balls += is_ground_ball as i64;
            day.pull_fly_balls += is_pull_fly as i64;

            if let Some(p_throws) = ev.p_throws.as_deref() {
                let split = match p_throws {
                    "L" => Some(&mut day.lhp),
                    "R" => Some(&mut day.rhp),
                    _ => None,
                };
                if let Some(split) = split {
                    split.pa += is_pa as i64;
                    split.ab += is_ab as i64;
                    split.singles += is_single as i64;
                    split.doubles += is_double as i64;
                    split.triples += is_triple as i64;
                    split.hrs += is_hr as i64;
                    split.ks += is_k as i64;
                    split.batted += is_batted as i64;
                    split.barrels += is_barrel as i64;
                }
            }

            let bgame = agg
                .batter_games
                .entry((ev.game_id, batter_id))
                .or_insert_with(|| BatterGame {
                    game_id: ev.game_id,
                    game_date: ev.game_date,
                    ..Default::default()
                });
            if let Some(name) = &ev.batter_name {
                bgame.player_name = name.clone();
            }
            if let Some(team) = &ev.bat_team {
                bgame.team = team.clone();
            }
            if let Some(opp) = &ev.def_team {
                bgame.opponent = opp.clone();
            }
            bgame.pa += is_pa as i64;
            bgame.singles += is_single as i64;
            bgame.doubles += is_double as i64;
            bgame.triples += is_triple as i64;
            bgame.hrs += is_hr as i64;
            bgame.ks += is_k as i64;
        }

        // ---- pitcher side ----
        if let Some(pitcher_id) = ev.pitcher_id {
            let day = agg
                .pitcher_days
                .entry((pitcher_id, ev.game_date))
                .or_default();
            if let Some(name) = &ev.pitcher_name {
                day.player_name = name.clone();
            }
            if let Some(team) = &ev.def_team {
                day.team = team.clone();
            }
            if let Some(opp) = &ev.bat_team {
                day.opponent = opp.clone();
            }
            if let Some(hand) = ev.p_throws.as_deref() {
                if matches!(hand, "L" | "R") {
                    day.pitch_hand = hand.to_string();
                }
            }
            day.pitches += 1;
            day.pa += is_pa as i64;
            day.singles += is_single as i64;
            day.doubles += is_double as i64;
            day.triples += is_triple as i64;
            day.hrs += is_hr as i64;
            day.ks += is_k as i64;
            day.outs_recorded += outs;
            if is_batted {
                day.batted += 1;
                day.ev_sum += ev.launch_speed.unwrap_or(0.0);
                day.la_sum += la.unwrap_or(0.0);
            }
            day.barrels += is_barrel as i64;
            day.hard_hit += is_hard_hit as i64;
            day.fly_balls += is_fly_ball as i64;
            day.swings += is_swing as i64;
            day.whiffs += is_whiff as i64;
            day.in_zone_pitches += in_zone as i64;
            day.out_zone_pitches += out_zone as i64;
            day.chase_swings += (is_swing && out_zone) as i64;
            if is_fastball {
                day.fb_velo_sum += ev.release_speed.unwrap_or(0.0);
                day.fb_velo_count += 1;
            }

            if matches!(stand, "L" | "R") {
                let split = if stand == "L" { &mut day.lhb } else { &mut day.rhb };
                split.pa += is_pa as i64;
                split.ab += is_ab as i64;
                split.singles += is_single as i64;
                split.doubles += is_double as i64;
                split.triples += is_triple as i64;
                split.hrs += is_hr as i64;
                split.ks += is_k as i64;
                split.outs += outs;
            }

            if let Some(def_team) = &ev.def_team {
                *agg
                    .workloads
                    .entry((ev.game_id, def_team.clone(), pitcher_id))
                    .or_default() += 1;
            }

            let pgame = agg
                .pitcher_games
                .entry((pitcher_id, ev.game_id))
                .or_insert_with(|| PitcherGame {
                    game_id: ev.game_id,
                    game_date: ev.game_date,
                    ..Default::default()
                });
            if let Some(team) = &ev.def_team {
                pgame.team = team.clone();
            }
            if let Some(opp) = &ev.bat_team {
                pgame.opponent = opp.clone();
            }
            pgame.pitches += 1;
            pgame.outs_recorded += outs;
            if is_pa {
                pgame.batters_faced += 1;
                pgame.ks += is_k as i64;
                pgame.hrs_allowed += is_hr as i64;
            }
            if let Some(batter_id) = ev.batter_id {
                let tto = match pgame.batter_order.iter().position(|b| *b == batter_id) {
                    Some(pos) => pos as i64 / 9 + 1,
                    None => {
                        pgame.batter_order.push(batter_id);
                        (pgame.batter_order.len() as i64 - 1) / 9 + 1
                    }
                };
                if is_pa {
                    if tto == 1 {
                        pgame.bf_tto1 += 1;
                        pgame.k_tto1 += is_k as i64;
                        pgame.hr_tto1 += is_hr as i64;
                    } else if tto >= 3 {
                        pgame.bf_tto3 += 1;
                        pgame.k_tto3 += is_k as i64;
                        pgame.hr_tto3 += is_hr as i64;
                    }
                }
            }
        }
    }

    agg
}

// =============================================================================
// Window math
// =============================================================================

fn pct(numer: i64, denom: i64) -> Option<f64> {
    if denom <= 0 {
        None
    } else {
        Some((numer as f64 / denom as f64 * 100.0 * 10.0).round() / 10.0)
    }
}

fn avg(sum: f64, denom: i64) -> Option<f64> {
    if denom <= 0 {
        None
    } else {
        Some((sum / denom as f64 * 10.0).round() / 10.0)
    }
}

fn iso(singles: i64, doubles: i64, triples: i64, hrs: i64, ab: i64) -> Option<f64> {
    if ab <= 0 {
        return None;
    }
    let hits = (singles + doubles + triples + hrs) as f64;
    let tb = (singles + 2 * doubles + 3 * triples + 4 * hrs) as f64;
    let value = tb / ab as f64 - hits / ab as f64;
    Some((value * 1000.0).round() / 1000.0)
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// =============================================================================
// Public build entrypoint
// =============================================================================

#[derive(Debug, Default)]
pub struct WindowBuildSummary {
    pub batter_rows: u64,
    pub pitcher_rows: u64,
    pub pitcher_game_rows: u64,
    pub batter_outcome_rows: u64,
}

/// Build window stats for stat dates in `(start, end + 1]` from pitch
/// events already persisted. Loads a 30-day lookback so the first dates
/// of the span see full windows; memory stays bounded by the caller's
/// chunking.
pub async fn build_window_stats(
    store: &Store,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<WindowBuildSummary> {
    let lookback = start - Duration::days(BATTER_WINDOWS[2] - 1);
    let events = load_events(store, lookback, end).await?;
    info!(
        start = %date_str(start),
        end = %date_str(end),
        events = events.len(),
        "computing rolling windows"
    );
    let agg = accumulate(&events);
    let mut summary = WindowBuildSummary::default();

    summary.batter_rows = write_batter_windows(store, &agg, start, end).await?;
    summary.pitcher_rows = write_pitcher_windows(store, &agg, start, end).await?;
    summary.pitcher_game_rows = write_pitcher_game_log(store, &agg, start, end).await?;
    summary.batter_outcome_rows = write_batter_outcomes(store, &agg, start, end).await?;

    info!(
        batter_rows = summary.batter_rows,
        pitcher_rows = summary.pitcher_rows,
        pitcher_games = summary.pitcher_game_rows,
        batter_outcomes = summary.batter_outcome_rows,
        "window stats persisted"
    );
    Ok(summary)
}

fn window_days<'a>(
    days: &'a BTreeMap<(i64, NaiveDate), BatterDay>,
    player_id: i64,
    stat_date: NaiveDate,
    window: i64,
) -> impl Iterator<Item = &'a BatterDay> {
    let lo = stat_date - Duration::days(window);
    days.range((player_id, lo)..(player_id, stat_date))
        .map(|(_, day)| day)
}

fn pitcher_window_days<'a>(
    days: &'a BTreeMap<(i64, NaiveDate), PitcherDay>,
    player_id: i64,
    stat_date: NaiveDate,
    window: i64,
) -> impl Iterator<Item = &'a PitcherDay> {
    let lo = stat_date - Duration::days(window);
    days.range((player_id, lo)..(player_id, stat_date))
        .map(|(_, day)| day)
}

async fn write_batter_windows(
    store: &Store,
    agg: &Aggregates,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64> {
    let columns = [
        "player_id",
        "stat_date",
        "window_days",
        "player_name",
        "team",
        "bat_hand",
        "pa",
        "ab",
        "singles",
        "doubles",
        "triples",
        "hrs",
        "k_pct",
        "bb_pct",
        "barrel_pct",
        "hard_hit_pct",
        "avg_exit_velo",
        "max_exit_velo",
        "avg_launch_angle",
        "sweet_spot_pct",
        "fly_ball_pct",
        "line_drive_pct",
        "ground_ball_pct",
        "pull_pct",
        "hr_per_fb",
        "iso_power",
        "slg",
        "iso_vs_lhp",
        "iso_vs_rhp",
        "barrel_pct_vs_lhp",
        "barrel_pct_vs_rhp",
        "hit_rate_vs_lhp",
        "hit_rate_vs_rhp",
        "k_pct_vs_lhp",
        "k_pct_vs_rhp",
        "hr_count_vs_lhp",
        "hr_count_vs_rhp",
    ];

    let mut rows: Vec<Vec<SqlValue>> = Vec::new();
    for (player_id, play_date) in agg.batter_days.keys() {
        let stat_date = *play_date + Duration::days(1);
        if stat_date <= start || stat_date > end + Duration::days(1) {
            continue;
        }
        for window in BATTER_WINDOWS {
            let mut total = BatterDay::default();
            let mut latest_meta: Option<&BatterDay> = None;
            for day in window_days(&agg.batter_days, *player_id, stat_date, window) {
                total.pa += day.pa;
                total.ab += day.ab;
                total.singles += day.singles;
                total.doubles += day.doubles;
                total.triples += day.triples;
                total.hrs += day.hrs;
                total.ks += day.ks;
                total.bbs += day.bbs;
                total.batted += day.batted;
                total.barrels += day.barrels;
                total.hard_hit += day.hard_hit;
                total.ev_sum += day.ev_sum;
                total.ev_max = total.ev_max.max(day.ev_max);
                total.la_sum += day.la_sum;
                total.sweet_spot += day.sweet_spot;
                total.fly_balls += day.fly_balls;
                total.line_drives += day.line_drives;
                total.ground_balls += day.ground_balls;
                total.pull_fly_balls += day.pull_fly_balls;
                merge_split(&mut total.lhp, &day.lhp);
                merge_split(&mut total.rhp, &day.rhp);
                latest_meta = Some(day);
            }
            if total.pa == 0 {
                continue;
            }
            let meta = latest_meta.expect("pa > 0 implies at least one day");
            let thin = total.pa < MIN_WINDOW_PA;

            let slg = if thin || total.ab == 0 {
                None
            } else {
                Some(round3(
                    (total.singles + 2 * total.doubles + 3 * total.triples + 4 * total.hrs) as f64
                        / total.ab as f64,
                ))
            };
            let rate = |n: i64, d: i64| if thin { None } else { pct(n, d) };
            let rate3 = |hits: i64, ab: i64| {
                if thin || ab == 0 {
                    None
                } else {
                    Some(round3(hits as f64 / ab as f64))
                }
            };

            rows.push(vec![
                SqlValue::from(*player_id),
                SqlValue::from(stat_date),
                SqlValue::from(window),
                SqlValue::from(meta.player_name.clone()),
                SqlValue::from(meta.team.clone()),
                SqlValue::from(if meta.bat_hand.is_empty() {
                    None
                } else {
                    Some(meta.bat_hand.clone())
                }),
                SqlValue::from(total.pa),
                SqlValue::from(total.ab),
                SqlValue::from(total.singles),
                SqlValue::from(total.doubles),
                SqlValue::from(total.triples),
                SqlValue::from(total.hrs),
                SqlValue::from(rate(total.ks, total.pa)),
                SqlValue::from(rate(total.bbs, total.pa)),
                SqlValue::from(rate(total.barrels, total.batted)),
                SqlValue::from(rate(total.hard_hit, total.batted)),
                SqlValue::from(if thin { None } else { avg(total.ev_sum, total.batted) }),
                SqlValue::from(if total.batted > 0 {
                    Some((total.ev_max * 10.0).round() / 10.0)
                } else {
                    None
                }),
                SqlValue::from(if thin { None } else { avg(total.la_sum, total.batted) }),
                SqlValue::from(rate(total.sweet_spot, total.batted)),
                SqlValue::from(rate(total.fly_balls, total.batted)),
                SqlValue::from(rate(total.line_drives, total.batted)),
                SqlValue::from(rate(total.ground_balls, total.batted)),
                SqlValue::from(rate(total.pull_fly_balls, total.fly_balls)),
                SqlValue::from(rate(total.hrs, total.fly_balls)),
                SqlValue::from(if thin {
                    None
                } else {
                    iso(total.singles, total.doubles, total.triples, total.hrs, total.ab)
                }),
                SqlValue::from(slg),
                SqlValue::from(if thin {
                    None
                } else {
                    iso(
                        total.lhp.singles,
                        total.lhp.doubles,
                        total.lhp.triples,
                        total.lhp.hrs,
                        total.lhp.ab,
                    )
                }),
                SqlValue::from(if thin {
                    None
                } else {
                    iso(
                        total.rhp.singles,
                        total.rhp.doubles,
                        total.rhp.triples,
                        total.rhp.hrs,
                        total.rhp.ab,
                    )
                }),
                SqlValue::from(rate(total.lhp.barrels, total.lhp.batted)),
                SqlValue::from(rate(total.rhp.barrels, total.rhp.batted)),
                SqlValue::from(rate3(
                    total.lhp.singles + total.lhp.doubles + total.lhp.triples + total.lhp.hrs,
                    total.lhp.ab,
                )),
                SqlValue::from(rate3(
                    total.rhp.singles + total.rhp.doubles + total.rhp.triples + total.rhp.hrs,
                    total.rhp.ab,
                )),
                SqlValue::from(rate(total.lhp.ks, total.lhp.pa)),
                SqlValue::from(rate(total.rhp.ks, total.rhp.pa)),
                SqlValue::from(total.lhp.hrs),
                SqlValue::from(total.rhp.hrs),
            ]);
        }
    }

    store
        .upsert_batch(
            "batter_stats",
            &columns,
            &["player_id", "stat_date", "window_days"],
            &rows,
        )
        .await
}

fn merge_split(into: &mut SplitDay, from: &SplitDay) {
    into.pa += from.pa;
    into.ab += from.ab;
    into.singles += from.singles;
    into.doubles += from.doubles;
    into.triples += from.triples;
    into.hrs += from.hrs;
    into.ks += from.ks;
    into.batted += from.batted;
    into.barrels += from.barrels;
    into.outs += from.outs;
}

async fn write_pitcher_windows(
    store: &Store,
    agg: &Aggregates,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64> {
    let columns = [
        "player_id",
        "stat_date",
        "window_days",
        "player_name",
        "team",
        "pitch_hand",
        "games",
        "pitches",
        "batters_faced",
        "outs_recorded",
        "innings_pitched",
        "k_pct",
        "bb_pct",
        "hr_per_9",
        "hr_per_fb",
        "fly_ball_pct",
        "hard_hit_pct_against",
        "barrel_pct_against",
        "avg_exit_velo_against",
        "whiff_pct",
        "chase_pct",
        "zone_pct",
        "avg_fastball_velo",
        "fastball_velo_trend",
        "pitches_per_start",
        "days_rest",
        "k_pct_vs_lhb",
        "k_pct_vs_rhb",
        "hr_per_9_vs_lhb",
        "hr_per_9_vs_rhb",
        "iso_allowed_vs_lhb",
        "iso_allowed_vs_rhb",
    ];

    // Range-wide fastball velocity stands in for the season average when
    // computing the velo trend.
    let mut range_velo: HashMap<i64, (f64, i64)> = HashMap::new();
    for ((player_id, _), day) in &agg.pitcher_days {
        let entry = range_velo.entry(*player_id).or_default();
        entry.0 += day.fb_velo_sum;
        entry.1 += day.fb_velo_count;
    }

    let mut prev_date: HashMap<i64, NaiveDate> = HashMap::new();
    let mut rows: Vec<Vec<SqlValue>> = Vec::new();
    for (player_id, play_date) in agg.pitcher_days.keys() {
        let days_rest = prev_date
            .insert(*player_id, *play_date)
            .map(|prev| (*play_date - prev).num_days());
        let stat_date = *play_date + Duration::days(1);
        if stat_date <= start || stat_date > end + Duration::days(1) {
            continue;
        }
        for window in PITCHER_WINDOWS {
            let mut total = PitcherDay::default();
            let mut games = 0i64;
            let mut latest_meta: Option<&PitcherDay> = None;
            for day in pitcher_window_days(&agg.pitcher_days, *player_id, stat_date, window) {
                games += 1;
                total.pitches += day.pitches;
                total.pa += day.pa;
                total.singles += day.singles;
                total.doubles += day.doubles;
                total.triples += day.triples;
                total.hrs += day.hrs;
                total.ks += day.ks;
                total.outs_recorded += day.outs_recorded;
                total.batted += day.batted;
                total.barrels += day.barrels;
                total.hard_hit += day.hard_hit;
                total.ev_sum += day.ev_sum;
                total.fly_balls += day.fly_balls;
                total.swings += day.swings;
                total.whiffs += day.whiffs;
                total.in_zone_pitches += day.in_zone_pitches;
                total.out_zone_pitches += day.out_zone_pitches;
                total.chase_swings += day.chase_swings;
                total.fb_velo_sum += day.fb_velo_sum;
                total.fb_velo_count += day.fb_velo_count;
                merge_split(&mut total.lhb, &day.lhb);
                merge_split(&mut total.rhb, &day.rhb);
                latest_meta = Some(day);
            }
            if total.pitches == 0 {
                continue;
            }
            let meta = latest_meta.expect("pitches > 0 implies at least one day");

            let innings = total.outs_recorded as f64 / 3.0;
            let bbs = total.pa - total.singles - total.doubles - total.triples - total.hrs
                - total.ks
                - outs_to_pa_proxy(total.outs_recorded, total.ks);
            let bb_pct = pct(bbs.max(0), total.pa);
            let hr9 = if innings > 0.0 {
                Some(round3(total.hrs as f64 * 9.0 / innings))
            } else {
                None
            };
            let avg_velo = if total.fb_velo_count > 0 {
                Some((total.fb_velo_sum / total.fb_velo_count as f64 * 100.0).round() / 100.0)
            } else {
                None
            };
            let range_avg = range_velo.get(player_id).and_then(|(sum, n)| {
                if *n > 0 {
                    Some(sum / *n as f64)
                } else {
                    None
                }
            });
            let velo_trend = match (avg_velo, range_avg) {
                (Some(w), Some(r)) => Some(((w - r) * 100.0).round() / 100.0),
                _ => None,
            };
            let lhb_innings = total.lhb.outs as f64 / 3.0;
            let rhb_innings = total.rhb.outs as f64 / 3.0;

            rows.push(vec![
                SqlValue::from(*player_id),
                SqlValue::from(stat_date),
                SqlValue::from(window),
                SqlValue::from(meta.player_name.clone()),
                SqlValue::from(meta.team.clone()),
                SqlValue::from(if meta.pitch_hand.is_empty() {
                    None
                } else {
                    Some(meta.pitch_hand.clone())
                }),
                SqlValue::from(games),
                SqlValue::from(total.pitches),
                SqlValue::from(total.pa),
                SqlValue::from(total.outs_recorded),
                SqlValue::from(round3(innings)),
                SqlValue::from(pct(total.ks, total.pa)),
                SqlValue::from(bb_pct),
                SqlValue::from(hr9),
                SqlValue::from(pct(total.hrs, total.fly_balls)),
                SqlValue::from(pct(total.fly_balls, total.batted)),
                SqlValue::from(pct(total.hard_hit, total.batted)),
                SqlValue::from(pct(total.barrels, total.batted)),
                SqlValue::from(avg(total.ev_sum, total.batted)),
                SqlValue::from(pct(total.whiffs, total.swings)),
                SqlValue::from(pct(total.chase_swings, total.out_zone_pitches)),
                SqlValue::from(pct(total.in_zone_pitches, total.pitches)),
                SqlValue::from(avg_velo),
                SqlValue::from(velo_trend),
                SqlValue::from(if games > 0 {
                    Some((total.pitches as f64 / games as f64 * 10.0).round() / 10.0)
                } else {
                    None
                }),
                SqlValue::from(days_rest),
                SqlValue::from(pct(total.lhb.ks, total.lhb.pa)),
                SqlValue::from(pct(total.rhb.ks, total.rhb.pa)),
                SqlValue::from(if lhb_innings > 0.0 {
                    Some(round3(total.lhb.hrs as f64 * 9.0 / lhb_innings))
                } else {
                    None
                }),
                SqlValue::from(if rhb_innings > 0.0 {
                    Some(round3(total.rhb.hrs as f64 * 9.0 / rhb_innings))
                } else {
                    None
                }),
                SqlValue::from(iso(
                    total.lhb.singles,
                    total.lhb.doubles,
                    total.lhb.triples,
                    total.lhb.hrs,
                    total.lhb.ab,
                )),
                SqlValue::from(iso(
                    total.rhb.singles,
                    total.rhb.doubles,
                    total.rhb.triples,
                    total.rhb.hrs,
                    total.rhb.ab,
                )),
            ]);
        }
    }

    store
        .upsert_batch(
            "pitcher_stats",
            &columns,
            &["player_id", "stat_date", "window_days"],
            &rows,
        )
        .await
}

/// Non-strikeout outs that ended a PA, used when estimating walks from
/// PA composition. Double plays overcount by one out; the walk estimate
/// is a floor-clamped proxy.
fn outs_to_pa_proxy(outs: i64, ks: i64) -> i64 {
    (outs - ks).max(0)
}

async fn write_pitcher_game_log(
    store: &Store,
    agg: &Aggregates,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64> {
    // starter = max workload for (game, defensive team)
    let mut starters: HashMap<(i64, String), (i64, i64)> = HashMap::new();
    for ((game_id, team, pitcher_id), n) in &agg.workloads {
        let entry = starters.entry((*game_id, team.clone())).or_insert((*pitcher_id, *n));
        if *n > entry.1 {
            *entry = (*pitcher_id, *n);
        }
    }

    let columns = [
        "pitcher_id",
        "game_id",
        "game_date",
        "team",
        "opponent",
        "outs_recorded",
        "pitches",
        "batters_faced",
        "ks",
        "hrs_allowed",
        "bf_tto1",
        "k_tto1",
        "hr_tto1",
        "bf_tto3",
        "k_tto3",
        "hr_tto3",
        "is_start",
    ];
    let rows: Vec<Vec<SqlValue>> = agg
        .pitcher_games
        .iter()
        .filter(|((_, _), g)| g.game_date >= start && g.game_date <= end)
        .map(|((pitcher_id, game_id), g)| {
            let is_start = starters
                .get(&(*game_id, g.team.clone()))
                .is_some_and(|(starter, _)| starter == pitcher_id);
            vec![
                SqlValue::from(*pitcher_id),
                SqlValue::from(*game_id),
                SqlValue::from(g.game_date),
                SqlValue::from(g.team.clone()),
                SqlValue::from(g.opponent.clone()),
                SqlValue::from(g.outs_recorded),
                SqlValue::from(g.pitches),
                SqlValue::from(g.batters_faced),
                SqlValue::from(g.ks),
                SqlValue::from(g.hrs_allowed),
                SqlValue::from(g.bf_tto1),
                SqlValue::from(g.k_tto1),
                SqlValue::from(g.hr_tto1),
                SqlValue::from(g.bf_tto3),
                SqlValue::from(g.k_tto3),
                SqlValue::from(g.hr_tto3),
                SqlValue::from(is_start),
            ]
        })
        .collect();

    store
        .upsert_batch("pitcher_game_log", &columns, &["pitcher_id", "game_id"], &rows)
        .await
}

async fn write_batter_outcomes(
    store: &Store,
    agg: &Aggregates,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64> {
    let columns = [
        "game_id",
        "player_id",
        "game_date",
        "player_name",
        "team",
        "opponent",
        "pa",
        "hits",
        "singles",
        "doubles",
        "triples",
        "hr_count",
        "total_bases",
        "ks",
    ];
    let rows: Vec<Vec<SqlValue>> = agg
        .batter_games
        .iter()
        .filter(|(_, g)| g.game_date >= start && g.game_date <= end)
        .map(|((game_id, player_id), g)| {
            let hits = g.singles + g.doubles + g.triples + g.hrs;
            let tb = g.singles + 2 * g.doubles + 3 * g.triples + 4 * g.hrs;
            vec![
                SqlValue::from(*game_id),
                SqlValue::from(*player_id),
                SqlValue::from(g.game_date),
                SqlValue::from(g.player_name.clone()),
                SqlValue::from(g.team.clone()),
                SqlValue::from(g.opponent.clone()),
                SqlValue::from(g.pa),
                SqlValue::from(hits),
                SqlValue::from(g.singles),
                SqlValue::from(g.doubles),
                SqlValue::from(g.triples),
                SqlValue::from(g.hrs),
                SqlValue::from(tb),
                SqlValue::from(g.ks),
            ]
        })
        .collect();

    store
        .upsert_batch(
            "batter_game_outcomes",
            &columns,
            &["game_id", "player_id"],
            &rows,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(
        game_id: i64,
        date: &str,
        batter: i64,
        pitcher: i64,
        event: &str,
        desc: &str,
    ) -> EventRow {
        EventRow {
            game_id,
            game_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            bat_team: Some("BOS".into()),
            def_team: Some("NYY".into()),
            batter_id: Some(batter),
            pitcher_id: Some(pitcher),
            batter_name: Some("Batter".into()),
            pitcher_name: Some("Pitcher".into()),
            stand: Some("R".into()),
            p_throws: Some("R".into()),
            events: if event.is_empty() { None } else { Some(event.into()) },
            description: if desc.is_empty() { None } else { Some(desc.into()) },
            pitch_type: Some("FF".into()),
            release_speed: Some(95.0),
            zone: Some(5),
            launch_speed: if event.is_empty() { None } else { Some(101.0) },
            launch_angle: if event.is_empty() { None } else { Some(28.0) },
            launch_speed_angle: if event == "home_run" { Some(6) } else { None },
            hc_x: Some(100.0),
        }
    }

    impl EventRow {
        fn with_stand(mut self, stand: &str) -> Self {
            self.stand = Some(stand.into());
            self
        }
    }

    #[test]
    fn test_outs_mapping() {
        assert_eq!(outs_for_event("strikeout"), 1);
        assert_eq!(outs_for_event("grounded_into_double_play"), 2);
        assert_eq!(outs_for_event("triple_play"), 3);
        assert_eq!(outs_for_event("single"), 0);
        assert_eq!(outs_for_event(""), 0);
    }

    #[test]
    fn test_accumulate_batter_day_counts() {
        let events = vec![
            ev(1, "2024-06-01", 10, 20, "home_run", "hit_into_play"),
            ev(1, "2024-06-01", 10, 20, "strikeout", "swinging_strike"),
            ev(1, "2024-06-01", 10, 20, "walk", ""),
            ev(1, "2024-06-01", 11, 20, "single", "hit_into_play").with_stand("L"),
        ];
        let agg = accumulate(&events);

        let day = &agg.batter_days[&(10, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())];
        assert_eq!(day.pa, 3);
        assert_eq!(day.ab, 2); // walk excluded
        assert_eq!(day.hrs, 1);
        assert_eq!(day.ks, 1);
        assert_eq!(day.bbs, 1);
        assert_eq!(day.barrels, 1);
        assert_eq!(day.rhp.hrs, 1);

        let outcome = &agg.batter_games[&(1, 10)];
        assert_eq!(outcome.pa, 3);
        assert_eq!(outcome.hrs, 1);

        // pitcher saw all four PAs and recorded the strikeout
        let pday = &agg.pitcher_days[&(20, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())];
        assert_eq!(pday.pa, 4);
        assert_eq!(pday.ks, 1);
        assert_eq!(pday.outs_recorded, 1);
        assert_eq!(pday.lhb.pa, 1);
    }

    #[test]
    fn test_window_right_endpoint_open() {
        // appearance on 6/1 lands in the stat row dated 6/2, never 6/1
        let events = vec![ev(1, "2024-06-01", 10, 20, "single", "hit_into_play")];
        let agg = accumulate(&events);
        let d0601 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let d0602 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(window_days(&agg.batter_days, 10, d0601, 7).count(), 0);
        assert_eq!(window_days(&agg.batter_days, 10, d0602, 7).count(), 1);
    }

    #[test]
    fn test_iso_math() {
        // 10 AB: 2 singles, 1 double, 1 HR => SLG (2+2+4)/10=0.8, BA 0.4, ISO 0.4
        assert_eq!(iso(2, 1, 0, 1, 10), Some(0.4));
        assert_eq!(iso(0, 0, 0, 0, 0), None);
    }
}
