//! Strength and run-expectation primitives shared by the game-level
//! markets (ML, TOTAL, F5 variants, TEAM_TOTAL).

use crate::features::pitcher::PitcherFeatures;
use crate::features::team::TeamFeatures;
use crate::markets::engine::clamp;

/// Starter quality on an additive strength scale centered at zero.
pub fn starter_strength(pitcher: Option<&PitcherFeatures>) -> f64 {
    let Some(p) = pitcher else {
        return 0.0;
    };
    let k = p.k_pct_30.or(p.k_pct_14).unwrap_or(22.0);
    let bb = p.bb_pct_30.or(p.bb_pct_14).unwrap_or(8.0);
    let hr9 = p.hr_per_9_30.or(p.hr_per_9_14).unwrap_or(1.1);
    let role = p.starter_role_confidence.unwrap_or(0.6);
    (k - bb) * 0.7 - (hr9 - 1.1) * 12.0 + (role - 0.6) * 8.0
}

pub fn offense_strength(team: Option<&TeamFeatures>) -> f64 {
    let Some(t) = team else {
        return 0.0;
    };
    let runs = t.runs_per_game_30.or(t.runs_per_game_14).unwrap_or(4.4);
    let obp = t.offense_obp_30.or(t.offense_obp_14).unwrap_or(0.320);
    let slg = t.offense_slg_30.or(t.offense_slg_14).unwrap_or(0.405);
    let hr_rate = t.hr_rate_30.or(t.hr_rate_14).unwrap_or(0.032);
    (runs - 4.4) * 2.8 + (obp - 0.320) * 120.0 + (slg - 0.405) * 55.0 + (hr_rate - 0.032) * 180.0
}

pub fn bullpen_strength(team: Option<&TeamFeatures>) -> f64 {
    let Some(t) = team else {
        return 0.0;
    };
    let era = t.bullpen_era_proxy_14.unwrap_or(4.2);
    let whip = t.bullpen_whip_proxy_14.unwrap_or(1.30);
    let k = t.bullpen_k_pct_14.unwrap_or(22.0);
    let hr9 = t.bullpen_hr9_14.unwrap_or(1.1);
    let tier_bonus = t.bullpen_high_lev_tier.unwrap_or(0) as f64 * 0.8;
    (4.2 - era) * 2.0 + (1.30 - whip) * 14.0 + (k - 22.0) * 0.55 - (hr9 - 1.1) * 7.0 + tier_bonus
}

/// Expected runs allowed per nine by a starter profile.
pub fn starter_ra9(pitcher: Option<&PitcherFeatures>) -> f64 {
    let Some(p) = pitcher else {
        return 4.4;
    };
    let k = p.k_pct_30.or(p.k_pct_14).unwrap_or(22.0);
    let bb = p.bb_pct_30.or(p.bb_pct_14).unwrap_or(8.0);
    let hr9 = p.hr_per_9_30.or(p.hr_per_9_14).unwrap_or(1.1);
    let hard_hit = p
        .hard_hit_pct_allowed_30
        .or(p.hard_hit_pct_allowed_14)
        .unwrap_or(35.0);
    let ra9 =
        4.15 + (hr9 - 1.1) * 1.05 + (hard_hit - 35.0) * 0.03 + (bb - 8.0) * 0.10 - (k - 22.0) * 0.06;
    clamp(ra9, 2.2, 7.2)
}

/// Expected innings from the starter before the bullpen takes over.
pub fn starter_innings(pitcher: Option<&PitcherFeatures>) -> f64 {
    let Some(p) = pitcher else {
        return 5.2;
    };
    let role = p.starter_role_confidence.unwrap_or(0.6);
    let pitches = p.pitches_avg_last_5.unwrap_or(90.0);
    clamp(4.7 + (role - 0.5) * 2.0 + (pitches - 90.0) * 0.015, 3.8, 7.0)
}

pub fn team_offense_base(team: Option<&TeamFeatures>) -> f64 {
    let Some(t) = team else {
        return 4.4;
    };
    let runs = t.runs_per_game_30.or(t.runs_per_game_14).unwrap_or(4.4);
    let iso = t.offense_iso_30.or(t.offense_iso_14).unwrap_or(0.160);
    let obp = t.offense_obp_30.or(t.offense_obp_14).unwrap_or(0.320);
    clamp(runs + (iso - 0.160) * 8.0 + (obp - 0.320) * 10.0, 2.8, 6.8)
}

pub fn team_bullpen_ra9(team: Option<&TeamFeatures>) -> f64 {
    let Some(t) = team else {
        return 4.2;
    };
    let era = t.bullpen_era_proxy_14.unwrap_or(4.2);
    let whip = t.bullpen_whip_proxy_14.unwrap_or(1.30);
    let hr9 = t.bullpen_hr9_14.unwrap_or(1.1);
    clamp(era + (whip - 1.30) * 0.8 + (hr9 - 1.1) * 0.7, 2.6, 6.5)
}

/// Expected runs for one offense: its base paired with the opposing
/// starter's workload share and the opposing bullpen behind him, scaled
/// by the run environment.
pub fn team_expected_runs(
    offense_team: Option<&TeamFeatures>,
    opposing_starter: Option<&PitcherFeatures>,
    opposing_bullpen_team: Option<&TeamFeatures>,
    env_multiplier: f64,
) -> f64 {
    let offense_base = team_offense_base(offense_team);
    let starter_ra = starter_ra9(opposing_starter);
    let starter_ip = starter_innings(opposing_starter);
    let bullpen_ra = team_bullpen_ra9(opposing_bullpen_team);

    let runs_allowed_profile = starter_ra * (starter_ip / 9.0) + bullpen_ra * ((9.0 - starter_ip) / 9.0);
    let expected = (offense_base * 0.55 + runs_allowed_profile * 0.45) * env_multiplier;
    clamp(expected, 1.2, 8.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ace() -> PitcherFeatures {
        PitcherFeatures {
            k_pct_30: Some(30.0),
            bb_pct_30: Some(5.0),
            hr_per_9_30: Some(0.8),
            hard_hit_pct_allowed_30: Some(31.0),
            starter_role_confidence: Some(0.9),
            pitches_avg_last_5: Some(100.0),
            ..Default::default()
        }
    }

    fn replacement() -> PitcherFeatures {
        PitcherFeatures {
            k_pct_30: Some(16.0),
            bb_pct_30: Some(11.0),
            hr_per_9_30: Some(1.8),
            hard_hit_pct_allowed_30: Some(42.0),
            starter_role_confidence: Some(0.4),
            pitches_avg_last_5: Some(75.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_starter_strength_ordering() {
        assert!(starter_strength(Some(&ace())) > starter_strength(Some(&replacement())));
        assert_eq!(starter_strength(None), 0.0);
    }

    #[test]
    fn test_ra9_bounds_and_ordering() {
        let ace_ra = starter_ra9(Some(&ace()));
        let repl_ra = starter_ra9(Some(&replacement()));
        assert!(ace_ra < repl_ra);
        assert!((2.2..=7.2).contains(&ace_ra));
        assert!((2.2..=7.2).contains(&repl_ra));
    }

    #[test]
    fn test_ace_goes_deeper() {
        assert!(starter_innings(Some(&ace())) > starter_innings(Some(&replacement())));
    }

    #[test]
    fn test_expected_runs_respond_to_environment() {
        let coors = team_expected_runs(None, None, None, 1.25);
        let marine_layer = team_expected_runs(None, None, None, 0.85);
        assert!(coors > marine_layer);
        assert!((1.2..=8.0).contains(&coors));
    }

    #[test]
    fn test_expected_runs_fewer_against_ace() {
        let vs_ace = team_expected_runs(None, Some(&ace()), None, 1.0);
        let vs_repl = team_expected_runs(None, Some(&replacement()), None, 1.0);
        assert!(vs_ace < vs_repl);
    }
}
