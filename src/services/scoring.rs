//! Core scoring engine — computes 4 mode scores per hourly forecast.
//!
//! Uses continuous linear ramp penalties: each factor has an ok threshold
//! (0 penalty), a bad threshold (max penalty), and linear interpolation
//! between them. A small set of binary hard gates short-circuits a mode to
//! score 0, and swim modes are additionally scaled by a sunset multiplier.
//!
//! Pure arithmetic over optional inputs: no I/O, no shared state, no failure
//! paths. Absent inputs contribute nothing and surface as info chips.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::thresholds::Thresholds;

pub const SCORING_VERSION: &str = "score_v2";

/// Factor priority for tie-breaking (earlier = higher priority).
const FACTOR_PRIORITY: [&str; 7] = ["rain", "heat", "waves", "uv", "aqi", "wind", "cold"];

/// Seconds over which the sunset multiplier ramps from 1.0 to 0.0.
const SUNSET_RAMP_SECS: f64 = 1800.0;

/// Forecast data for a single hour. Mirrors the normalized row fields the
/// engine consumes, plus the sunset instant for the hour's local date.
#[derive(Debug, Clone, PartialEq)]
pub struct HourData {
    pub hour_utc: DateTime<Utc>,
    pub wave_height_m: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub gust_ms: Option<f64>,
    pub precip_prob_pct: Option<i32>,
    pub precip_mm: Option<f64>,
    pub uv_index: Option<f64>,
    pub eu_aqi: Option<i32>,
    pub sunset_utc: Option<DateTime<Utc>>,
}

/// One explanatory chip attached to a mode result.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ReasonChip {
    pub factor: String,
    pub text: String,
    /// "check" | "warning" | "danger" | "info"
    pub emoji: String,
    pub penalty: i64,
}

impl ReasonChip {
    fn new(factor: &str, text: impl Into<String>, emoji: &str, penalty: i64) -> Self {
        Self {
            factor: factor.to_string(),
            text: text.into(),
            emoji: emoji.to_string(),
            penalty,
        }
    }
}

/// Score for one activity mode.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ModeScore {
    pub score: i64,
    pub label: String,
    pub reasons: Vec<ReasonChip>,
    pub hard_gated: bool,
}

impl ModeScore {
    fn gated(chip: ReasonChip) -> Self {
        Self {
            score: 0,
            label: "Nope".to_string(),
            reasons: vec![chip],
            hard_gated: true,
        }
    }
}

/// Scores for all four modes for one hour.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScoringOutput {
    pub hour_utc: DateTime<Utc>,
    pub scoring_version: String,
    pub swim_solo: ModeScore,
    pub swim_dog: ModeScore,
    pub run_solo: ModeScore,
    pub run_dog: ModeScore,
}

/// Score a single hour for all 4 activity modes.
pub fn score_hour(hour: &HourData, t: &Thresholds) -> ScoringOutput {
    ScoringOutput {
        hour_utc: hour.hour_utc,
        scoring_version: SCORING_VERSION.to_string(),
        swim_solo: score_swim(hour, t, Mode::SwimSolo),
        swim_dog: score_swim(hour, t, Mode::SwimDog),
        run_solo: score_run(hour, t, Mode::RunSolo),
        run_dog: score_run(hour, t, Mode::RunDog),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    SwimSolo,
    SwimDog,
    RunSolo,
    RunDog,
}

impl Mode {
    fn is_swim(self) -> bool {
        matches!(self, Mode::SwimSolo | Mode::SwimDog)
    }
}

/// A factor's contribution before chip construction: negative penalty with
/// explanatory text, or a zero-penalty "data unavailable" info entry.
struct Penalty {
    factor: &'static str,
    penalty: i64,
    text: String,
}

impl Penalty {
    fn info(factor: &'static str, text: &str) -> Self {
        Self {
            factor,
            penalty: 0,
            text: text.to_string(),
        }
    }
}

pub fn score_to_label(score: i64) -> &'static str {
    if score >= 85 {
        "Perfect"
    } else if score >= 70 {
        "Good"
    } else if score >= 45 {
        "Meh"
    } else if score >= 20 {
        "Bad"
    } else {
        "Nope"
    }
}

/// Compute a linear ramp penalty.
///
/// Returns 0 when value is on the ok side, `max_penalty` at/past the bad
/// threshold, and linear interpolation between. A reversed ramp (ok > bad,
/// used for cold) is handled by direction.
pub fn linear_penalty(value: f64, ok: f64, bad: f64, max_penalty: f64) -> f64 {
    if ok < bad {
        // Normal direction: higher value = worse (heat, waves, UV, etc.)
        if value <= ok {
            0.0
        } else if value >= bad {
            max_penalty
        } else {
            max_penalty * (value - ok) / (bad - ok)
        }
    } else {
        // Reversed direction: lower value = worse (cold)
        if value >= ok {
            0.0
        } else if value <= bad {
            max_penalty
        } else {
            max_penalty * (ok - value) / (ok - bad)
        }
    }
}

/// 1.0 before/at sunset, ramps to 0.0 over 30 min, then 0.0.
/// An absent sunset means no gate.
fn sunset_multiplier(hour_utc: DateTime<Utc>, sunset_utc: Option<DateTime<Utc>>) -> f64 {
    let Some(sunset) = sunset_utc else {
        return 1.0;
    };
    let delta = (hour_utc - sunset).num_seconds() as f64;
    if delta <= 0.0 {
        1.0
    } else if delta >= SUNSET_RAMP_SECS {
        0.0
    } else {
        1.0 - delta / SUNSET_RAMP_SECS
    }
}

// ---------------------------------------------------------------------------
// Hard gates (binary — not ramped)
// ---------------------------------------------------------------------------

fn is_rain_gated(hour: &HourData, t: &Thresholds) -> bool {
    if hour.precip_mm.is_some_and(|mm| mm >= t.rain_gate_mm) {
        return true;
    }
    hour.precip_prob_pct
        .is_some_and(|pct| pct >= t.rain_gate_prob_pct)
}

fn is_wind_gated(hour: &HourData, t: &Thresholds) -> bool {
    hour.gust_ms.is_some_and(|g| g >= t.wind_gate_ms)
}

fn is_dog_heat_gated(hour: &HourData, t: &Thresholds) -> bool {
    let Some(feels) = hour.feelslike_c else {
        return false;
    };
    let basic_heat_bad = feels >= t.dog_heat_gate_c;
    let compound_heat_bad = hour
        .uv_index
        .is_some_and(|uv| uv >= t.dog_heat_compound_uv && feels >= t.dog_heat_compound_warn_c);
    basic_heat_bad || compound_heat_bad
}

fn rain_gate_chip(hour: &HourData, t: &Thresholds) -> ReasonChip {
    if hour.precip_mm.is_some_and(|mm| mm >= t.rain_gate_mm) {
        ReasonChip::new("rain", "Heavy rain", "danger", 0)
    } else {
        ReasonChip::new("rain", "Rain very likely", "danger", 0)
    }
}

fn after_dark_chip() -> ReasonChip {
    ReasonChip::new("dark", "After dark — no night swimming", "danger", 100)
}

// ---------------------------------------------------------------------------
// Reason chip construction
// ---------------------------------------------------------------------------

fn penalty_text_waves(height_m: f64, penalty: i64) -> String {
    if penalty >= 50 {
        format!("Waves {height_m}m — rough")
    } else {
        format!("Waves {height_m}m")
    }
}

fn penalty_text_waves_dog(height_m: f64, penalty: i64) -> String {
    if penalty >= 50 {
        "Waves too rough for dog".to_string()
    } else {
        format!("Waves {height_m}m — watch your dog")
    }
}

fn factor_priority(factor: &str) -> usize {
    FACTOR_PRIORITY
        .iter()
        .position(|&f| f == factor)
        .unwrap_or(99)
}

fn is_info(p: &Penalty) -> bool {
    p.penalty == 0 && p.text.contains("unavailable")
}

/// Build 2-5 reason chips from penalty entries:
/// top-4 negatives by severity, one positive for good scores, info chips for
/// missing data, then padding up to the 2-chip floor.
fn build_reason_chips(penalties: &[Penalty], score: i64, mode: Mode) -> Vec<ReasonChip> {
    let mut negative: Vec<&Penalty> = penalties.iter().filter(|p| p.penalty < 0).collect();
    negative.sort_by(|a, b| {
        b.penalty
            .abs()
            .cmp(&a.penalty.abs())
            .then_with(|| factor_priority(a.factor).cmp(&factor_priority(b.factor)))
    });

    let mut chips: Vec<ReasonChip> = Vec::new();

    for p in negative.iter().take(4) {
        let emoji = if p.penalty.abs() >= 30 { "danger" } else { "warning" };
        chips.push(ReasonChip::new(p.factor, p.text.clone(), emoji, p.penalty));
    }

    if score >= 70 {
        if let Some(chip) = select_positive_chip(penalties, mode) {
            chips.push(chip);
        }
    }

    for p in penalties.iter().filter(|p| is_info(p)) {
        if chips.len() < 5 {
            chips.push(ReasonChip::new(p.factor, p.text.clone(), "info", 0));
        }
    }

    // Pad to the 2-chip floor from remaining zero-penalty factors
    if chips.len() < 2 {
        for p in penalties.iter().filter(|p| p.penalty == 0 && !is_info(p)) {
            if chips.len() >= 2 {
                break;
            }
            if !chips.iter().any(|c| c.factor == p.factor) {
                chips.push(ReasonChip::new(p.factor, p.text.clone(), "check", 0));
            }
        }
    }

    if chips.len() < 2 && score >= 70 {
        for (factor, text) in [("wind", "Calm wind"), ("aqi", "Air quality good")] {
            if chips.len() >= 2 {
                break;
            }
            if !chips.iter().any(|c| c.factor == factor) {
                chips.push(ReasonChip::new(factor, text, "check", 0));
            }
        }
    }

    chips.truncate(5);
    chips
}

/// Select one positive chip for the highest-value factor that is neither
/// penalized nor missing.
fn select_positive_chip(penalties: &[Penalty], mode: Mode) -> Option<ReasonChip> {
    let penalized = |factor: &str| {
        penalties
            .iter()
            .any(|p| p.factor == factor && p.penalty < 0)
    };
    let missing = |factor: &str| penalties.iter().any(|p| p.factor == factor && is_info(p));

    let mut candidates: Vec<(&str, &str)> = Vec::new();
    if mode.is_swim() {
        candidates.push(("waves", "Waves calm"));
    }
    candidates.extend([
        ("heat", "Nice temperature"),
        ("uv", "UV low"),
        ("aqi", "Air quality good"),
        ("wind", "Calm wind"),
    ]);

    candidates
        .into_iter()
        .find(|(factor, _)| !penalized(factor) && !missing(factor))
        .map(|(factor, text)| ReasonChip::new(factor, text, "check", 0))
}

// ---------------------------------------------------------------------------
// Mode scoring
// ---------------------------------------------------------------------------

fn score_swim(hour: &HourData, t: &Thresholds, mode: Mode) -> ModeScore {
    if is_rain_gated(hour, t) {
        return ModeScore::gated(rain_gate_chip(hour, t));
    }

    let mut penalties: Vec<Penalty> = Vec::new();

    // Waves (swim_dog uses the stricter ramp and dog-specific text)
    match hour.wave_height_m {
        Some(h) => {
            let (p, text_fn): (f64, fn(f64, i64) -> String) = if mode == Mode::SwimDog {
                (
                    linear_penalty(
                        h,
                        t.swim_dog_wave_ok_m,
                        t.swim_dog_wave_bad_m,
                        t.swim_dog_wave_max_penalty,
                    ),
                    penalty_text_waves_dog,
                )
            } else {
                (
                    linear_penalty(h, t.swim_wave_ok_m, t.swim_wave_bad_m, t.swim_wave_max_penalty),
                    penalty_text_waves,
                )
            };
            if p > 0.0 {
                let rounded = p.round() as i64;
                penalties.push(Penalty {
                    factor: "waves",
                    penalty: -rounded,
                    text: text_fn(h, rounded),
                });
            }
        }
        None => penalties.push(Penalty::info("waves", "Wave data unavailable")),
    }

    // Wind
    match hour.gust_ms {
        Some(g) => {
            let p = linear_penalty(g, t.wind_ok_ms, t.wind_bad_ms, t.wind_swim_max_penalty);
            if p > 0.0 {
                penalties.push(Penalty {
                    factor: "wind",
                    penalty: -(p.round() as i64),
                    text: format!("Gusty {g:.0}m/s"),
                });
            }
        }
        None => penalties.push(Penalty::info("wind", "Wind data unavailable")),
    }

    // AQI
    match hour.eu_aqi {
        Some(aqi) => {
            let p = linear_penalty(f64::from(aqi), t.aqi_ok, t.aqi_bad, t.aqi_swim_max_penalty);
            if p > 0.0 {
                let text = if p >= t.aqi_swim_max_penalty * 0.7 {
                    "Air quality poor"
                } else {
                    "AQI moderate"
                };
                penalties.push(Penalty {
                    factor: "aqi",
                    penalty: -(p.round() as i64),
                    text: text.to_string(),
                });
            }
        }
        None => penalties.push(Penalty::info("aqi", "AQI data unavailable")),
    }

    // Temperature
    match hour.feelslike_c {
        Some(feels) if mode == Mode::SwimDog => {
            // Dog heat is a penalty here, not a gate
            let p = linear_penalty(
                feels,
                t.dog_swim_heat_ok_c,
                t.dog_swim_heat_bad_c,
                t.dog_swim_heat_max_penalty,
            );
            if p > 0.0 {
                penalties.push(Penalty {
                    factor: "heat",
                    penalty: -(p.round() as i64),
                    text: "Warm for paws".to_string(),
                });
            }
        }
        Some(feels) => {
            // Heat or cold; cold takes precedence when both ramps are active
            let p_heat =
                linear_penalty(feels, t.swim_heat_ok_c, t.swim_heat_bad_c, t.swim_heat_max_penalty);
            let p_cold =
                linear_penalty(feels, t.swim_cold_ok_c, t.swim_cold_bad_c, t.swim_cold_max_penalty);
            if p_cold > 0.0 {
                penalties.push(Penalty {
                    factor: "cold",
                    penalty: -(p_cold.round() as i64),
                    text: format!("Chilly {feels:.0}°C"),
                });
            } else if p_heat > 0.0 {
                penalties.push(Penalty {
                    factor: "heat",
                    penalty: -(p_heat.round() as i64),
                    text: format!("Hot {feels:.0}°C"),
                });
            }
        }
        None => penalties.push(Penalty::info("heat", "Temp data unavailable")),
    }

    // UV (swim_dog only)
    match hour.uv_index {
        Some(uv) if mode == Mode::SwimDog => {
            let p = linear_penalty(uv, t.uv_ok, t.uv_bad, t.uv_swim_dog_max_penalty);
            if p > 0.0 {
                penalties.push(Penalty {
                    factor: "uv",
                    penalty: -(p.round() as i64),
                    text: "UV elevated".to_string(),
                });
            }
        }
        Some(_) => {}
        None => penalties.push(Penalty::info("uv", "UV data unavailable")),
    }

    let total: i64 = penalties.iter().map(|p| p.penalty).sum();
    let mut score = (100 + total).clamp(0, 100);

    let sun_mult = sunset_multiplier(hour.hour_utc, hour.sunset_utc);
    if sun_mult == 0.0 {
        return ModeScore::gated(after_dark_chip());
    } else if sun_mult < 1.0 {
        score = ((score as f64 * sun_mult) as i64).max(0);
    }

    ModeScore {
        score,
        label: score_to_label(score).to_string(),
        reasons: build_reason_chips(&penalties, score, mode),
        hard_gated: false,
    }
}

fn score_run(hour: &HourData, t: &Thresholds, mode: Mode) -> ModeScore {
    if is_rain_gated(hour, t) {
        return ModeScore::gated(rain_gate_chip(hour, t));
    }
    if is_wind_gated(hour, t) {
        return ModeScore::gated(ReasonChip::new("wind", "Wind too strong", "danger", 0));
    }
    if mode == Mode::RunDog && is_dog_heat_gated(hour, t) {
        return ModeScore::gated(ReasonChip::new("heat", "Too hot for dog", "danger", 0));
    }

    // Heat, UV, and AQI penalties (and their text tiers) scale up for the dog
    let dog_mult = if mode == Mode::RunDog { t.dog_multiplier } else { 1.0 };

    let mut penalties: Vec<Penalty> = Vec::new();

    // Heat
    match hour.feelslike_c {
        Some(feels) => {
            let p = linear_penalty(feels, t.run_heat_ok_c, t.run_heat_bad_c, t.run_heat_max_penalty)
                * dog_mult;
            if p > 0.0 {
                let text = if p >= t.run_heat_max_penalty * dog_mult * 0.8 {
                    "Too hot to run".to_string()
                } else {
                    format!("Warm {feels:.0}°C")
                };
                penalties.push(Penalty {
                    factor: "heat",
                    penalty: -(p.round() as i64),
                    text,
                });
            }
        }
        None => penalties.push(Penalty::info("heat", "Temp data unavailable")),
    }

    // UV
    match hour.uv_index {
        Some(uv) => {
            let p = linear_penalty(uv, t.uv_ok, t.uv_bad, t.uv_run_max_penalty) * dog_mult;
            if p > 0.0 {
                let text = if p >= t.uv_run_max_penalty * dog_mult * 0.7 {
                    "UV very high"
                } else {
                    "UV elevated"
                };
                penalties.push(Penalty {
                    factor: "uv",
                    penalty: -(p.round() as i64),
                    text: text.to_string(),
                });
            }
        }
        None => penalties.push(Penalty::info("uv", "UV data unavailable")),
    }

    // AQI
    match hour.eu_aqi {
        Some(aqi) => {
            let p = linear_penalty(f64::from(aqi), t.aqi_ok, t.aqi_bad, t.aqi_run_max_penalty)
                * dog_mult;
            if p > 0.0 {
                let text = if p >= t.aqi_run_max_penalty * dog_mult * 0.7 {
                    "Air quality poor"
                } else {
                    "AQI moderate"
                };
                penalties.push(Penalty {
                    factor: "aqi",
                    penalty: -(p.round() as i64),
                    text: text.to_string(),
                });
            }
        }
        None => penalties.push(Penalty::info("aqi", "AQI data unavailable")),
    }

    // Wind — penalty below the gate threshold (no dog multiplier)
    match hour.gust_ms {
        Some(g) => {
            let p = linear_penalty(g, t.wind_ok_ms, t.wind_bad_ms, t.wind_run_max_penalty);
            if p > 0.0 {
                penalties.push(Penalty {
                    factor: "wind",
                    penalty: -(p.round() as i64),
                    text: format!("Gusty {g:.0}m/s"),
                });
            }
        }
        None => penalties.push(Penalty::info("wind", "Wind data unavailable")),
    }

    // Rain probability — soft ramp below the gate (no dog multiplier)
    if let Some(prob) = hour.precip_prob_pct {
        let p = linear_penalty(
            f64::from(prob),
            t.rain_prob_ok_pct,
            t.rain_prob_bad_pct,
            t.rain_run_max_penalty,
        );
        if p > 0.0 {
            penalties.push(Penalty {
                factor: "rain",
                penalty: -(p.round() as i64),
                text: "Rain possible".to_string(),
            });
        }
    }

    let total: i64 = penalties.iter().map(|p| p.penalty).sum();
    let score = (100 + total).clamp(0, 100);

    ModeScore {
        score,
        label: score_to_label(score).to_string(),
        reasons: build_reason_chips(&penalties, score, mode),
        hard_gated: false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
