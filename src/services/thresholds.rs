//! Threshold constants for scoring presets.
//!
//! Each penalty factor is defined by three values:
//!   ok  — below this, zero penalty
//!   bad — at/above this, maximum penalty
//!   max_penalty — the penalty applied at the bad threshold
//!
//! Between ok and bad the penalty scales linearly. Hard-gate scalars are
//! binary, not ramped. The record is flat so alternate presets can be swapped
//! in without code change; only the "balanced" preset ships.

/// Scoring thresholds for one preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    // --- Swim waves ---
    pub swim_wave_ok_m: f64,
    pub swim_wave_bad_m: f64,
    pub swim_wave_max_penalty: f64,

    // --- Swim dog waves (stricter) ---
    pub swim_dog_wave_ok_m: f64,
    pub swim_dog_wave_bad_m: f64,
    pub swim_dog_wave_max_penalty: f64,

    // --- Run heat ---
    pub run_heat_ok_c: f64,
    pub run_heat_bad_c: f64,
    pub run_heat_max_penalty: f64,

    // --- Swim heat ---
    pub swim_heat_ok_c: f64,
    pub swim_heat_bad_c: f64,
    pub swim_heat_max_penalty: f64,

    // --- Swim cold (reversed: penalty grows as temp drops below ok) ---
    pub swim_cold_ok_c: f64,
    pub swim_cold_bad_c: f64,
    pub swim_cold_max_penalty: f64,

    // --- Dog heat (swim_dog penalty — dogs can cool in water) ---
    pub dog_swim_heat_ok_c: f64,
    pub dog_swim_heat_bad_c: f64,
    pub dog_swim_heat_max_penalty: f64,

    // --- UV ---
    pub uv_ok: f64,
    pub uv_bad: f64,
    pub uv_run_max_penalty: f64,
    pub uv_swim_dog_max_penalty: f64,

    // --- AQI ---
    pub aqi_ok: f64,
    pub aqi_bad: f64,
    pub aqi_swim_max_penalty: f64,
    pub aqi_run_max_penalty: f64,

    // --- Wind ---
    pub wind_ok_ms: f64,
    pub wind_bad_ms: f64,
    pub wind_swim_max_penalty: f64,
    pub wind_run_max_penalty: f64,

    // --- Rain probability (soft penalty for run) ---
    pub rain_prob_ok_pct: f64,
    pub rain_prob_bad_pct: f64,
    pub rain_run_max_penalty: f64,

    // --- Hard gate thresholds (binary, not ramped) ---
    pub rain_gate_mm: f64,
    pub rain_gate_prob_pct: i32,
    /// Run modes only.
    pub wind_gate_ms: f64,
    /// run_dog basic gate.
    pub dog_heat_gate_c: f64,
    /// run_dog compound gate.
    pub dog_heat_compound_warn_c: f64,
    /// run_dog compound gate UV threshold.
    pub dog_heat_compound_uv: f64,

    // --- Dog multiplier for run_dog penalties ---
    pub dog_multiplier: f64,
}

/// The "balanced" preset — the only one shipped.
pub const BALANCED_THRESHOLDS: Thresholds = Thresholds {
    swim_wave_ok_m: 0.3,
    swim_wave_bad_m: 1.5,
    swim_wave_max_penalty: 70.0,

    swim_dog_wave_ok_m: 0.3,
    swim_dog_wave_bad_m: 1.0,
    swim_dog_wave_max_penalty: 80.0,

    run_heat_ok_c: 26.0,
    run_heat_bad_c: 38.0,
    run_heat_max_penalty: 60.0,

    swim_heat_ok_c: 28.0,
    swim_heat_bad_c: 40.0,
    swim_heat_max_penalty: 10.0,

    swim_cold_ok_c: 18.0,
    swim_cold_bad_c: 10.0,
    swim_cold_max_penalty: 15.0,

    dog_swim_heat_ok_c: 24.0,
    dog_swim_heat_bad_c: 34.0,
    dog_swim_heat_max_penalty: 20.0,

    uv_ok: 4.0,
    uv_bad: 10.0,
    uv_run_max_penalty: 25.0,
    uv_swim_dog_max_penalty: 15.0,

    aqi_ok: 40.0,
    aqi_bad: 120.0,
    aqi_swim_max_penalty: 25.0,
    aqi_run_max_penalty: 40.0,

    wind_ok_ms: 7.0,
    wind_bad_ms: 14.0,
    wind_swim_max_penalty: 15.0,
    wind_run_max_penalty: 12.0,

    rain_prob_ok_pct: 30.0,
    rain_prob_bad_pct: 79.0,
    rain_run_max_penalty: 10.0,

    rain_gate_mm: 3.0,
    rain_gate_prob_pct: 80,
    wind_gate_ms: 14.0,
    dog_heat_gate_c: 29.0,
    dog_heat_compound_warn_c: 26.0,
    dog_heat_compound_uv: 8.0,

    dog_multiplier: 1.2,
};
