//! Forecast provider contract and the normalized row shapes it produces.
//!
//! The ingest pipeline depends only on this capability set; Open-Meteo is the
//! one shipped implementation (`services::open_meteo`). Alternatives slot in
//! without touching the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Raw endpoint responses keyed by endpoint name ("weather", "marine",
/// "air_quality"). Endpoints that failed after retries are simply absent.
pub type RawResponses = BTreeMap<String, serde_json::Value>;

/// The canonical time-aligned hourly record produced by normalization.
///
/// Every metric field is independently optional: a missing source endpoint or
/// a null value in its parallel array leaves the field absent, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedHourlyRow {
    pub area_id: String,
    pub hour_utc: DateTime<Utc>,
    pub wave_height_m: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub wind_ms: Option<f64>,
    pub gust_ms: Option<f64>,
    pub precip_prob_pct: Option<i32>,
    pub precip_mm: Option<f64>,
    pub uv_index: Option<f64>,
    pub eu_aqi: Option<i32>,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
}

/// One calendar day's sunrise/sunset pair, used by the scoring engine's
/// sunset gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailySunRow {
    /// Calendar date as "YYYY-MM-DD"
    pub date: String,
    pub sunrise_utc: DateTime<Utc>,
    pub sunset_utc: DateTime<Utc>,
}

/// Capability set required of an upstream forecast provider.
#[allow(async_fn_in_trait)]
pub trait ForecastProvider {
    /// Provider identifier written into curated rows and run records.
    fn name(&self) -> &'static str;

    /// Fetch all upstream endpoints concurrently with per-endpoint retry.
    ///
    /// Never fails: endpoints that exhaust their retries are omitted from the
    /// returned map, and the map is empty in the worst case.
    async fn fetch_raw(
        &self,
        area_id: &str,
        lat: f64,
        lon: f64,
        horizon_days: u32,
    ) -> RawResponses;

    /// Merge raw endpoint responses into sorted normalized hourly rows plus
    /// daily sun rows. Pure; an empty map yields `([], [])`.
    fn normalize(
        &self,
        raw: &RawResponses,
        area_id: &str,
        fetched_at_utc: DateTime<Utc>,
    ) -> (Vec<NormalizedHourlyRow>, Vec<DailySunRow>);
}
