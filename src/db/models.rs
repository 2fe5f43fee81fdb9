use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::provider::{DailySunRow, NormalizedHourlyRow};

/// One hour entry inside the serving document (and API responses).
///
/// Same metric fields as [`NormalizedHourlyRow`] minus `area_id`, which lives
/// at the document level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastHour {
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

impl From<&NormalizedHourlyRow> for ForecastHour {
    fn from(row: &NormalizedHourlyRow) -> Self {
        Self {
            hour_utc: row.hour_utc,
            wave_height_m: row.wave_height_m,
            wave_period_s: row.wave_period_s,
            air_temp_c: row.air_temp_c,
            feelslike_c: row.feelslike_c,
            wind_ms: row.wind_ms,
            gust_ms: row.gust_ms,
            precip_prob_pct: row.precip_prob_pct,
            precip_mm: row.precip_mm,
            uv_index: row.uv_index,
            eu_aqi: row.eu_aqi,
            pm10: row.pm10,
            pm2_5: row.pm2_5,
        }
    }
}

/// The serving artifact: one document per area, overwritten on every
/// successful ingest run. The ingest pipeline is the sole writer; the API
/// only reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDocument {
    pub area_id: String,
    pub updated_at_utc: DateTime<Utc>,
    pub provider: String,
    pub horizon_days: u32,
    pub ingest_status: String,
    pub hours: Vec<ForecastHour>,
    pub daily: Vec<DailySunRow>,
}

/// One immutable row of the `ingest_runs_v1` audit table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRunRecord {
    pub run_id: String,
    pub area_id: String,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub status: String,
    pub provider: String,
    pub hours_ingested: i32,
    pub dq_flags: Vec<String>,
    pub error_message: Option<String>,
    pub schema_version: String,
}
