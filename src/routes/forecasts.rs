//! Forecast HTTP endpoints.
//!
//! - GET /api/v1/forecast?area_id=X&days=N — upcoming hours from the serving doc
//! - GET /api/v1/scores?area_id=X&days=N — same hours, scored for all 4 modes
//!
//! Both endpoints only read the serving document; the ingest pipeline is the
//! sole writer.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::AppConfig;
use crate::db::models::{ForecastDocument, ForecastHour};
use crate::db::queries;
use crate::errors::AppError;
use crate::routes::FRESHNESS_THRESHOLD_MINUTES;
use crate::services::open_meteo::OpenMeteoProvider;
use crate::services::provider::DailySunRow;
use crate::services::scoring::{score_hour, HourData, ModeScore, SCORING_VERSION};
use crate::services::storage::PgStorage;
use crate::services::thresholds::BALANCED_THRESHOLDS;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub provider: OpenMeteoProvider,
    pub storage: PgStorage,
    pub config: AppConfig,
}

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastQuery {
    /// Area identifier (e.g. "tel_aviv_coast")
    pub area_id: Option<String>,
    /// Forecast horizon in days (1-7, default 7)
    pub days: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Forecast response: upcoming hours plus daily sun times.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub area_id: String,
    pub updated_at_utc: DateTime<Utc>,
    pub provider: String,
    /// "fresh" or "stale"
    pub freshness: String,
    pub forecast_age_minutes: i64,
    pub horizon_days: u32,
    pub hours: Vec<ForecastHour>,
    pub daily: Vec<DailySunRow>,
}

/// Scores for the four activity modes for one hour.
#[derive(Debug, Serialize, ToSchema)]
pub struct HourScores {
    pub swim_solo: ModeScore,
    pub swim_dog: ModeScore,
    pub run_solo: ModeScore,
    pub run_dog: ModeScore,
}

/// One forecast hour with its mode scores.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoredHour {
    #[serde(flatten)]
    pub hour: ForecastHour,
    pub scores: HourScores,
}

/// Scored forecast response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoredForecastResponse {
    pub area_id: String,
    pub updated_at_utc: DateTime<Utc>,
    pub provider: String,
    /// "fresh" or "stale"
    pub freshness: String,
    pub forecast_age_minutes: i64,
    pub horizon_days: u32,
    pub scoring_version: String,
    pub hours: Vec<ScoredHour>,
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Forecast age in minutes and the matching freshness label.
pub(crate) fn compute_freshness(updated_at_utc: DateTime<Utc>, now: DateTime<Utc>) -> (i64, &'static str) {
    let age_minutes = (now - updated_at_utc).num_minutes();
    let freshness = if age_minutes < FRESHNESS_THRESHOLD_MINUTES {
        "fresh"
    } else {
        "stale"
    };
    (age_minutes, freshness)
}

/// Hours at or after `now`, capped at `days * 24` entries.
fn upcoming_hours(hours: &[ForecastHour], now: DateTime<Utc>, days: u32) -> Vec<ForecastHour> {
    hours
        .iter()
        .filter(|h| h.hour_utc >= now)
        .take(days as usize * 24)
        .cloned()
        .collect()
}

/// Sunset instant for the hour's calendar date, from the daily sun rows.
fn sunset_for(daily: &[DailySunRow], hour_utc: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = hour_utc.format("%Y-%m-%d").to_string();
    daily.iter().find(|d| d.date == date).map(|d| d.sunset_utc)
}

fn score_forecast_hour(hour: &ForecastHour, daily: &[DailySunRow]) -> HourScores {
    let hour_data = HourData {
        hour_utc: hour.hour_utc,
        wave_height_m: hour.wave_height_m,
        feelslike_c: hour.feelslike_c,
        gust_ms: hour.gust_ms,
        precip_prob_pct: hour.precip_prob_pct,
        precip_mm: hour.precip_mm,
        uv_index: hour.uv_index,
        eu_aqi: hour.eu_aqi,
        sunset_utc: sunset_for(daily, hour.hour_utc),
    };
    let result = score_hour(&hour_data, &BALANCED_THRESHOLDS);
    HourScores {
        swim_solo: result.swim_solo,
        swim_dog: result.swim_dog,
        run_solo: result.run_solo,
        run_dog: result.run_dog,
    }
}

/// Validate query params and load the serving document.
async fn load_doc(
    state: &AppState,
    query: &ForecastQuery,
) -> Result<(ForecastDocument, u32), AppError> {
    let Some(area_id) = query.area_id.as_deref() else {
        return Err(AppError::ValidationError("area_id is required".to_string()));
    };
    let days = query.days.unwrap_or(7);
    if !(1..=7).contains(&days) {
        return Err(AppError::ValidationError("days must be between 1 and 7".to_string()));
    }
    if area_id != state.config.area_id {
        return Err(AppError::NotFound(format!("Unknown area_id: {area_id}")));
    }

    let doc = queries::get_serving_doc(&state.pool, area_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No forecast data for area_id: {area_id}")))?;
    Ok((doc, days))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Get the upcoming hourly forecast for an area.
#[utoipa::path(
    get,
    path = "/api/v1/forecast",
    tag = "Forecasts",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Upcoming hourly forecast", body = ForecastResponse),
        (status = 400, description = "Missing or invalid parameters", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown area or no data yet", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, AppError> {
    let (doc, days) = load_doc(&state, &query).await?;
    let now = Utc::now();
    let (age_minutes, freshness) = compute_freshness(doc.updated_at_utc, now);

    Ok(Json(ForecastResponse {
        area_id: doc.area_id,
        updated_at_utc: doc.updated_at_utc,
        provider: doc.provider,
        freshness: freshness.to_string(),
        forecast_age_minutes: age_minutes,
        horizon_days: doc.horizon_days,
        hours: upcoming_hours(&doc.hours, now, days),
        daily: doc.daily,
    }))
}

/// Get the upcoming hourly forecast with go/no-go scores for all 4 modes.
#[utoipa::path(
    get,
    path = "/api/v1/scores",
    tag = "Forecasts",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Scored hourly forecast", body = ScoredForecastResponse),
        (status = 400, description = "Missing or invalid parameters", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown area or no data yet", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_scores(
    State(state): State<AppState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ScoredForecastResponse>, AppError> {
    let (doc, days) = load_doc(&state, &query).await?;
    let now = Utc::now();
    let (age_minutes, freshness) = compute_freshness(doc.updated_at_utc, now);

    let hours = upcoming_hours(&doc.hours, now, days)
        .into_iter()
        .map(|hour| {
            let scores = score_forecast_hour(&hour, &doc.daily);
            ScoredHour { hour, scores }
        })
        .collect();

    Ok(Json(ScoredForecastResponse {
        area_id: doc.area_id,
        updated_at_utc: doc.updated_at_utc,
        provider: doc.provider,
        freshness: freshness.to_string(),
        forecast_age_minutes: age_minutes,
        horizon_days: doc.horizon_days,
        scoring_version: SCORING_VERSION.to_string(),
        hours,
    }))
}
