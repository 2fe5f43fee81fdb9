//! Health check endpoint.
//!
//! Health is derived from the serving document's freshness and the last
//! ingest status, so a wedged pipeline surfaces here even while the HTTP
//! layer itself is fine.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::queries;
use crate::routes::forecasts::{compute_freshness, AppState};
use crate::routes::UNHEALTHY_THRESHOLD_MINUTES;
use crate::services::scoring::SCORING_VERSION;

/// Forecast-side detail of the health response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastHealthDetail {
    pub area_id: String,
    /// Absent when no serving document has been written yet
    pub updated_at_utc: Option<DateTime<Utc>>,
    /// -1 when no serving document exists
    pub age_minutes: i64,
    /// "fresh" or "stale"
    pub freshness: String,
    pub ingest_status: String,
    pub hours_count: i64,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// API version
    pub version: String,
    pub scoring_version: String,
    pub forecast: ForecastHealthDetail,
    pub timestamp_utc: DateTime<Utc>,
}

/// "healthy" needs a fresh document from a successful ingest; past the
/// unhealthy threshold the data is too old to serve.
fn classify_health(age_minutes: i64, ingest_status: &str) -> &'static str {
    if age_minutes < crate::routes::FRESHNESS_THRESHOLD_MINUTES && ingest_status == "success" {
        "healthy"
    } else if age_minutes >= UNHEALTHY_THRESHOLD_MINUTES {
        "unhealthy"
    } else {
        "degraded"
    }
}

/// Service health, derived from serving-document freshness.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Current service health", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let area_id = state.config.area_id.clone();

    let doc = match queries::get_serving_doc(&state.pool, &area_id).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(error = %e, "health check failed to read serving doc");
            None
        }
    };

    let Some(doc) = doc else {
        return Json(HealthResponse {
            status: "unhealthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scoring_version: SCORING_VERSION.to_string(),
            forecast: ForecastHealthDetail {
                area_id,
                updated_at_utc: None,
                age_minutes: -1,
                freshness: "stale".to_string(),
                ingest_status: "failed".to_string(),
                hours_count: 0,
            },
            timestamp_utc: now,
        });
    };

    let (age_minutes, freshness) = compute_freshness(doc.updated_at_utc, now);
    let status = classify_health(age_minutes, &doc.ingest_status);

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scoring_version: SCORING_VERSION.to_string(),
        forecast: ForecastHealthDetail {
            area_id,
            updated_at_utc: Some(doc.updated_at_utc),
            age_minutes,
            freshness: freshness.to_string(),
            ingest_status: doc.ingest_status,
            hours_count: doc.hours.len() as i64,
        },
        timestamp_utc: now,
    })
}
