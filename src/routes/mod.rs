pub mod forecasts;
pub mod health;
pub mod ingest;

/// Forecast age below which the serving data counts as fresh (minutes).
/// A consuming-layer constant: the pipeline itself only writes `updated_at_utc`.
pub(crate) const FRESHNESS_THRESHOLD_MINUTES: i64 = 90;

/// Forecast age at which the health endpoint reports unhealthy (minutes).
pub(crate) const UNHEALTHY_THRESHOLD_MINUTES: i64 = 180;
