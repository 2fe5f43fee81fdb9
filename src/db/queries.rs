use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::models::{ForecastDocument, IngestRunRecord};
use crate::services::provider::NormalizedHourlyRow;

/// Schema version stamped on every curated hourly row.
pub(crate) const CURATED_SCHEMA_VERSION: &str = "curated_v1";

// ---------------------------------------------------------------------------
// raw_archive_v1
// ---------------------------------------------------------------------------

/// Insert one raw payload under its blob path. Re-running an ingest with the
/// same path overwrites the payload (paths embed the run id, so collisions
/// only happen on deliberate replays).
pub(crate) async fn insert_raw_blob(
    pool: &PgPool,
    blob_path: &str,
    payload: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO raw_archive_v1 (blob_path, content_type, payload)
         VALUES ($1, 'application/json', $2)
         ON CONFLICT (blob_path) DO UPDATE SET payload = EXCLUDED.payload",
    )
    .bind(blob_path)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// hourly_forecast_v1
// ---------------------------------------------------------------------------

/// Append normalized hourly rows in a single batch insert.
///
/// Parallel arrays go through UNNEST so the whole batch is one statement:
/// either every row lands or none does.
pub(crate) async fn insert_hourly_batch(
    pool: &PgPool,
    rows: &[NormalizedHourlyRow],
    fetched_at_utc: DateTime<Utc>,
    provider: &str,
    ingest_run_id: &str,
) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }

    let area_ids: Vec<&str> = rows.iter().map(|r| r.area_id.as_str()).collect();
    let hours: Vec<DateTime<Utc>> = rows.iter().map(|r| r.hour_utc).collect();
    let wave_heights: Vec<Option<f64>> = rows.iter().map(|r| r.wave_height_m).collect();
    let wave_periods: Vec<Option<f64>> = rows.iter().map(|r| r.wave_period_s).collect();
    let air_temps: Vec<Option<f64>> = rows.iter().map(|r| r.air_temp_c).collect();
    let feelslikes: Vec<Option<f64>> = rows.iter().map(|r| r.feelslike_c).collect();
    let winds: Vec<Option<f64>> = rows.iter().map(|r| r.wind_ms).collect();
    let gusts: Vec<Option<f64>> = rows.iter().map(|r| r.gust_ms).collect();
    let precip_probs: Vec<Option<i32>> = rows.iter().map(|r| r.precip_prob_pct).collect();
    let precip_mms: Vec<Option<f64>> = rows.iter().map(|r| r.precip_mm).collect();
    let uv_indexes: Vec<Option<f64>> = rows.iter().map(|r| r.uv_index).collect();
    let eu_aqis: Vec<Option<i32>> = rows.iter().map(|r| r.eu_aqi).collect();
    let pm10s: Vec<Option<f64>> = rows.iter().map(|r| r.pm10).collect();
    let pm2_5s: Vec<Option<f64>> = rows.iter().map(|r| r.pm2_5).collect();

    sqlx::query(
        "INSERT INTO hourly_forecast_v1 (
             area_id, hour_utc, wave_height_m, wave_period_s, air_temp_c, feelslike_c,
             wind_ms, gust_ms, precip_prob_pct, precip_mm, uv_index, eu_aqi, pm10, pm2_5,
             fetched_at_utc, provider, ingest_run_id, schema_version)
         SELECT u.*, $15, $16, $17, $18
         FROM UNNEST(
             $1::text[], $2::timestamptz[], $3::float8[], $4::float8[], $5::float8[],
             $6::float8[], $7::float8[], $8::float8[], $9::int4[], $10::float8[],
             $11::float8[], $12::int4[], $13::float8[], $14::float8[]
         ) AS u(area_id, hour_utc, wave_height_m, wave_period_s, air_temp_c, feelslike_c,
                wind_ms, gust_ms, precip_prob_pct, precip_mm, uv_index, eu_aqi, pm10, pm2_5)",
    )
    .bind(area_ids)
    .bind(hours)
    .bind(wave_heights)
    .bind(wave_periods)
    .bind(air_temps)
    .bind(feelslikes)
    .bind(winds)
    .bind(gusts)
    .bind(precip_probs)
    .bind(precip_mms)
    .bind(uv_indexes)
    .bind(eu_aqis)
    .bind(pm10s)
    .bind(pm2_5s)
    .bind(fetched_at_utc)
    .bind(provider)
    .bind(ingest_run_id)
    .bind(CURATED_SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// ingest_runs_v1
// ---------------------------------------------------------------------------

/// Append one run record to the audit table.
pub(crate) async fn insert_ingest_run(
    pool: &PgPool,
    record: &IngestRunRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ingest_runs_v1 (
             run_id, area_id, started_at_utc, finished_at_utc, status, provider,
             hours_ingested, dq_flags, error_message, schema_version)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&record.run_id)
    .bind(&record.area_id)
    .bind(record.started_at_utc)
    .bind(record.finished_at_utc)
    .bind(&record.status)
    .bind(&record.provider)
    .bind(record.hours_ingested)
    .bind(&record.dq_flags)
    .bind(record.error_message.as_deref())
    .bind(&record.schema_version)
    .execute(pool)
    .await?;
    Ok(())
}

/// True if a successful run already exists for this area in the given UTC
/// hour bucket ("YYYY-MM-DDTHH", compared against the bucket of
/// `started_at_utc`).
pub(crate) async fn prior_success_exists(
    pool: &PgPool,
    area_id: &str,
    hour_bucket_utc: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM ingest_runs_v1
         WHERE area_id = $1
           AND to_char(started_at_utc AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24') = $2
           AND status = 'success'",
    )
    .bind(area_id)
    .bind(hour_bucket_utc)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// forecast_serving
// ---------------------------------------------------------------------------

/// Overwrite the serving document for an area. Single-statement upsert, so
/// readers see either the old document or the new one, never a partial write.
pub(crate) async fn upsert_serving_doc(
    pool: &PgPool,
    area_id: &str,
    doc: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO forecast_serving (area_id, doc, updated_at)
         VALUES ($1, $2, NOW())
         ON CONFLICT (area_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = NOW()",
    )
    .bind(area_id)
    .bind(doc)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch the serving document for an area, if one has been written.
pub(crate) async fn get_serving_doc(
    pool: &PgPool,
    area_id: &str,
) -> Result<Option<ForecastDocument>, sqlx::Error> {
    let doc: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT doc FROM forecast_serving WHERE area_id = $1")
            .bind(area_id)
            .fetch_optional(pool)
            .await?;

    doc.map(|value| serde_json::from_value(value).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .transpose()
}
