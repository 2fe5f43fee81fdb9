//! Storage contract for the ingest pipeline's write surfaces.
//!
//! Four surfaces, all write-only from the pipeline's perspective: the raw
//! archive, the curated hourly table, the serving document, and the run
//! record. The orchestrator is generic over this contract; the Postgres
//! implementation below is the one shipped, and tests substitute in-memory
//! mocks to exercise partial-failure semantics.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::models::{ForecastDocument, IngestRunRecord};
use crate::db::queries;
use crate::errors::AppError;
use crate::services::provider::{NormalizedHourlyRow, RawResponses};

/// Schema version stamped into every raw archive envelope.
const RAW_SCHEMA_VERSION: &str = "raw_v1";

/// Write surfaces required by the ingest orchestrator.
#[allow(async_fn_in_trait)]
pub trait IngestStorage {
    /// True if a successful run already exists for this area and UTC hour
    /// bucket ("YYYY-MM-DDTHH").
    async fn prior_success_exists(
        &self,
        area_id: &str,
        hour_bucket_utc: &str,
    ) -> Result<bool, AppError>;

    /// Archive every endpoint's raw payload, wrapped in a metadata envelope.
    async fn write_raw_archive(
        &self,
        raw: &RawResponses,
        area_id: &str,
        fetched_at_utc: DateTime<Utc>,
        run_id: &str,
        provider: &str,
    ) -> Result<(), AppError>;

    /// Append normalized rows to the curated hourly table as one batch.
    async fn append_hourly_rows(
        &self,
        rows: &[NormalizedHourlyRow],
        fetched_at_utc: DateTime<Utc>,
        provider: &str,
        run_id: &str,
    ) -> Result<(), AppError>;

    /// Overwrite the area's serving document. An empty `hours` list is a
    /// logged no-op.
    async fn overwrite_serving_doc(&self, doc: &ForecastDocument) -> Result<(), AppError>;

    /// Append one run record to the audit table.
    async fn append_run_record(&self, record: &IngestRunRecord) -> Result<(), AppError>;
}

/// Blob path for one endpoint's raw payload:
/// `raw/openmeteo/{endpoint}/area_id={area_id}/{YYYY}/{MM}/{DD}/{HH}/{run_id}.json`
pub(crate) fn raw_blob_path(
    endpoint: &str,
    area_id: &str,
    fetched_at_utc: DateTime<Utc>,
    run_id: &str,
) -> String {
    format!(
        "raw/openmeteo/{endpoint}/area_id={area_id}/{}/{run_id}.json",
        fetched_at_utc.format("%Y/%m/%d/%H")
    )
}

/// Wrap a raw endpoint response in the archive envelope.
fn raw_envelope(
    response: &serde_json::Value,
    endpoint: &str,
    provider: &str,
    fetched_at_utc: DateTime<Utc>,
    run_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "_meta": {
            "fetched_at_utc": fetched_at_utc.to_rfc3339(),
            "provider_name": provider,
            "endpoint": endpoint,
            "schema_version": RAW_SCHEMA_VERSION,
            "ingest_run_id": run_id,
        },
        "response": response,
    })
}

/// Postgres-backed implementation of all four write surfaces.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IngestStorage for PgStorage {
    async fn prior_success_exists(
        &self,
        area_id: &str,
        hour_bucket_utc: &str,
    ) -> Result<bool, AppError> {
        Ok(queries::prior_success_exists(&self.pool, area_id, hour_bucket_utc).await?)
    }

    async fn write_raw_archive(
        &self,
        raw: &RawResponses,
        area_id: &str,
        fetched_at_utc: DateTime<Utc>,
        run_id: &str,
        provider: &str,
    ) -> Result<(), AppError> {
        for (endpoint, response) in raw {
            let path = raw_blob_path(endpoint, area_id, fetched_at_utc, run_id);
            let envelope = raw_envelope(response, endpoint, provider, fetched_at_utc, run_id);
            queries::insert_raw_blob(&self.pool, &path, &envelope).await?;
            tracing::info!(layer = "raw_archive", path, "storage write succeeded");
        }
        Ok(())
    }

    async fn append_hourly_rows(
        &self,
        rows: &[NormalizedHourlyRow],
        fetched_at_utc: DateTime<Utc>,
        provider: &str,
        run_id: &str,
    ) -> Result<(), AppError> {
        queries::insert_hourly_batch(&self.pool, rows, fetched_at_utc, provider, run_id).await?;
        tracing::info!(
            layer = "analytical",
            table = "hourly_forecast_v1",
            row_count = rows.len(),
            "storage write succeeded"
        );
        Ok(())
    }

    async fn overwrite_serving_doc(&self, doc: &ForecastDocument) -> Result<(), AppError> {
        if doc.hours.is_empty() {
            tracing::warn!(
                area_id = %doc.area_id,
                "skipping serving doc update: no hours to serve"
            );
            return Ok(());
        }

        let value = serde_json::to_value(doc)
            .map_err(|e| AppError::InternalError(format!("serving doc serialization: {e}")))?;
        queries::upsert_serving_doc(&self.pool, &doc.area_id, &value).await?;
        tracing::info!(
            layer = "serving",
            doc = format!("forecasts/{}", doc.area_id),
            hour_count = doc.hours.len(),
            "storage write succeeded"
        );
        Ok(())
    }

    async fn append_run_record(&self, record: &IngestRunRecord) -> Result<(), AppError> {
        queries::insert_ingest_run(&self.pool, record).await?;
        tracing::info!(
            layer = "analytical",
            table = "ingest_runs_v1",
            run_id = %record.run_id,
            "storage write succeeded"
        );
        Ok(())
    }
}
