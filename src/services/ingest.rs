//! Ingest orchestrator — one invocation per trigger.
//!
//! Eight ordered steps with explicit failure semantics:
//! 1. start (run id, timestamps)
//! 2. idempotency probe (prior success in this hour bucket → skip)
//! 3. fetch (empty result → failed)
//! 4. raw archive (write failure → failed, nothing downstream runs)
//! 5. normalize (pure)
//! 6. data quality checks (degraded findings and missing endpoints downgrade)
//! 7. analytical + serving sinks in parallel (one failure → degraded,
//!    both → failed)
//! 8. run record (write failure is logged only)
//!
//! The run status is an explicit state variable with monotonic downgrade
//! (success → degraded → failed); sink errors become flags, never panics or
//! early unwinds.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::{ForecastDocument, IngestRunRecord};
use crate::services::dq::run_dq_checks;
use crate::services::open_meteo::ENDPOINT_NAMES;
use crate::services::provider::ForecastProvider;
use crate::services::storage::IngestStorage;

/// Schema version stamped on every run record.
const RUN_RECORD_SCHEMA_VERSION: &str = "ingest_run_v1";

/// Final status of an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Degraded,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Degraded => "degraded",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }

    /// Monotonic downgrade: only an untouched success becomes degraded.
    fn degrade(&mut self) {
        if *self == RunStatus::Success {
            *self = RunStatus::Degraded;
        }
    }
}

/// Outcome returned to the trigger caller.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub hours_ingested: i64,
}

/// `run_{YYYYMMDD}_{HHMMSS}_{6-char-random}` with a lowercase alphanumeric
/// suffix.
fn generate_run_id(now: DateTime<Utc>) -> String {
    const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect();
    format!(
        "run_{}_{}_{suffix}",
        now.format("%Y%m%d"),
        now.format("%H%M%S")
    )
}

/// UTC hour bucket used for idempotency ("YYYY-MM-DDTHH").
fn hour_bucket(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

/// Execute the full ingestion pipeline for one area.
///
/// Never fails: every outcome, including total upstream failure, is reported
/// through the returned status.
pub async fn run_ingest<P, S>(
    provider: &P,
    storage: &S,
    area_id: &str,
    lat: f64,
    lon: f64,
    horizon_days: u32,
) -> IngestOutcome
where
    P: ForecastProvider,
    S: IngestStorage,
{
    let started_at = Utc::now();
    let run_id = generate_run_id(started_at);
    tracing::info!(area_id, run_id, "ingest started");

    // Step 2: idempotency probe. A probe failure means "not already ingested".
    let bucket = hour_bucket(started_at);
    match storage.prior_success_exists(area_id, &bucket).await {
        Ok(true) => {
            tracing::info!(area_id, hour_bucket = %bucket, "ingest skipped: prior success in bucket");
            return IngestOutcome {
                run_id,
                status: RunStatus::Skipped,
                hours_ingested: 0,
            };
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(area_id, error = %e, "idempotency probe failed, proceeding");
        }
    }

    // Step 3: fetch. Endpoints that exhausted retries are absent from the map.
    let raw = provider.fetch_raw(area_id, lat, lon, horizon_days).await;
    if raw.is_empty() {
        return finish_failed(
            storage,
            run_id,
            area_id,
            provider.name(),
            started_at,
            "All provider endpoints failed after retries".to_string(),
        )
        .await;
    }
    let fetched_at = Utc::now();

    // Step 4: raw archive. A write failure ends the run; nothing downstream
    // is attempted.
    if let Err(e) = storage
        .write_raw_archive(&raw, area_id, fetched_at, &run_id, provider.name())
        .await
    {
        tracing::error!(run_id, error = %e, "raw archive write failed");
        return finish_failed(
            storage,
            run_id,
            area_id,
            provider.name(),
            started_at,
            format!("Raw archive write failed: {e}"),
        )
        .await;
    }

    // Step 5: normalize (pure)
    let (rows, daily_sun) = provider.normalize(&raw, area_id, fetched_at);

    // Step 6: data quality
    let mut dq = run_dq_checks(&rows);
    let mut status = RunStatus::Success;
    if dq.is_degraded {
        status = RunStatus::Degraded;
    }
    if raw.len() < ENDPOINT_NAMES.len() {
        status = RunStatus::Degraded;
        let mut missing: Vec<&str> = ENDPOINT_NAMES
            .iter()
            .filter(|name| !raw.contains_key(**name))
            .copied()
            .collect();
        missing.sort_unstable();
        dq.flags.push(format!("missing_endpoints:{}", missing.join(",")));
    }

    // Step 7: analytical table and serving document, concurrently. Each
    // failure becomes a flag and a downgrade; both failing fails the run.
    let doc = ForecastDocument {
        area_id: area_id.to_string(),
        updated_at_utc: fetched_at,
        provider: provider.name().to_string(),
        horizon_days,
        ingest_status: status.as_str().to_string(),
        hours: rows.iter().map(Into::into).collect(),
        daily: daily_sun,
    };

    let (hourly_result, serving_result) = tokio::join!(
        storage.append_hourly_rows(&rows, fetched_at, provider.name(), &run_id),
        storage.overwrite_serving_doc(&doc),
    );

    let hourly_ok = match hourly_result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(run_id, error = %e, "analytical table write failed");
            status.degrade();
            dq.flags.push(format!("bq_write_failed:{e}"));
            false
        }
    };
    let serving_ok = match serving_result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(run_id, error = %e, "serving doc write failed");
            status.degrade();
            dq.flags.push(format!("firestore_write_failed:{e}"));
            false
        }
    };
    if !hourly_ok && !serving_ok {
        status = RunStatus::Failed;
    }

    // Step 8: run record. A failure here must not alter the response.
    let finished_at = Utc::now();
    let record = IngestRunRecord {
        run_id: run_id.clone(),
        area_id: area_id.to_string(),
        started_at_utc: started_at,
        finished_at_utc: finished_at,
        status: status.as_str().to_string(),
        provider: provider.name().to_string(),
        hours_ingested: rows.len() as i32,
        dq_flags: dq.flags.clone(),
        error_message: None,
        schema_version: RUN_RECORD_SCHEMA_VERSION.to_string(),
    };
    if let Err(e) = storage.append_run_record(&record).await {
        tracing::error!(run_id, error = %e, "failed to write ingest run record");
    }

    tracing::info!(
        run_id,
        status = status.as_str(),
        hours_ingested = rows.len(),
        dq_flags = ?dq.flags,
        duration_ms = (finished_at - started_at).num_milliseconds(),
        "ingest completed"
    );

    IngestOutcome {
        run_id,
        status,
        hours_ingested: rows.len() as i64,
    }
}

/// Terminal failure before the sink stage: write a failed run record (best
/// effort) and report the failure to the caller.
async fn finish_failed<S: IngestStorage>(
    storage: &S,
    run_id: String,
    area_id: &str,
    provider: &str,
    started_at: DateTime<Utc>,
    error_message: String,
) -> IngestOutcome {
    tracing::error!(run_id, area_id, error = %error_message, "ingest failed");

    let record = IngestRunRecord {
        run_id: run_id.clone(),
        area_id: area_id.to_string(),
        started_at_utc: started_at,
        finished_at_utc: Utc::now(),
        status: RunStatus::Failed.as_str().to_string(),
        provider: provider.to_string(),
        hours_ingested: 0,
        dq_flags: Vec::new(),
        error_message: Some(error_message),
        schema_version: RUN_RECORD_SCHEMA_VERSION.to_string(),
    };
    if let Err(e) = storage.append_run_record(&record).await {
        tracing::error!(run_id, error = %e, "failed to write ingest run record");
    }

    IngestOutcome {
        run_id,
        status: RunStatus::Failed,
        hours_ingested: 0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Duration;

    use crate::errors::AppError;
    use crate::services::provider::{DailySunRow, NormalizedHourlyRow, RawResponses};

    // --- fixtures ---

    fn clean_rows(n: i64) -> Vec<NormalizedHourlyRow> {
        let base: DateTime<Utc> = "2025-06-01T00:00:00Z".parse().unwrap();
        (0..n)
            .map(|h| NormalizedHourlyRow {
                area_id: "tel_aviv_coast".to_string(),
                hour_utc: base + Duration::hours(h),
                wave_height_m: Some(0.5),
                wave_period_s: Some(5.0),
                air_temp_c: Some(25.0),
                feelslike_c: Some(26.0),
                wind_ms: Some(3.0),
                gust_ms: Some(5.0),
                precip_prob_pct: Some(0),
                precip_mm: Some(0.0),
                uv_index: Some(3.0),
                eu_aqi: Some(40),
                pm10: Some(15.0),
                pm2_5: Some(8.0),
            })
            .collect()
    }

    fn all_endpoints_raw() -> RawResponses {
        let mut raw = RawResponses::new();
        for name in ENDPOINT_NAMES {
            raw.insert(name.to_string(), serde_json::json!({"hourly": {}}));
        }
        raw
    }

    struct MockProvider {
        raw: RawResponses,
        rows: Vec<NormalizedHourlyRow>,
        daily: Vec<DailySunRow>,
    }

    impl MockProvider {
        fn healthy() -> Self {
            Self {
                raw: all_endpoints_raw(),
                rows: clean_rows(168),
                daily: Vec::new(),
            }
        }
    }

    impl ForecastProvider for MockProvider {
        fn name(&self) -> &'static str {
            "open_meteo"
        }

        async fn fetch_raw(&self, _: &str, _: f64, _: f64, _: u32) -> RawResponses {
            self.raw.clone()
        }

        fn normalize(
            &self,
            _: &RawResponses,
            _: &str,
            _: DateTime<Utc>,
        ) -> (Vec<NormalizedHourlyRow>, Vec<DailySunRow>) {
            (self.rows.clone(), self.daily.clone())
        }
    }

    #[derive(Default)]
    struct Written {
        raw_paths: Vec<String>,
        hourly_batches: Vec<usize>,
        serving_docs: Vec<ForecastDocument>,
        run_records: Vec<IngestRunRecord>,
    }

    #[derive(Default)]
    struct MockStorage {
        prior_success: bool,
        probe_fails: bool,
        raw_fails: bool,
        hourly_fails: bool,
        serving_fails: bool,
        run_record_fails: bool,
        written: Mutex<Written>,
    }

    fn boom(what: &str) -> AppError {
        AppError::InternalError(format!("{what} exploded"))
    }

    impl IngestStorage for MockStorage {
        async fn prior_success_exists(&self, _: &str, _: &str) -> Result<bool, AppError> {
            if self.probe_fails {
                return Err(boom("probe"));
            }
            Ok(self.prior_success)
        }

        async fn write_raw_archive(
            &self,
            raw: &RawResponses,
            area_id: &str,
            fetched_at_utc: DateTime<Utc>,
            run_id: &str,
            _: &str,
        ) -> Result<(), AppError> {
            if self.raw_fails {
                return Err(boom("raw archive"));
            }
            let mut written = self.written.lock().unwrap();
            for endpoint in raw.keys() {
                written.raw_paths.push(crate::services::storage::raw_blob_path(
                    endpoint,
                    area_id,
                    fetched_at_utc,
                    run_id,
                ));
            }
            Ok(())
        }

        async fn append_hourly_rows(
            &self,
            rows: &[NormalizedHourlyRow],
            _: DateTime<Utc>,
            _: &str,
            _: &str,
        ) -> Result<(), AppError> {
            if self.hourly_fails {
                return Err(boom("hourly table"));
            }
            self.written.lock().unwrap().hourly_batches.push(rows.len());
            Ok(())
        }

        async fn overwrite_serving_doc(&self, doc: &ForecastDocument) -> Result<(), AppError> {
            if self.serving_fails {
                return Err(boom("serving doc"));
            }
            self.written.lock().unwrap().serving_docs.push(doc.clone());
            Ok(())
        }

        async fn append_run_record(&self, record: &IngestRunRecord) -> Result<(), AppError> {
            if self.run_record_fails {
                return Err(boom("run record"));
            }
            self.written.lock().unwrap().run_records.push(record.clone());
            Ok(())
        }
    }

    async fn ingest(provider: &MockProvider, storage: &MockStorage) -> IngestOutcome {
        run_ingest(provider, storage, "tel_aviv_coast", 32.08, 34.77, 7).await
    }

    // --- run id / bucket formatting ---

    #[test]
    fn test_run_id_format() {
        let now: DateTime<Utc> = "2025-06-01T14:07:33Z".parse().unwrap();
        let run_id = generate_run_id(now);
        assert!(run_id.starts_with("run_20250601_140733_"), "id: {run_id}");
        let suffix = run_id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_run_id_suffixes_differ() {
        let now: DateTime<Utc> = "2025-06-01T14:07:33Z".parse().unwrap();
        assert_ne!(generate_run_id(now), generate_run_id(now));
    }

    #[test]
    fn test_hour_bucket_format() {
        let at: DateTime<Utc> = "2025-06-01T14:59:59Z".parse().unwrap();
        assert_eq!(hour_bucket(at), "2025-06-01T14");
    }

    // --- status machine ---

    #[test]
    fn test_degrade_only_touches_success() {
        let mut status = RunStatus::Success;
        status.degrade();
        assert_eq!(status, RunStatus::Degraded);

        let mut status = RunStatus::Failed;
        status.degrade();
        assert_eq!(status, RunStatus::Failed);

        let mut status = RunStatus::Degraded;
        status.degrade();
        assert_eq!(status, RunStatus::Degraded);
    }

    // --- orchestration scenarios ---

    #[tokio::test]
    async fn test_clean_run_succeeds() {
        let provider = MockProvider::healthy();
        let storage = MockStorage::default();

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.hours_ingested, 168);

        let written = storage.written.lock().unwrap();
        assert_eq!(written.raw_paths.len(), 3);
        assert_eq!(written.hourly_batches, vec![168]);
        assert_eq!(written.serving_docs.len(), 1);
        assert_eq!(written.serving_docs[0].ingest_status, "success");
        assert_eq!(written.run_records.len(), 1);
        let record = &written.run_records[0];
        assert_eq!(record.status, "success");
        assert_eq!(record.hours_ingested, 168);
        assert!(record.dq_flags.is_empty());
        assert!(record.error_message.is_none());
        assert_eq!(record.schema_version, "ingest_run_v1");
    }

    #[tokio::test]
    async fn test_prior_success_skips_without_writing() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            prior_success: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Skipped);
        assert_eq!(outcome.hours_ingested, 0);

        // A skipped run writes nothing — not even a run record
        let written = storage.written.lock().unwrap();
        assert!(written.raw_paths.is_empty());
        assert!(written.hourly_batches.is_empty());
        assert!(written.serving_docs.is_empty());
        assert!(written.run_records.is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_proceeds_with_ingest() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            probe_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(storage.written.lock().unwrap().run_records.len(), 1);
    }

    #[tokio::test]
    async fn test_all_endpoints_failed_is_terminal() {
        let provider = MockProvider {
            raw: RawResponses::new(),
            rows: Vec::new(),
            daily: Vec::new(),
        };
        let storage = MockStorage::default();

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.hours_ingested, 0);

        let written = storage.written.lock().unwrap();
        assert!(written.raw_paths.is_empty());
        assert!(written.serving_docs.is_empty());
        assert_eq!(written.run_records.len(), 1);
        let record = &written.run_records[0];
        assert_eq!(record.status, "failed");
        assert_eq!(
            record.error_message.as_deref(),
            Some("All provider endpoints failed after retries")
        );
    }

    #[tokio::test]
    async fn test_raw_archive_failure_is_terminal() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            raw_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Failed);

        // No downstream writes after the archive failure
        let written = storage.written.lock().unwrap();
        assert!(written.hourly_batches.is_empty());
        assert!(written.serving_docs.is_empty());
        assert_eq!(written.run_records.len(), 1);
        let record = &written.run_records[0];
        assert_eq!(record.status, "failed");
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Raw archive write failed:"));
    }

    #[tokio::test]
    async fn test_hourly_sink_failure_degrades() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            hourly_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Degraded);
        assert_eq!(outcome.hours_ingested, 168);

        let written = storage.written.lock().unwrap();
        // The other sink still ran
        assert_eq!(written.serving_docs.len(), 1);
        let record = &written.run_records[0];
        assert_eq!(record.status, "degraded");
        assert!(record
            .dq_flags
            .iter()
            .any(|f| f.starts_with("bq_write_failed:")));
    }

    #[tokio::test]
    async fn test_serving_sink_failure_degrades() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            serving_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Degraded);

        let written = storage.written.lock().unwrap();
        assert_eq!(written.hourly_batches, vec![168]);
        let record = &written.run_records[0];
        assert!(record
            .dq_flags
            .iter()
            .any(|f| f.starts_with("firestore_write_failed:")));
    }

    #[tokio::test]
    async fn test_both_sinks_failing_fails_the_run() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            hourly_fails: true,
            serving_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Failed);

        let written = storage.written.lock().unwrap();
        let record = &written.run_records[0];
        assert_eq!(record.status, "failed");
        // Both flags preserved in the audit trail
        assert!(record
            .dq_flags
            .iter()
            .any(|f| f.starts_with("bq_write_failed:")));
        assert!(record
            .dq_flags
            .iter()
            .any(|f| f.starts_with("firestore_write_failed:")));
    }

    #[tokio::test]
    async fn test_missing_endpoint_degrades_with_flag() {
        let mut raw = all_endpoints_raw();
        raw.remove("marine");
        let provider = MockProvider {
            raw,
            rows: clean_rows(168),
            daily: Vec::new(),
        };
        let storage = MockStorage::default();

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Degraded);
        let written = storage.written.lock().unwrap();
        let record = &written.run_records[0];
        assert!(record
            .dq_flags
            .contains(&"missing_endpoints:marine".to_string()));
    }

    #[tokio::test]
    async fn test_two_missing_endpoints_flag_is_sorted() {
        let mut raw = all_endpoints_raw();
        raw.remove("weather");
        raw.remove("air_quality");
        let provider = MockProvider {
            raw,
            rows: clean_rows(168),
            daily: Vec::new(),
        };
        let storage = MockStorage::default();

        ingest(&provider, &storage).await;

        let written = storage.written.lock().unwrap();
        let record = &written.run_records[0];
        assert!(record
            .dq_flags
            .contains(&"missing_endpoints:air_quality,weather".to_string()));
    }

    #[tokio::test]
    async fn test_degraded_dq_downgrades_status() {
        let provider = MockProvider {
            raw: all_endpoints_raw(),
            rows: clean_rows(80), // very low hour count → degraded
            daily: Vec::new(),
        };
        let storage = MockStorage::default();

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Degraded);
        let written = storage.written.lock().unwrap();
        let record = &written.run_records[0];
        assert!(record
            .dq_flags
            .contains(&"very_low_hour_count:80".to_string()));
        // The serving doc carries the degraded status for the reading API
        assert_eq!(written.serving_docs[0].ingest_status, "degraded");
    }

    #[tokio::test]
    async fn test_run_record_failure_does_not_alter_outcome() {
        let provider = MockProvider::healthy();
        let storage = MockStorage {
            run_record_fails: true,
            ..Default::default()
        };

        let outcome = ingest(&provider, &storage).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.hours_ingested, 168);
    }

    #[tokio::test]
    async fn test_serving_doc_carries_daily_sun() {
        let daily = vec![DailySunRow {
            date: "2025-06-01".to_string(),
            sunrise_utc: "2025-06-01T05:33:00Z".parse().unwrap(),
            sunset_utc: "2025-06-01T19:42:00Z".parse().unwrap(),
        }];
        let provider = MockProvider {
            raw: all_endpoints_raw(),
            rows: clean_rows(168),
            daily: daily.clone(),
        };
        let storage = MockStorage::default();

        ingest(&provider, &storage).await;

        let written = storage.written.lock().unwrap();
        assert_eq!(written.serving_docs[0].daily, daily);
        assert_eq!(written.serving_docs[0].horizon_days, 7);
        assert_eq!(written.serving_docs[0].provider, "open_meteo");
    }
}
