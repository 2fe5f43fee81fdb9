//! Data quality checks run after normalization, before loading.
//!
//! Checks:
//! - Hour count against the expected 7x24 horizon
//! - Range checks for key metrics
//! - Null rate per key metric (> 10% triggers degraded)
//! - Timestamp continuity (gaps > 1 hour)
//!
//! The checker is pure and never fails; everything it finds becomes a flag
//! string on the run record, and only the serious findings mark the run
//! degraded.

use crate::services::provider::NormalizedHourlyRow;

/// Hours expected for a full 7-day horizon.
const EXPECTED_HOURS: usize = 168;

/// Below this many rows the dataset is unusable → degraded.
const VERY_LOW_HOUR_COUNT: usize = 100;

/// Below this many rows is suspicious but servable.
const LOW_HOUR_COUNT: usize = 140;

/// Null rate above which a key metric marks the run degraded.
const NULL_RATE_THRESHOLD: f64 = 0.10;

/// Range checks: (field name, accessor, min, max).
const RANGE_CHECKS: [(&str, fn(&NormalizedHourlyRow) -> Option<f64>, f64, f64); 5] = [
    ("wave_height_m", |r| r.wave_height_m, 0.0, 10.0),
    ("eu_aqi", |r| r.eu_aqi.map(f64::from), 0.0, 500.0),
    ("uv_index", |r| r.uv_index, 0.0, 15.0),
    ("feelslike_c", |r| r.feelslike_c, -5.0, 55.0),
    ("wind_ms", |r| r.wind_ms, 0.0, 50.0),
];

/// Key metrics for the null-rate check.
const KEY_METRICS: [(&str, fn(&NormalizedHourlyRow) -> bool); 5] = [
    ("wave_height_m", |r| r.wave_height_m.is_none()),
    ("feelslike_c", |r| r.feelslike_c.is_none()),
    ("wind_ms", |r| r.wind_ms.is_none()),
    ("uv_index", |r| r.uv_index.is_none()),
    ("eu_aqi", |r| r.eu_aqi.is_none()),
];

/// Result of the data quality checks.
#[derive(Debug, Clone, Default)]
pub struct DqResult {
    pub flags: Vec<String>,
    pub is_degraded: bool,
}

impl DqResult {
    fn add_flag(&mut self, flag: String, degraded: bool) {
        tracing::warn!(flag = %flag, degraded, "dq check flag");
        self.flags.push(flag);
        if degraded {
            self.is_degraded = true;
        }
    }
}

/// Run all V1 data quality checks on normalized rows.
pub fn run_dq_checks(rows: &[NormalizedHourlyRow]) -> DqResult {
    let mut result = DqResult::default();
    let total = rows.len();

    // 1. Hour count check
    if total < VERY_LOW_HOUR_COUNT {
        result.add_flag(format!("very_low_hour_count:{total}"), true);
    } else if total < LOW_HOUR_COUNT {
        result.add_flag(format!("low_hour_count:{total}"), false);
    }

    if total == 0 {
        return result;
    }

    // 2. Range checks
    for (field, get, min, max) in RANGE_CHECKS {
        let out_of_range = rows
            .iter()
            .filter(|r| get(r).is_some_and(|v| v < min || v > max))
            .count();
        if out_of_range > 0 {
            result.add_flag(format!("out_of_range:{field}:{out_of_range}_rows"), false);
        }
    }

    // 3. Null rate per key metric
    for (metric, is_null) in KEY_METRICS {
        let null_count = rows.iter().filter(|r| is_null(r)).count();
        let null_rate = null_count as f64 / total as f64;
        if null_rate > NULL_RATE_THRESHOLD {
            result.add_flag(
                format!("null_rate_high:{metric}:{:.0}%", null_rate * 100.0),
                true,
            );
        }
    }

    // 4. Timestamp continuity
    if total >= 2 {
        let mut sorted: Vec<_> = rows.iter().collect();
        sorted.sort_by_key(|r| r.hour_utc);
        for pair in sorted.windows(2) {
            let gap_seconds = (pair[1].hour_utc - pair[0].hour_utc).num_seconds();
            if gap_seconds > 3600 {
                let gap_hours = gap_seconds as f64 / 3600.0;
                result.add_flag(
                    format!(
                        "timestamp_gap:{}_to_{}:{gap_hours:.1}h",
                        pair[0].hour_utc.to_rfc3339(),
                        pair[1].hour_utc.to_rfc3339()
                    ),
                    false,
                );
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    /// A clean row at `base + hour` hours with all key metrics present.
    fn make_row(hour: i64) -> NormalizedHourlyRow {
        let base: DateTime<Utc> = "2025-06-01T00:00:00Z".parse().unwrap();
        NormalizedHourlyRow {
            area_id: "tel_aviv_coast".to_string(),
            hour_utc: base + Duration::hours(hour),
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
        }
    }

    fn make_rows(n: i64) -> Vec<NormalizedHourlyRow> {
        (0..n).map(make_row).collect()
    }

    #[test]
    fn test_full_clean_dataset_has_no_flags() {
        let result = run_dq_checks(&make_rows(168));
        assert!(result.flags.is_empty(), "flags: {:?}", result.flags);
        assert!(!result.is_degraded);
    }

    #[test]
    fn test_low_hour_count_flagged_not_degraded() {
        let result = run_dq_checks(&make_rows(130));
        assert_eq!(result.flags, vec!["low_hour_count:130"]);
        assert!(!result.is_degraded);
    }

    #[test]
    fn test_very_low_hour_count_degrades() {
        let result = run_dq_checks(&make_rows(80));
        assert_eq!(result.flags, vec!["very_low_hour_count:80"]);
        assert!(result.is_degraded);
    }

    #[test]
    fn test_empty_rows_returns_early() {
        let result = run_dq_checks(&[]);
        assert_eq!(result.flags, vec!["very_low_hour_count:0"]);
        assert!(result.is_degraded);
    }

    #[test]
    fn test_out_of_range_values_flagged() {
        let mut rows = make_rows(168);
        rows[0].wave_height_m = Some(15.0);
        rows[1].wave_height_m = Some(-1.0);
        rows[2].feelslike_c = Some(60.0);
        let result = run_dq_checks(&rows);
        assert!(result
            .flags
            .contains(&"out_of_range:wave_height_m:2_rows".to_string()));
        assert!(result
            .flags
            .contains(&"out_of_range:feelslike_c:1_rows".to_string()));
        assert!(!result.is_degraded);
    }

    #[test]
    fn test_absent_values_do_not_count_as_out_of_range() {
        let mut rows = make_rows(168);
        for row in rows.iter_mut().take(10) {
            row.uv_index = None;
        }
        let result = run_dq_checks(&rows);
        assert!(!result.flags.iter().any(|f| f.starts_with("out_of_range:")));
    }

    #[test]
    fn test_null_rate_above_threshold_degrades() {
        let mut rows = make_rows(168);
        // 20/168 = 11.9% nulls in eu_aqi
        for row in rows.iter_mut().take(20) {
            row.eu_aqi = None;
        }
        let result = run_dq_checks(&rows);
        assert!(result
            .flags
            .contains(&"null_rate_high:eu_aqi:12%".to_string()));
        assert!(result.is_degraded);
    }

    #[test]
    fn test_null_rate_at_or_below_threshold_is_clean() {
        let mut rows = make_rows(168);
        // 16/168 = 9.5% nulls — under the 10% threshold
        for row in rows.iter_mut().take(16) {
            row.wind_ms = None;
        }
        let result = run_dq_checks(&rows);
        assert!(!result.flags.iter().any(|f| f.starts_with("null_rate_high:")));
        assert!(!result.is_degraded);
    }

    #[test]
    fn test_timestamp_gap_flagged() {
        let mut rows = make_rows(167);
        // Push the last row 3 hours past its predecessor
        let last = rows.last_mut().unwrap();
        last.hour_utc += Duration::hours(2);
        let result = run_dq_checks(&rows);
        let gap_flags: Vec<_> = result
            .flags
            .iter()
            .filter(|f| f.starts_with("timestamp_gap:"))
            .collect();
        assert_eq!(gap_flags.len(), 1);
        assert!(gap_flags[0].ends_with(":3.0h"), "flag: {}", gap_flags[0]);
        assert!(!result.is_degraded);
    }

    #[test]
    fn test_consecutive_hours_have_no_gap_flags() {
        let result = run_dq_checks(&make_rows(168));
        assert!(!result.flags.iter().any(|f| f.starts_with("timestamp_gap:")));
    }

    #[test]
    fn test_unsorted_input_is_sorted_before_gap_check() {
        let mut rows = make_rows(168);
        rows.reverse();
        let result = run_dq_checks(&rows);
        assert!(!result.flags.iter().any(|f| f.starts_with("timestamp_gap:")));
    }
}
