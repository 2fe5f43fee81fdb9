//! Open-Meteo provider — weather, marine, and air quality endpoints.
//!
//! Fetches the three free-tier Open-Meteo endpoints concurrently (each with
//! its own retry loop) and merges the parallel-array responses into
//! time-aligned normalized hourly rows plus daily sunrise/sunset rows.
//! See: https://open-meteo.com/en/docs

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::services::provider::{
    DailySunRow, ForecastProvider, NormalizedHourlyRow, RawResponses,
};
use crate::services::retry::{retry_with_backoff, RetryPolicy};

/// HTTP request timeout for Open-Meteo API calls (seconds).
const OPEN_METEO_HTTP_TIMEOUT_SECS: u64 = 30;

/// Endpoint names, in the order they are requested.
pub const ENDPOINT_NAMES: [&str; 3] = ["weather", "marine", "air_quality"];

/// Base URLs for the three Open-Meteo hosts. Overridable so tests can point
/// every endpoint at a local fake.
#[derive(Debug, Clone)]
pub struct OpenMeteoEndpoints {
    pub weather_base: String,
    pub marine_base: String,
    pub air_quality_base: String,
}

impl Default for OpenMeteoEndpoints {
    fn default() -> Self {
        Self {
            weather_base: "https://api.open-meteo.com".to_string(),
            marine_base: "https://marine-api.open-meteo.com".to_string(),
            air_quality_base: "https://air-quality-api.open-meteo.com".to_string(),
        }
    }
}

/// Client for the Open-Meteo forecast APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    client: reqwest::Client,
    endpoints: OpenMeteoEndpoints,
    retry: RetryPolicy,
}

impl OpenMeteoProvider {
    pub fn new(endpoints: OpenMeteoEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(OPEN_METEO_HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            endpoints,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy (tests shrink the delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_urls(&self, lat: f64, lon: f64, horizon_days: u32) -> [(&'static str, String); 3] {
        let base_params =
            format!("latitude={lat}&longitude={lon}&forecast_days={horizon_days}&timezone=auto");
        [
            (
                "weather",
                format!(
                    "{}/v1/forecast?{}&hourly=temperature_2m,apparent_temperature,\
                     wind_speed_10m,wind_gusts_10m,precipitation_probability,\
                     precipitation,uv_index&daily=sunrise,sunset",
                    self.endpoints.weather_base.trim_end_matches('/'),
                    base_params
                ),
            ),
            (
                "marine",
                format!(
                    "{}/v1/marine?{}&hourly=wave_height,wave_period,wave_direction",
                    self.endpoints.marine_base.trim_end_matches('/'),
                    base_params
                ),
            ),
            (
                "air_quality",
                format!(
                    "{}/v1/air-quality?{}&hourly=european_aqi,pm10,pm2_5",
                    self.endpoints.air_quality_base.trim_end_matches('/'),
                    base_params
                ),
            ),
        ]
    }

    /// Fetch a single endpoint with backoff. Returns `None` once the retry
    /// policy is exhausted; a transport error, a non-2xx status, and a JSON
    /// parse failure all count as failed attempts.
    async fn fetch_endpoint(&self, endpoint: &str, url: &str) -> Option<Value> {
        let result: Result<Value, String> = retry_with_backoff(self.retry, endpoint, || {
            let request = self.client.get(url);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| format!("request failed: {e}"))?;
                if !response.status().is_success() {
                    return Err(format!("HTTP {}", response.status()));
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| format!("JSON parse error: {e}"))
            }
        })
        .await;

        match result {
            Ok(data) => {
                tracing::info!(endpoint, "provider fetch succeeded");
                Some(data)
            }
            Err(err) => {
                tracing::error!(endpoint, error = %err, "provider fetch failed after retries");
                None
            }
        }
    }
}

impl ForecastProvider for OpenMeteoProvider {
    fn name(&self) -> &'static str {
        "open_meteo"
    }

    async fn fetch_raw(
        &self,
        area_id: &str,
        lat: f64,
        lon: f64,
        horizon_days: u32,
    ) -> RawResponses {
        let [(n0, u0), (n1, u1), (n2, u2)] = self.build_urls(lat, lon, horizon_days);

        let (weather, marine, air_quality) = futures::join!(
            self.fetch_endpoint(n0, &u0),
            self.fetch_endpoint(n1, &u1),
            self.fetch_endpoint(n2, &u2),
        );

        let mut raw = RawResponses::new();
        for (name, result) in [(n0, weather), (n1, marine), (n2, air_quality)] {
            if let Some(data) = result {
                raw.insert(name.to_string(), data);
            }
        }

        tracing::info!(
            area_id,
            endpoints = raw.len(),
            "provider fetch complete"
        );
        raw
    }

    fn normalize(
        &self,
        raw: &RawResponses,
        area_id: &str,
        _fetched_at_utc: DateTime<Utc>,
    ) -> (Vec<NormalizedHourlyRow>, Vec<DailySunRow>) {
        // Union of hourly time axes across all present endpoints; ISO strings
        // sort chronologically, so the BTreeSet order is the row order.
        let mut hours: BTreeSet<&str> = BTreeSet::new();
        for data in raw.values() {
            for t in time_array(data) {
                hours.insert(t);
            }
        }

        if hours.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let weather = EndpointSeries::from_raw(raw, "weather");
        let marine = EndpointSeries::from_raw(raw, "marine");
        let air_quality = EndpointSeries::from_raw(raw, "air_quality");

        let mut rows = Vec::with_capacity(hours.len());
        for time_str in hours {
            let Some(hour_utc) = parse_naive_utc(time_str) else {
                tracing::warn!(time = time_str, "skipping hour with unparseable timestamp");
                continue;
            };

            rows.push(NormalizedHourlyRow {
                area_id: area_id.to_string(),
                hour_utc,
                wave_height_m: marine.f64_at("wave_height", time_str),
                wave_period_s: marine.f64_at("wave_period", time_str),
                air_temp_c: weather.f64_at("temperature_2m", time_str),
                feelslike_c: weather.f64_at("apparent_temperature", time_str),
                wind_ms: weather.f64_at("wind_speed_10m", time_str).map(kmh_to_ms),
                gust_ms: weather.f64_at("wind_gusts_10m", time_str).map(kmh_to_ms),
                precip_prob_pct: weather.i32_at("precipitation_probability", time_str),
                precip_mm: weather.f64_at("precipitation", time_str),
                uv_index: weather.f64_at("uv_index", time_str),
                eu_aqi: air_quality.i32_at("european_aqi", time_str),
                pm10: air_quality.f64_at("pm10", time_str),
                pm2_5: air_quality.f64_at("pm2_5", time_str),
            });
        }

        let daily_sun = extract_daily_sun(raw.get("weather"));

        tracing::info!(
            area_id,
            row_count = rows.len(),
            daily_count = daily_sun.len(),
            "normalize complete"
        );
        (rows, daily_sun)
    }
}

// ---------------------------------------------------------------------------
// Parallel-array access helpers
// ---------------------------------------------------------------------------

/// Index-based lookup into one endpoint's `hourly` parallel arrays.
struct EndpointSeries<'a> {
    hourly: Option<&'a Value>,
    index: HashMap<&'a str, usize>,
}

impl<'a> EndpointSeries<'a> {
    fn from_raw(raw: &'a RawResponses, endpoint: &str) -> Self {
        let hourly = raw.get(endpoint).and_then(|d| d.get("hourly"));
        let index = hourly
            .map(|h| {
                time_array_of(h)
                    .enumerate()
                    .map(|(i, t)| (t, i))
                    .collect()
            })
            .unwrap_or_default();
        Self { hourly, index }
    }

    fn value_at(&self, field: &str, time_str: &str) -> Option<&'a Value> {
        let i = *self.index.get(time_str)?;
        self.hourly?.get(field)?.as_array()?.get(i)
    }

    fn f64_at(&self, field: &str, time_str: &str) -> Option<f64> {
        self.value_at(field, time_str)?.as_f64()
    }

    fn i32_at(&self, field: &str, time_str: &str) -> Option<i32> {
        self.value_at(field, time_str)?.as_f64().map(|v| v as i32)
    }
}

/// Iterate the string entries of `{block}["time"]`.
fn time_array_of(block: &Value) -> impl Iterator<Item = &str> {
    block
        .get("time")
        .and_then(|t| t.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
}

fn time_array(endpoint_data: &Value) -> impl Iterator<Item = &str> {
    endpoint_data
        .get("hourly")
        .into_iter()
        .flat_map(time_array_of)
}

/// Open-Meteo reports wind in km/h; curated rows carry m/s at 2 decimals.
fn kmh_to_ms(kmh: f64) -> f64 {
    (kmh / 3.6 * 100.0).round() / 100.0
}

/// Parse an Open-Meteo local timestamp ("2025-06-01T14:00", seconds optional)
/// as UTC wall-clock.
fn parse_naive_utc(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Build daily sun rows from the weather endpoint's `daily` block. Entries
/// with an unparseable date or missing sunrise/sunset are skipped.
fn extract_daily_sun(weather: Option<&Value>) -> Vec<DailySunRow> {
    let Some(daily) = weather.and_then(|d| d.get("daily")) else {
        return Vec::new();
    };

    let dates = string_array(daily, "time");
    let sunrises = string_array(daily, "sunrise");
    let sunsets = string_array(daily, "sunset");

    dates
        .iter()
        .zip(sunrises.iter())
        .zip(sunsets.iter())
        .filter_map(|((date, sunrise), sunset)| {
            if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                tracing::warn!(date, "skipping daily sun row with unparseable date");
                return None;
            }
            Some(DailySunRow {
                date: date.to_string(),
                sunrise_utc: parse_naive_utc(sunrise)?,
                sunset_utc: parse_naive_utc(sunset)?,
            })
        })
        .collect()
}

fn string_array<'a>(block: &'a Value, field: &str) -> Vec<&'a str> {
    block
        .get(field)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
