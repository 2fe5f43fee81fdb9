//! Ingest trigger endpoint.
//!
//! POST /api/v1/ingest/trigger — accepts either a direct payload
//! `{area_id?, horizon_days?}` or a push-subscription envelope
//! `{message: {data: base64(JSON)}}`, runs one ingest synchronously, and
//! answers 200 with the outcome even when the run itself failed. Only an
//! unparseable body is a 400.

use axum::extract::State;
use axum::Json;
use base64::Engine;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::routes::forecasts::AppState;
use crate::services::ingest::{run_ingest, IngestOutcome};

/// Trigger payload; absent fields default from the runtime config.
#[derive(Debug, Default, PartialEq, Deserialize, ToSchema)]
pub struct TriggerPayload {
    pub area_id: Option<String>,
    pub horizon_days: Option<u32>,
}

/// Decode a trigger body: the push envelope's `message.data` is base64-coded
/// JSON; anything else is treated as the payload itself.
pub(crate) fn decode_trigger_body(body: &serde_json::Value) -> Result<TriggerPayload, AppError> {
    if let Some(message) = body.get("message") {
        let data = message
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| AppError::ValidationError("push envelope missing message.data".to_string()))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AppError::ValidationError(format!("invalid base64 payload: {e}")))?;
        serde_json::from_slice(&decoded)
            .map_err(|e| AppError::ValidationError(format!("invalid payload JSON: {e}")))
    } else {
        serde_json::from_value(body.clone())
            .map_err(|e| AppError::ValidationError(format!("invalid payload: {e}")))
    }
}

/// Run one ingest for the requested area.
#[utoipa::path(
    post,
    path = "/api/v1/ingest/trigger",
    tag = "Ingest",
    request_body = TriggerPayload,
    responses(
        (status = 200, description = "Ingest finished (status may still be failed/degraded)", body = IngestOutcome),
        (status = 400, description = "Unparseable trigger body", body = crate::errors::ErrorResponse),
    )
)]
pub async fn trigger_ingest(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestOutcome>, AppError> {
    let payload = decode_trigger_body(&body)?;
    let area_id = payload
        .area_id
        .unwrap_or_else(|| state.config.area_id.clone());
    let horizon_days = payload.horizon_days.unwrap_or(state.config.horizon_days);

    let outcome = run_ingest(
        &state.provider,
        &state.storage,
        &area_id,
        state.config.lat,
        state.config.lon,
        horizon_days,
    )
    .await;

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    #[test]
    fn test_decode_direct_payload() {
        let body = serde_json::json!({"area_id": "tel_aviv_coast", "horizon_days": 3});
        let payload = decode_trigger_body(&body).unwrap();
        assert_eq!(payload.area_id.as_deref(), Some("tel_aviv_coast"));
        assert_eq!(payload.horizon_days, Some(3));
    }

    #[test]
    fn test_decode_empty_payload_uses_defaults() {
        let payload = decode_trigger_body(&serde_json::json!({})).unwrap();
        assert_eq!(payload, TriggerPayload::default());
    }

    #[test]
    fn test_decode_push_envelope() {
        let inner = serde_json::json!({"area_id": "tel_aviv_coast"}).to_string();
        let body = serde_json::json!({
            "message": {"data": STANDARD.encode(inner)}
        });
        let payload = decode_trigger_body(&body).unwrap();
        assert_eq!(payload.area_id.as_deref(), Some("tel_aviv_coast"));
        assert_eq!(payload.horizon_days, None);
    }

    #[test]
    fn test_decode_envelope_without_data_is_rejected() {
        let body = serde_json::json!({"message": {}});
        assert!(matches!(
            decode_trigger_body(&body),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_decode_envelope_with_bad_base64_is_rejected() {
        let body = serde_json::json!({"message": {"data": "%%% not base64 %%%"}});
        assert!(matches!(
            decode_trigger_body(&body),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_decode_envelope_with_non_json_payload_is_rejected() {
        let body = serde_json::json!({"message": {"data": STANDARD.encode("plain text")}});
        assert!(matches!(
            decode_trigger_body(&body),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_decode_wrong_field_type_is_rejected() {
        let body = serde_json::json!({"area_id": 42});
        assert!(matches!(
            decode_trigger_body(&body),
            Err(AppError::ValidationError(_))
        ));
    }
}
