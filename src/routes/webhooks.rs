use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::decision::classify;
use crate::domain::Vendor;
use crate::error::{AppError, AppResult};
use crate::reconciler::ReconcileOutcome;
use crate::signature::{self, SignatureCheck, SIGNATURE_HEADER};
use crate::state::AppState;

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(vendor): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let vendor: Vendor = vendor.parse().map_err(|_| AppError::not_found())?;

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let check = signature::check(state.config.webhook_secret(vendor), &body, provided);
    let enforce = state.config.webhook_signature_enforce;
    match check {
        SignatureCheck::Valid => {}
        SignatureCheck::NotConfigured if enforce => {
            error!(%vendor, "signatures enforced but no webhook secret configured, rejecting");
            return Err(AppError::unauthorized());
        }
        SignatureCheck::NotConfigured => {
            debug!(%vendor, "no webhook secret configured, signature not checked");
        }
        SignatureCheck::Missing | SignatureCheck::Invalid if !check.is_acceptable(enforce) => {
            warn!(%vendor, ?check, "rejecting webhook with bad signature");
            return Err(AppError::unauthorized());
        }
        SignatureCheck::Missing | SignatureCheck::Invalid => {
            warn!(%vendor, ?check, "webhook signature not valid, processing anyway");
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON payload: {err}")))?;
    let event = classify(vendor, &payload).map_err(|err| AppError::bad_request(err.to_string()))?;

    match state.reconciler().handle(vendor, event, payload).await {
        Ok(ReconcileOutcome::UnknownSession) => Ok(Json(json!({
            "received": true,
            "warning": "verification not found",
        }))),
        Ok(ReconcileOutcome::UnknownShape) => {
            debug!(%vendor, "webhook of unknown type acknowledged");
            Ok(Json(json!({
                "received": true,
                "warning": "unknown webhook type",
            })))
        }
        Ok(outcome) => {
            info!(%vendor, ?outcome, "webhook processed");
            Ok(Json(json!({ "received": true })))
        }
        Err(err) => {
            error!(%vendor, error = %err, "webhook processing failed");
            Ok(Json(json!({
                "received": true,
                "warning": "processing error",
            })))
        }
    }
}
