use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::domain::Vendor;
use crate::error::{AppError, AppResult};
use crate::gateway::{RegistrationData, SessionSubject};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub action: String,
    pub vendor: Option<String>,
    pub registration_data: Option<RegistrationPayload>,
    pub registration_token: Option<String>,
    pub session_id: Option<String>,
}

pub async fn handle_verification(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<VerificationRequest>,
) -> AppResult<Json<Value>> {
    let vendor = payload
        .vendor
        .as_deref()
        .map(str::parse::<Vendor>)
        .transpose()
        .map_err(AppError::bad_request)?;
    let gateway = state.gateway();

    match payload.action.as_str() {
        "initiate" => {
            let user = require_user(user)?;
            let created = gateway
                .create_session(SessionSubject::User(user.user_id), vendor)
                .await?;
            Ok(Json(json!(created)))
        }
        "initiate-registration" => {
            let data = payload
                .registration_data
                .ok_or_else(|| AppError::bad_request("registrationData is required"))?;
            let data = RegistrationData::validated(&data.first_name, &data.last_name, &data.email)?;
            let created = gateway
                .create_session(SessionSubject::Registration(data), vendor)
                .await?;
            Ok(Json(json!(created)))
        }
        "status" => {
            let user = require_user(user)?;
            let snapshot = gateway
                .status(user.user_id, payload.session_id.as_deref())
                .await?;
            Ok(Json(json!(snapshot)))
        }
        "check-registration" => {
            let token = require_token(payload.registration_token.as_deref())?;
            let snapshot = gateway.check_registration(token).await?;
            Ok(Json(json!(snapshot)))
        }
        "claim-registration" => {
            let user = require_user(user)?;
            let token = require_token(payload.registration_token.as_deref())?;
            let record = gateway.claim_registration(token, user.user_id).await?;
            Ok(Json(json!({
                "verificationId": record.id,
                "status": record.status,
            })))
        }
        "retry" => {
            let user = require_user(user)?;
            let removed = gateway.retry(user.user_id).await?;
            Ok(Json(json!({ "reset": true, "verificationId": removed })))
        }
        other => Err(AppError::bad_request(format!("unknown action '{other}'"))),
    }
}

fn require_user(user: Option<AuthenticatedUser>) -> AppResult<AuthenticatedUser> {
    user.ok_or_else(AppError::unauthorized)
}

fn require_token(token: Option<&str>) -> AppResult<&str> {
    token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::bad_request("registrationToken is required"))
}
