use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::documents::pending_listing_entry;
use crate::domain::{DocumentStatus, DocumentVerification, NewNotification};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDocumentsRequest {
    pub action: String,
    pub document_id: Option<Uuid>,
    pub verification_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<String>,
    pub rejection_reason: Option<String>,
}

pub async fn handle_admin_documents(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<AdminDocumentsRequest>,
) -> AppResult<Json<Value>> {
    let verifier = state.document_verifier();

    match payload.action.as_str() {
        "get-pending" => get_pending(&state).await,
        "start-batch" => {
            let batch = verifier.start_batch(admin.user_id).await?;
            let queued = batch.as_ref().map_or(0, |batch| batch.total_documents);
            Ok(Json(json!({ "batch": batch, "queued": queued })))
        }
        "update-status" => {
            let verification_id = payload
                .verification_id
                .ok_or_else(|| AppError::bad_request("verificationId is required"))?;
            let status = parse_manual_status(payload.status.as_deref())?;
            let reason = payload
                .rejection_reason
                .map(|reason| reason.trim().to_string())
                .filter(|reason| !reason.is_empty());

            let row = state
                .store
                .set_document_status(verification_id, status, reason, admin.user_id)
                .await?
                .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "document verification not found"))?;
            notify_document_owner(&state, &row).await?;
            info!(verification_id = %row.id, status = status.as_str(), admin_id = %admin.user_id, "document status set manually");
            Ok(Json(json!({ "verification": row })))
        }
        "verify-single" | "retry-verification" => {
            let document_id = require_document(payload.document_id)?;
            let result = verifier.verify_one(document_id, Some(admin.user_id)).await?;
            Ok(Json(json!({ "result": result })))
        }
        "verify-all" => {
            let report = verifier.verify_all(Some(admin.user_id)).await?;
            Ok(Json(json!(report)))
        }
        "notify-user" => {
            let document_id = require_document(payload.document_id)?;
            let row = state
                .store
                .find_document_verification_by_document(document_id)
                .await?
                .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "document verification not found"))?;
            notify_document_owner(&state, &row).await?;
            Ok(Json(json!({ "notified": true, "userId": row.user_id })))
        }
        "delete-document" => {
            let document_id = require_document(payload.document_id)?;
            let document = state
                .store
                .find_family_document(document_id)
                .await?
                .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "document not found"))?;
            if let Err(err) = state.storage.delete_object(&document.file_path).await {
                warn!(%document_id, error = %err, "failed to delete document blob");
            }
            state.store.delete_document_verification(document_id).await?;
            state.store.delete_family_document(document_id).await?;
            info!(%document_id, admin_id = %admin.user_id, "family document deleted");
            Ok(Json(json!({ "deleted": true })))
        }
        "reset-verification" => {
            let user_id = payload
                .user_id
                .ok_or_else(|| AppError::bad_request("userId is required"))?;
            let removed = state.gateway().reset_verification(user_id).await?;
            Ok(Json(json!({ "reset": true, "removed": removed })))
        }
        "refresh-all" => {
            let report = state.gateway().refresh_open_verifications().await?;
            info!(admin_id = %admin.user_id, checked = report.checked, "open verifications refreshed by admin");
            Ok(Json(json!(report)))
        }
        other => Err(AppError::bad_request(format!("unknown action '{other}'"))),
    }
}

async fn get_pending(state: &AppState) -> AppResult<Json<Value>> {
    let statuses: HashMap<Uuid, DocumentStatus> = state
        .store
        .list_document_verifications(None)
        .await?
        .into_iter()
        .map(|row| (row.document_id, row.status))
        .collect();
    let documents: Vec<Value> = state
        .store
        .list_family_documents()
        .await?
        .iter()
        .map(|doc| pending_listing_entry(doc, statuses.get(&doc.id).copied()))
        .collect();
    let identity = state.store.list_verifications().await?;

    Ok(Json(json!({
        "documents": documents,
        "identityVerifications": identity,
    })))
}

fn require_document(document_id: Option<Uuid>) -> AppResult<Uuid> {
    document_id.ok_or_else(|| AppError::bad_request("documentId is required"))
}

fn parse_manual_status(status: Option<&str>) -> AppResult<DocumentStatus> {
    let status: DocumentStatus = status
        .ok_or_else(|| AppError::bad_request("status is required"))?
        .parse()
        .map_err(AppError::bad_request)?;
    if status == DocumentStatus::Pending {
        return Err(AppError::bad_request(
            "status must be verified, rejected or review_needed",
        ));
    }
    Ok(status)
}

pub fn document_notification(row: &DocumentVerification) -> (String, String) {
    let name = &row.file_name;
    match row.status {
        DocumentStatus::Verified => (
            "Document verified".to_string(),
            format!("Your document \"{name}\" has been verified."),
        ),
        DocumentStatus::Rejected => {
            let reason = row
                .reason
                .as_deref()
                .unwrap_or("It does not meet our requirements.");
            (
                "Document rejected".to_string(),
                format!("Your document \"{name}\" was rejected. {reason}"),
            )
        }
        DocumentStatus::ReviewNeeded => (
            "Document under review".to_string(),
            format!("Your document \"{name}\" needs an additional review by our team."),
        ),
        DocumentStatus::Pending => (
            "Document pending".to_string(),
            format!("Your document \"{name}\" is awaiting verification."),
        ),
    }
}

async fn notify_document_owner(state: &AppState, row: &DocumentVerification) -> AppResult<()> {
    let (title, message) = document_notification(row);
    state
        .store
        .insert_notification(NewNotification {
            user_id: row.user_id,
            notification_type: row.status.notification_type(),
            title,
            message,
            related_document_id: Some(row.document_id),
        })
        .await?;
    state.store.mark_document_notified(row.id).await?;
    Ok(())
}
