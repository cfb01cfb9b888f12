use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{NewNotification, NotificationType, VerificationRecord, VerificationStatus};
use crate::jobs::{EmailKind, VerificationEmailPayload, JOB_SEND_VERIFICATION_EMAIL};
use crate::store::Store;

pub const GENERIC_REJECTION: &str = "Please try again with a valid document.";

/// Fans out the side effects of a terminal verification outcome. Every
/// step is attempted even when an earlier one fails.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn on_terminal_transition(
        &self,
        record: &VerificationRecord,
        status: VerificationStatus,
        reason: Option<&str>,
    ) {
        let Some(user_id) = record.subject.user_id() else {
            return;
        };

        match status {
            VerificationStatus::Verified => self.on_verified(record, user_id).await,
            VerificationStatus::Rejected => self.on_rejected(record, user_id, reason).await,
            VerificationStatus::ReviewNeeded => self.on_review_needed(record, user_id).await,
            other => {
                warn!(verification_id = %record.id, status = %other, "dispatch requested for non-terminal status");
            }
        }
    }

    async fn on_verified(&self, record: &VerificationRecord, user_id: Uuid) {
        if let Err(err) = self
            .store
            .set_identity_verified(user_id, Some(Utc::now()))
            .await
        {
            error!(verification_id = %record.id, %user_id, error = %err, "failed to set profile verification flag");
        }

        let person = match record.extracted_identity.full_name() {
            Some(name) => Some(name),
            None => match self.store.find_profile(user_id).await {
                Ok(profile) => profile.and_then(|p| p.display_name()),
                Err(err) => {
                    warn!(%user_id, error = %err, "failed to load profile for notification");
                    None
                }
            },
        };
        let message = match person {
            Some(name) => format!("The identity of {name} has been verified successfully."),
            None => "Your identity has been verified successfully.".to_string(),
        };
        self.notify(
            record,
            user_id,
            NotificationType::VerificationApproved,
            "Identity verified",
            message,
        )
        .await;

        match self.store.confirm_pending_referrals(user_id).await {
            Ok(0) => {}
            Ok(confirmed) => info!(%user_id, confirmed, "confirmed pending referrals"),
            Err(err) => error!(%user_id, error = %err, "failed to confirm referrals"),
        }

        self.queue_email(record, user_id, EmailKind::Verified, None)
            .await;
    }

    async fn on_rejected(&self, record: &VerificationRecord, user_id: Uuid, reason: Option<&str>) {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(GENERIC_REJECTION);
        self.notify(
            record,
            user_id,
            NotificationType::VerificationRejected,
            "Identity verification rejected",
            format!("Your identity verification was not approved. {reason}"),
        )
        .await;

        self.queue_email(record, user_id, EmailKind::Rejected, Some(reason.to_string()))
            .await;
    }

    async fn on_review_needed(&self, record: &VerificationRecord, user_id: Uuid) {
        self.notify(
            record,
            user_id,
            NotificationType::VerificationResubmission,
            "New submission required",
            "Your identity verification needs a new submission. Please restart the verification with a clear photo of your document.".to_string(),
        )
        .await;

        self.queue_email(record, user_id, EmailKind::Pending, None)
            .await;
    }

    async fn notify(
        &self,
        record: &VerificationRecord,
        user_id: Uuid,
        notification_type: NotificationType,
        title: &str,
        message: String,
    ) {
        let notification = NewNotification {
            user_id,
            notification_type,
            title: title.to_string(),
            message,
            related_document_id: None,
        };
        if let Err(err) = self.store.insert_notification(notification).await {
            error!(
                verification_id = %record.id,
                %user_id,
                notification_type = notification_type.as_str(),
                error = %err,
                "failed to write notification"
            );
        }
    }

    async fn queue_email(
        &self,
        record: &VerificationRecord,
        user_id: Uuid,
        kind: EmailKind,
        reason: Option<String>,
    ) {
        let payload = VerificationEmailPayload {
            user_id,
            verification_id: record.id,
            kind,
            reason,
        };
        let payload = match serde_json::to_value(&payload) {
            Ok(payload) => payload,
            Err(err) => {
                error!(verification_id = %record.id, error = %err, "failed to encode email job");
                return;
            }
        };
        if let Err(err) = self
            .store
            .enqueue_job(JOB_SEND_VERIFICATION_EMAIL, payload, None)
            .await
        {
            error!(verification_id = %record.id, %user_id, error = %err, "failed to queue verification email");
        }
    }
}
