use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::decision::{classify, WebhookEvent};
use crate::domain::{
    NewVerification, Subject, Vendor, VerificationRecord, VerificationStatus, VerificationType,
};
use crate::error::{VerificationError, VerificationResult};
use crate::reconciler::Reconciler;
use crate::storage::ObjectStorage;
use crate::store::Store;
use crate::vendors::{SessionRequest, VendorRegistry};

#[derive(Debug, Clone)]
pub struct RegistrationData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl RegistrationData {
    /// Trims every field and requires all three, with an `@` in the email.
    pub fn validated(first_name: &str, last_name: &str, email: &str) -> VerificationResult<Self> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        let email = email.trim();
        if first_name.is_empty() || last_name.is_empty() || email.is_empty() {
            return Err(VerificationError::Validation(
                "first name, last name and email are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(VerificationError::Validation(
                "email address is invalid".to_string(),
            ));
        }
        Ok(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedVerification {
    pub verification_id: Uuid,
    pub previous: VerificationStatus,
    pub status: VerificationStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub updated: Vec<RefreshedVerification>,
}

#[derive(Debug, Clone)]
pub enum SessionSubject {
    User(Uuid),
    Registration(RegistrationData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub verification_id: Option<Uuid>,
    pub vendor: Vendor,
    #[serde(rename = "sessionId")]
    pub vendor_session_id: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: VerificationStatus,
    pub identity_verified: bool,
    pub identity_verified_at: Option<DateTime<Utc>>,
    pub verification: Option<VerificationRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSnapshot {
    pub verification_id: Uuid,
    pub status: VerificationStatus,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document_type: Option<String>,
    pub document_country: Option<String>,
}

pub fn generate_registration_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Creates vendor sessions and answers status queries about them.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn Store>,
    vendors: VendorRegistry,
    storage: Arc<dyn ObjectStorage>,
    reconciler: Reconciler,
    config: Arc<AppConfig>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn Store>,
        vendors: VendorRegistry,
        storage: Arc<dyn ObjectStorage>,
        config: Arc<AppConfig>,
    ) -> Self {
        let reconciler = Reconciler::new(store.clone());
        Self {
            store,
            vendors,
            storage,
            reconciler,
            config,
        }
    }

    pub async fn create_session(
        &self,
        subject: SessionSubject,
        vendor: Option<Vendor>,
    ) -> VerificationResult<SessionCreated> {
        let vendor = vendor.unwrap_or(self.config.verification_vendor);
        let gateway = self.vendors.get(vendor)?;
        let site_url = self.config.site_url.trim_end_matches('/');
        let callback_url = self.config.webhook_callback_url(vendor);

        let (request, subject, verification_type, mut metadata) = match subject {
            SessionSubject::User(user_id) => {
                let profile = self
                    .store
                    .find_profile(user_id)
                    .await?
                    .ok_or(VerificationError::NotFound("profile"))?;
                let request = SessionRequest {
                    reference: user_id.to_string(),
                    first_name: profile.first_name.clone(),
                    last_name: profile.last_name.clone(),
                    callback_url,
                    success_url: format!("{site_url}/profile?verification=success"),
                    error_url: format!("{site_url}/profile?verification=error"),
                };
                (
                    request,
                    Subject::Assigned { user_id },
                    VerificationType::IdDocument,
                    json!({}),
                )
            }
            SessionSubject::Registration(data) => {
                let token = generate_registration_token();
                let request = SessionRequest {
                    reference: token.clone(),
                    first_name: Some(data.first_name.clone()),
                    last_name: Some(data.last_name.clone()),
                    callback_url,
                    success_url: format!(
                        "{site_url}/register?verification=success&token={token}"
                    ),
                    error_url: format!("{site_url}/register?verification=error&token={token}"),
                };
                let metadata = json!({
                    "registrationFirstName": data.first_name,
                    "registrationLastName": data.last_name,
                    "registrationEmail": data.email,
                });
                (
                    request,
                    Subject::Pending {
                        registration_token: token,
                    },
                    VerificationType::Registration,
                    metadata,
                )
            }
        };

        let session = gateway.create_session(&request).await?;
        crate::utils::json::merge_object(
            &mut metadata,
            json!({
                "sessionUrl": session.redirect_url,
                "sessionToken": session.session_token,
            }),
        );

        let registration_token = subject.registration_token().map(str::to_string);
        let new = NewVerification {
            subject,
            vendor,
            vendor_session_id: session.session_id.clone(),
            vendor_account_id: session.account_id.clone(),
            status: VerificationStatus::Initiated,
            verification_type,
            metadata,
            document_path: None,
        };

        let verification_id = match self.store.insert_verification(new).await {
            Ok(record) => {
                info!(
                    verification_id = %record.id,
                    %vendor,
                    session_id = %record.vendor_session_id,
                    verification_type = record.verification_type.as_str(),
                    "verification session initiated"
                );
                Some(record.id)
            }
            Err(err) => {
                error!(
                    %vendor,
                    session_id = %session.session_id,
                    error = %err,
                    "vendor session created but verification record could not be stored"
                );
                None
            }
        };

        Ok(SessionCreated {
            verification_id,
            vendor,
            vendor_session_id: session.session_id,
            redirect_url: session.redirect_url,
            registration_token,
        })
    }

    pub async fn status(
        &self,
        user_id: Uuid,
        session_id: Option<&str>,
    ) -> VerificationResult<StatusSnapshot> {
        let profile = self
            .store
            .find_profile(user_id)
            .await?
            .ok_or(VerificationError::NotFound("profile"))?;

        let verification = match session_id {
            Some(session_id) => {
                let mut found = None;
                for vendor in [Vendor::Veriff, Vendor::Jumio] {
                    if let Some(record) = self
                        .store
                        .find_verification_by_session(vendor, session_id)
                        .await?
                    {
                        found = Some(record);
                        break;
                    }
                }
                let record = found
                    .filter(|record| record.subject.user_id() == Some(user_id))
                    .ok_or(VerificationError::NotFound("verification"))?;
                Some(record)
            }
            None => self.store.latest_verification_for_user(user_id).await?,
        };

        let verification = match verification {
            Some(record) if record.status.is_open() => {
                Some(self.poll_decision(&record).await.unwrap_or(record))
            }
            other => other,
        };
        // A polled approval updates the profile flag.
        let profile = match verification.as_ref() {
            Some(record)
                if record.status == VerificationStatus::Verified && !profile.identity_verified =>
            {
                self.store.find_profile(user_id).await?.unwrap_or(profile)
            }
            _ => profile,
        };

        Ok(StatusSnapshot {
            status: verification
                .as_ref()
                .map_or(VerificationStatus::None, |record| record.status),
            identity_verified: profile.identity_verified,
            identity_verified_at: profile.identity_verified_at,
            verification,
        })
    }

    pub async fn check_registration(&self, token: &str) -> VerificationResult<RegistrationSnapshot> {
        let mut record = self.registration_record(token).await?;

        if record.status.is_open() {
            if let Some(refreshed) = self.poll_decision(&record).await {
                record = refreshed;
            }
        }

        let first_name = record
            .extracted_identity
            .first_name
            .clone()
            .or_else(|| record.metadata_str("registrationFirstName").map(str::to_string));
        let last_name = record
            .extracted_identity
            .last_name
            .clone()
            .or_else(|| record.metadata_str("registrationLastName").map(str::to_string));

        Ok(RegistrationSnapshot {
            verification_id: record.id,
            status: record.status,
            first_name,
            last_name,
            document_type: record.extracted_identity.document_type.clone(),
            document_country: record.extracted_identity.document_country.clone(),
        })
    }

    /// Polls the vendor for every initiated or pending record.
    pub async fn refresh_open_verifications(&self) -> VerificationResult<RefreshReport> {
        let open: Vec<VerificationRecord> = self
            .store
            .list_verifications()
            .await?
            .into_iter()
            .filter(|record| record.status.is_open())
            .collect();

        let mut report = RefreshReport {
            checked: open.len(),
            ..RefreshReport::default()
        };
        for record in open {
            match self.poll_decision(&record).await {
                Some(refreshed) if refreshed.status != record.status => {
                    report.updated.push(RefreshedVerification {
                        verification_id: refreshed.id,
                        previous: record.status,
                        status: refreshed.status,
                    });
                }
                _ => {}
            }
        }

        info!(checked = report.checked, updated = report.updated.len(), "open verifications refreshed");
        Ok(report)
    }

    /// Asks the vendor for a decision the webhook may not have delivered yet.
    /// Failures are logged and leave the stored record as the answer.
    async fn poll_decision(&self, record: &VerificationRecord) -> Option<VerificationRecord> {
        let gateway = self.vendors.get(record.vendor).ok()?;
        let payload: Value = match gateway.fetch_decision(&record.vendor_session_id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(verification_id = %record.id, error = %err, "decision polling failed");
                return None;
            }
        };

        let decision = match classify(record.vendor, &payload) {
            Ok(WebhookEvent::Decision(decision)) => decision,
            Ok(_) => return None,
            Err(err) => {
                warn!(verification_id = %record.id, error = %err, "polled decision was malformed");
                return None;
            }
        };

        if let Err(err) = self
            .reconciler
            .apply_decision(record.clone(), &decision, payload)
            .await
        {
            warn!(verification_id = %record.id, error = %err, "failed to apply polled decision");
            return None;
        }

        match self.store.find_verification(record.id).await {
            Ok(found) => found,
            Err(err) => {
                warn!(verification_id = %record.id, error = %err, "failed to reload verification");
                None
            }
        }
    }

    pub async fn claim_registration(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> VerificationResult<VerificationRecord> {
        let record = self.registration_record(token).await?;
        self.store
            .find_profile(user_id)
            .await?
            .ok_or(VerificationError::NotFound("profile"))?;

        let record = match record.subject {
            Subject::Assigned { user_id: owner } if owner == user_id => record,
            Subject::Assigned { .. } => {
                return Err(VerificationError::Validation(
                    "registration already claimed".to_string(),
                ))
            }
            // A concurrent claim may have won since the read above.
            Subject::Pending { .. } => self
                .store
                .assign_verification_subject(record.id, user_id)
                .await?
                .ok_or_else(|| {
                    VerificationError::Validation("registration already claimed".to_string())
                })?,
        };

        if record.status == VerificationStatus::Verified {
            let verified_at = record.decided_at.unwrap_or_else(Utc::now);
            self.store
                .set_identity_verified(user_id, Some(verified_at))
                .await?;
            let confirmed = self.store.confirm_pending_referrals(user_id).await?;
            if confirmed > 0 {
                info!(%user_id, confirmed, "referrals confirmed on registration claim");
            }
        }

        info!(verification_id = %record.id, %user_id, status = %record.status, "registration claimed");
        Ok(record)
    }

    pub async fn retry(&self, user_id: Uuid) -> VerificationResult<Uuid> {
        let record = self
            .store
            .latest_verification_for_user(user_id)
            .await?
            .ok_or(VerificationError::NotFound("verification"))?;
        if record.status == VerificationStatus::Verified {
            return Err(VerificationError::Validation(
                "identity is already verified".to_string(),
            ));
        }

        self.store.delete_verification(record.id).await?;
        self.purge_document(&record).await;
        info!(verification_id = %record.id, %user_id, "verification reset for retry");
        Ok(record.id)
    }

    /// Removes every identity record of `user_id` and clears the profile flag.
    pub async fn reset_verification(&self, user_id: Uuid) -> VerificationResult<usize> {
        let removed = self.store.delete_verifications_for_user(user_id).await?;
        for record in &removed {
            self.purge_document(record).await;
        }
        self.store.set_identity_verified(user_id, None).await?;
        info!(%user_id, removed = removed.len(), "identity verification reset");
        Ok(removed.len())
    }

    pub async fn purge_stale_registrations(
        &self,
        older_than: DateTime<Utc>,
    ) -> VerificationResult<usize> {
        let removed = self.store.delete_stale_registrations(older_than).await?;
        for record in &removed {
            self.purge_document(record).await;
        }
        Ok(removed.len())
    }

    async fn registration_record(&self, token: &str) -> VerificationResult<VerificationRecord> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VerificationError::Validation(
                "registration token is required".to_string(),
            ));
        }
        self.store
            .find_verification_by_registration_token(token)
            .await?
            .ok_or(VerificationError::NotFound("verification"))
    }

    async fn purge_document(&self, record: &VerificationRecord) {
        let Some(path) = record.document_path.as_deref() else {
            return;
        };
        if let Err(err) = self.storage.delete_object(path).await {
            warn!(verification_id = %record.id, path, error = %err, "failed to delete verification document");
        }
    }
}
