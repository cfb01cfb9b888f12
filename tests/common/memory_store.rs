#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aurora_verification::domain::{
    DocumentStatus, DocumentVerification, DocumentVerificationUpsert, ExtractedIdentity,
    NewNotification, NewVerification, Subject, Vendor, VerificationRecord, VerificationStatus,
    VerificationType, VerificationUpdate,
};
use aurora_verification::jobs::{
    self, STATUS_FAILED, STATUS_PROCESSING, STATUS_QUEUED, STATUS_SUCCEEDED,
};
use aurora_verification::models::{
    FamilyDocument, Job, NewFamilyDocument, NewProfile, Notification, Profile, Referral,
    VerificationBatch,
};
use aurora_verification::store::{
    Store, StoreError, StoreResult, BATCH_COMPLETED, BATCH_IN_PROGRESS, REFERRAL_CONFIRMED,
    REFERRAL_PENDING,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process `Store` used by the router-level flows.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    verifications: Vec<VerificationRecord>,
    /// Registration tokens outlive the claim that assigns their record.
    registration_tokens: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, Profile>,
    notifications: Vec<Notification>,
    referrals: Vec<Referral>,
    family_documents: Vec<FamilyDocument>,
    document_verifications: Vec<DocumentVerification>,
    batches: Vec<VerificationBatch>,
    jobs: Vec<Job>,
}

impl Inner {
    fn prune_registration_tokens(&mut self) {
        let verifications = &self.verifications;
        self.registration_tokens
            .retain(|_, id| verifications.iter().any(|r| r.id == *id));
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: NewProfile) -> Profile {
        let now = Utc::now();
        let profile = Profile {
            id: profile.id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            identity_verified: false,
            identity_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.profiles.insert(profile.id, profile.clone());
        profile
    }

    pub async fn insert_family_document(&self, document: NewFamilyDocument) -> FamilyDocument {
        let document = FamilyDocument {
            id: document.id,
            user_id: document.user_id,
            file_name: document.file_name,
            file_path: document.file_path,
            file_type: document.file_type,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().await;
        inner.family_documents.push(document.clone());
        document
    }

    pub async fn insert_referral(&self, referrer_id: Uuid, referred_id: Uuid) -> Referral {
        let now = Utc::now();
        let referral = Referral {
            id: Uuid::new_v4(),
            referrer_id,
            referred_id,
            status: REFERRAL_PENDING.to_string(),
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.referrals.push(referral.clone());
        referral
    }

    pub async fn referrals(&self) -> Vec<Referral> {
        self.inner.lock().await.referrals.clone()
    }

    pub async fn all_jobs(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.clone()
    }
}

fn job_mut(inner: &mut Inner, job_id: Uuid) -> StoreResult<&mut Job> {
    inner
        .jobs
        .iter_mut()
        .find(|job| job.id == job_id)
        .ok_or_else(|| StoreError::Backend(format!("job {job_id} not found")))
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_verification(&self, new: NewVerification) -> StoreResult<VerificationRecord> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.verifications.iter().any(|record| {
            record.vendor == new.vendor && record.vendor_session_id == new.vendor_session_id
        });
        if duplicate {
            return Err(StoreError::Duplicate(
                "vendor session already recorded".to_string(),
            ));
        }
        if let Some(token) = new.subject.registration_token() {
            if inner.registration_tokens.contains_key(token) {
                return Err(StoreError::Duplicate(
                    "registration token already recorded".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let record = VerificationRecord {
            id: Uuid::new_v4(),
            subject: new.subject,
            vendor: new.vendor,
            vendor_session_id: new.vendor_session_id,
            vendor_account_id: new.vendor_account_id,
            status: new.status,
            verification_type: new.verification_type,
            extracted_identity: ExtractedIdentity::default(),
            raw_vendor_payload: None,
            metadata: new.metadata,
            document_path: new.document_path,
            created_at: now,
            updated_at: now,
            decided_at: None,
        };
        if let Some(token) = record.subject.registration_token() {
            inner
                .registration_tokens
                .insert(token.to_string(), record.id);
        }
        inner.verifications.push(record.clone());
        Ok(record)
    }

    async fn find_verification(&self, id: Uuid) -> StoreResult<Option<VerificationRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.verifications.iter().find(|r| r.id == id).cloned())
    }

    async fn find_verification_by_session(
        &self,
        vendor: Vendor,
        session_id: &str,
    ) -> StoreResult<Option<VerificationRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .verifications
            .iter()
            .find(|r| r.vendor == vendor && r.vendor_session_id == session_id)
            .cloned())
    }

    async fn find_verification_by_registration_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<VerificationRecord>> {
        let inner = self.inner.lock().await;
        let Some(id) = inner.registration_tokens.get(token) else {
            return Ok(None);
        };
        Ok(inner.verifications.iter().find(|r| r.id == *id).cloned())
    }

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>> {
        let inner = self.inner.lock().await;
        // Later pushes win ties on created_at.
        Ok(inner
            .verifications
            .iter()
            .filter(|r| r.subject.user_id() == Some(user_id))
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn list_verifications(&self) -> StoreResult<Vec<VerificationRecord>> {
        let inner = self.inner.lock().await;
        let mut records = inner.verifications.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_verification(
        &self,
        id: Uuid,
        expected: VerificationStatus,
        update: VerificationUpdate,
    ) -> StoreResult<Option<VerificationRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner
            .verifications
            .iter_mut()
            .find(|r| r.id == id && r.status == expected)
        else {
            return Ok(None);
        };

        record.status = update.status;
        record.extracted_identity = update.extracted_identity;
        record.raw_vendor_payload = update.raw_vendor_payload;
        record.metadata = update.metadata;
        record.decided_at = update.decided_at;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn assign_verification_subject(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.verifications.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if matches!(record.subject.user_id(), Some(owner) if owner != user_id) {
            return Ok(None);
        }
        record.subject = Subject::Assigned { user_id };
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete_verification(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.verifications.len();
        inner.verifications.retain(|r| r.id != id);
        inner.prune_registration_tokens();
        Ok(inner.verifications.len() != before)
    }

    async fn delete_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<VerificationRecord>> {
        let mut inner = self.inner.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = inner
            .verifications
            .drain(..)
            .partition(|r| r.subject.user_id() == Some(user_id));
        inner.verifications = kept;
        inner.prune_registration_tokens();
        Ok(removed)
    }

    async fn delete_stale_registrations(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<VerificationRecord>> {
        let mut inner = self.inner.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = inner
            .verifications
            .drain(..)
            .partition(|r| r.subject.user_id().is_none() && r.created_at < older_than);
        inner.verifications = kept;
        inner.prune_registration_tokens();
        Ok(removed)
    }

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        let inner = self.inner.lock().await;
        Ok(inner.profiles.get(&user_id).cloned())
    }

    async fn set_identity_verified(
        &self,
        user_id: Uuid,
        verified_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(profile) = inner.profiles.get_mut(&user_id) else {
            return Ok(false);
        };
        profile.identity_verified = verified_at.is_some();
        profile.identity_verified_at = verified_at;
        profile.updated_at = Utc::now();
        Ok(true)
    }

    async fn confirm_pending_referrals(&self, referred_id: Uuid) -> StoreResult<usize> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut confirmed = 0;
        for referral in inner
            .referrals
            .iter_mut()
            .filter(|r| r.referred_id == referred_id && r.status == REFERRAL_PENDING)
        {
            referral.status = REFERRAL_CONFIRMED.to_string();
            referral.updated_at = now;
            confirmed += 1;
        }
        Ok(confirmed)
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let row = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            notification_type: notification.notification_type.as_str().to_string(),
            title: notification.title,
            message: notification.message,
            related_document_id: notification.related_document_id,
            is_read: false,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().await;
        inner.notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_family_documents(&self) -> StoreResult<Vec<FamilyDocument>> {
        let inner = self.inner.lock().await;
        Ok(inner.family_documents.clone())
    }

    async fn find_family_document(&self, id: Uuid) -> StoreResult<Option<FamilyDocument>> {
        let inner = self.inner.lock().await;
        Ok(inner.family_documents.iter().find(|d| d.id == id).cloned())
    }

    async fn delete_family_document(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.family_documents.len();
        inner.family_documents.retain(|d| d.id != id);
        Ok(inner.family_documents.len() != before)
    }

    async fn list_document_verifications(
        &self,
        batch_id: Option<Uuid>,
    ) -> StoreResult<Vec<DocumentVerification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .document_verifications
            .iter()
            .filter(|d| batch_id.is_none() || d.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn find_document_verification(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .document_verifications
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn find_document_verification_by_document(
        &self,
        document_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .document_verifications
            .iter()
            .find(|d| d.document_id == document_id)
            .cloned())
    }

    async fn upsert_document_verification(
        &self,
        upsert: DocumentVerificationUpsert,
    ) -> StoreResult<DocumentVerification> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        if let Some(existing) = inner
            .document_verifications
            .iter_mut()
            .find(|d| d.document_id == upsert.document_id)
        {
            existing.user_id = upsert.user_id;
            existing.file_name = upsert.file_name;
            existing.file_path = upsert.file_path;
            if let Some(status) = upsert.status {
                existing.status = status;
            }
            existing.verdict = upsert.verdict;
            existing.reason = upsert.reason;
            existing.details = upsert.details;
            existing.confidence = upsert.confidence;
            existing.verified_by = upsert.verified_by;
            existing.verified_at = upsert.verified_at;
            existing.batch_id = upsert.batch_id.or(existing.batch_id);
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let row = DocumentVerification {
            id: Uuid::new_v4(),
            document_id: upsert.document_id,
            user_id: upsert.user_id,
            document_type: VerificationType::FamilyDocument,
            file_name: upsert.file_name,
            file_path: upsert.file_path,
            status: upsert.status.unwrap_or(DocumentStatus::Pending),
            verdict: upsert.verdict,
            reason: upsert.reason,
            details: upsert.details,
            confidence: upsert.confidence,
            verified_by: upsert.verified_by,
            verified_at: upsert.verified_at,
            batch_id: upsert.batch_id,
            notification_sent: false,
            notification_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.document_verifications.push(row.clone());
        Ok(row)
    }

    async fn set_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        reason: Option<String>,
        admin_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.document_verifications.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        let now = Utc::now();
        row.status = status;
        row.reason = reason;
        row.verified_by = Some(admin_id);
        row.verified_at = Some(now);
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn mark_document_notified(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.document_verifications.iter_mut().find(|d| d.id == id) {
            let now = Utc::now();
            row.notification_sent = true;
            row.notification_sent_at = Some(now);
            row.updated_at = now;
        }
        Ok(())
    }

    async fn delete_document_verification(&self, document_id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.document_verifications.len();
        inner
            .document_verifications
            .retain(|d| d.document_id != document_id);
        Ok(inner.document_verifications.len() != before)
    }

    async fn insert_batch(
        &self,
        admin_id: Uuid,
        total_documents: i32,
    ) -> StoreResult<VerificationBatch> {
        let batch = VerificationBatch {
            id: Uuid::new_v4(),
            admin_id,
            status: BATCH_IN_PROGRESS.to_string(),
            total_documents,
            processed_documents: 0,
            started_at: Utc::now(),
            completed_at: None,
        };
        let mut inner = self.inner.lock().await;
        inner.batches.push(batch.clone());
        Ok(batch)
    }

    async fn find_batch(&self, id: Uuid) -> StoreResult<Option<VerificationBatch>> {
        let inner = self.inner.lock().await;
        Ok(inner.batches.iter().find(|b| b.id == id).cloned())
    }

    async fn complete_batch(&self, id: Uuid, processed_documents: i32) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(batch) = inner.batches.iter_mut().find(|b| b.id == id) {
            batch.status = BATCH_COMPLETED.to_string();
            batch.processed_documents = processed_documents;
            batch.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn enqueue_job(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<DateTime<Utc>>,
    ) -> StoreResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            status: STATUS_QUEUED.to_string(),
            attempts: 0,
            run_after: run_after.unwrap_or(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.inner.lock().await;
        inner.jobs.push(job.clone());
        Ok(job)
    }

    async fn reserve_job(&self, job_types: &[&'static str]) -> StoreResult<Option<Job>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let Some(job) = inner
            .jobs
            .iter_mut()
            .filter(|job| {
                job.status == STATUS_QUEUED
                    && job.run_after <= now
                    && job_types.iter().any(|ty| *ty == job.job_type)
            })
            .min_by_key(|job| job.run_after)
        else {
            return Ok(None);
        };
        job.status = STATUS_PROCESSING.to_string();
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;
        job.status = STATUS_SUCCEEDED.to_string();
        job.last_error = None;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;
        job.status = STATUS_QUEUED.to_string();
        job.run_after = jobs::retry_at(delay);
        job.last_error = Some(error_message.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_job_failed(&self, job_id: Uuid, error_message: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let job = job_mut(&mut inner, job_id)?;
        job.status = STATUS_FAILED.to_string();
        job.last_error = Some(error_message.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn list_jobs(&self, job_type: &str) -> StoreResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .iter()
            .filter(|job| job.job_type == job_type)
            .cloned()
            .collect())
    }
}
