use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    DocumentStatus, DocumentVerification, DocumentVerificationUpsert, NewNotification,
    NewVerification, Vendor, VerificationRecord, VerificationStatus, VerificationUpdate,
};
use crate::models::{FamilyDocument, Job, Notification, Profile, VerificationBatch};

pub mod pg;

pub use pg::PgStore;

pub const BATCH_IN_PROGRESS: &str = "in_progress";
pub const BATCH_COMPLETED: &str = "completed";

pub const REFERRAL_PENDING: &str = "pending";
pub const REFERRAL_CONFIRMED: &str = "confirmed";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence boundary for verification state, profiles, notifications,
/// document checks and the background job queue.
///
/// `update_verification` is a compare-and-set on the record status: it
/// returns `None` when the stored status no longer equals `expected`.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn insert_verification(&self, new: NewVerification) -> StoreResult<VerificationRecord>;

    async fn find_verification(&self, id: Uuid) -> StoreResult<Option<VerificationRecord>>;

    async fn find_verification_by_session(
        &self,
        vendor: Vendor,
        session_id: &str,
    ) -> StoreResult<Option<VerificationRecord>>;

    async fn find_verification_by_registration_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<VerificationRecord>>;

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>>;

    async fn list_verifications(&self) -> StoreResult<Vec<VerificationRecord>>;

    async fn update_verification(
        &self,
        id: Uuid,
        expected: VerificationStatus,
        update: VerificationUpdate,
    ) -> StoreResult<Option<VerificationRecord>>;

    /// Attaches the record to `user_id` unless another user already owns
    /// it. `None` when the record is missing or owned by someone else.
    async fn assign_verification_subject(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>>;

    async fn delete_verification(&self, id: Uuid) -> StoreResult<bool>;

    async fn delete_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<VerificationRecord>>;

    /// Removes unclaimed registration records created before `older_than`.
    async fn delete_stale_registrations(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<VerificationRecord>>;

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>>;

    /// `Some(at)` sets the identity flag, `None` clears it.
    async fn set_identity_verified(
        &self,
        user_id: Uuid,
        verified_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    async fn confirm_pending_referrals(&self, referred_id: Uuid) -> StoreResult<usize>;

    async fn insert_notification(&self, notification: NewNotification)
        -> StoreResult<Notification>;

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;

    async fn list_family_documents(&self) -> StoreResult<Vec<FamilyDocument>>;

    async fn find_family_document(&self, id: Uuid) -> StoreResult<Option<FamilyDocument>>;

    async fn delete_family_document(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_document_verifications(
        &self,
        batch_id: Option<Uuid>,
    ) -> StoreResult<Vec<DocumentVerification>>;

    async fn find_document_verification(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>>;

    async fn find_document_verification_by_document(
        &self,
        document_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>>;

    async fn upsert_document_verification(
        &self,
        upsert: DocumentVerificationUpsert,
    ) -> StoreResult<DocumentVerification>;

    async fn set_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        reason: Option<String>,
        admin_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>>;

    async fn mark_document_notified(&self, id: Uuid) -> StoreResult<()>;

    async fn delete_document_verification(&self, document_id: Uuid) -> StoreResult<bool>;

    async fn insert_batch(&self, admin_id: Uuid, total_documents: i32)
        -> StoreResult<VerificationBatch>;

    async fn find_batch(&self, id: Uuid) -> StoreResult<Option<VerificationBatch>>;

    async fn complete_batch(&self, id: Uuid, processed_documents: i32) -> StoreResult<()>;

    async fn enqueue_job(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<DateTime<Utc>>,
    ) -> StoreResult<Job>;

    async fn reserve_job(&self, job_types: &[&'static str]) -> StoreResult<Option<Job>>;

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()>;

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> StoreResult<()>;

    async fn mark_job_failed(&self, job_id: Uuid, error_message: &str) -> StoreResult<()>;

    async fn list_jobs(&self, job_type: &str) -> StoreResult<Vec<Job>>;
}
