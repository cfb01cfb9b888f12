use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::Value;
use uuid::Uuid;

use super::{
    Store, StoreError, StoreResult, BATCH_COMPLETED, BATCH_IN_PROGRESS, REFERRAL_CONFIRMED,
    REFERRAL_PENDING,
};
use crate::db::PgPool;
use crate::domain::{
    DocumentStatus, DocumentVerdict, DocumentVerification, DocumentVerificationUpsert,
    ExtractedIdentity, NewNotification, NewVerification, Subject, Vendor, VerificationRecord,
    VerificationStatus, VerificationType, VerificationUpdate,
};
use crate::jobs;
use crate::models::{
    DocumentVerificationChangeset, DocumentVerificationRow, FamilyDocument, Job,
    NewDocumentVerificationRow, NewNotificationRow, NewVerificationBatch, NewVerificationRow,
    Notification, Profile, VerificationBatch, VerificationChangeset, VerificationRow,
};
use crate::schema::{
    document_verifications, family_documents, identity_verifications, profiles, referrals,
    user_notifications, verification_batches,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Pool(err.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Backend(format!("store task failed: {err}")))?
    }
}

fn corrupt(id: Uuid, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        id,
        reason: reason.into(),
    }
}

fn verification_from_row(row: VerificationRow) -> StoreResult<VerificationRecord> {
    let subject = match (row.user_id, row.registration_token) {
        (Some(user_id), _) => Subject::Assigned { user_id },
        (None, Some(registration_token)) => Subject::Pending { registration_token },
        (None, None) => return Err(corrupt(row.id, "record has no subject")),
    };
    let vendor = row.vendor.parse::<Vendor>().map_err(|err| corrupt(row.id, err))?;
    let status = row
        .status
        .parse::<VerificationStatus>()
        .map_err(|err| corrupt(row.id, err))?;
    let verification_type = row
        .verification_type
        .parse::<VerificationType>()
        .map_err(|err| corrupt(row.id, err))?;
    let extracted_identity: ExtractedIdentity = serde_json::from_value(row.extracted_identity)
        .map_err(|err| corrupt(row.id, err.to_string()))?;

    Ok(VerificationRecord {
        id: row.id,
        subject,
        vendor,
        vendor_session_id: row.vendor_session_id,
        vendor_account_id: row.vendor_account_id,
        status,
        verification_type,
        extracted_identity,
        raw_vendor_payload: row.raw_vendor_payload,
        metadata: row.metadata,
        document_path: row.document_path,
        created_at: row.created_at,
        updated_at: row.updated_at,
        decided_at: row.decided_at,
    })
}

fn verifications_from_rows(rows: Vec<VerificationRow>) -> StoreResult<Vec<VerificationRecord>> {
    rows.into_iter().map(verification_from_row).collect()
}

fn document_from_row(row: DocumentVerificationRow) -> StoreResult<DocumentVerification> {
    let document_type = row
        .document_type
        .parse::<VerificationType>()
        .map_err(|err| corrupt(row.id, err))?;
    let status = row
        .status
        .parse::<DocumentStatus>()
        .map_err(|err| corrupt(row.id, err))?;
    let verdict = row
        .verdict
        .as_deref()
        .map(str::parse::<DocumentVerdict>)
        .transpose()
        .map_err(|err: String| corrupt(row.id, err))?;

    Ok(DocumentVerification {
        id: row.id,
        document_id: row.document_id,
        user_id: row.user_id,
        document_type,
        file_name: row.file_name,
        file_path: row.file_path,
        status,
        verdict,
        reason: row.reason,
        details: row.details,
        confidence: row.confidence,
        verified_by: row.verified_by,
        verified_at: row.verified_at,
        batch_id: row.batch_id,
        notification_sent: row.notification_sent,
        notification_sent_at: row.notification_sent_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn map_unique_violation(err: DieselError, what: &str) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            StoreError::Duplicate(what.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_verification(&self, new: NewVerification) -> StoreResult<VerificationRecord> {
        self.run(move |conn| {
            let (user_id, registration_token) = match new.subject {
                Subject::Assigned { user_id } => (Some(user_id), None),
                Subject::Pending { registration_token } => (None, Some(registration_token)),
            };
            let row = NewVerificationRow {
                id: Uuid::new_v4(),
                user_id,
                registration_token,
                vendor: new.vendor.as_str().to_string(),
                vendor_session_id: new.vendor_session_id,
                vendor_account_id: new.vendor_account_id,
                status: new.status.as_str().to_string(),
                verification_type: new.verification_type.as_str().to_string(),
                extracted_identity: serde_json::json!({}),
                metadata: new.metadata,
                document_path: new.document_path,
            };

            let inserted: VerificationRow = diesel::insert_into(identity_verifications::table)
                .values(&row)
                .get_result(conn)
                .map_err(|err| map_unique_violation(err, "vendor session already recorded"))?;
            verification_from_row(inserted)
        })
        .await
    }

    async fn find_verification(&self, id: Uuid) -> StoreResult<Option<VerificationRecord>> {
        self.run(move |conn| {
            identity_verifications::table
                .find(id)
                .first::<VerificationRow>(conn)
                .optional()?
                .map(verification_from_row)
                .transpose()
        })
        .await
    }

    async fn find_verification_by_session(
        &self,
        vendor: Vendor,
        session_id: &str,
    ) -> StoreResult<Option<VerificationRecord>> {
        let session_id = session_id.to_string();
        self.run(move |conn| {
            identity_verifications::table
                .filter(identity_verifications::vendor.eq(vendor.as_str()))
                .filter(identity_verifications::vendor_session_id.eq(&session_id))
                .first::<VerificationRow>(conn)
                .optional()?
                .map(verification_from_row)
                .transpose()
        })
        .await
    }

    async fn find_verification_by_registration_token(
        &self,
        token: &str,
    ) -> StoreResult<Option<VerificationRecord>> {
        let token = token.to_string();
        self.run(move |conn| {
            identity_verifications::table
                .filter(identity_verifications::registration_token.eq(&token))
                .first::<VerificationRow>(conn)
                .optional()?
                .map(verification_from_row)
                .transpose()
        })
        .await
    }

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>> {
        self.run(move |conn| {
            identity_verifications::table
                .filter(identity_verifications::user_id.eq(user_id))
                .order(identity_verifications::created_at.desc())
                .first::<VerificationRow>(conn)
                .optional()?
                .map(verification_from_row)
                .transpose()
        })
        .await
    }

    async fn list_verifications(&self) -> StoreResult<Vec<VerificationRecord>> {
        self.run(move |conn| {
            let rows = identity_verifications::table
                .order(identity_verifications::created_at.desc())
                .load::<VerificationRow>(conn)?;
            verifications_from_rows(rows)
        })
        .await
    }

    async fn update_verification(
        &self,
        id: Uuid,
        expected: VerificationStatus,
        update: VerificationUpdate,
    ) -> StoreResult<Option<VerificationRecord>> {
        self.run(move |conn| {
            let changeset = VerificationChangeset {
                status: update.status.as_str().to_string(),
                extracted_identity: serde_json::to_value(&update.extracted_identity)
                    .map_err(|err| corrupt(id, err.to_string()))?,
                raw_vendor_payload: update.raw_vendor_payload,
                metadata: update.metadata,
                updated_at: Utc::now(),
                decided_at: update.decided_at,
            };

            diesel::update(
                identity_verifications::table
                    .filter(identity_verifications::id.eq(id))
                    .filter(identity_verifications::status.eq(expected.as_str())),
            )
            .set(&changeset)
            .get_result::<VerificationRow>(conn)
            .optional()?
            .map(verification_from_row)
            .transpose()
        })
        .await
    }

    async fn assign_verification_subject(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<VerificationRecord>> {
        self.run(move |conn| {
            diesel::update(
                identity_verifications::table.find(id).filter(
                    identity_verifications::user_id
                        .is_null()
                        .or(identity_verifications::user_id.eq(user_id)),
                ),
            )
            .set((
                identity_verifications::user_id.eq(Some(user_id)),
                identity_verifications::updated_at.eq(Utc::now()),
            ))
            .get_result::<VerificationRow>(conn)
            .optional()?
            .map(verification_from_row)
            .transpose()
        })
        .await
    }

    async fn delete_verification(&self, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted =
                diesel::delete(identity_verifications::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn delete_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<VerificationRecord>> {
        self.run(move |conn| {
            let rows = diesel::delete(
                identity_verifications::table.filter(identity_verifications::user_id.eq(user_id)),
            )
            .get_results::<VerificationRow>(conn)?;
            verifications_from_rows(rows)
        })
        .await
    }

    async fn delete_stale_registrations(
        &self,
        older_than: DateTime<Utc>,
    ) -> StoreResult<Vec<VerificationRecord>> {
        self.run(move |conn| {
            let rows = diesel::delete(
                identity_verifications::table
                    .filter(identity_verifications::user_id.is_null())
                    .filter(identity_verifications::created_at.lt(older_than)),
            )
            .get_results::<VerificationRow>(conn)?;
            verifications_from_rows(rows)
        })
        .await
    }

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        self.run(move |conn| Ok(profiles::table.find(user_id).first(conn).optional()?))
            .await
    }

    async fn set_identity_verified(
        &self,
        user_id: Uuid,
        verified_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        self.run(move |conn| {
            let updated = diesel::update(profiles::table.find(user_id))
                .set((
                    profiles::identity_verified.eq(verified_at.is_some()),
                    profiles::identity_verified_at.eq(verified_at),
                    profiles::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn confirm_pending_referrals(&self, referred_id: Uuid) -> StoreResult<usize> {
        self.run(move |conn| {
            let updated = diesel::update(
                referrals::table
                    .filter(referrals::referred_id.eq(referred_id))
                    .filter(referrals::status.eq(REFERRAL_PENDING)),
            )
            .set((
                referrals::status.eq(REFERRAL_CONFIRMED),
                referrals::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            Ok(updated)
        })
        .await
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        self.run(move |conn| {
            let row = NewNotificationRow {
                id: Uuid::new_v4(),
                user_id: notification.user_id,
                notification_type: notification.notification_type.as_str().to_string(),
                title: notification.title,
                message: notification.message,
                related_document_id: notification.related_document_id,
            };
            Ok(diesel::insert_into(user_notifications::table)
                .values(&row)
                .get_result(conn)?)
        })
        .await
    }

    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
        self.run(move |conn| {
            Ok(user_notifications::table
                .filter(user_notifications::user_id.eq(user_id))
                .order(user_notifications::created_at.asc())
                .load(conn)?)
        })
        .await
    }

    async fn list_family_documents(&self) -> StoreResult<Vec<FamilyDocument>> {
        self.run(move |conn| {
            Ok(family_documents::table
                .order(family_documents::created_at.desc())
                .load(conn)?)
        })
        .await
    }

    async fn find_family_document(&self, id: Uuid) -> StoreResult<Option<FamilyDocument>> {
        self.run(move |conn| Ok(family_documents::table.find(id).first(conn).optional()?))
            .await
    }

    async fn delete_family_document(&self, id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(family_documents::table.find(id)).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_document_verifications(
        &self,
        batch_id: Option<Uuid>,
    ) -> StoreResult<Vec<DocumentVerification>> {
        self.run(move |conn| {
            let mut query = document_verifications::table
                .order(document_verifications::created_at.asc())
                .into_boxed();
            if let Some(batch_id) = batch_id {
                query = query.filter(document_verifications::batch_id.eq(batch_id));
            }
            let rows = query.load::<DocumentVerificationRow>(conn)?;
            rows.into_iter().map(document_from_row).collect()
        })
        .await
    }

    async fn find_document_verification(
        &self,
        id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        self.run(move |conn| {
            document_verifications::table
                .find(id)
                .first::<DocumentVerificationRow>(conn)
                .optional()?
                .map(document_from_row)
                .transpose()
        })
        .await
    }

    async fn find_document_verification_by_document(
        &self,
        document_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        self.run(move |conn| {
            document_verifications::table
                .filter(document_verifications::document_id.eq(document_id))
                .first::<DocumentVerificationRow>(conn)
                .optional()?
                .map(document_from_row)
                .transpose()
        })
        .await
    }

    async fn upsert_document_verification(
        &self,
        upsert: DocumentVerificationUpsert,
    ) -> StoreResult<DocumentVerification> {
        self.run(move |conn| {
            let row = conn.transaction::<DocumentVerificationRow, StoreError, _>(|conn| {
                let existing = document_verifications::table
                    .filter(document_verifications::document_id.eq(upsert.document_id))
                    .for_update()
                    .first::<DocumentVerificationRow>(conn)
                    .optional()?;

                match existing {
                    Some(existing) => {
                        let status = upsert
                            .status
                            .map(|status| status.as_str().to_string())
                            .unwrap_or(existing.status);
                        let changeset = DocumentVerificationChangeset {
                            user_id: upsert.user_id,
                            document_type: VerificationType::FamilyDocument.as_str().to_string(),
                            file_name: upsert.file_name,
                            file_path: upsert.file_path,
                            status,
                            verdict: upsert.verdict.map(|v| v.as_str().to_string()),
                            reason: upsert.reason,
                            details: upsert.details,
                            confidence: upsert.confidence,
                            verified_by: upsert.verified_by,
                            verified_at: upsert.verified_at,
                            batch_id: upsert.batch_id.or(existing.batch_id),
                            updated_at: Utc::now(),
                        };
                        Ok(diesel::update(document_verifications::table.find(existing.id))
                            .set(&changeset)
                            .get_result(conn)?)
                    }
                    None => {
                        let row = NewDocumentVerificationRow {
                            id: Uuid::new_v4(),
                            document_id: upsert.document_id,
                            user_id: upsert.user_id,
                            document_type: VerificationType::FamilyDocument.as_str().to_string(),
                            file_name: upsert.file_name,
                            file_path: upsert.file_path,
                            status: upsert
                                .status
                                .unwrap_or(DocumentStatus::Pending)
                                .as_str()
                                .to_string(),
                            verdict: upsert.verdict.map(|v| v.as_str().to_string()),
                            reason: upsert.reason,
                            details: upsert.details,
                            confidence: upsert.confidence,
                            verified_by: upsert.verified_by,
                            verified_at: upsert.verified_at,
                            batch_id: upsert.batch_id,
                        };
                        Ok(diesel::insert_into(document_verifications::table)
                            .values(&row)
                            .get_result(conn)?)
                    }
                }
            })?;
            document_from_row(row)
        })
        .await
    }

    async fn set_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        reason: Option<String>,
        admin_id: Uuid,
    ) -> StoreResult<Option<DocumentVerification>> {
        self.run(move |conn| {
            let now = Utc::now();
            diesel::update(document_verifications::table.find(id))
                .set((
                    document_verifications::status.eq(status.as_str()),
                    document_verifications::reason.eq(reason),
                    document_verifications::verified_by.eq(Some(admin_id)),
                    document_verifications::verified_at.eq(Some(now)),
                    document_verifications::updated_at.eq(now),
                ))
                .get_result::<DocumentVerificationRow>(conn)
                .optional()?
                .map(document_from_row)
                .transpose()
        })
        .await
    }

    async fn mark_document_notified(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let now = Utc::now();
            diesel::update(document_verifications::table.find(id))
                .set((
                    document_verifications::notification_sent.eq(true),
                    document_verifications::notification_sent_at.eq(Some(now)),
                    document_verifications::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn delete_document_verification(&self, document_id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let deleted = diesel::delete(
                document_verifications::table
                    .filter(document_verifications::document_id.eq(document_id)),
            )
            .execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_batch(
        &self,
        admin_id: Uuid,
        total_documents: i32,
    ) -> StoreResult<VerificationBatch> {
        self.run(move |conn| {
            let batch = NewVerificationBatch {
                id: Uuid::new_v4(),
                admin_id,
                status: BATCH_IN_PROGRESS.to_string(),
                total_documents,
            };
            Ok(diesel::insert_into(verification_batches::table)
                .values(&batch)
                .get_result(conn)?)
        })
        .await
    }

    async fn find_batch(&self, id: Uuid) -> StoreResult<Option<VerificationBatch>> {
        self.run(move |conn| {
            Ok(verification_batches::table
                .find(id)
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn complete_batch(&self, id: Uuid, processed_documents: i32) -> StoreResult<()> {
        self.run(move |conn| {
            diesel::update(verification_batches::table.find(id))
                .set((
                    verification_batches::status.eq(BATCH_COMPLETED),
                    verification_batches::processed_documents.eq(processed_documents),
                    verification_batches::completed_at.eq(Some(Utc::now())),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn enqueue_job(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<DateTime<Utc>>,
    ) -> StoreResult<Job> {
        let job_type = job_type.to_string();
        self.run(move |conn| Ok(jobs::enqueue_job(conn, &job_type, payload, run_after)?))
            .await
    }

    async fn reserve_job(&self, job_types: &[&'static str]) -> StoreResult<Option<Job>> {
        let job_types = job_types.to_vec();
        self.run(move |conn| Ok(jobs::reserve_job(conn, &job_types)?))
            .await
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()> {
        self.run(move |conn| Ok(jobs::mark_job_succeeded(conn, job_id)?))
            .await
    }

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> StoreResult<()> {
        let error_message = error_message.to_string();
        self.run(move |conn| Ok(jobs::retry_job_after(conn, job_id, delay, &error_message)?))
            .await
    }

    async fn mark_job_failed(&self, job_id: Uuid, error_message: &str) -> StoreResult<()> {
        let error_message = error_message.to_string();
        self.run(move |conn| Ok(jobs::mark_job_failed(conn, job_id, &error_message)?))
            .await
    }

    async fn list_jobs(&self, job_type: &str) -> StoreResult<Vec<Job>> {
        let job_type = job_type.to_string();
        self.run(move |conn| Ok(jobs::list_jobs(conn, &job_type)?))
            .await
    }
}
