use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = identity_verifications)]
pub struct VerificationRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub registration_token: Option<String>,
    pub vendor: String,
    pub vendor_session_id: String,
    pub vendor_account_id: Option<String>,
    pub status: String,
    pub verification_type: String,
    pub extracted_identity: serde_json::Value,
    pub raw_vendor_payload: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub document_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = identity_verifications)]
pub struct NewVerificationRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub registration_token: Option<String>,
    pub vendor: String,
    pub vendor_session_id: String,
    pub vendor_account_id: Option<String>,
    pub status: String,
    pub verification_type: String,
    pub extracted_identity: serde_json::Value,
    pub metadata: serde_json::Value,
    pub document_path: Option<String>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = identity_verifications)]
#[diesel(treat_none_as_null = true)]
pub struct VerificationChangeset {
    pub status: String,
    pub extracted_identity: serde_json::Value,
    pub raw_vendor_payload: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub identity_verified: bool,
    pub identity_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn display_name(&self) -> Option<String> {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let trimmed = name.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = user_notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub related_document_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_notifications)]
pub struct NewNotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub related_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = referrals)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = referrals)]
pub struct NewReferral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = family_documents)]
pub struct FamilyDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = family_documents)]
pub struct NewFamilyDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_verifications)]
pub struct DocumentVerificationRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub status: String,
    pub verdict: Option<String>,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub confidence: Option<i32>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_verifications)]
pub struct NewDocumentVerificationRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub status: String,
    pub verdict: Option<String>,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub confidence: Option<i32>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = document_verifications)]
#[diesel(treat_none_as_null = true)]
pub struct DocumentVerificationChangeset {
    pub user_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub status: String,
    pub verdict: Option<String>,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub confidence: Option<i32>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = verification_batches)]
pub struct VerificationBatch {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub status: String,
    pub total_documents: i32,
    pub processed_documents: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = verification_batches)]
pub struct NewVerificationBatch {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub status: String,
    pub total_documents: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: DateTime<Utc>,
}
