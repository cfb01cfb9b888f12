use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Jumio,
    Veriff,
}

impl Vendor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Vendor::Jumio => "jumio",
            Vendor::Veriff => "veriff",
        }
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jumio" => Ok(Vendor::Jumio),
            "veriff" => Ok(Vendor::Veriff),
            other => Err(format!("unknown verification vendor '{other}'")),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an identity verification attempt.
///
/// `none → initiated → pending → {verified | rejected | review_needed}`.
/// `verified` is sticky; `rejected` and `review_needed` may return to
/// `pending` when the user resubmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    None,
    Pending,
    Initiated,
    Verified,
    Rejected,
    ReviewNeeded,
}

impl VerificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::None => "none",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Initiated => "initiated",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::ReviewNeeded => "review_needed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified
                | VerificationStatus::Rejected
                | VerificationStatus::ReviewNeeded
        )
    }

    /// Still waiting on the vendor: worth polling for a decision.
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            VerificationStatus::Initiated | VerificationStatus::Pending
        )
    }

    pub fn can_transition_to(self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;

        match (self, next) {
            (current, next) if current == next => false,
            (Verified, _) => false,
            (_, None) => false,
            (None, Initiated) => true,
            (_, Initiated) => false,
            (None | Initiated, Pending) => true,
            (Rejected | ReviewNeeded, Pending) => true,
            (Pending, Pending) => false,
            (_, next) => next.is_terminal(),
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(VerificationStatus::None),
            "pending" => Ok(VerificationStatus::Pending),
            "initiated" => Ok(VerificationStatus::Initiated),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            "review_needed" => Ok(VerificationStatus::ReviewNeeded),
            other => Err(format!("unknown verification status '{other}'")),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    IdDocument,
    Registration,
    FamilyDocument,
}

impl VerificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            VerificationType::IdDocument => "id_document",
            VerificationType::Registration => "registration",
            VerificationType::FamilyDocument => "family_document",
        }
    }
}

impl FromStr for VerificationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "id_document" => Ok(VerificationType::IdDocument),
            "registration" => Ok(VerificationType::Registration),
            "family_document" => Ok(VerificationType::FamilyDocument),
            other => Err(format!("unknown verification type '{other}'")),
        }
    }
}

/// Who a verification belongs to. Registration flows start before an
/// account exists and are keyed by the registration token until claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Assigned { user_id: Uuid },
    Pending { registration_token: String },
}

impl Subject {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Subject::Assigned { user_id } => Some(*user_id),
            Subject::Pending { .. } => None,
        }
    }

    pub fn registration_token(&self) -> Option<&str> {
        match self {
            Subject::Assigned { .. } => None,
            Subject::Pending { registration_token } => Some(registration_token),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

impl ExtractedIdentity {
    /// Fields present in `newer` win; fields it omits keep their current value.
    pub fn merge(&self, newer: &ExtractedIdentity) -> ExtractedIdentity {
        fn pick(newer: &Option<String>, current: &Option<String>) -> Option<String> {
            newer.clone().or_else(|| current.clone())
        }

        ExtractedIdentity {
            first_name: pick(&newer.first_name, &self.first_name),
            last_name: pick(&newer.last_name, &self.last_name),
            date_of_birth: pick(&newer.date_of_birth, &self.date_of_birth),
            document_type: pick(&newer.document_type, &self.document_type),
            document_number: pick(&newer.document_number, &self.document_number),
            document_country: pick(&newer.document_country, &self.document_country),
            nationality: pick(&newer.nationality, &self.nationality),
        }
    }

    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: Uuid,
    pub subject: Subject,
    pub vendor: Vendor,
    pub vendor_session_id: String,
    pub vendor_account_id: Option<String>,
    pub status: VerificationStatus,
    pub verification_type: VerificationType,
    pub extracted_identity: ExtractedIdentity,
    #[serde(skip)]
    pub raw_vendor_payload: Option<Value>,
    #[serde(skip)]
    pub metadata: Value,
    pub document_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl VerificationRecord {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct NewVerification {
    pub subject: Subject,
    pub vendor: Vendor,
    pub vendor_session_id: String,
    pub vendor_account_id: Option<String>,
    pub status: VerificationStatus,
    pub verification_type: VerificationType,
    pub metadata: Value,
    pub document_path: Option<String>,
}

/// Replacement values for the mutable part of a verification record.
#[derive(Debug, Clone)]
pub struct VerificationUpdate {
    pub status: VerificationStatus,
    pub extracted_identity: ExtractedIdentity,
    pub raw_vendor_payload: Option<Value>,
    pub metadata: Value,
    pub decided_at: Option<DateTime<Utc>>,
}

impl VerificationUpdate {
    pub fn from_record(record: &VerificationRecord) -> Self {
        Self {
            status: record.status,
            extracted_identity: record.extracted_identity.clone(),
            raw_vendor_payload: record.raw_vendor_payload.clone(),
            metadata: record.metadata.clone(),
            decided_at: record.decided_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    VerificationApproved,
    VerificationRejected,
    VerificationResubmission,
    DocumentVerified,
    DocumentRejected,
    DocumentReview,
}

impl NotificationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NotificationType::VerificationApproved => "verification_approved",
            NotificationType::VerificationRejected => "verification_rejected",
            NotificationType::VerificationResubmission => "verification_resubmission",
            NotificationType::DocumentVerified => "document_verified",
            NotificationType::DocumentRejected => "document_rejected",
            NotificationType::DocumentReview => "document_review",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub related_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Rejected,
    ReviewNeeded,
}

impl DocumentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Verified => "verified",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::ReviewNeeded => "review_needed",
        }
    }

    pub const fn notification_type(self) -> NotificationType {
        match self {
            DocumentStatus::Verified => NotificationType::DocumentVerified,
            DocumentStatus::Rejected => NotificationType::DocumentRejected,
            DocumentStatus::Pending | DocumentStatus::ReviewNeeded => {
                NotificationType::DocumentReview
            }
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DocumentStatus::Pending),
            "verified" => Ok(DocumentStatus::Verified),
            "rejected" => Ok(DocumentStatus::Rejected),
            "review_needed" => Ok(DocumentStatus::ReviewNeeded),
            other => Err(format!("unknown document status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentVerdict {
    Valid,
    Invalid,
    Suspicious,
    Error,
}

impl DocumentVerdict {
    pub const fn as_str(self) -> &'static str {
        match self {
            DocumentVerdict::Valid => "valid",
            DocumentVerdict::Invalid => "invalid",
            DocumentVerdict::Suspicious => "suspicious",
            DocumentVerdict::Error => "error",
        }
    }

    /// `None` for `error`: a failed analysis never decides the document.
    pub const fn document_status(self) -> Option<DocumentStatus> {
        match self {
            DocumentVerdict::Valid => Some(DocumentStatus::Verified),
            DocumentVerdict::Invalid => Some(DocumentStatus::Rejected),
            DocumentVerdict::Suspicious => Some(DocumentStatus::ReviewNeeded),
            DocumentVerdict::Error => None,
        }
    }
}

impl FromStr for DocumentVerdict {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(DocumentVerdict::Valid),
            "invalid" => Ok(DocumentVerdict::Invalid),
            "suspicious" => Ok(DocumentVerdict::Suspicious),
            "error" => Ok(DocumentVerdict::Error),
            other => Err(format!("unknown document verdict '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVerification {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub document_type: VerificationType,
    pub file_name: String,
    pub file_path: String,
    pub status: DocumentStatus,
    pub verdict: Option<DocumentVerdict>,
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

/// Upsert keyed by `document_id`. A `status` of `None` keeps the stored
/// status of an existing row and inserts new rows as `pending`.
#[derive(Debug, Clone)]
pub struct DocumentVerificationUpsert {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub status: Option<DocumentStatus>,
    pub verdict: Option<DocumentVerdict>,
    pub reason: Option<String>,
    pub details: Option<String>,
    pub confidence: Option<i32>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
}
