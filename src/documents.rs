use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{DocumentStatus, DocumentVerdict, DocumentVerificationUpsert};
use crate::error::{VerificationError, VerificationResult};
use crate::jobs::{VerifyDocumentsPayload, JOB_VERIFY_DOCUMENTS};
use crate::models::{FamilyDocument, VerificationBatch};
use crate::oracle::{parse_verdict, ClassificationOracle, ParsedVerdict, DOCUMENT_RUBRIC};
use crate::storage::ObjectStorage;
use crate::store::Store;

const SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);
pub const NOT_ANALYZABLE_REASON: &str = "not analyzable, accepted by default";
pub const ORACLE_MISSING_REASON: &str = "classification service not configured";
pub const DOCUMENT_UNREACHABLE_REASON: &str = "document could not be accessed";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub verdict: DocumentVerdict,
    pub status: DocumentStatus,
    pub confidence: Option<i32>,
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationStats {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub suspicious: usize,
    pub error: usize,
    pub skipped: usize,
}

impl VerificationStats {
    fn record(&mut self, verdict: DocumentVerdict) {
        match verdict {
            DocumentVerdict::Valid => self.valid += 1,
            DocumentVerdict::Invalid => self.invalid += 1,
            DocumentVerdict::Suspicious => self.suspicious += 1,
            DocumentVerdict::Error => self.error += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<DocumentResult>,
    pub stats: VerificationStats,
}

/// Media type of a stored document. The recorded file type wins; a bare
/// extension or a missing type falls back to guessing from the file name.
pub fn document_media_type(document: &FamilyDocument) -> Option<String> {
    let recorded = document
        .file_type
        .as_deref()
        .map(str::trim)
        .filter(|ty| !ty.is_empty())
        .map(str::to_ascii_lowercase);

    match recorded {
        Some(ty) if ty.contains('/') => Some(ty),
        Some(ext) => mime_guess::from_ext(ext.trim_start_matches('.'))
            .first_raw()
            .map(str::to_string)
            .or_else(|| guess_from_name(&document.file_name)),
        None => guess_from_name(&document.file_name),
    }
}

fn guess_from_name(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first_raw()
        .map(str::to_string)
}

pub fn is_analyzable(media_type: Option<&str>) -> bool {
    match media_type {
        Some(ty) => ty.starts_with("image/") || ty == "application/pdf",
        None => false,
    }
}

/// Runs family documents through the classification oracle and records
/// the verdicts.
#[derive(Clone)]
pub struct DocumentVerifier {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    oracle: Option<Arc<dyn ClassificationOracle>>,
    batch_size: usize,
    batch_delay: Duration,
}

impl DocumentVerifier {
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        oracle: Option<Arc<dyn ClassificationOracle>>,
        batch_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            oracle,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub async fn verify_one(
        &self,
        document_id: Uuid,
        admin_id: Option<Uuid>,
    ) -> VerificationResult<DocumentResult> {
        let document = self
            .store
            .find_family_document(document_id)
            .await?
            .ok_or(VerificationError::NotFound("document"))?;
        let parsed = self.analyze(&document).await;
        self.record(&document, parsed, admin_id, None).await
    }

    /// Verifies every family document that is not already decided.
    pub async fn verify_all(&self, admin_id: Option<Uuid>) -> VerificationResult<BatchReport> {
        let documents = self.store.list_family_documents().await?;
        let decided: HashMap<Uuid, DocumentStatus> = self
            .store
            .list_document_verifications(None)
            .await?
            .into_iter()
            .map(|row| (row.document_id, row.status))
            .collect();

        let total = documents.len();
        let (pending, skipped): (Vec<_>, Vec<_>) = documents.into_iter().partition(|doc| {
            decided
                .get(&doc.id)
                .map_or(true, |status| *status == DocumentStatus::Pending)
        });

        let mut report = self.process(pending, admin_id, None).await?;
        report.stats.total = total;
        report.stats.skipped = skipped.len();
        Ok(report)
    }

    /// Creates a batch covering every undecided document and queues it for
    /// the worker. `None` when nothing awaits verification.
    pub async fn start_batch(
        &self,
        admin_id: Uuid,
    ) -> VerificationResult<Option<VerificationBatch>> {
        let documents = self.store.list_family_documents().await?;
        let decided: HashMap<Uuid, DocumentStatus> = self
            .store
            .list_document_verifications(None)
            .await?
            .into_iter()
            .map(|row| (row.document_id, row.status))
            .collect();
        let unverified: Vec<FamilyDocument> = documents
            .into_iter()
            .filter(|doc| {
                decided
                    .get(&doc.id)
                    .map_or(true, |status| *status == DocumentStatus::Pending)
            })
            .collect();
        if unverified.is_empty() {
            return Ok(None);
        }

        let total = i32::try_from(unverified.len()).unwrap_or(i32::MAX);
        let batch = self.store.insert_batch(admin_id, total).await?;
        for document in &unverified {
            self.store
                .upsert_document_verification(DocumentVerificationUpsert {
                    document_id: document.id,
                    user_id: document.user_id,
                    file_name: document.file_name.clone(),
                    file_path: document.file_path.clone(),
                    status: Some(DocumentStatus::Pending),
                    verdict: None,
                    reason: None,
                    details: None,
                    confidence: None,
                    verified_by: None,
                    verified_at: None,
                    batch_id: Some(batch.id),
                })
                .await?;
        }

        let payload = serde_json::to_value(VerifyDocumentsPayload {
            batch_id: batch.id,
            admin_id,
        })
        .map_err(|err| VerificationError::Conflict(format!("failed to encode batch job: {err}")))?;
        self.store
            .enqueue_job(JOB_VERIFY_DOCUMENTS, payload, None)
            .await?;

        info!(batch_id = %batch.id, %admin_id, documents = unverified.len(), "document batch queued");
        Ok(Some(batch))
    }

    /// Verifies the still-pending documents of `batch_id` and completes it.
    pub async fn run_batch(
        &self,
        batch_id: Uuid,
        admin_id: Uuid,
    ) -> VerificationResult<BatchReport> {
        self.store
            .find_batch(batch_id)
            .await?
            .ok_or(VerificationError::NotFound("batch"))?;

        let rows = self
            .store
            .list_document_verifications(Some(batch_id))
            .await?;
        let total = rows.len();
        let mut documents = Vec::new();
        let mut skipped = 0;
        for row in rows {
            if row.status != DocumentStatus::Pending {
                skipped += 1;
                continue;
            }
            match self.store.find_family_document(row.document_id).await? {
                Some(document) => documents.push(document),
                None => {
                    warn!(%batch_id, document_id = %row.document_id, "batch document no longer exists");
                    skipped += 1;
                }
            }
        }

        let mut report = self
            .process(documents, Some(admin_id), Some(batch_id))
            .await?;
        report.stats.total = total;
        report.stats.skipped = skipped;

        let processed = i32::try_from(report.results.len()).unwrap_or(i32::MAX);
        self.store.complete_batch(batch_id, processed).await?;
        info!(%batch_id, processed, "document batch completed");
        Ok(report)
    }

    async fn process(
        &self,
        documents: Vec<FamilyDocument>,
        admin_id: Option<Uuid>,
        batch_id: Option<Uuid>,
    ) -> VerificationResult<BatchReport> {
        let mut stats = VerificationStats::default();
        let mut results = Vec::with_capacity(documents.len());

        let (analyzable, accepted): (Vec<_>, Vec<_>) = documents
            .into_iter()
            .partition(|doc| is_analyzable(document_media_type(doc).as_deref()));

        for document in accepted {
            let result = self
                .record(&document, not_analyzable(), admin_id, batch_id)
                .await?;
            stats.record(result.verdict);
            results.push(result);
        }

        let groups: Vec<&[FamilyDocument]> = analyzable.chunks(self.batch_size).collect();
        let group_count = groups.len();
        for (index, group) in groups.into_iter().enumerate() {
            let verdicts = join_all(group.iter().map(|doc| self.analyze(doc))).await;
            for (document, parsed) in group.iter().zip(verdicts) {
                let result = self.record(document, parsed, admin_id, batch_id).await?;
                stats.record(result.verdict);
                results.push(result);
            }
            if index + 1 < group_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(BatchReport { results, stats })
    }

    async fn analyze(&self, document: &FamilyDocument) -> ParsedVerdict {
        let media_type = document_media_type(document);
        if !is_analyzable(media_type.as_deref()) {
            debug!(document_id = %document.id, media_type = ?media_type, "document accepted without analysis");
            return not_analyzable();
        }

        let Some(oracle) = self.oracle.as_ref() else {
            return error_verdict(ORACLE_MISSING_REASON.to_string());
        };

        let url = match self
            .storage
            .presign_get_object(&document.file_path, SIGNED_URL_TTL)
            .await
        {
            Ok(url) => url,
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "failed to sign document URL");
                return error_verdict(DOCUMENT_UNREACHABLE_REASON.to_string());
            }
        };

        match oracle.classify(&url, DOCUMENT_RUBRIC).await {
            Ok(raw) => parse_verdict(&raw),
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "document classification failed");
                error_verdict(err.to_string())
            }
        }
    }

    async fn record(
        &self,
        document: &FamilyDocument,
        parsed: ParsedVerdict,
        admin_id: Option<Uuid>,
        batch_id: Option<Uuid>,
    ) -> VerificationResult<DocumentResult> {
        let row = self
            .store
            .upsert_document_verification(DocumentVerificationUpsert {
                document_id: document.id,
                user_id: document.user_id,
                file_name: document.file_name.clone(),
                file_path: document.file_path.clone(),
                status: parsed.verdict.document_status(),
                verdict: Some(parsed.verdict),
                reason: parsed.reason.clone(),
                details: parsed.details.clone(),
                confidence: parsed.confidence,
                verified_by: admin_id,
                verified_at: Some(Utc::now()),
                batch_id,
            })
            .await?;

        info!(
            document_id = %document.id,
            verdict = parsed.verdict.as_str(),
            status = row.status.as_str(),
            "document verification recorded"
        );

        Ok(DocumentResult {
            document_id: document.id,
            user_id: document.user_id,
            file_name: document.file_name.clone(),
            verdict: parsed.verdict,
            status: row.status,
            confidence: parsed.confidence,
            reason: parsed.reason,
            details: parsed.details,
        })
    }
}

fn not_analyzable() -> ParsedVerdict {
    ParsedVerdict {
        verdict: DocumentVerdict::Valid,
        confidence: None,
        reason: Some(NOT_ANALYZABLE_REASON.to_string()),
        details: None,
    }
}

fn error_verdict(reason: String) -> ParsedVerdict {
    ParsedVerdict {
        verdict: DocumentVerdict::Error,
        confidence: None,
        reason: Some(reason),
        details: None,
    }
}

/// Summary of a document's state for the admin "pending" listing.
pub fn pending_listing_entry(
    document: &FamilyDocument,
    status: Option<DocumentStatus>,
) -> serde_json::Value {
    json!({
        "id": document.id,
        "userId": document.user_id,
        "fileName": document.file_name,
        "fileType": document.file_type,
        "createdAt": document.created_at,
        "verificationStatus": status.map_or("not_verified", DocumentStatus::as_str),
    })
}
