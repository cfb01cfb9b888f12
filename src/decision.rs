use serde_json::Value;
use thiserror::Error;

use crate::domain::{ExtractedIdentity, Vendor, VerificationStatus};

/// Raw vendor outcome: a status word and, for Veriff, a numeric decision code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorVerdict {
    pub status: Option<String>,
    pub code: Option<i64>,
}

/// Maps a vendor verdict onto the local status. Unknown verdicts keep
/// `current` so an unrecognised callback never regresses a record.
pub fn map_vendor_decision(
    vendor: Vendor,
    verdict: &VendorVerdict,
    current: VerificationStatus,
) -> VerificationStatus {
    let by_status = verdict.status.as_deref().and_then(|status| match vendor {
        Vendor::Veriff => veriff_status(status),
        Vendor::Jumio => jumio_decision(status),
    });
    let by_code = || match vendor {
        Vendor::Veriff => verdict.code.and_then(veriff_code),
        Vendor::Jumio => None,
    };

    by_status.or_else(by_code).unwrap_or(current)
}

fn veriff_status(status: &str) -> Option<VerificationStatus> {
    match status.trim().to_ascii_lowercase().as_str() {
        "approved" => Some(VerificationStatus::Verified),
        "declined" | "expired" | "abandoned" => Some(VerificationStatus::Rejected),
        "resubmission_requested" | "review" => Some(VerificationStatus::ReviewNeeded),
        _ => None,
    }
}

fn veriff_code(code: i64) -> Option<VerificationStatus> {
    match code {
        9001 => Some(VerificationStatus::Verified),
        9102 | 9104 | 9121 => Some(VerificationStatus::Rejected),
        9103 => Some(VerificationStatus::ReviewNeeded),
        _ => None,
    }
}

fn jumio_decision(decision: &str) -> Option<VerificationStatus> {
    match decision.trim().to_ascii_uppercase().as_str() {
        "PASSED" => Some(VerificationStatus::Verified),
        "REJECTED" | "NOT_EXECUTED" | "EXPIRED" => Some(VerificationStatus::Rejected),
        "WARNING" => Some(VerificationStatus::ReviewNeeded),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Decision(DecisionEvent),
    Lifecycle(LifecycleEvent),
    Unknown,
}

impl WebhookEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::Decision(decision) => Some(&decision.session_id),
            WebhookEvent::Lifecycle(event) => Some(&event.session_id),
            WebhookEvent::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEvent {
    pub session_id: String,
    pub account_id: Option<String>,
    pub verdict: VendorVerdict,
    pub reason: Option<String>,
    pub reason_code: Option<String>,
    pub decision_time: Option<String>,
    pub identity: ExtractedIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    Submitted,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub session_id: String,
    pub action: LifecycleAction,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("missing vendor session id")]
    MissingSessionId,
}

/// Distinguishes decision callbacks from lifecycle events by payload shape.
pub fn classify(vendor: Vendor, payload: &Value) -> Result<WebhookEvent, ClassifyError> {
    match vendor {
        Vendor::Veriff => classify_veriff(payload),
        Vendor::Jumio => classify_jumio(payload),
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn code_at(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn present(value: &Value, key: &str) -> bool {
    value.get(key).map_or(false, |v| !v.is_null())
}

fn classify_veriff(payload: &Value) -> Result<WebhookEvent, ClassifyError> {
    if let Some(verification) = payload.get("verification").filter(|v| !v.is_null()) {
        let session_id = string_at(verification, "id").ok_or(ClassifyError::MissingSessionId)?;
        let person = verification.get("person").unwrap_or(&Value::Null);
        let document = verification.get("document").unwrap_or(&Value::Null);

        let identity = ExtractedIdentity {
            first_name: string_at(person, "firstName"),
            last_name: string_at(person, "lastName"),
            date_of_birth: string_at(person, "dateOfBirth"),
            document_type: string_at(document, "type"),
            document_number: string_at(document, "number")
                .or_else(|| string_at(person, "idNumber")),
            document_country: string_at(document, "country"),
            nationality: string_at(person, "nationality")
                .or_else(|| string_at(person, "citizenship")),
        };

        return Ok(WebhookEvent::Decision(DecisionEvent {
            session_id,
            account_id: None,
            verdict: VendorVerdict {
                status: string_at(verification, "status"),
                code: code_at(verification, "code"),
            },
            reason: string_at(verification, "reason"),
            reason_code: string_at(verification, "reasonCode"),
            decision_time: string_at(verification, "decisionTime"),
            identity,
        }));
    }

    if present(payload, "action") {
        let session_id = string_at(payload, "id").ok_or(ClassifyError::MissingSessionId)?;
        let action = string_at(payload, "action").unwrap_or_default();
        return Ok(WebhookEvent::Lifecycle(LifecycleEvent {
            session_id,
            action: lifecycle_action(&action),
        }));
    }

    Ok(WebhookEvent::Unknown)
}

fn lifecycle_action(action: &str) -> LifecycleAction {
    if action.eq_ignore_ascii_case("submitted") {
        LifecycleAction::Submitted
    } else {
        LifecycleAction::Other(action.to_ascii_lowercase())
    }
}

fn classify_jumio(payload: &Value) -> Result<WebhookEvent, ClassifyError> {
    let execution = payload.get("workflowExecution").filter(|v| !v.is_null());
    let decision = payload
        .get("decision")
        .and_then(|d| string_at(d, "type"));

    if execution.is_none() && decision.is_none() {
        return Ok(WebhookEvent::Unknown);
    }

    let execution = execution.unwrap_or(&Value::Null);
    let session_id = string_at(execution, "id").ok_or(ClassifyError::MissingSessionId)?;
    let account_id = payload.get("account").and_then(|a| string_at(a, "id"));
    let execution_status = string_at(execution, "status").map(|s| s.to_ascii_uppercase());

    let status = match (decision, execution_status.as_deref()) {
        (Some(decision), _) => decision,
        (None, Some("SESSION_EXPIRED" | "TOKEN_EXPIRED")) => "EXPIRED".to_string(),
        (None, Some("ACQUIRED")) => {
            return Ok(WebhookEvent::Lifecycle(LifecycleEvent {
                session_id,
                action: LifecycleAction::Submitted,
            }))
        }
        (None, other) => {
            return Ok(WebhookEvent::Lifecycle(LifecycleEvent {
                session_id,
                action: LifecycleAction::Other(other.unwrap_or_default().to_ascii_lowercase()),
            }))
        }
    };

    let extraction = payload
        .get("capabilities")
        .and_then(|c| c.get("extraction"))
        .map(|e| match e {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        })
        .and_then(|e| e.get("data"))
        .unwrap_or(&Value::Null);

    let identity = ExtractedIdentity {
        first_name: string_at(extraction, "firstName"),
        last_name: string_at(extraction, "lastName"),
        date_of_birth: string_at(extraction, "dateOfBirth"),
        document_type: string_at(extraction, "idType").or_else(|| string_at(extraction, "type")),
        document_number: string_at(extraction, "documentNumber"),
        document_country: string_at(extraction, "idCountry")
            .or_else(|| string_at(extraction, "issuingCountry")),
        nationality: string_at(extraction, "nationality"),
    };

    Ok(WebhookEvent::Decision(DecisionEvent {
        session_id,
        account_id,
        verdict: VendorVerdict {
            status: Some(status),
            code: None,
        },
        reason: payload
            .get("decision")
            .and_then(|d| d.get("details"))
            .and_then(|d| string_at(d, "label")),
        reason_code: None,
        decision_time: string_at(execution, "updatedAt"),
        identity,
    }))
}
