use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decision::{
    map_vendor_decision, DecisionEvent, LifecycleAction, LifecycleEvent, WebhookEvent,
};
use crate::dispatcher::Dispatcher;
use crate::domain::{Vendor, VerificationRecord, VerificationStatus, VerificationUpdate};
use crate::error::{VerificationError, VerificationResult};
use crate::store::Store;
use crate::utils::json::merge_object;

const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        verification_id: Uuid,
        previous: VerificationStatus,
        status: VerificationStatus,
    },
    Unchanged {
        verification_id: Uuid,
        status: VerificationStatus,
    },
    Acknowledged {
        verification_id: Uuid,
    },
    UnknownSession,
    UnknownShape,
}

/// Applies vendor callbacks to stored verification records.
///
/// Writes are compare-and-set on the status observed before the write. A
/// writer that loses the race reloads and recomputes; only the writer that
/// actually moves a record into a terminal state dispatches side effects.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let dispatcher = Dispatcher::new(store.clone());
        Self { store, dispatcher }
    }

    pub async fn handle(
        &self,
        vendor: Vendor,
        event: WebhookEvent,
        raw: Value,
    ) -> VerificationResult<ReconcileOutcome> {
        let session_id = match event.session_id() {
            Some(session_id) => session_id.to_string(),
            None => {
                debug!(%vendor, "ignoring webhook with unrecognised shape");
                return Ok(ReconcileOutcome::UnknownShape);
            }
        };

        let Some(record) = self
            .store
            .find_verification_by_session(vendor, &session_id)
            .await?
        else {
            warn!(%vendor, session_id = %session_id, "webhook for unknown verification session");
            return Ok(ReconcileOutcome::UnknownSession);
        };

        match event {
            WebhookEvent::Decision(decision) => self.apply_decision(record, &decision, raw).await,
            WebhookEvent::Lifecycle(lifecycle) => self.apply_lifecycle(record, &lifecycle, raw).await,
            WebhookEvent::Unknown => Ok(ReconcileOutcome::UnknownShape),
        }
    }

    pub async fn apply_decision(
        &self,
        mut record: VerificationRecord,
        decision: &DecisionEvent,
        raw: Value,
    ) -> VerificationResult<ReconcileOutcome> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = record.status;
            let mapped = map_vendor_decision(record.vendor, &decision.verdict, current);
            let next = if current.can_transition_to(mapped) {
                mapped
            } else {
                current
            };

            if current == VerificationStatus::Verified {
                debug!(verification_id = %record.id, "decision ignored for verified record");
                return Ok(ReconcileOutcome::Unchanged {
                    verification_id: record.id,
                    status: current,
                });
            }

            let update = decision_update(&record, decision, next, raw.clone());
            match self
                .store
                .update_verification(record.id, current, update)
                .await?
            {
                Some(updated) => {
                    if next == current {
                        debug!(verification_id = %updated.id, status = %current, "decision left status unchanged");
                        return Ok(ReconcileOutcome::Unchanged {
                            verification_id: updated.id,
                            status: current,
                        });
                    }

                    info!(
                        verification_id = %updated.id,
                        vendor = %updated.vendor,
                        previous = %current,
                        status = %next,
                        "verification status updated"
                    );
                    if next.is_terminal() {
                        let reason = decision
                            .reason
                            .as_deref()
                            .or(decision.reason_code.as_deref());
                        self.dispatcher
                            .on_terminal_transition(&updated, next, reason)
                            .await;
                    }
                    return Ok(ReconcileOutcome::Applied {
                        verification_id: updated.id,
                        previous: current,
                        status: next,
                    });
                }
                None => {
                    debug!(verification_id = %record.id, attempt, "lost status race, reloading");
                    match self.store.find_verification(record.id).await? {
                        Some(reloaded) => record = reloaded,
                        None => return Ok(ReconcileOutcome::UnknownSession),
                    }
                }
            }
        }

        Err(VerificationError::Conflict(format!(
            "verification {} kept changing during reconciliation",
            record.id
        )))
    }

    async fn apply_lifecycle(
        &self,
        record: VerificationRecord,
        event: &LifecycleEvent,
        raw: Value,
    ) -> VerificationResult<ReconcileOutcome> {
        let submitted = event.action == LifecycleAction::Submitted;
        if !submitted || record.status != VerificationStatus::Initiated {
            debug!(
                verification_id = %record.id,
                action = ?event.action,
                status = %record.status,
                "lifecycle event acknowledged"
            );
            return Ok(ReconcileOutcome::Acknowledged {
                verification_id: record.id,
            });
        }

        let mut update = VerificationUpdate::from_record(&record);
        update.status = VerificationStatus::Pending;
        update.raw_vendor_payload = Some(raw);
        merge_object(
            &mut update.metadata,
            json!({ "submittedAt": Utc::now().to_rfc3339() }),
        );

        match self
            .store
            .update_verification(record.id, VerificationStatus::Initiated, update)
            .await?
        {
            Some(updated) => {
                info!(verification_id = %updated.id, "verification submitted, awaiting decision");
                Ok(ReconcileOutcome::Applied {
                    verification_id: updated.id,
                    previous: VerificationStatus::Initiated,
                    status: VerificationStatus::Pending,
                })
            }
            None => Ok(ReconcileOutcome::Acknowledged {
                verification_id: record.id,
            }),
        }
    }
}

fn decision_update(
    record: &VerificationRecord,
    decision: &DecisionEvent,
    next: VerificationStatus,
    raw: Value,
) -> VerificationUpdate {
    let mut update = VerificationUpdate::from_record(record);
    update.status = next;
    update.extracted_identity = record.extracted_identity.merge(&decision.identity);
    update.raw_vendor_payload = Some(raw);
    merge_object(
        &mut update.metadata,
        json!({
            "vendorStatus": decision.verdict.status,
            "vendorCode": decision.verdict.code,
            "vendorReason": decision.reason,
            "vendorReasonCode": decision.reason_code,
            "vendorDecisionTime": decision.decision_time,
            "vendorAccountId": decision.account_id,
        }),
    );
    if next != record.status && next.is_terminal() {
        update.decided_at = Some(Utc::now());
    }
    update
}
