use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    error::VerificationError,
    jobs::{VerifyDocumentsPayload, JOB_VERIFY_DOCUMENTS},
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler, MAX_JOB_ATTEMPTS};

const RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct VerifyDocumentsJob;

impl VerifyDocumentsJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VerifyDocumentsJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for VerifyDocumentsJob {
    fn job_type(&self) -> &'static str {
        JOB_VERIFY_DOCUMENTS
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: VerifyDocumentsPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid batch payload: {err}"),
                }
            }
        };

        match state
            .document_verifier()
            .run_batch(payload.batch_id, payload.admin_id)
            .await
        {
            Ok(report) => {
                info!(
                    job_id = %job.id,
                    batch_id = %payload.batch_id,
                    valid = report.stats.valid,
                    invalid = report.stats.invalid,
                    suspicious = report.stats.suspicious,
                    error = report.stats.error,
                    "document batch verified"
                );
                JobExecution::Success
            }
            Err(err) => failure_execution(&err, job.attempts),
        }
    }
}

/// A vanished batch never recovers; anything else is retried until the
/// attempt cap.
fn failure_execution(err: &VerificationError, attempts: i32) -> JobExecution {
    match err {
        VerificationError::NotFound(_) => JobExecution::Failed {
            error: err.to_string(),
        },
        _ if attempts >= MAX_JOB_ATTEMPTS => JobExecution::Failed {
            error: format!("giving up after {attempts} attempts: {err}"),
        },
        _ => JobExecution::Retry {
            delay: RETRY_DELAY,
            error: err.to_string(),
        },
    }
}
