use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::info;

use crate::{
    jobs::{VerificationEmailPayload, JOB_SEND_VERIFICATION_EMAIL},
    mailer::verification_email,
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler, MAX_JOB_ATTEMPTS};

const RETRY_BASE_DELAY: Duration = Duration::from_secs(60);

pub struct SendVerificationEmailJob;

impl SendVerificationEmailJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendVerificationEmailJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for SendVerificationEmailJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_VERIFICATION_EMAIL
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: VerificationEmailPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid email payload: {err}"),
                }
            }
        };

        let profile = match state.store.find_profile(payload.user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return JobExecution::Failed {
                    error: format!("profile {} not found", payload.user_id),
                }
            }
            Err(err) => {
                return JobExecution::Retry {
                    delay: RETRY_BASE_DELAY,
                    error: err.to_string(),
                }
            }
        };

        let Some(to) = profile.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return JobExecution::Failed {
                error: format!("profile {} has no email address", payload.user_id),
            };
        };
        let first_name = profile
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("member");

        let email = verification_email(
            payload.kind,
            to,
            first_name,
            payload.reason.as_deref(),
            &state.config.site_url,
        );

        match state.mailer.send(email).await {
            Ok(()) => {
                info!(job_id = %job.id, verification_id = %payload.verification_id, kind = ?payload.kind, "verification email sent");
                JobExecution::Success
            }
            Err(err) if err.is_retryable() && job.attempts < MAX_JOB_ATTEMPTS => JobExecution::Retry {
                delay: RETRY_BASE_DELAY * job.attempts.max(1) as u32,
                error: err.to_string(),
            },
            Err(err) => JobExecution::Failed {
                error: err.to_string(),
            },
        }
    }
}
