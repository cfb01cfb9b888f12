use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_SEND_VERIFICATION_EMAIL: &str = "send-verification-email";
pub const JOB_VERIFY_DOCUMENTS: &str = "verify-documents";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Verified,
    Rejected,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationEmailPayload {
    pub user_id: Uuid,
    pub verification_id: Uuid,
    pub kind: EmailKind,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyDocumentsPayload {
    pub batch_id: Uuid,
    pub admin_id: Uuid,
}

pub fn retry_at(delay: Duration) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(30))
}

pub fn enqueue_job(
    conn: &mut PgConnection,
    job_type: &str,
    payload: Value,
    run_after: Option<DateTime<Utc>>,
) -> QueryResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: STATUS_QUEUED.to_string(),
        run_after: run_after.unwrap_or_else(Utc::now),
    };

    diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)
}

pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> QueryResult<Option<Job>> {
    let now = Utc::now();

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        let job_opt = jobs::table
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?;

        match job_opt {
            Some(job) => diesel::update(jobs::table.find(job.id))
                .set((
                    jobs::status.eq(STATUS_PROCESSING),
                    jobs::attempts.eq(job.attempts + 1),
                    jobs::updated_at.eq(now),
                ))
                .get_result(conn)
                .map(Some),
            None => Ok(None),
        }
    })
}

pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> QueryResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_SUCCEEDED),
            jobs::last_error.eq::<Option<String>>(None),
            jobs::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn retry_job_after(
    conn: &mut PgConnection,
    job_id: Uuid,
    delay: Duration,
    error_message: &str,
) -> QueryResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_QUEUED),
            jobs::run_after.eq(retry_at(delay)),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> QueryResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_FAILED),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn list_jobs(conn: &mut PgConnection, job_type: &str) -> QueryResult<Vec<Job>> {
    jobs::table
        .filter(jobs::job_type.eq(job_type))
        .order(jobs::created_at.asc())
        .load(conn)
}
