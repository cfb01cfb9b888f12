mod common;

use anyhow::{ensure, Result};
use aurora_verification::domain::{Vendor, VerificationStatus};
use aurora_verification::jobs::JOB_SEND_VERIFICATION_EMAIL;
use aurora_verification::store::{Store, REFERRAL_CONFIRMED};
use axum::http::StatusCode;
use common::{body_json, TestApp, TestOptions, VERIFF_SECRET};
use serde_json::{json, Value};
use uuid::Uuid;

/// Starts an authenticated Veriff session and returns the user and session id.
async fn start_session(app: &TestApp) -> Result<(Uuid, String)> {
    let user_id = app.insert_profile("Ada", "Lovelace", "ada@example.com").await;
    let token = app.member_token(user_id);
    let response = app
        .post_json(
            "/api/verification",
            &json!({ "action": "initiate" }),
            Some(&token),
        )
        .await?;
    ensure!(
        response.status() == StatusCode::OK,
        "initiate failed with status {}",
        response.status()
    );
    let body = body_json(response).await?;
    let session_id = body["sessionId"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing sessionId"))?;
    Ok((user_id, session_id))
}

fn veriff_decision(session_id: &str, status: &str, code: i64) -> Vec<u8> {
    let payload = json!({
        "status": "success",
        "verification": {
            "id": session_id,
            "status": status,
            "code": code,
            "reason": if status == "declined" { Value::from("Document expired") } else { Value::Null },
            "person": { "firstName": "ADA", "lastName": "LOVELACE", "dateOfBirth": "1815-12-10" },
            "document": { "type": "PASSPORT", "country": "GB", "number": "X123" },
            "decisionTime": "2024-11-02T10:00:00.000Z"
        }
    });
    payload.to_string().into_bytes()
}

async fn status_of(app: &TestApp, session_id: &str) -> Result<VerificationStatus> {
    let record = app
        .store
        .find_verification_by_session(Vendor::Veriff, session_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("verification missing"))?;
    Ok(record.status)
}

#[tokio::test]
async fn approved_decision_verifies_profile_once() -> Result<()> {
    let app = TestApp::new();
    let (user_id, session_id) = start_session(&app).await?;
    let referrer = app.insert_profile("Grace", "Hopper", "grace@example.com").await;
    app.store.insert_referral(referrer, user_id).await;

    let body = veriff_decision(&session_id, "approved", 9001);
    let response = app.post_webhook("veriff", &body, Some(VERIFF_SECRET)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?, json!({ "received": true }));

    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Verified);
    let profile = app.store.find_profile(user_id).await?.expect("profile exists");
    assert!(profile.identity_verified);
    assert!(profile.identity_verified_at.is_some());

    let notifications = app.store.list_notifications(user_id).await?;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].notification_type, "verification_approved");
    assert!(notifications[0].message.contains("ADA LOVELACE"));

    let referrals = app.store.referrals().await;
    assert_eq!(referrals[0].status, REFERRAL_CONFIRMED);

    // Redelivery of the same decision changes nothing.
    let response = app.post_webhook("veriff", &body, Some(VERIFF_SECRET)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.store.list_notifications(user_id).await?.len(), 1);
    assert_eq!(app.store.list_jobs(JOB_SEND_VERIFICATION_EMAIL).await?.len(), 1);

    assert_eq!(app.drain_jobs().await?, 1);
    let sent = app.mailer.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.com");
    assert!(sent[0].subject.contains("verified"));
    Ok(())
}

#[tokio::test]
async fn extracted_identity_is_stored_on_the_record() -> Result<()> {
    let app = TestApp::new();
    let (_, session_id) = start_session(&app).await?;

    let body = veriff_decision(&session_id, "approved", 9001);
    app.post_webhook("veriff", &body, Some(VERIFF_SECRET)).await?;

    let record = app
        .store
        .find_verification_by_session(Vendor::Veriff, &session_id)
        .await?
        .expect("record exists");
    assert_eq!(record.extracted_identity.first_name.as_deref(), Some("ADA"));
    assert_eq!(record.extracted_identity.document_type.as_deref(), Some("PASSPORT"));
    assert_eq!(record.extracted_identity.document_country.as_deref(), Some("GB"));
    assert!(record.raw_vendor_payload.is_some());
    assert_eq!(record.metadata["vendorCode"], json!(9001));
    assert!(record.decided_at.is_some());
    Ok(())
}

#[tokio::test]
async fn verified_status_is_sticky() -> Result<()> {
    let app = TestApp::new();
    let (user_id, session_id) = start_session(&app).await?;

    app.post_webhook(
        "veriff",
        &veriff_decision(&session_id, "approved", 9001),
        Some(VERIFF_SECRET),
    )
    .await?;
    let response = app
        .post_webhook(
            "veriff",
            &veriff_decision(&session_id, "declined", 9102),
            Some(VERIFF_SECRET),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Verified);
    let profile = app.store.find_profile(user_id).await?.expect("profile exists");
    assert!(profile.identity_verified);
    assert_eq!(app.store.list_notifications(user_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_codes_leave_status_alone() -> Result<()> {
    let app = TestApp::new();
    let (user_id, session_id) = start_session(&app).await?;

    let response = app
        .post_webhook(
            "veriff",
            &veriff_decision(&session_id, "mystery", 4242),
            Some(VERIFF_SECRET),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Initiated);
    assert!(app.store.list_notifications(user_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn declined_decision_notifies_with_vendor_reason() -> Result<()> {
    let app = TestApp::new();
    let (user_id, session_id) = start_session(&app).await?;

    app.post_webhook(
        "veriff",
        &veriff_decision(&session_id, "declined", 9102),
        Some(VERIFF_SECRET),
    )
    .await?;

    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Rejected);
    let notifications = app.store.list_notifications(user_id).await?;
    assert_eq!(notifications[0].notification_type, "verification_rejected");
    assert!(notifications[0].message.contains("Document expired"));

    let profile = app.store.find_profile(user_id).await?.expect("profile exists");
    assert!(!profile.identity_verified);

    app.drain_jobs().await?;
    let sent = app.mailer.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].html.contains("Document expired"));
    Ok(())
}

#[tokio::test]
async fn submitted_event_moves_initiated_to_pending() -> Result<()> {
    let app = TestApp::new();
    let (_, session_id) = start_session(&app).await?;

    let body = json!({ "id": session_id, "action": "submitted", "feature": "selfid" }).to_string();
    let response = app
        .post_webhook("veriff", body.as_bytes(), Some(VERIFF_SECRET))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Pending);

    // A second submission is acknowledged without another transition.
    let body = json!({ "id": session_id, "action": "started" }).to_string();
    app.post_webhook("veriff", body.as_bytes(), Some(VERIFF_SECRET))
        .await?;
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn jumio_expired_session_is_rejected_with_generic_reason() -> Result<()> {
    let app = TestApp::new();
    let user_id = app.insert_profile("Ada", "Lovelace", "ada@example.com").await;
    let token = app.member_token(user_id);
    let response = app
        .post_json(
            "/api/verification",
            &json!({ "action": "initiate", "vendor": "jumio" }),
            Some(&token),
        )
        .await?;
    let session_id = body_json(response).await?["sessionId"]
        .as_str()
        .map(str::to_string)
        .expect("session id");

    let body = json!({
        "account": { "id": "account-1" },
        "workflowExecution": { "id": session_id, "status": "SESSION_EXPIRED" }
    })
    .to_string();
    let response = app.post_webhook("jumio", body.as_bytes(), None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let record = app
        .store
        .find_verification_by_session(Vendor::Jumio, &session_id)
        .await?
        .expect("record exists");
    assert_eq!(record.status, VerificationStatus::Rejected);
    let notifications = app.store.list_notifications(user_id).await?;
    assert!(notifications[0]
        .message
        .contains("Please try again with a valid document."));
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_acknowledged_with_warning() -> Result<()> {
    let app = TestApp::new();
    let body = veriff_decision("no-such-session", "approved", 9001);
    let response = app.post_webhook("veriff", &body, Some(VERIFF_SECRET)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await?,
        json!({ "received": true, "warning": "verification not found" })
    );
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_are_rejected() -> Result<()> {
    let app = TestApp::new();

    let response = app.post_webhook("veriff", b"{not json", None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json!({ "verification": { "status": "approved" } }).to_string();
    let response = app.post_webhook("veriff", body.as_bytes(), None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_webhook("onfido", b"{}", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn bad_signatures_only_warn_by_default() -> Result<()> {
    let app = TestApp::new();
    let (_, session_id) = start_session(&app).await?;

    let body = veriff_decision(&session_id, "approved", 9001);
    let response = app.post_webhook("veriff", &body, Some("wrong-secret")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Verified);
    Ok(())
}

#[tokio::test]
async fn enforced_signatures_reject_bad_or_missing_signatures() -> Result<()> {
    let app = TestApp::with_options(TestOptions {
        enforce_signatures: true,
        ..TestOptions::default()
    });
    let (_, session_id) = start_session(&app).await?;
    let body = veriff_decision(&session_id, "approved", 9001);

    let response = app.post_webhook("veriff", &body, Some("wrong-secret")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.post_webhook("veriff", &body, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Initiated);

    let response = app.post_webhook("veriff", &body, Some(VERIFF_SECRET)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status_of(&app, &session_id).await?, VerificationStatus::Verified);
    Ok(())
}

#[tokio::test]
async fn concurrent_deliveries_dispatch_once() -> Result<()> {
    let app = TestApp::new();
    let (user_id, session_id) = start_session(&app).await?;
    let body = veriff_decision(&session_id, "approved", 9001);

    let (first, second) = tokio::join!(
        app.post_webhook("veriff", &body, Some(VERIFF_SECRET)),
        app.post_webhook("veriff", &body, Some(VERIFF_SECRET)),
    );
    assert_eq!(first?.status(), StatusCode::OK);
    assert_eq!(second?.status(), StatusCode::OK);

    assert_eq!(app.store.list_notifications(user_id).await?.len(), 1);
    assert_eq!(app.store.list_jobs(JOB_SEND_VERIFICATION_EMAIL).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn enforced_signatures_reject_vendors_without_a_secret() -> Result<()> {
    let app = TestApp::with_options(TestOptions {
        enforce_signatures: true,
        ..TestOptions::default()
    });
    let user_id = app.insert_profile("Ada", "Lovelace", "ada@example.com").await;
    let response = app
        .post_json(
            "/api/verification",
            &json!({ "action": "initiate", "vendor": "jumio" }),
            Some(&app.member_token(user_id)),
        )
        .await?;
    let session_id = body_json(response).await?["sessionId"]
        .as_str()
        .map(str::to_string)
        .expect("session id");

    let forged = json!({
        "workflowExecution": { "id": session_id, "status": "PROCESSED" },
        "decision": { "type": "PASSED" }
    })
    .to_string();
    let response = app.post_webhook("jumio", forged.as_bytes(), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let record = app
        .store
        .find_verification_by_session(Vendor::Jumio, &session_id)
        .await?
        .expect("record exists");
    assert_eq!(record.status, VerificationStatus::Initiated);
    let profile = app.store.find_profile(user_id).await?.expect("profile");
    assert!(!profile.identity_verified);
    Ok(())
}

#[tokio::test]
async fn unknown_payload_shape_is_acknowledged_with_warning() -> Result<()> {
    let app = TestApp::new();
    let body = json!({ "event": "ping" }).to_string();
    let response = app
        .post_webhook("veriff", body.as_bytes(), Some(VERIFF_SECRET))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await?,
        json!({ "received": true, "warning": "unknown webhook type" })
    );
    Ok(())
}
