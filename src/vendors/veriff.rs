use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{status_error, transport_error, SessionRequest, VendorGateway, VendorSession};
use crate::domain::Vendor;
use crate::error::{VerificationError, VerificationResult};
use crate::signature;

pub struct VeriffGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    shared_secret: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    verification: Option<SessionVerification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionVerification {
    id: Option<String>,
    url: Option<String>,
    session_token: Option<String>,
}

impl VeriffGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            shared_secret: shared_secret.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base_url)
    }
}

#[async_trait]
impl VendorGateway for VeriffGateway {
    fn vendor(&self) -> Vendor {
        Vendor::Veriff
    }

    async fn create_session(&self, request: &SessionRequest) -> VerificationResult<VendorSession> {
        let mut person = json!({});
        if let Some(first_name) = &request.first_name {
            person["firstName"] = json!(first_name);
        }
        if let Some(last_name) = &request.last_name {
            person["lastName"] = json!(last_name);
        }
        let body = json!({
            "verification": {
                "callback": request.success_url,
                "person": person,
                "vendorData": request.reference,
                "endUserId": request.reference,
            }
        });
        let payload = serde_json::to_vec(&body)
            .map_err(|err| VerificationError::Vendor(format!("failed to encode session: {err}")))?;
        let signature = signature::sign(&self.shared_secret, &payload);

        let response = self
            .client
            .post(self.url("/sessions"))
            .header("X-AUTH-CLIENT", &self.api_key)
            .header("X-HMAC-SIGNATURE", signature)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|err| transport_error(Vendor::Veriff, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(Vendor::Veriff, status));
        }

        let parsed: SessionResponse = response
            .json()
            .await
            .map_err(|err| transport_error(Vendor::Veriff, err))?;
        let verification = parsed.verification.ok_or_else(|| {
            VerificationError::Vendor("veriff response missing verification".to_string())
        })?;
        let (Some(session_id), Some(redirect_url)) = (verification.id, verification.url) else {
            return Err(VerificationError::Vendor(
                "veriff response missing session id or url".to_string(),
            ));
        };

        info!(vendor = "veriff", session_id = %session_id, "vendor session created");
        Ok(VendorSession {
            session_id,
            account_id: None,
            redirect_url,
            session_token: verification.session_token,
        })
    }

    async fn fetch_decision(&self, session_id: &str) -> VerificationResult<Option<Value>> {
        // GET requests sign the session id instead of a body.
        let signature = signature::sign(&self.shared_secret, session_id.as_bytes());
        let response = self
            .client
            .get(self.url(&format!("/sessions/{session_id}/decision")))
            .header("X-AUTH-CLIENT", &self.api_key)
            .header("X-HMAC-SIGNATURE", signature)
            .send()
            .await
            .map_err(|err| transport_error(Vendor::Veriff, err))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(session_id, "veriff decision not available yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(Vendor::Veriff, status));
        }

        let decision: Value = response
            .json()
            .await
            .map_err(|err| transport_error(Vendor::Veriff, err))?;
        let decided = decision
            .get("verification")
            .map_or(false, |verification| !verification.is_null());
        Ok(decided.then_some(decision))
    }
}
