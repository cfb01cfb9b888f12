use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{status_error, transport_error, SessionRequest, VendorGateway, VendorSession};
use crate::domain::Vendor;
use crate::error::{VerificationError, VerificationResult};

const TOKEN_LIFETIME: &str = "30m";

pub struct JumioGateway {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    api_secret: String,
    workflow_key: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    account: Option<IdHolder>,
    workflow_execution: Option<IdHolder>,
    web: Option<WebHolder>,
}

#[derive(Debug, Deserialize)]
struct IdHolder {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebHolder {
    href: Option<String>,
}

impl JumioGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        api_secret: impl Into<String>,
        workflow_key: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            api_secret: api_secret.into(),
            workflow_key,
        }
    }
}

#[async_trait]
impl VendorGateway for JumioGateway {
    fn vendor(&self) -> Vendor {
        Vendor::Jumio
    }

    async fn create_session(&self, request: &SessionRequest) -> VerificationResult<VendorSession> {
        let body = json!({
            "customerInternalReference": request.reference,
            "userReference": request.reference,
            "workflowDefinition": { "key": self.workflow_key },
            "callbackUrl": request.callback_url,
            "tokenLifetime": TOKEN_LIFETIME,
            "web": {
                "successUrl": request.success_url,
                "errorUrl": request.error_url,
            }
        });

        let response = self
            .client
            .post(format!("{}/api/v1/accounts", self.base_url))
            .basic_auth(&self.api_token, Some(&self.api_secret))
            .header("User-Agent", "AuroraSociety/1.0")
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(Vendor::Jumio, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(Vendor::Jumio, status));
        }

        let parsed: AccountResponse = response
            .json()
            .await
            .map_err(|err| transport_error(Vendor::Jumio, err))?;

        let session_id = parsed.workflow_execution.and_then(|w| w.id);
        let redirect_url = parsed.web.and_then(|w| w.href);
        let (Some(session_id), Some(redirect_url)) = (session_id, redirect_url) else {
            return Err(VerificationError::Vendor(
                "jumio response missing workflow execution or redirect url".to_string(),
            ));
        };
        let account_id = parsed.account.and_then(|a| a.id);

        info!(vendor = "jumio", session_id = %session_id, "vendor session created");
        Ok(VendorSession {
            session_id,
            account_id,
            redirect_url,
            session_token: None,
        })
    }
}
