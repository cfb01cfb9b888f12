use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::AppConfig;
use crate::domain::Vendor;
use crate::error::{VerificationError, VerificationResult};

pub mod jumio;
pub mod veriff;

pub use jumio::JumioGateway;
pub use veriff::VeriffGateway;

const VENDOR_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Correlation value echoed back by the vendor: a user id or a registration token.
    pub reference: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub callback_url: String,
    pub success_url: String,
    pub error_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSession {
    pub session_id: String,
    pub account_id: Option<String>,
    pub redirect_url: String,
    pub session_token: Option<String>,
}

#[async_trait]
pub trait VendorGateway: Send + Sync {
    fn vendor(&self) -> Vendor;

    async fn create_session(&self, request: &SessionRequest) -> VerificationResult<VendorSession>;

    /// Current vendor decision in webhook shape, when the vendor supports polling.
    async fn fetch_decision(&self, _session_id: &str) -> VerificationResult<Option<Value>> {
        Ok(None)
    }
}

/// Vendor gateways available in this deployment. Vendors without
/// credentials are absent and resolve to a configuration error.
#[derive(Clone, Default)]
pub struct VendorRegistry {
    gateways: HashMap<Vendor, Arc<dyn VendorGateway>>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(VENDOR_TIMEOUT).build()?;
        let mut registry = Self::new();

        if let (Some(api_key), Some(secret)) = (
            config.veriff.api_key.clone(),
            config.veriff.shared_secret.clone(),
        ) {
            registry = registry.with_gateway(Arc::new(VeriffGateway::new(
                client.clone(),
                config.veriff.base_url.clone(),
                api_key,
                secret,
            )));
        }

        if let (Some(token), Some(secret)) = (
            config.jumio.api_token.clone(),
            config.jumio.api_secret.clone(),
        ) {
            registry = registry.with_gateway(Arc::new(JumioGateway::new(
                client,
                config.jumio.base_url.clone(),
                token,
                secret,
                config.jumio.workflow_key,
            )));
        }

        Ok(registry)
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn VendorGateway>) -> Self {
        self.gateways.insert(gateway.vendor(), gateway);
        self
    }

    pub fn get(&self, vendor: Vendor) -> VerificationResult<Arc<dyn VendorGateway>> {
        self.gateways.get(&vendor).cloned().ok_or_else(|| {
            VerificationError::Configuration(format!("{vendor} credentials"))
        })
    }

    pub fn configured(&self) -> Vec<Vendor> {
        let mut vendors: Vec<Vendor> = self.gateways.keys().copied().collect();
        vendors.sort_by_key(|vendor| vendor.as_str());
        vendors
    }
}

pub(crate) fn transport_error(vendor: Vendor, err: reqwest::Error) -> VerificationError {
    // reqwest errors carry the URL only, never headers.
    VerificationError::Vendor(format!("{vendor} request failed: {err}"))
}

pub(crate) fn status_error(vendor: Vendor, status: reqwest::StatusCode) -> VerificationError {
    VerificationError::Vendor(format!("{vendor} responded with status {status}"))
}
