use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    documents::DocumentVerifier,
    gateway::Gateway,
    mailer::{LogMailer, Mailer, SmtpMailer},
    oracle::{ClassificationOracle, HttpOracle},
    reconciler::Reconciler,
    storage::{ObjectStorage, S3Storage},
    store::{PgStore, Store},
    vendors::VendorRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub vendors: VendorRegistry,
    pub oracle: Option<Arc<dyn ClassificationOracle>>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        vendors: VendorRegistry,
        oracle: Option<Arc<dyn ClassificationOracle>>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            storage,
            vendors,
            oracle,
            mailer,
            jwt,
        }
    }

    /// Wires the production collaborators: PostgreSQL, S3, the configured
    /// vendors, the oracle when it has a key and SMTP when it is set up.
    pub async fn bootstrap(config: AppConfig, pool: PgPool) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
        let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::from_config(&config).await);
        let vendors = VendorRegistry::from_config(&config)?;
        let oracle = HttpOracle::from_config(&config.oracle)?
            .map(|oracle| Arc::new(oracle) as Arc<dyn ClassificationOracle>);
        let mailer: Arc<dyn Mailer> = match config.smtp.as_ref() {
            Some(smtp) => Arc::new(SmtpMailer::from_config(smtp)?),
            None => Arc::new(LogMailer),
        };
        let jwt = JwtService::from_config(&config)?;

        info!(
            vendors = ?vendors.configured(),
            default_vendor = %config.verification_vendor,
            oracle_enabled = oracle.is_some(),
            smtp_enabled = config.smtp.is_some(),
            "verification services configured"
        );

        if config.webhook_signature_enforce {
            for vendor in vendors.configured() {
                if config.webhook_secret(vendor).is_none() {
                    warn!(%vendor, "no webhook secret while signatures are enforced, webhooks will be rejected");
                }
            }
        }

        Ok(Self::new(config, store, storage, vendors, oracle, mailer, jwt))
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(
            self.store.clone(),
            self.vendors.clone(),
            self.storage.clone(),
            self.config.clone(),
        )
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.store.clone())
    }

    pub fn document_verifier(&self) -> DocumentVerifier {
        DocumentVerifier::new(
            self.store.clone(),
            self.storage.clone(),
            self.oracle.clone(),
            self.config.document_batch_size,
            Duration::from_millis(self.config.document_batch_delay_ms),
        )
    }
}
