use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use aurora_verification::auth::jwt::{JwtService, ROLE_ADMIN, ROLE_MEMBER};
use aurora_verification::config::{
    AppConfig, JumioConfig, OracleConfig, VeriffConfig, DEFAULT_JUMIO_WORKFLOW_KEY,
};
use aurora_verification::domain::Vendor;
use aurora_verification::error::{VerificationError, VerificationResult};
use aurora_verification::mailer::{MailError, Mailer, OutgoingEmail};
use aurora_verification::models::{FamilyDocument, NewFamilyDocument, NewProfile};
use aurora_verification::oracle::{ClassificationOracle, OracleError};
use aurora_verification::routes;
use aurora_verification::signature;
use aurora_verification::state::AppState;
use aurora_verification::storage::ObjectStorage;
use aurora_verification::store::Store;
use aurora_verification::vendors::{SessionRequest, VendorGateway, VendorRegistry, VendorSession};
use aurora_verification::{default_handlers, Worker};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub mod memory_store;

pub use memory_store::MemoryStore;

pub const VERIFF_SECRET: &str = "veriff-shared-secret";
pub const SITE_URL: &str = "https://members.example.test";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashSet<String>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    pub async fn put(&self, key: &str) {
        self.objects.lock().await.insert(key.to_string());
    }

    #[allow(dead_code)]
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains(key)
    }
}

/// Vendor double that hands out sequential session ids and serves a
/// configurable polled decision.
pub struct FakeVendor {
    vendor: Vendor,
    counter: AtomicUsize,
    pub requests: Mutex<Vec<SessionRequest>>,
    pub decision: Mutex<Option<Value>>,
    pub fail: Mutex<bool>,
}

impl FakeVendor {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            counter: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            decision: Mutex::new(None),
            fail: Mutex::new(false),
        }
    }
}

#[async_trait]
impl VendorGateway for FakeVendor {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn create_session(&self, request: &SessionRequest) -> VerificationResult<VendorSession> {
        if *self.fail.lock().await {
            return Err(VerificationError::Vendor(format!(
                "{} responded with status 500",
                self.vendor
            )));
        }
        self.requests.lock().await.push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("{}-session-{n}", self.vendor);
        Ok(VendorSession {
            redirect_url: format!("https://{}.vendor.test/{session_id}", self.vendor),
            account_id: (self.vendor == Vendor::Jumio).then(|| format!("account-{n}")),
            session_token: Some(format!("token-{n}")),
            session_id,
        })
    }

    async fn fetch_decision(&self, _session_id: &str) -> VerificationResult<Option<Value>> {
        Ok(self.decision.lock().await.clone())
    }
}

/// Oracle double that records how many classifications overlap.
pub struct FakeOracle {
    pub reply: Mutex<Option<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeOracle {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Some(reply.to_string())),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationOracle for FakeOracle {
    async fn classify(&self, document_url: &str, _rubric: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        // Hold the call open so calls issued together overlap.
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !document_url.starts_with("https://fake-storage/") {
            return Err(OracleError::Transport("unexpected document url".to_string()));
        }
        self.reply
            .lock()
            .await
            .clone()
            .ok_or(OracleError::Status(503))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail_transport: Mutex<bool>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if *self.fail_transport.lock().await {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct TestOptions {
    pub enforce_signatures: bool,
    pub with_oracle: bool,
    pub document_batch_size: usize,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            enforce_signatures: false,
            with_oracle: true,
            document_batch_size: 2,
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub veriff: Arc<FakeVendor>,
    pub jumio: Arc<FakeVendor>,
    pub oracle: Arc<FakeOracle>,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let mut config = test_config(options.enforce_signatures);
        config.document_batch_size = options.document_batch_size;

        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(FakeStorage::default());
        let veriff = Arc::new(FakeVendor::new(Vendor::Veriff));
        let jumio = Arc::new(FakeVendor::new(Vendor::Jumio));
        let oracle = Arc::new(FakeOracle::replying(
            r#"{"status":"valid","confidence":92,"reason":"clear birth certificate"}"#,
        ));
        let mailer = Arc::new(RecordingMailer::default());

        let vendors = VendorRegistry::new()
            .with_gateway(veriff.clone())
            .with_gateway(jumio.clone());
        let oracle_for_state: Option<Arc<dyn ClassificationOracle>> = options
            .with_oracle
            .then(|| oracle.clone() as Arc<dyn ClassificationOracle>);
        let jwt = match JwtService::from_config(&config) {
            Ok(jwt) => jwt,
            Err(err) => panic!("jwt setup failed: {err}"),
        };

        let state = AppState::new(
            config,
            store.clone() as Arc<dyn Store>,
            storage.clone() as Arc<dyn ObjectStorage>,
            vendors,
            oracle_for_state,
            mailer.clone() as Arc<dyn Mailer>,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Self {
            state,
            store,
            storage,
            veriff,
            jumio,
            oracle,
            mailer,
            router,
        }
    }

    pub async fn insert_profile(&self, first_name: &str, last_name: &str, email: &str) -> Uuid {
        self.store
            .insert_profile(NewProfile {
                id: Uuid::new_v4(),
                first_name: Some(first_name.to_string()),
                last_name: Some(last_name.to_string()),
                email: Some(email.to_string()),
            })
            .await
            .id
    }

    #[allow(dead_code)]
    pub async fn insert_document(
        &self,
        user_id: Uuid,
        file_name: &str,
        file_type: Option<&str>,
    ) -> FamilyDocument {
        let file_path = format!("family/{user_id}/{file_name}");
        self.storage.put(&file_path).await;
        self.store
            .insert_family_document(NewFamilyDocument {
                id: Uuid::new_v4(),
                user_id,
                file_name: file_name.to_string(),
                file_path,
                file_type: file_type.map(str::to_string),
            })
            .await
    }

    pub fn member_token(&self, user_id: Uuid) -> String {
        self.token(user_id, ROLE_MEMBER)
    }

    #[allow(dead_code)]
    pub fn admin_token(&self, user_id: Uuid) -> String {
        self.token(user_id, ROLE_ADMIN)
    }

    fn token(&self, user_id: Uuid, role: &str) -> String {
        match self.state.jwt.generate_token(user_id, None, role) {
            Ok(token) => token,
            Err(err) => panic!("failed to sign test token: {err}"),
        }
    }

    /// Runs queued jobs until the queue is idle.
    #[allow(dead_code)]
    pub async fn drain_jobs(&self) -> Result<usize> {
        let worker = Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(self.state.config.worker_poll_interval_ms),
        );
        let mut processed = 0;
        while worker.tick().await? {
            processed += 1;
            ensure!(processed < 100, "job queue did not drain");
        }
        Ok(processed)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    /// Posts a raw webhook body, optionally signed with `secret`.
    #[allow(dead_code)]
    pub async fn post_webhook(
        &self,
        vendor: &str,
        body: &[u8],
        secret: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/webhooks/{vendor}"))
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(signature::SIGNATURE_HEADER, signature::sign(secret, body));
        }
        let request = builder.body(Body::from(body.to_vec()))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub fn test_config(enforce_signatures: bool) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        public_base_url: "https://api.example.test".to_string(),
        site_url: SITE_URL.to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        s3_bucket: "test-bucket".to_string(),
        verification_vendor: Vendor::Veriff,
        webhook_signature_enforce: enforce_signatures,
        veriff: VeriffConfig {
            base_url: "https://veriff.invalid".to_string(),
            api_key: Some("veriff-key".to_string()),
            shared_secret: Some(VERIFF_SECRET.to_string()),
        },
        jumio: JumioConfig {
            base_url: "https://jumio.invalid".to_string(),
            api_token: Some("jumio-token".to_string()),
            api_secret: Some("jumio-secret".to_string()),
            workflow_key: DEFAULT_JUMIO_WORKFLOW_KEY,
            webhook_secret: None,
        },
        oracle: OracleConfig::default(),
        smtp: None,
        document_batch_size: 2,
        document_batch_delay_ms: 0,
        worker_poll_interval_ms: 10,
    }
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}
