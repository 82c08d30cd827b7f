use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::config::{EmailJsConfig, LeadConfig, MitigationConfig};
use crate::workflows::leads::{
    AllowListGate, DeliveryReceipt, FlagStoreError, FormCatalog, LeadApi, LeadSubmissionService,
    LedgerError, MitigationError, MitigationProvider, MitigationSettings, Notification,
    NotificationSink, OneTimeFlagStore, RelayEndpoint, RelayError, RelayTransport,
    SubmissionLedger, SubmissionPayload, SubmissionRecord,
};

pub(super) const ADMIN_EMAIL: &str = "anne@example.com";

pub(super) fn lead_config() -> LeadConfig {
    LeadConfig {
        relay_timeout: Duration::from_secs(2),
        target_email: "info@brokerage.test".to_string(),
        contact_relay_url: "https://relay.test/contact".parse().expect("valid url"),
        contact_access_key: "contact-key".to_string(),
        consultation_relay_url: "https://relay.test/consultation"
            .parse()
            .expect("valid url"),
        emailjs: EmailJsConfig {
            url: "https://relay.test/emailjs".parse().expect("valid url"),
            service_id: "service_test".to_string(),
            newsletter_template: "template_newsletter".to_string(),
            confirmation_template: "template_confirmation".to_string(),
            public_key: "public_test".to_string(),
        },
        mitigation: MitigationConfig {
            site_key: "site-key".to_string(),
            ready_timeout: Duration::from_millis(50),
        },
        admin_emails: vec![ADMIN_EMAIL.to_string()],
        flag_store_path: None,
    }
}

pub(super) fn catalog() -> FormCatalog {
    FormCatalog::standard(&lead_config())
}

pub(super) fn mitigation_settings() -> MitigationSettings {
    MitigationSettings {
        site_key: "site-key".to_string(),
        ready_timeout: Duration::from_millis(50),
    }
}

pub(super) fn contact_input() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("name".to_string(), "Jane Doe".to_string()),
        ("email".to_string(), "jane@x.com".to_string()),
        ("message".to_string(), "Hello, I am interested.".to_string()),
    ])
}

pub(super) fn newsletter_input() -> BTreeMap<String, String> {
    BTreeMap::from([("email".to_string(), "subscriber@x.com".to_string())])
}

/// Relay fake that records every delivery and replays scripted responses.
#[derive(Default)]
pub(super) struct RecordingRelay {
    deliveries: Mutex<Vec<(String, SubmissionPayload)>>,
    responses: Mutex<VecDeque<Result<DeliveryReceipt, RelayError>>>,
}

impl RecordingRelay {
    pub(super) fn responding(responses: Vec<Result<DeliveryReceipt, RelayError>>) -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
        }
    }

    pub(super) fn rejecting(status: u16, body: &str) -> Self {
        Self::responding(vec![Err(RelayError::Rejected {
            status,
            body: body.to_string(),
        })])
    }

    pub(super) fn deliveries(&self) -> Vec<(String, SubmissionPayload)> {
        self.deliveries.lock().expect("relay mutex poisoned").clone()
    }

    pub(super) fn call_count(&self) -> usize {
        self.deliveries.lock().expect("relay mutex poisoned").len()
    }
}

#[async_trait]
impl RelayTransport for RecordingRelay {
    async fn deliver(
        &self,
        payload: &SubmissionPayload,
        endpoint: &RelayEndpoint,
    ) -> Result<DeliveryReceipt, RelayError> {
        self.deliveries
            .lock()
            .expect("relay mutex poisoned")
            .push((endpoint.name.clone(), payload.clone()));
        self.responses
            .lock()
            .expect("relay mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(DeliveryReceipt {
                status: 200,
                reference: None,
            }))
    }
}

#[derive(Default)]
pub(super) struct MemoryFlags {
    flags: Mutex<BTreeSet<(String, String)>>,
    writes: AtomicUsize,
}

impl MemoryFlags {
    pub(super) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl OneTimeFlagStore for MemoryFlags {
    fn is_set(&self, device_id: &str, key: &str) -> Result<bool, FlagStoreError> {
        let guard = self.flags.lock().expect("flag mutex poisoned");
        Ok(guard.contains(&(device_id.to_string(), key.to_string())))
    }

    fn set(&self, device_id: &str, key: &str) -> Result<(), FlagStoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.flags
            .lock()
            .expect("flag mutex poisoned")
            .insert((device_id.to_string(), key.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryLedger {
    records: Mutex<Vec<SubmissionRecord>>,
}

impl MemoryLedger {
    pub(super) fn records(&self) -> Vec<SubmissionRecord> {
        self.records.lock().expect("ledger mutex poisoned").clone()
    }
}

impl SubmissionLedger for MemoryLedger {
    fn record(&self, record: SubmissionRecord) -> Result<(), LedgerError> {
        self.records
            .lock()
            .expect("ledger mutex poisoned")
            .push(record);
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<SubmissionRecord>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        self.events
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
    }
}

/// Always-ready provider issuing a fixed token and counting calls.
pub(super) struct StaticProvider {
    token: String,
    executions: AtomicUsize,
}

impl StaticProvider {
    pub(super) fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            executions: AtomicUsize::new(0),
        }
    }

    pub(super) fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MitigationProvider for StaticProvider {
    async fn ready(&self) {}

    async fn execute(&self, _site_key: &str, _action: &str) -> Result<String, MitigationError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}

/// Provider whose script never finishes loading.
pub(super) struct NeverReadyProvider;

#[async_trait]
impl MitigationProvider for NeverReadyProvider {
    async fn ready(&self) {
        std::future::pending::<()>().await;
    }

    async fn execute(&self, _site_key: &str, _action: &str) -> Result<String, MitigationError> {
        panic!("execute must not run before the provider is ready");
    }
}

pub(super) struct RejectingProvider;

#[async_trait]
impl MitigationProvider for RejectingProvider {
    async fn ready(&self) {}

    async fn execute(&self, _site_key: &str, _action: &str) -> Result<String, MitigationError> {
        Err(MitigationError::Rejected("invalid site key".to_string()))
    }
}

pub(super) type TestService = LeadSubmissionService<RecordingRelay, MemoryFlags, MemoryLedger>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) relay: Arc<RecordingRelay>,
    pub(super) flags: Arc<MemoryFlags>,
    pub(super) ledger: Arc<MemoryLedger>,
    pub(super) sink: Arc<RecordingSink>,
}

pub(super) fn harness() -> Harness {
    harness_with(RecordingRelay::default())
}

pub(super) fn harness_with(relay: RecordingRelay) -> Harness {
    let relay = Arc::new(relay);
    let flags = Arc::new(MemoryFlags::default());
    let ledger = Arc::new(MemoryLedger::default());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(LeadSubmissionService::new(
        Arc::new(catalog()),
        relay.clone(),
        flags.clone(),
        ledger.clone(),
        sink.clone(),
        mitigation_settings(),
    ));
    Harness {
        service,
        relay,
        flags,
        ledger,
        sink,
    }
}

impl Harness {
    pub(super) fn api(&self) -> LeadApi<RecordingRelay, MemoryFlags, MemoryLedger> {
        LeadApi {
            service: self.service.clone(),
            access: Arc::new(AllowListGate::new([ADMIN_EMAIL])),
        }
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
