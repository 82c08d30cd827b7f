use lead_intake::config::LeadConfig;
use lead_intake::workflows::leads::{
    FlagStoreError, JsonFileFlagStore, LedgerError, MitigationSettings, OneTimeFlagStore,
    SubmissionLedger, SubmissionRecord,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Oldest records are dropped once the in-memory ledger holds this many.
const LEDGER_CAPACITY: usize = 1_000;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Clone)]
pub(crate) struct InMemorySubmissionLedger {
    records: Arc<Mutex<VecDeque<SubmissionRecord>>>,
    capacity: usize,
}

impl Default for InMemorySubmissionLedger {
    fn default() -> Self {
        Self::with_capacity(LEDGER_CAPACITY)
    }
}

impl InMemorySubmissionLedger {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }
}

impl SubmissionLedger for InMemorySubmissionLedger {
    fn record(&self, record: SubmissionRecord) -> Result<(), LedgerError> {
        let mut guard = self.records.lock().expect("ledger mutex poisoned");
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(record);
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<SubmissionRecord>, LedgerError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

/// Flags that last for the lifetime of the process.
#[derive(Default)]
pub(crate) struct InMemoryFlagStore {
    flags: Mutex<BTreeSet<(String, String)>>,
}

impl OneTimeFlagStore for InMemoryFlagStore {
    fn is_set(&self, device_id: &str, key: &str) -> Result<bool, FlagStoreError> {
        let guard = self.flags.lock().expect("flag mutex poisoned");
        Ok(guard.contains(&(device_id.to_string(), key.to_string())))
    }

    fn set(&self, device_id: &str, key: &str) -> Result<(), FlagStoreError> {
        let mut guard = self.flags.lock().expect("flag mutex poisoned");
        guard.insert((device_id.to_string(), key.to_string()));
        Ok(())
    }
}

/// File-backed when `LEAD_FLAG_STORE_PATH` is set, in-memory otherwise.
pub(crate) enum ConfiguredFlagStore {
    File(JsonFileFlagStore),
    Memory(InMemoryFlagStore),
}

impl ConfiguredFlagStore {
    pub(crate) fn from_config(config: &LeadConfig) -> Result<Self, FlagStoreError> {
        match &config.flag_store_path {
            Some(path) => {
                let store = JsonFileFlagStore::open(path)?;
                info!(path = %store.path().display(), "one-time flags persisted to file");
                Ok(Self::File(store))
            }
            None => Ok(Self::Memory(InMemoryFlagStore::default())),
        }
    }
}

impl OneTimeFlagStore for ConfiguredFlagStore {
    fn is_set(&self, device_id: &str, key: &str) -> Result<bool, FlagStoreError> {
        match self {
            Self::File(store) => store.is_set(device_id, key),
            Self::Memory(store) => store.is_set(device_id, key),
        }
    }

    fn set(&self, device_id: &str, key: &str) -> Result<(), FlagStoreError> {
        match self {
            Self::File(store) => store.set(device_id, key),
            Self::Memory(store) => store.set(device_id, key),
        }
    }
}

pub(crate) fn mitigation_settings(config: &LeadConfig) -> MitigationSettings {
    MitigationSettings {
        site_key: config.mitigation.site_key.clone(),
        ready_timeout: config.mitigation.ready_timeout,
    }
}
