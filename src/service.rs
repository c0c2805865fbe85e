// src/service.rs
//! Wires the counter and the alert aggregator over shared collaborators

use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::alerts::{AccountSource, ApprovalAlerts, ApprovalsAlert};
use crate::api::{ApprovalApi, OpenApiClient};
use crate::approvals_count::{AddressCounts, ApprovalCounter};
use crate::config::ApprovalConfig;
use crate::cooldown::{Clock, SystemClock};
use crate::error::AlertError;
use crate::keyring::Account;
use crate::triggers::{spawn_poller, RefreshHandle, RefreshReason};

static GLOBAL: OnceCell<ApprovalService> = OnceCell::new();

pub struct ApprovalService {
    config: ApprovalConfig,
    counter: ApprovalCounter,
    alerts: Arc<ApprovalAlerts>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl ApprovalService {
    pub fn new(
        config: ApprovalConfig,
        api: Arc<dyn ApprovalApi>,
        accounts: Arc<dyn AccountSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AlertError> {
        config.validate().map_err(|e| AlertError::from(e.to_string()))?;

        let counter = ApprovalCounter::new(Arc::clone(&api), &config.count_queue);
        let alerts = Arc::new(ApprovalAlerts::new(api, accounts, &config, clock));

        Ok(Self {
            config,
            counter,
            alerts,
            poller: Mutex::new(None),
        })
    }

    /// Production wiring: reqwest client and the system clock
    pub fn with_http(config: ApprovalConfig, accounts: Arc<dyn AccountSource>) -> Result<Self, AlertError> {
        let api = OpenApiClient::from_config(&config)?;
        Self::new(config, Arc::new(api), accounts, Arc::new(SystemClock))
    }

    /// Make `service` the process-wide instance. Hands it back if one is
    /// already installed.
    pub fn install(service: ApprovalService) -> Result<&'static ApprovalService, ApprovalService> {
        GLOBAL.try_insert(service).map_err(|(_, rejected)| rejected)
    }

    pub fn global() -> Option<&'static ApprovalService> {
        GLOBAL.get()
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn counter(&self) -> &ApprovalCounter {
        &self.counter
    }

    pub fn alerts(&self) -> &Arc<ApprovalAlerts> {
        &self.alerts
    }

    pub async fn get_all_approval_count(&self, accounts: &[Account]) {
        self.counter.get_all_approval_count(accounts).await
    }

    pub fn address_to_count(&self) -> AddressCounts {
        self.counter.address_to_count()
    }

    pub fn alert_info(&self) -> ApprovalsAlert {
        self.alerts.alert_info()
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle::new(Arc::clone(&self.alerts))
    }

    /// Debounced refresh in the background
    pub fn trigger_update(&self) -> JoinHandle<bool> {
        self.refresh_handle().request(RefreshReason::Requested)
    }

    /// Immediate refresh in the background
    pub fn force_update(&self) -> JoinHandle<bool> {
        self.refresh_handle().request(RefreshReason::UserRefresh)
    }

    /// Start the background poller if `poll_interval_ms` is set. Returns
    /// whether a poller is running afterwards.
    pub fn start_polling(&self) -> bool {
        let Some(interval) = self.config.poll_interval() else {
            return false;
        };
        let mut poller = self.poller.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if poller.is_none() {
            log::info!("[ApprovalAlerts] polling every {:?}", interval);
            *poller = Some(spawn_poller(self.refresh_handle(), interval));
        }
        true
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for ApprovalService {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
