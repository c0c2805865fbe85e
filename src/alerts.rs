// src/alerts.rs
//! Approval risk alerts across all of the user's own accounts
//!
//! One cycle lists the accounts, drops watch-only and Gnosis ones, fetches
//! each account's approval status through the alert queue, and publishes
//! `{ total, address2count, loading: false }` in a single store write once the
//! queue drains. Until then subscribers keep seeing the previous snapshot with
//! `loading` set. Cycles never overlap, and `trigger_update` runs at most once
//! per cooldown window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::api::{total_danger_count, ApprovalApi};
use crate::barrier::wait_until_drained;
use crate::config::ApprovalConfig;
use crate::cooldown::{Clock, Cooldown};
use crate::error::AlertError;
use crate::keyring::{eligible_accounts, Account};
use crate::queue::TaskQueue;
use crate::store::{Store, SubscriptionId};
use crate::triggers::{RefreshReason, RefreshSignal};

/// Published alert state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalsAlert {
    pub total: u64,
    pub address2count: HashMap<String, u64>,
    pub loading: bool,
}

/// Where the current account list comes from
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn accounts(&self) -> Result<Vec<Account>, AlertError>;
}

/// Account list held in memory and replaced by the host
#[derive(Default)]
pub struct StaticAccounts {
    accounts: RwLock<Vec<Account>>,
}

impl StaticAccounts {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub fn replace(&self, accounts: Vec<Account>) {
        *self
            .accounts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = accounts;
    }
}

#[async_trait]
impl AccountSource for StaticAccounts {
    async fn accounts(&self) -> Result<Vec<Account>, AlertError> {
        Ok(self
            .accounts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

/// Releases the running flag however a cycle ends. If the cycle future is
/// dropped before publishing, `loading` is cleared and the old snapshot stays.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    store: &'a Store<ApprovalsAlert>,
    published: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.store.update_strict(|state| state.loading = false);
        }
        self.running.store(false, Ordering::Release);
    }
}

pub struct ApprovalAlerts {
    api: Arc<dyn ApprovalApi>,
    accounts: Arc<dyn AccountSource>,
    queue: TaskQueue,
    store: Arc<Store<ApprovalsAlert>>,
    cooldown: Cooldown,
    running: AtomicBool,
    cycles: AtomicU64,
    signal: RefreshSignal,
}

impl ApprovalAlerts {
    pub fn new(
        api: Arc<dyn ApprovalApi>,
        accounts: Arc<dyn AccountSource>,
        config: &ApprovalConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            accounts,
            queue: TaskQueue::new("approval-alerts", &config.alert_queue),
            store: Arc::new(Store::default()),
            cooldown: Cooldown::new(
                std::time::Duration::from_millis(config.alert_cache_time_ms),
                clock,
            ),
            running: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            signal: RefreshSignal::new(),
        }
    }

    pub fn alert_info(&self) -> ApprovalsAlert {
        self.store.read()
    }

    pub fn store(&self) -> &Arc<Store<ApprovalsAlert>> {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cycles started since construction
    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Run a cycle if the cooldown window has passed. Returns whether one ran.
    pub async fn trigger_update(&self) -> bool {
        if !self.cooldown.try_acquire() {
            log::debug!(
                "[ApprovalAlerts] skipped, next refresh allowed in {:?}",
                self.cooldown.remaining()
            );
            return false;
        }
        self.get_all_approval_info().await
    }

    /// Run a cycle now and restart the cooldown window.
    pub async fn force_update(&self) -> bool {
        self.cooldown.reset();
        self.get_all_approval_info().await
    }

    /// Route a refresh request: user refresh and revocations force a cycle,
    /// everything else goes through the cooldown.
    pub async fn refresh(&self, reason: RefreshReason) -> bool {
        self.signal.emit(reason);
        if reason.is_forced() {
            self.force_update().await
        } else {
            self.trigger_update().await
        }
    }

    /// Listen for every refresh request routed through [`Self::refresh`].
    /// Event sources (focus, polling, account or transaction changes) plug in
    /// by calling `refresh` with their reason; listeners only observe.
    pub fn on_should_refresh(
        &self,
        f: impl Fn(RefreshReason) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.signal.subscribe(f)
    }

    pub fn remove_refresh_listener(&self, id: SubscriptionId) -> bool {
        self.signal.unsubscribe(id)
    }

    /// Danger count for a single account, outside the aggregate cycle and
    /// its cooldown. Watch-only and Gnosis accounts and failed fetches read
    /// as `0`.
    pub async fn load_approval_status(&self, account: &Account) -> u64 {
        if !account.is_alert_eligible() {
            return 0;
        }
        match self.api.get_approval_status(&account.address).await {
            Ok(statuses) => total_danger_count(&statuses),
            Err(e) => {
                log::warn!(
                    "[ApprovalAlerts] failed to load approval status for {}: {}",
                    account.address,
                    e
                );
                0
            }
        }
    }

    /// One aggregation cycle. A no-op returning `false` while another cycle
    /// is running.
    pub async fn get_all_approval_info(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("[ApprovalAlerts] cycle already running");
            return false;
        }
        let mut guard = RunGuard {
            running: &self.running,
            store: &self.store,
            published: false,
        };

        self.store.update_strict(|state| state.loading = true);
        self.cycles.fetch_add(1, Ordering::Relaxed);

        let next = match self.aggregate().await {
            Ok(alert) => {
                log::info!(
                    "[ApprovalAlerts] {} alerts across {} accounts",
                    alert.total,
                    alert.address2count.len()
                );
                alert
            }
            Err(e) => {
                log::error!("[ApprovalAlerts] aggregation failed, resetting: {}", e);
                ApprovalsAlert::default()
            }
        };

        self.store.set(next);
        guard.published = true;
        true
    }

    async fn aggregate(&self) -> Result<ApprovalsAlert, AlertError> {
        let accounts = self.accounts.accounts().await?;
        let targets = eligible_accounts(&accounts);
        let results: Arc<Mutex<HashMap<String, u64>>> = Arc::new(Mutex::new(HashMap::new()));

        for account in targets {
            let api = Arc::clone(&self.api);
            let results = Arc::clone(&results);
            let address = account.address;
            self.queue.enqueue(async move {
                let fetched = api.get_approval_status(&address).await;
                match fetched {
                    Ok(statuses) => {
                        let count = total_danger_count(&statuses);
                        results
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .insert(address, count);
                    }
                    Err(e) => {
                        log::warn!(
                            "[ApprovalAlerts] failed to fetch approval status for {}: {}",
                            address,
                            e
                        );
                    }
                }
                Ok(())
            });
        }

        wait_until_drained(&self.queue).await;

        let address2count =
            std::mem::take(&mut *results.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        let total = address2count
            .values()
            .try_fold(0u64, |acc, &count| acc.checked_add(count))
            .ok_or_else(|| AlertError::from("alert total overflowed"))?;

        Ok(ApprovalsAlert {
            total,
            address2count,
            loading: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApprovalCount, ApprovalStatus};
    use crate::config::QueueConfig;
    use crate::cooldown::ManualClock;
    use crate::error::ApiError;
    use crate::keyring::KeyringType;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct MockApi {
        danger: HashMap<String, Vec<(u64, u64)>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ApprovalApi for MockApi {
        async fn get_approval_status(&self, address: &str) -> Result<Vec<ApprovalStatus>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let entries = self
                .danger
                .get(address)
                .ok_or_else(|| ApiError::status(502, "bad gateway"))?;
            Ok(entries
                .iter()
                .map(|&(token, nft)| ApprovalStatus {
                    chain: "eth".to_string(),
                    token_approval_danger_cnt: token,
                    nft_approval_danger_cnt: nft,
                })
                .collect())
        }

        async fn get_approval_count(&self, _address: &str) -> Result<ApprovalCount, ApiError> {
            Ok(ApprovalCount::default())
        }
    }

    struct FailingAccounts;

    #[async_trait]
    impl AccountSource for FailingAccounts {
        async fn accounts(&self) -> Result<Vec<Account>, AlertError> {
            Err("keyring locked".into())
        }
    }

    fn config(cache_time_ms: u64) -> ApprovalConfig {
        ApprovalConfig {
            alert_cache_time_ms: cache_time_ms,
            alert_queue: QueueConfig {
                window_ms: 100,
                max_starts_per_window: 10,
                max_concurrent: 2,
                task_timeout_ms: Some(5_000),
            },
            ..ApprovalConfig::default()
        }
    }

    fn three_accounts() -> Vec<Account> {
        vec![
            Account::new("0xa1", KeyringType::Hd),
            Account::new("0xa2", KeyringType::SimpleKeyPair),
            Account::new("0xa3", KeyringType::Ledger),
        ]
    }

    fn mock_api(delay: Duration) -> MockApi {
        MockApi {
            danger: HashMap::from([
                ("0xa1".to_string(), vec![(1, 0), (0, 1)]),
                ("0xa2".to_string(), vec![(0, 0)]),
            ]),
            delay,
            ..MockApi::default()
        }
    }

    fn alerts(
        api: MockApi,
        accounts: Vec<Account>,
        cache_time_ms: u64,
    ) -> (ApprovalAlerts, Arc<MockApi>, Arc<ManualClock>) {
        let api = Arc::new(api);
        let clock = Arc::new(ManualClock::new(1_000_000));
        let alerts = ApprovalAlerts::new(
            api.clone(),
            Arc::new(StaticAccounts::new(accounts)),
            &config(cache_time_ms),
            clock.clone(),
        );
        (alerts, api, clock)
    }

    fn assert_sum_invariant(alert: &ApprovalsAlert) {
        assert_eq!(alert.total, alert.address2count.values().sum::<u64>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_address_is_omitted() {
        let (alerts, _, _) = alerts(mock_api(Duration::from_millis(10)), three_accounts(), 1_000);

        assert!(alerts.trigger_update().await);

        let info = alerts.alert_info();
        assert_eq!(info.total, 2);
        assert_eq!(
            info.address2count,
            HashMap::from([("0xa1".to_string(), 2), ("0xa2".to_string(), 0)])
        );
        assert!(!info.loading);
        assert_sum_invariant(&info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_limits_cycles() {
        let (alerts, _, clock) = alerts(mock_api(Duration::ZERO), three_accounts(), 1_000);

        assert!(alerts.trigger_update().await);
        clock.advance(Duration::from_millis(50));
        assert!(!alerts.trigger_update().await);
        clock.advance(Duration::from_millis(1_050));
        assert!(alerts.trigger_update().await);

        assert_eq!(alerts.cycles_run(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_update_bypasses_and_resets_cooldown() {
        let (alerts, _, clock) = alerts(mock_api(Duration::ZERO), three_accounts(), 1_000);

        assert!(alerts.trigger_update().await);
        clock.advance(Duration::from_millis(10));
        assert!(alerts.force_update().await);
        assert_eq!(alerts.cooldown().last_run_ms(), Some(1_000_010));

        // window counts from the forced run
        clock.advance(Duration::from_millis(995));
        assert!(!alerts.trigger_update().await);
        assert_eq!(alerts.cycles_run(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_noop() {
        let (alerts, api, _) = alerts(mock_api(Duration::from_millis(200)), three_accounts(), 1_000);

        let (first, second) = tokio::join!(alerts.force_update(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(alerts.alert_info().loading);
            alerts.get_all_approval_info().await
        });

        assert!(first);
        assert!(!second);
        assert_eq!(alerts.cycles_run(), 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert!(!alerts.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_snapshot_kept_while_loading() {
        let (alerts, _, _) = alerts(mock_api(Duration::from_millis(100)), three_accounts(), 0);
        assert!(alerts.force_update().await);
        let before = alerts.alert_info();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        alerts.store().subscribe(move |state: &ApprovalsAlert| {
            sink.lock().unwrap().push(state.clone());
        });

        assert!(alerts.force_update().await);

        let seen = seen.lock().unwrap().clone();
        // loading flip, then one final publish; no partial maps in between
        assert_eq!(seen.len(), 2);
        assert!(seen[0].loading);
        assert_eq!(seen[0].address2count, before.address2count);
        assert!(!seen[1].loading);
        assert_sum_invariant(&seen[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_source_failure_resets_to_zero() {
        let api = Arc::new(mock_api(Duration::ZERO));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(5_000));
        let alerts = ApprovalAlerts::new(api, Arc::new(FailingAccounts), &config(1_000), clock);
        alerts.store().set(ApprovalsAlert {
            total: 9,
            address2count: HashMap::from([("0xold".to_string(), 9)]),
            loading: false,
        });

        assert!(alerts.force_update().await);
        assert_eq!(alerts.alert_info(), ApprovalsAlert::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_excludes_watch_and_gnosis() {
        let mut accounts = three_accounts();
        accounts.push(Account::new("0xwatch", KeyringType::WatchAddress));
        accounts.push(Account::new("0xsafe", KeyringType::Gnosis));
        let mut api = mock_api(Duration::ZERO);
        api.danger.insert("0xwatch".to_string(), vec![(5, 5)]);
        api.danger.insert("0xsafe".to_string(), vec![(5, 5)]);
        api.danger.insert("0xa3".to_string(), vec![(0, 3)]);
        let (alerts, api, _) = alerts(api, accounts, 1_000);

        alerts.force_update().await;

        let mut keys: Vec<_> = alerts.alert_info().address2count.into_keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["0xa1", "0xa2", "0xa3"]);
        assert_eq!(alerts.alert_info().total, 5);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_routes_by_reason() {
        let (alerts, _, _) = alerts(mock_api(Duration::ZERO), three_accounts(), 60_000);
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        alerts.on_should_refresh(move |reason| sink.lock().unwrap().push(reason));

        assert!(alerts.refresh(RefreshReason::ScreenFocus).await);
        assert!(!alerts.refresh(RefreshReason::Poll).await);
        assert!(alerts.refresh(RefreshReason::UserRefresh).await);
        assert!(alerts.refresh(RefreshReason::ApprovalRevoked).await);

        assert_eq!(alerts.cycles_run(), 3);
        assert_eq!(
            *heard.lock().unwrap(),
            vec![
                RefreshReason::ScreenFocus,
                RefreshReason::Poll,
                RefreshReason::UserRefresh,
                RefreshReason::ApprovalRevoked,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_approval_status_for_one_account() {
        let (alerts, api, _) = alerts(mock_api(Duration::ZERO), three_accounts(), 1_000);

        assert_eq!(alerts.load_approval_status(&Account::new("0xa1", KeyringType::Hd)).await, 2);
        // 0xa3 has no status entry and fails
        assert_eq!(alerts.load_approval_status(&Account::new("0xa3", KeyringType::Ledger)).await, 0);
        assert_eq!(
            alerts
                .load_approval_status(&Account::new("0xa1", KeyringType::WatchAddress))
                .await,
            0
        );

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(alerts.cycles_run(), 0);
        assert_eq!(alerts.alert_info(), ApprovalsAlert::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_cycle_clears_loading() {
        let (alerts, _, _) = alerts(mock_api(Duration::from_secs(10)), three_accounts(), 0);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), alerts.force_update()).await;
        assert!(cancelled.is_err());

        assert!(!alerts.is_running());
        assert!(!alerts.alert_info().loading);
        assert_eq!(alerts.alert_info().total, 0);
    }
}
