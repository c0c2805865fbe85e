// src/triggers.rs
//! Refresh requests coming from outside the aggregator
//!
//! Screen focus, polling, account changes and finished transactions ask for a
//! refresh through the cooldown. An explicit pull-to-refresh or a revoked
//! approval forces one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alerts::ApprovalAlerts;
use crate::store::{Store, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshReason {
    /// Debounced request with no more specific source
    Requested,
    ScreenFocus,
    Poll,
    AccountsChanged,
    TransactionCompleted,
    UserRefresh,
    ApprovalRevoked,
}

impl RefreshReason {
    /// Whether this reason skips the cooldown
    pub fn is_forced(&self) -> bool {
        matches!(self, RefreshReason::UserRefresh | RefreshReason::ApprovalRevoked)
    }
}

/// Fan-out of refresh requests to registered listeners
pub struct RefreshSignal {
    /// Sequence number keeps repeated reasons distinct for the strict store
    last: Store<Option<(u64, RefreshReason)>>,
    seq: AtomicU64,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self {
            last: Store::new(None),
            seq: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, reason: RefreshReason) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.last.set(Some((seq, reason)));
    }

    pub fn subscribe(&self, f: impl Fn(RefreshReason) + Send + Sync + 'static) -> SubscriptionId {
        self.last.subscribe(move |last| {
            if let Some((_, reason)) = last {
                f(*reason);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.last.unsubscribe(id)
    }

    /// Most recent request, if any
    pub fn last(&self) -> Option<RefreshReason> {
        self.last.with(|last| last.map(|(_, reason)| reason))
    }
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap handle UI code can hold to request refreshes without awaiting them
#[derive(Clone)]
pub struct RefreshHandle {
    alerts: Arc<ApprovalAlerts>,
}

impl RefreshHandle {
    pub fn new(alerts: Arc<ApprovalAlerts>) -> Self {
        Self { alerts }
    }

    /// Fire and forget. The join handle resolves to whether a cycle ran.
    pub fn request(&self, reason: RefreshReason) -> JoinHandle<bool> {
        let alerts = Arc::clone(&self.alerts);
        tokio::spawn(async move { alerts.refresh(reason).await })
    }

    pub async fn refresh(&self, reason: RefreshReason) -> bool {
        self.alerts.refresh(reason).await
    }
}

/// Request a `Poll` refresh every `interval` until the handle is aborted.
/// The first tick fires immediately; the cooldown absorbs it if a recent
/// cycle already ran.
pub fn spawn_poller(handle: RefreshHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if handle.refresh(RefreshReason::Poll).await {
                log::debug!("[ApprovalAlerts] poll refresh ran");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::StaticAccounts;
    use crate::api::{ApprovalApi, ApprovalCount, ApprovalStatus};
    use crate::config::ApprovalConfig;
    use crate::cooldown::{Clock, SystemClock};
    use crate::error::ApiError;
    use crate::keyring::{Account, KeyringType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct OneAlertApi;

    #[async_trait]
    impl ApprovalApi for OneAlertApi {
        async fn get_approval_status(&self, _address: &str) -> Result<Vec<ApprovalStatus>, ApiError> {
            Ok(vec![ApprovalStatus {
                chain: "eth".to_string(),
                token_approval_danger_cnt: 1,
                nft_approval_danger_cnt: 0,
            }])
        }

        async fn get_approval_count(&self, _address: &str) -> Result<ApprovalCount, ApiError> {
            Ok(ApprovalCount::default())
        }
    }

    fn alerts() -> Arc<ApprovalAlerts> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Arc::new(ApprovalAlerts::new(
            Arc::new(OneAlertApi),
            Arc::new(StaticAccounts::new(vec![Account::new("0x1", KeyringType::Hd)])),
            &ApprovalConfig::default(),
            clock,
        ))
    }

    #[test]
    fn test_forced_reasons() {
        assert!(RefreshReason::UserRefresh.is_forced());
        assert!(RefreshReason::ApprovalRevoked.is_forced());
        assert!(!RefreshReason::ScreenFocus.is_forced());
        assert!(!RefreshReason::TransactionCompleted.is_forced());
        assert!(!RefreshReason::Requested.is_forced());
    }

    #[test]
    fn test_signal_repeats_same_reason() {
        let signal = RefreshSignal::new();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        let id = signal.subscribe(move |reason| sink.lock().unwrap().push(reason));

        signal.emit(RefreshReason::Poll);
        signal.emit(RefreshReason::Poll);
        assert!(signal.unsubscribe(id));
        signal.emit(RefreshReason::AccountsChanged);

        assert_eq!(*heard.lock().unwrap(), vec![RefreshReason::Poll, RefreshReason::Poll]);
        assert_eq!(signal.last(), Some(RefreshReason::AccountsChanged));
    }

    #[tokio::test]
    async fn test_request_runs_in_background() {
        let alerts = alerts();
        let handle = RefreshHandle::new(Arc::clone(&alerts));

        assert!(handle.request(RefreshReason::UserRefresh).await.unwrap());
        assert_eq!(alerts.alert_info().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_is_absorbed_by_cooldown() {
        let alerts = alerts();
        let poller = spawn_poller(RefreshHandle::new(Arc::clone(&alerts)), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(550)).await;
        poller.abort();

        // default cooldown is a minute of wall clock, so only the first tick ran
        assert_eq!(alerts.cycles_run(), 1);
        assert_eq!(alerts.alert_info().total, 1);
    }
}
