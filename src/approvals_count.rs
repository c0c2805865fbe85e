// src/approvals_count.rs
//! Per-account approval counts, fetched on demand
//!
//! `get_all_approval_count` fans one request per eligible account through its
//! own task queue and merges each answer into a shared address map as it
//! lands. An address absent from the map has not been fetched yet; a failed
//! fetch is recorded as `0`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::ApprovalApi;
use crate::barrier::wait_until_drained;
use crate::config::QueueConfig;
use crate::keyring::{eligible_accounts, Account};
use crate::queue::TaskQueue;
use crate::store::Store;

pub type AddressCounts = HashMap<String, u64>;

type InFlight = Arc<Mutex<HashSet<String>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks one queued fetch. Dropping it without `settle` (timeout, panic)
/// still records the fallback `0` and frees the address for the next call.
struct PendingFetch {
    address: String,
    key: String,
    counts: Arc<Store<AddressCounts>>,
    in_flight: InFlight,
    settled: bool,
}

impl PendingFetch {
    fn settle(mut self, count: u64) {
        self.write(count);
        self.settled = true;
    }

    fn write(&self, count: u64) {
        let address = self.address.clone();
        self.counts.update(move |map| {
            map.insert(address, count);
        });
    }
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        if !self.settled {
            self.write(0);
        }
        lock_in_flight(&self.in_flight).remove(&self.key);
    }
}

pub struct ApprovalCounter {
    api: Arc<dyn ApprovalApi>,
    queue: TaskQueue,
    counts: Arc<Store<AddressCounts>>,
    /// Lowercased addresses with a fetch queued or running
    in_flight: InFlight,
}

impl ApprovalCounter {
    pub fn new(api: Arc<dyn ApprovalApi>, queue_config: &QueueConfig) -> Self {
        Self {
            api,
            queue: TaskQueue::new("approval-count", queue_config),
            counts: Arc::new(Store::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Snapshot of every count fetched so far
    pub fn address_to_count(&self) -> AddressCounts {
        self.counts.read()
    }

    /// `None` until the address has been fetched at least once
    pub fn count_of(&self, address: &str) -> Option<u64> {
        self.counts.with(|map| map.get(address).copied())
    }

    pub fn store(&self) -> &Arc<Store<AddressCounts>> {
        &self.counts
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Fetch counts for the eligible subset of `accounts` and wait for the
    /// queue to drain. Never fails; per-address errors become `0`.
    ///
    /// An address that already has a fetch queued or running is not queued
    /// again; the call still waits for that fetch through the drain.
    pub async fn get_all_approval_count(&self, accounts: &[Account]) {
        let targets = eligible_accounts(accounts);
        if targets.is_empty() {
            return;
        }

        let mut queued = 0usize;
        for account in targets {
            let key = account.address.to_lowercase();
            if !lock_in_flight(&self.in_flight).insert(key.clone()) {
                log::debug!("[Approvals] count for {} already in flight", account.address);
                continue;
            }

            let pending = PendingFetch {
                address: account.address,
                key,
                counts: Arc::clone(&self.counts),
                in_flight: Arc::clone(&self.in_flight),
                settled: false,
            };
            let api = Arc::clone(&self.api);

            self.queue.enqueue(async move {
                let result = api.get_approval_count(&pending.address).await;
                match result {
                    Ok(count) => pending.settle(count.total_asset_cnt),
                    Err(e) => {
                        log::warn!(
                            "[Approvals] failed to fetch approval count for {}: {}",
                            pending.address,
                            e
                        );
                        pending.settle(0);
                    }
                }
                Ok(())
            });
            queued += 1;
        }

        log::debug!("[Approvals] queued {} approval count fetches", queued);
        wait_until_drained(&self.queue).await;
    }
}
