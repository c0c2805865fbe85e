// src/api/types.rs
//! Response shapes returned by the approval API

use serde::{Deserialize, Serialize};

/// Per-chain risk summary for one address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub token_approval_danger_cnt: u64,
    #[serde(default)]
    pub nft_approval_danger_cnt: u64,
}

impl ApprovalStatus {
    pub fn danger_count(&self) -> u64 {
        self.token_approval_danger_cnt
            .saturating_add(self.nft_approval_danger_cnt)
    }
}

/// Sum of both danger counters across every entry
pub fn total_danger_count(statuses: &[ApprovalStatus]) -> u64 {
    statuses
        .iter()
        .fold(0u64, |acc, s| acc.saturating_add(s.danger_count()))
}

/// Number of assets with live approvals for one address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCount {
    pub total_asset_cnt: u64,
}
