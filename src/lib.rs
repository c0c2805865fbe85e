//! Approval counts and risk alerts for a multi-account wallet.
//!
//! Two aggregators share the same building blocks: a rate and concurrency
//! bounded [`queue::TaskQueue`], a drain [`barrier`], a subscribable
//! [`store::Store`] and a [`cooldown::Cooldown`]. [`approvals_count`] fetches
//! per-account approval counts on demand; [`alerts`] keeps a debounced total of
//! risky approvals across the user's own accounts.

pub mod alerts;
pub mod api;
pub mod approvals_count;
pub mod barrier;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod keyring;
pub mod queue;
pub mod service;
pub mod store;
pub mod triggers;

pub use alerts::{AccountSource, ApprovalAlerts, ApprovalsAlert, StaticAccounts};
pub use api::{ApprovalApi, ApprovalCount, ApprovalStatus, OpenApiClient};
pub use approvals_count::{AddressCounts, ApprovalCounter};
pub use config::{ApprovalConfig, QueueConfig};
pub use error::{AlertError, ApiError, ApiErrorKind, ConfigError};
pub use keyring::{Account, KeyringType};
pub use service::ApprovalService;
pub use triggers::{RefreshHandle, RefreshReason};
