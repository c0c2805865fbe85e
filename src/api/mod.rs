// src/api/mod.rs
//! Remote approval API: response types, the client trait, and the HTTP client

mod client;
mod types;

pub use client::{ApprovalApi, OpenApiClient};
pub use types::*;
