//! Desired models and remote wire types for every cloudstep resource family.
//!
//! Desired models are what a caller submits for one resource instance. Remote
//! types mirror what the control planes return and are always re-fetched.

use serde::{Deserialize, Serialize};

pub mod cluster;
pub mod export_job;
pub mod private_endpoint;
pub mod stream_processor;

pub use cluster::*;
pub use export_job::*;
pub use private_endpoint::*;
pub use stream_processor::*;

/// Operation time budgets, as Go-style duration strings ("20m", "1h30m").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
}

/// A key/value tag attached to a remote resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// One page of a paginated list response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_count: u64,
}
