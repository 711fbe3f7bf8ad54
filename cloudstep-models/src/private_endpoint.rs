//! Private endpoint models
//!
//! A private endpoint spans two control planes: an endpoint service on the
//! database side and an interface endpoint on the network provider side.

use serde::{Deserialize, Serialize};

/// Desired configuration for an AWS private endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointModel {
    #[serde(alias = "groupId")]
    pub project_id: Option<String>,
    /// Provider region, e.g. us-east-1
    pub region: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_ids: Option<Vec<String>>,

    // Server-assigned
    /// Endpoint service id
    pub id: Option<String>,
    pub endpoint_service_name: Option<String>,
    pub status: Option<String>,
    pub error_message: Option<String>,
    /// Provider-side interface endpoint ids attached to the service
    pub interface_endpoints: Option<Vec<String>>,
}

/// Endpoint service statuses
pub mod service_status {
    pub const INITIATING: &str = "INITIATING";
    pub const AVAILABLE: &str = "AVAILABLE";
    pub const DELETING: &str = "DELETING";
}

/// Interface connection statuses
pub mod connection_status {
    pub const PENDING: &str = "PENDING";
    pub const PENDING_ACCEPTANCE: &str = "PENDING_ACCEPTANCE";
    pub const AVAILABLE: &str = "AVAILABLE";
}

/// Endpoint service as returned by the database control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointService {
    pub id: String,
    pub region_name: Option<String>,
    pub endpoint_service_name: Option<String>,
    pub error_message: Option<String>,
    pub status: String,
    #[serde(default)]
    pub interface_endpoints: Vec<String>,
}

/// Interface endpoint attached to a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceEndpoint {
    pub interface_endpoint_id: String,
    pub connection_status: String,
    pub error_message: Option<String>,
    pub delete_requested: Option<bool>,
}

/// Endpoint object on the network provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEndpoint {
    pub id: String,
    /// Provider lifecycle state, e.g. pending, available, deleting, deleted
    pub state: String,
}
