//! Cloud backup export job models

use serde::{Deserialize, Serialize};

/// Desired configuration for a snapshot export job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobModel {
    pub project_id: Option<String>,
    pub cluster_name: Option<String>,
    pub snapshot_id: Option<String>,
    pub export_bucket_id: Option<String>,
    pub custom_data: Option<Vec<CustomData>>,

    // Server-assigned
    pub export_id: Option<String>,
    pub created_at: Option<String>,
    pub finished_at: Option<String>,
    pub prefix: Option<String>,
    pub state: Option<String>,
    pub export_status: Option<ExportStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomData {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportStatus {
    pub exported_collections: Option<u64>,
    pub total_collections: Option<u64>,
}

/// Request body for the create call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobRequest {
    pub snapshot_id: String,
    pub export_bucket_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_data: Vec<CustomData>,
}

/// Export job as returned by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteExportJob {
    pub id: String,
    pub snapshot_id: Option<String>,
    pub export_bucket_id: Option<String>,
    pub created_at: Option<String>,
    pub finished_at: Option<String>,
    pub prefix: Option<String>,
    /// Queued, InProgress, Successful, Failed or Cancelled
    pub state: String,
    pub export_status: Option<ExportStatus>,
    #[serde(default)]
    pub custom_data: Vec<CustomData>,
}
