//! Cluster models

use serde::{Deserialize, Serialize};

use crate::Label;

/// Desired configuration for a database cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
    /// Project that owns the cluster
    pub project_id: Option<String>,
    /// Cluster name, unique within the project
    pub name: Option<String>,
    /// REPLICASET, SHARDED or GEOSHARDED
    pub cluster_type: Option<String>,
    #[serde(rename = "mongoDBMajorVersion")]
    pub mongo_db_major_version: Option<String>,
    pub replication_specs: Option<Vec<ReplicationSpec>>,
    pub backup_enabled: Option<bool>,
    pub termination_protection_enabled: Option<bool>,
    /// Desired paused flag, applied once the cluster is idle
    pub paused: Option<bool>,
    pub labels: Option<Vec<Label>>,
    /// Process arguments, applied once the cluster is idle
    pub advanced_settings: Option<ProcessArgs>,

    // Server-assigned, read back from the control plane
    pub id: Option<String>,
    pub state_name: Option<String>,
    pub created_date: Option<String>,
    #[serde(rename = "mongoDBVersion")]
    pub mongo_db_version: Option<String>,
    pub connection_strings: Option<ConnectionStrings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub region_configs: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    pub provider_name: String,
    pub region_name: String,
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electable_specs: Option<HardwareSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_specs: Option<HardwareSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    pub instance_size: String,
    pub node_count: u32,
}

/// Advanced configuration applied through the process-args endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_read_concern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_write_concern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_index_key_too_long: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub javascript_enabled: Option<bool>,
    #[serde(rename = "minimumEnabledTlsProtocol", skip_serializing_if = "Option::is_none")]
    pub minimum_enabled_tls_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_table_scan: Option<bool>,
    #[serde(rename = "oplogSizeMB", skip_serializing_if = "Option::is_none")]
    pub oplog_size_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_size_bi_connector: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_refresh_interval_bi_connector: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStrings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_srv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_srv: Option<String>,
}

/// Request body for cluster create and update calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    #[serde(rename = "mongoDBMajorVersion", skip_serializing_if = "Option::is_none")]
    pub mongo_db_major_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_specs: Option<Vec<ReplicationSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_protection_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

impl ClusterModel {
    /// Build the create/update request body from the desired model.
    ///
    /// `paused` is never sent here; it is applied in its own call once the
    /// cluster is idle.
    pub fn to_request(&self) -> ClusterRequest {
        ClusterRequest {
            name: self.name.clone(),
            cluster_type: self.cluster_type.clone(),
            mongo_db_major_version: self.mongo_db_major_version.clone(),
            replication_specs: self.replication_specs.clone(),
            backup_enabled: self.backup_enabled,
            termination_protection_enabled: self.termination_protection_enabled,
            paused: None,
            labels: self.labels.clone(),
        }
    }
}

/// Cluster as returned by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCluster {
    pub id: Option<String>,
    pub name: String,
    pub group_id: Option<String>,
    pub state_name: String,
    pub cluster_type: Option<String>,
    pub paused: Option<bool>,
    pub created_date: Option<String>,
    #[serde(rename = "mongoDBVersion")]
    pub mongo_db_version: Option<String>,
    #[serde(rename = "mongoDBMajorVersion")]
    pub mongo_db_major_version: Option<String>,
    pub connection_strings: Option<ConnectionStrings>,
    pub replication_specs: Option<Vec<ReplicationSpec>>,
    pub backup_enabled: Option<bool>,
    pub termination_protection_enabled: Option<bool>,
    #[serde(default)]
    pub labels: Vec<Label>,
}
