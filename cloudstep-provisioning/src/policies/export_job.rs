//! Snapshot export job lifecycle
//!
//! ```text
//! create: EXPORTING ─completion state─▶ done
//! delete: [DELETING ─finished or 404─▶] done
//! ```
//!
//! Export jobs cannot be removed from the control plane. Deleting one only
//! waits for a running export to finish.

use std::sync::Arc;

use async_trait::async_trait;
use cloudstep_models::{ExportJobModel, ExportJobRequest, RemoteExportJob};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{observe_result, required};
use crate::context::PhaseTag;
use crate::controller::{Observation, PhasePolicy, Transition};
use crate::error::{ProvisionError, Result};
use crate::gateway::ExportJobGateway;
use crate::names::families;
use crate::types::Operation;

const STATE_CANCELLED: &str = "Cancelled";
const STATE_FAILED: &str = "Failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportJobPhase {
    Exporting,
    Deleting,
}

impl PhaseTag for ExportJobPhase {
    fn as_str(&self) -> &'static str {
        match self {
            ExportJobPhase::Exporting => "EXPORTING",
            ExportJobPhase::Deleting => "DELETING",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "EXPORTING" => Some(ExportJobPhase::Exporting),
            "DELETING" => Some(ExportJobPhase::Deleting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExportJobIds {
    pub project_id: String,
    pub cluster_name: String,
    pub export_id: String,
}

pub struct ExportJobPolicy {
    gateway: Arc<dyn ExportJobGateway>,
    operation: Operation,
    completion_state: String,
}

impl ExportJobPolicy {
    pub fn new(gateway: Arc<dyn ExportJobGateway>, operation: Operation, completion_state: impl Into<String>) -> Self {
        Self {
            gateway,
            operation,
            completion_state: completion_state.into(),
        }
    }

    fn is_finished(&self, job: &RemoteExportJob) -> bool {
        job.state == self.completion_state || job.state == STATE_FAILED || job.state == STATE_CANCELLED
    }
}

pub fn merge_remote(mut model: ExportJobModel, remote: &RemoteExportJob) -> ExportJobModel {
    model.export_id = Some(remote.id.clone());
    model.created_at = remote.created_at.clone();
    model.finished_at = remote.finished_at.clone();
    model.prefix = remote.prefix.clone();
    model.state = Some(remote.state.clone());
    model.export_status = remote.export_status.clone();
    if remote.snapshot_id.is_some() {
        model.snapshot_id = remote.snapshot_id.clone();
    }
    if remote.export_bucket_id.is_some() {
        model.export_bucket_id = remote.export_bucket_id.clone();
    }
    if !remote.custom_data.is_empty() {
        model.custom_data = Some(remote.custom_data.clone());
    }
    model
}

pub async fn read(gateway: &dyn ExportJobGateway, model: &ExportJobModel) -> Result<ExportJobModel> {
    let project_id = required(&model.project_id, "projectId")?;
    let cluster_name = required(&model.cluster_name, "clusterName")?;
    let export_id = required(&model.export_id, "exportId")?;
    match gateway.get_export(project_id, cluster_name, export_id).await {
        Ok(job) => Ok(merge_remote(model.clone(), &job)),
        Err(e) if e.is_not_found() => Err(ProvisionError::NotFound(format!("export job {} not found", export_id))),
        Err(e) => Err(e.into()),
    }
}

pub async fn list(gateway: &dyn ExportJobGateway, project_id: &str, cluster_name: &str) -> Result<Vec<ExportJobModel>> {
    let jobs = gateway.list_exports(project_id, cluster_name).await?;
    Ok(jobs
        .iter()
        .map(|job| {
            let model = ExportJobModel {
                project_id: Some(project_id.to_string()),
                cluster_name: Some(cluster_name.to_string()),
                ..Default::default()
            };
            merge_remote(model, job)
        })
        .collect())
}

#[async_trait]
impl PhasePolicy for ExportJobPolicy {
    type Model = ExportJobModel;
    type Phase = ExportJobPhase;
    type Ids = ExportJobIds;
    type Remote = RemoteExportJob;

    fn family(&self) -> &'static str {
        families::EXPORT_JOB
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn resource_label(&self) -> &'static str {
        "export job"
    }

    fn validate(&self, model: &ExportJobModel) -> Result<()> {
        required(&model.project_id, "projectId")?;
        required(&model.cluster_name, "clusterName")?;
        match self.operation {
            Operation::Create => {
                required(&model.snapshot_id, "snapshotId")?;
                required(&model.export_bucket_id, "exportBucketId")?;
                Ok(())
            }
            Operation::Delete => required(&model.export_id, "exportId").map(|_| ()),
            Operation::Update => Err(ProvisionError::validation("export jobs cannot be updated")),
        }
    }

    async fn inspect(&self, model: &ExportJobModel) -> Result<Option<Observation<RemoteExportJob>>> {
        if self.operation != Operation::Delete {
            return Ok(None);
        }
        let current = self
            .gateway
            .get_export(
                required(&model.project_id, "projectId")?,
                required(&model.cluster_name, "clusterName")?,
                required(&model.export_id, "exportId")?,
            )
            .await;
        observe_result(current).map(Some)
    }

    async fn begin(
        &self,
        model: &ExportJobModel,
        current: Option<&RemoteExportJob>,
    ) -> Result<Transition<ExportJobPhase, ExportJobIds, ExportJobModel>> {
        let project_id = required(&model.project_id, "projectId")?.to_string();
        let cluster_name = required(&model.cluster_name, "clusterName")?.to_string();

        match (self.operation, current) {
            (Operation::Create, _) => {
                let request = ExportJobRequest {
                    snapshot_id: required(&model.snapshot_id, "snapshotId")?.to_string(),
                    export_bucket_id: required(&model.export_bucket_id, "exportBucketId")?.to_string(),
                    custom_data: model.custom_data.clone().unwrap_or_default(),
                };
                info!(project_id = %project_id, cluster = %cluster_name, snapshot_id = %request.snapshot_id, "Creating export job");
                let job = self.gateway.create_export(&project_id, &cluster_name, &request).await?;
                Ok(Transition::Continue {
                    phase: ExportJobPhase::Exporting,
                    ids: ExportJobIds {
                        project_id,
                        cluster_name,
                        export_id: job.id,
                    },
                    message: format!("Export job created, state {}", job.state),
                })
            }
            (Operation::Delete, Some(job)) if self.is_finished(job) => Ok(Transition::Complete {
                model: None,
                message: format!("Export job {} already {}", job.id, job.state),
            }),
            (Operation::Delete, Some(job)) => Ok(Transition::Continue {
                phase: ExportJobPhase::Deleting,
                ids: ExportJobIds {
                    project_id,
                    cluster_name,
                    export_id: job.id.clone(),
                },
                message: format!("Waiting for export job {} to finish", job.id),
            }),
            (operation, _) => Err(ProvisionError::validation(format!(
                "unsupported export job operation: {}",
                operation
            ))),
        }
    }

    async fn observe(&self, _phase: ExportJobPhase, ids: &ExportJobIds) -> Result<Observation<RemoteExportJob>> {
        observe_result(
            self.gateway
                .get_export(&ids.project_id, &ids.cluster_name, &ids.export_id)
                .await,
        )
    }

    fn awaits_absence(&self, phase: ExportJobPhase) -> bool {
        phase == ExportJobPhase::Deleting
    }

    fn is_terminal_success(&self, phase: ExportJobPhase, remote: &RemoteExportJob) -> bool {
        match phase {
            ExportJobPhase::Exporting => remote.state == self.completion_state,
            ExportJobPhase::Deleting => self.is_finished(remote),
        }
    }

    fn is_terminal_failure(&self, phase: ExportJobPhase, remote: &RemoteExportJob) -> Option<String> {
        match phase {
            ExportJobPhase::Exporting if remote.state == STATE_CANCELLED || remote.state == STATE_FAILED => {
                Some(format!("Export job {} is {}", remote.id, remote.state))
            }
            _ => None,
        }
    }

    async fn advance(
        &self,
        phase: ExportJobPhase,
        _ids: ExportJobIds,
        model: &ExportJobModel,
        remote: Option<&RemoteExportJob>,
    ) -> Result<Transition<ExportJobPhase, ExportJobIds, ExportJobModel>> {
        match (phase, remote) {
            (ExportJobPhase::Exporting, Some(job)) => Ok(Transition::Complete {
                model: Some(merge_remote(model.clone(), job)),
                message: format!("Export job {} completed", job.id),
            }),
            (ExportJobPhase::Exporting, None) => Err(ProvisionError::NotFound("export job not found".to_string())),
            (ExportJobPhase::Deleting, _) => Ok(Transition::Complete {
                model: None,
                message: "Export job finished".to_string(),
            }),
        }
    }
}
