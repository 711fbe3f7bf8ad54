//! Cluster lifecycle
//!
//! ```text
//! create: CREATING ─IDLE─▶ [CONFIGURING ─IDLE─▶] [PAUSING ─IDLE+paused─▶] done
//! update: UPDATING ─IDLE─▶ [CONFIGURING ─IDLE─▶] [PAUSING ─IDLE+paused─▶] done
//! delete: DELETING ─DELETED or 404─▶ done
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use cloudstep_models::{ClusterModel, ClusterRequest, Label, RemoteCluster};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{observe_result, required};
use crate::context::PhaseTag;
use crate::controller::{Observation, PhasePolicy, Transition};
use crate::error::{ProvisionError, Result};
use crate::gateway::ClusterGateway;
use crate::names::families;
use crate::types::Operation;

pub const STATE_IDLE: &str = "IDLE";
pub const STATE_DELETING: &str = "DELETING";
pub const STATE_DELETED: &str = "DELETED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Creating,
    Updating,
    Configuring,
    Pausing,
    Deleting,
}

impl PhaseTag for ClusterPhase {
    fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Creating => "CREATING",
            ClusterPhase::Updating => "UPDATING",
            ClusterPhase::Configuring => "CONFIGURING",
            ClusterPhase::Pausing => "PAUSING",
            ClusterPhase::Deleting => "DELETING",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "CREATING" => Some(ClusterPhase::Creating),
            "UPDATING" => Some(ClusterPhase::Updating),
            "CONFIGURING" => Some(ClusterPhase::Configuring),
            "PAUSING" => Some(ClusterPhase::Pausing),
            "DELETING" => Some(ClusterPhase::Deleting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterIds {
    pub project_id: String,
    pub cluster_name: String,
    /// Paused flag the PAUSING phase waits for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_paused: Option<bool>,
}

pub struct ClusterPolicy {
    gateway: Arc<dyn ClusterGateway>,
    operation: Operation,
    reserved_label: Label,
}

impl ClusterPolicy {
    pub fn new(gateway: Arc<dyn ClusterGateway>, operation: Operation, reserved_label: Label) -> Self {
        Self {
            gateway,
            operation,
            reserved_label,
        }
    }

    fn ids(model: &ClusterModel) -> Result<ClusterIds> {
        Ok(ClusterIds {
            project_id: required(&model.project_id, "projectId")?.to_string(),
            cluster_name: required(&model.name, "name")?.to_string(),
            target_paused: None,
        })
    }

    /// Follow-ups that run once the cluster is idle: process args, then pause.
    async fn after_idle(
        &self,
        phase: ClusterPhase,
        ids: ClusterIds,
        model: &ClusterModel,
        remote: &RemoteCluster,
    ) -> Result<Transition<ClusterPhase, ClusterIds, ClusterModel>> {
        if matches!(phase, ClusterPhase::Creating | ClusterPhase::Updating) {
            if let Some(args) = &model.advanced_settings {
                info!(cluster = %ids.cluster_name, "Applying advanced settings");
                self.gateway
                    .update_process_args(&ids.project_id, &ids.cluster_name, args)
                    .await?;
                return Ok(Transition::Continue {
                    phase: ClusterPhase::Configuring,
                    ids,
                    message: "Applying advanced configuration".to_string(),
                });
            }
        }

        if phase != ClusterPhase::Pausing {
            if let Some(paused) = model.paused {
                if remote.paused.unwrap_or(false) != paused {
                    info!(cluster = %ids.cluster_name, paused, "Changing paused state");
                    let request = ClusterRequest {
                        paused: Some(paused),
                        ..Default::default()
                    };
                    self.gateway
                        .update_cluster(&ids.project_id, &ids.cluster_name, &request)
                        .await?;
                    return Ok(Transition::Continue {
                        phase: ClusterPhase::Pausing,
                        ids: ClusterIds {
                            target_paused: Some(paused),
                            ..ids
                        },
                        message: format!("Setting paused to {}", paused),
                    });
                }
            }
        }

        Ok(Transition::Complete {
            model: Some(merge_remote(model.clone(), remote, &self.reserved_label)),
            message: format!("Cluster {} is {}", ids.cluster_name, remote.state_name),
        })
    }
}

/// Copy server-assigned fields from the remote cluster onto the desired model.
pub fn merge_remote(mut model: ClusterModel, remote: &RemoteCluster, reserved: &Label) -> ClusterModel {
    model.id = remote.id.clone();
    model.state_name = Some(remote.state_name.clone());
    model.created_date = remote.created_date.clone();
    model.mongo_db_version = remote.mongo_db_version.clone();
    model.connection_strings = remote.connection_strings.clone();
    if remote.paused.is_some() {
        model.paused = remote.paused;
    }
    let labels: Vec<Label> = remote
        .labels
        .iter()
        .filter(|label| label.key != reserved.key)
        .cloned()
        .collect();
    if !labels.is_empty() {
        model.labels = Some(labels);
    }
    model
}

/// Full model built from a remote cluster, used by read and list.
pub fn model_from_remote(project_id: &str, remote: &RemoteCluster, reserved: &Label) -> ClusterModel {
    let model = ClusterModel {
        project_id: Some(project_id.to_string()),
        name: Some(remote.name.clone()),
        cluster_type: remote.cluster_type.clone(),
        mongo_db_major_version: remote.mongo_db_major_version.clone(),
        replication_specs: remote.replication_specs.clone(),
        backup_enabled: remote.backup_enabled,
        termination_protection_enabled: remote.termination_protection_enabled,
        ..Default::default()
    };
    merge_remote(model, remote, reserved)
}

pub async fn read(
    gateway: &dyn ClusterGateway,
    reserved: &Label,
    model: &ClusterModel,
) -> Result<ClusterModel> {
    let ids = ClusterPolicy::ids(model)?;
    match gateway.get_cluster(&ids.project_id, &ids.cluster_name).await {
        Ok(remote) => Ok(merge_remote(model.clone(), &remote, reserved)),
        Err(e) if e.is_not_found() => Err(ProvisionError::NotFound(format!(
            "cluster {} not found",
            ids.cluster_name
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn list(gateway: &dyn ClusterGateway, reserved: &Label, project_id: &str) -> Result<Vec<ClusterModel>> {
    let clusters = gateway.list_clusters(project_id).await?;
    Ok(clusters
        .iter()
        .map(|remote| model_from_remote(project_id, remote, reserved))
        .collect())
}

#[async_trait]
impl PhasePolicy for ClusterPolicy {
    type Model = ClusterModel;
    type Phase = ClusterPhase;
    type Ids = ClusterIds;
    type Remote = RemoteCluster;

    fn family(&self) -> &'static str {
        families::CLUSTER
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn resource_label(&self) -> &'static str {
        "cluster"
    }

    fn validate(&self, model: &ClusterModel) -> Result<()> {
        Self::ids(model)?;
        if self.operation == Operation::Delete {
            return Ok(());
        }

        if let Some(specs) = &model.replication_specs {
            if model.cluster_type.is_none() || specs.iter().any(|spec| spec.num_shards.is_none()) {
                return Err(ProvisionError::validation(
                    "clusterType and numShards must be set when replicationSpecs is set",
                ));
            }
        }

        let reserved = &self.reserved_label.key;
        if model.labels.iter().flatten().any(|label| &label.key == reserved) {
            return Err(ProvisionError::validation(format!(
                "you should not set `{}` label, it is used for internal purposes",
                reserved
            )));
        }
        Ok(())
    }

    async fn inspect(&self, model: &ClusterModel) -> Result<Option<Observation<RemoteCluster>>> {
        if self.operation == Operation::Create {
            return Ok(None);
        }
        let ids = Self::ids(model)?;
        let current = self.gateway.get_cluster(&ids.project_id, &ids.cluster_name).await;
        observe_result(current).map(Some)
    }

    async fn begin(
        &self,
        model: &ClusterModel,
        _current: Option<&RemoteCluster>,
    ) -> Result<Transition<ClusterPhase, ClusterIds, ClusterModel>> {
        let ids = Self::ids(model)?;
        match self.operation {
            Operation::Create => {
                let mut request = model.to_request();
                let mut labels = request.labels.take().unwrap_or_default();
                labels.push(self.reserved_label.clone());
                request.labels = Some(labels);

                info!(project_id = %ids.project_id, cluster = %ids.cluster_name, "Creating cluster");
                self.gateway.create_cluster(&ids.project_id, &request).await?;
                Ok(Transition::Continue {
                    phase: ClusterPhase::Creating,
                    ids,
                    message: "Cluster creation requested".to_string(),
                })
            }
            Operation::Update => {
                info!(project_id = %ids.project_id, cluster = %ids.cluster_name, "Updating cluster");
                self.gateway
                    .update_cluster(&ids.project_id, &ids.cluster_name, &model.to_request())
                    .await?;
                Ok(Transition::Continue {
                    phase: ClusterPhase::Updating,
                    ids,
                    message: "Cluster update requested".to_string(),
                })
            }
            Operation::Delete => {
                info!(project_id = %ids.project_id, cluster = %ids.cluster_name, "Deleting cluster");
                match self.gateway.delete_cluster(&ids.project_id, &ids.cluster_name).await {
                    Err(e) if e.is_not_found() => Ok(Transition::Complete {
                        model: None,
                        message: "cluster does not exist".to_string(),
                    }),
                    Err(e) => Err(e.into()),
                    Ok(()) => Ok(Transition::Continue {
                        phase: ClusterPhase::Deleting,
                        ids,
                        message: "Cluster deletion requested".to_string(),
                    }),
                }
            }
        }
    }

    async fn observe(&self, _phase: ClusterPhase, ids: &ClusterIds) -> Result<Observation<RemoteCluster>> {
        observe_result(self.gateway.get_cluster(&ids.project_id, &ids.cluster_name).await)
    }

    fn awaits_absence(&self, phase: ClusterPhase) -> bool {
        phase == ClusterPhase::Deleting
    }

    fn is_terminal_success(&self, phase: ClusterPhase, remote: &RemoteCluster) -> bool {
        match phase {
            ClusterPhase::Deleting => remote.state_name == STATE_DELETED,
            _ => remote.state_name == STATE_IDLE,
        }
    }

    fn is_terminal_failure(&self, phase: ClusterPhase, remote: &RemoteCluster) -> Option<String> {
        let state = remote.state_name.as_str();
        if phase != ClusterPhase::Deleting && (state == STATE_DELETING || state == STATE_DELETED) {
            return Some(format!(
                "Cluster {} entered {} state while waiting for {}",
                remote.name, state, STATE_IDLE
            ));
        }
        None
    }

    async fn advance(
        &self,
        phase: ClusterPhase,
        ids: ClusterIds,
        model: &ClusterModel,
        remote: Option<&RemoteCluster>,
    ) -> Result<Transition<ClusterPhase, ClusterIds, ClusterModel>> {
        match (phase, remote) {
            (ClusterPhase::Deleting, _) => Ok(Transition::Complete {
                model: None,
                message: format!("Cluster {} deleted", ids.cluster_name),
            }),
            (ClusterPhase::Pausing, Some(remote)) if Some(remote.paused.unwrap_or(false)) != ids.target_paused => {
                // Still idle from before the change; keep waiting
                Ok(Transition::Continue {
                    phase,
                    message: format!("Waiting for paused to become {:?}", ids.target_paused),
                    ids,
                })
            }
            (_, Some(remote)) => self.after_idle(phase, ids, model, remote).await,
            (_, None) => Err(ProvisionError::NotFound(format!(
                "cluster {} not found",
                ids.cluster_name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use crate::error::{GatewayError, GatewayResult};
    use crate::policies::testing::*;
    use crate::types::ErrorCategory;
    use cloudstep_models::{ConnectionStrings, ProcessArgs, ReplicationSpec};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeClusters {
        gets: Mutex<VecDeque<GatewayResult<RemoteCluster>>>,
        delete_result: Mutex<Option<GatewayError>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClusters {
        fn with_gets(gets: Vec<GatewayResult<RemoteCluster>>) -> Arc<Self> {
            Arc::new(Self {
                gets: Mutex::new(gets.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    #[async_trait]
    impl ClusterGateway for FakeClusters {
        async fn create_cluster(&self, _project_id: &str, request: &ClusterRequest) -> GatewayResult<RemoteCluster> {
            let labels = request.labels.clone().unwrap_or_default();
            self.record(&format!("create labels={}", labels.len()));
            Ok(cluster("CREATING"))
        }

        async fn get_cluster(&self, _project_id: &str, _name: &str) -> GatewayResult<RemoteCluster> {
            self.record("get");
            self.gets
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GatewayError::not_found("no such cluster")))
        }

        async fn update_cluster(&self, _project_id: &str, _name: &str, request: &ClusterRequest) -> GatewayResult<RemoteCluster> {
            match request.paused {
                Some(paused) => self.record(&format!("update paused={}", paused)),
                None => self.record("update"),
            }
            Ok(cluster("UPDATING"))
        }

        async fn delete_cluster(&self, _project_id: &str, _name: &str) -> GatewayResult<()> {
            self.record("delete");
            match self.delete_result.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn list_clusters(&self, _project_id: &str) -> GatewayResult<Vec<RemoteCluster>> {
            self.record("list");
            Ok(vec![cluster("IDLE")])
        }

        async fn update_process_args(&self, _project_id: &str, _name: &str, args: &ProcessArgs) -> GatewayResult<ProcessArgs> {
            self.record("process-args");
            Ok(args.clone())
        }
    }

    fn cluster(state: &str) -> RemoteCluster {
        RemoteCluster {
            id: Some("65f0c0ffee".to_string()),
            name: "orders".to_string(),
            state_name: state.to_string(),
            paused: Some(false),
            created_date: Some("2024-05-01T10:00:00Z".to_string()),
            mongo_db_version: Some("7.0.5".to_string()),
            connection_strings: Some(ConnectionStrings {
                standard_srv: Some("mongodb+srv://orders.abcde.mongodb.net".to_string()),
                ..Default::default()
            }),
            labels: vec![reserved()],
            ..Default::default()
        }
    }

    fn reserved() -> Label {
        Label {
            key: "Infrastructure Tool".to_string(),
            value: "cloudstep".to_string(),
        }
    }

    fn model() -> ClusterModel {
        ClusterModel {
            project_id: Some("p1".to_string()),
            name: Some("orders".to_string()),
            cluster_type: Some("REPLICASET".to_string()),
            // Caller-supplied server fields must be overwritten
            id: Some("client-made-up".to_string()),
            state_name: Some("WHATEVER".to_string()),
            ..Default::default()
        }
    }

    fn controller(gateway: Arc<FakeClusters>, operation: Operation) -> Controller<ClusterPolicy> {
        Controller::new(ClusterPolicy::new(gateway, operation, reserved()), config())
    }

    #[tokio::test]
    async fn test_create_first_step_is_in_progress() {
        let gateway = FakeClusters::with_gets(vec![]);
        let outcome = controller(gateway.clone(), Operation::Create)
            .step(&no_context(), &model())
            .await;

        assert_eq!(phase_of(&outcome), "CREATING");
        let context = context_of(&outcome);
        assert_eq!(context["projectId"], "p1");
        assert_eq!(context["clusterName"], "orders");
        // Reserved label is stamped on create
        assert_eq!(gateway.calls(), vec!["create labels=1"]);
    }

    #[tokio::test]
    async fn test_create_polls_until_idle_and_reads_back_server_fields() {
        let gateway = FakeClusters::with_gets(vec![Ok(cluster("CREATING")), Ok(cluster("IDLE"))]);
        let controller = controller(gateway.clone(), Operation::Create);

        let first = controller.step(&no_context(), &model()).await;
        let second = controller.step(&context_of(&first), &model()).await;
        assert_eq!(context_of(&second), context_of(&first));

        let done = controller.step(&context_of(&second), &model()).await;
        let result = success_model(&done).unwrap();
        assert_eq!(result.state_name.as_deref(), Some("IDLE"));
        assert_eq!(result.id.as_deref(), Some("65f0c0ffee"));
        assert_eq!(result.mongo_db_version.as_deref(), Some("7.0.5"));
        assert_eq!(
            result.connection_strings.unwrap().standard_srv.as_deref(),
            Some("mongodb+srv://orders.abcde.mongodb.net")
        );
        // Reserved label is not echoed back
        assert!(result.labels.is_none());
    }

    #[tokio::test]
    async fn test_create_applies_settings_then_pause_one_call_per_step() {
        let mut paused = cluster("IDLE");
        paused.paused = Some(true);
        let gateway = FakeClusters::with_gets(vec![
            Ok(cluster("IDLE")),
            Ok(cluster("IDLE")),
            Ok(cluster("IDLE")),
            Ok(paused),
        ]);
        let controller = controller(gateway.clone(), Operation::Create);
        let desired = ClusterModel {
            advanced_settings: Some(ProcessArgs {
                javascript_enabled: Some(false),
                ..Default::default()
            }),
            paused: Some(true),
            ..model()
        };

        let step = controller.step(&no_context(), &desired).await;
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "CONFIGURING");
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "PAUSING");
        assert_eq!(context_of(&step)["targetPaused"], true);

        // Idle but not yet paused
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "PAUSING");

        let done = controller.step(&context_of(&step), &desired).await;
        assert_eq!(success_model(&done).unwrap().paused, Some(true));
        assert_eq!(
            gateway.calls(),
            vec!["create labels=1", "get", "process-args", "get", "update paused=true", "get", "get"]
        );
    }

    #[tokio::test]
    async fn test_replication_specs_require_cluster_type() {
        let gateway = FakeClusters::with_gets(vec![]);
        let desired = ClusterModel {
            cluster_type: None,
            replication_specs: Some(vec![ReplicationSpec {
                num_shards: Some(1),
                ..Default::default()
            }]),
            ..model()
        };
        let outcome = controller(gateway.clone(), Operation::Create)
            .step(&no_context(), &desired)
            .await;

        let (message, category, retryable) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::Validation);
        assert!(!retryable);
        assert!(message.contains("clusterType and numShards"));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_label_is_rejected() {
        let gateway = FakeClusters::with_gets(vec![]);
        let desired = ClusterModel {
            labels: Some(vec![reserved()]),
            ..model()
        };
        let outcome = controller(gateway.clone(), Operation::Update)
            .step(&no_context(), &desired)
            .await;

        let (message, category, _) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::Validation);
        assert_eq!(
            message,
            "you should not set `Infrastructure Tool` label, it is used for internal purposes"
        );
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_waits_for_404() {
        let gateway = FakeClusters::with_gets(vec![Ok(cluster("IDLE")), Ok(cluster("DELETING"))]);
        let controller = controller(gateway.clone(), Operation::Delete);

        let step = controller.step(&no_context(), &model()).await;
        assert_eq!(phase_of(&step), "DELETING");
        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "DELETING");

        // Script exhausted, so the next get is a 404
        let done = controller.step(&context_of(&step), &model()).await;
        assert!(success_model(&done).is_none());
        assert_eq!(gateway.calls(), vec!["get", "delete", "get", "get"]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_cluster_succeeds() {
        let gateway = FakeClusters::with_gets(vec![]);
        let outcome = controller(gateway.clone(), Operation::Delete)
            .step(&no_context(), &model())
            .await;

        assert!(success_model(&outcome).is_none());
        assert_eq!(gateway.calls(), vec!["get"]);
    }

    #[tokio::test]
    async fn test_cluster_vanishing_during_create_is_not_found() {
        let gateway = FakeClusters::with_gets(vec![]);
        let controller = controller(gateway.clone(), Operation::Create);
        let step = controller.step(&no_context(), &model()).await;

        let outcome = controller.step(&context_of(&step), &model()).await;
        let (_, category, _) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn test_cluster_deleting_during_create_is_a_remote_failure() {
        let gateway = FakeClusters::with_gets(vec![Ok(cluster("CREATING")), Ok(cluster("DELETING"))]);
        let controller = controller(gateway.clone(), Operation::Create);
        let step = controller.step(&no_context(), &model()).await;
        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "CREATING");

        let outcome = controller.step(&context_of(&step), &model()).await;
        let (message, category, retryable) = failure_of(&outcome);
        assert_eq!(message, "Cluster orders entered DELETING state while waiting for IDLE");
        assert_eq!(category, ErrorCategory::Remote);
        assert!(!retryable);
        assert_eq!(gateway.calls(), vec!["create labels=1", "get", "get"]);
    }

    #[tokio::test]
    async fn test_malformed_phase_is_fatal() {
        let gateway = FakeClusters::with_gets(vec![Ok(cluster("IDLE"))]);
        let controller = controller(gateway.clone(), Operation::Create);
        let step = controller.step(&no_context(), &model()).await;

        let mut context = context_of(&step);
        context.insert("phase".to_string(), "IDLING".into());
        let outcome = controller.step(&context, &model()).await;

        let (message, category, retryable) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::MalformedContext);
        assert!(!retryable);
        assert!(message.contains("IDLING"));
        // Never restarted: no second create, no poll
        assert_eq!(gateway.calls(), vec!["create labels=1"]);
    }

    #[tokio::test]
    async fn test_read_maps_404_to_not_found() {
        let gateway = FakeClusters::with_gets(vec![]);
        let err = read(gateway.as_ref(), &reserved(), &model()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn test_list_builds_models_from_remote() {
        let gateway = FakeClusters::with_gets(vec![]);
        let clusters = list(gateway.as_ref(), &reserved(), "p1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name.as_deref(), Some("orders"));
        assert_eq!(clusters[0].project_id.as_deref(), Some("p1"));
        assert_eq!(clusters[0].state_name.as_deref(), Some("IDLE"));
    }
}
