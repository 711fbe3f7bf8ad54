//! Stream processor lifecycle
//!
//! ```text
//! create: CREATING ─CREATED─▶ [STARTING ─STARTED─▶] done
//! update: [STOPPING ─STOPPED─▶] UPDATING ─settled─▶ [STARTING ─STARTED─▶] done
//! delete: DELETING ─404─▶ done
//! ```
//!
//! A started processor must be stopped before its pipeline can change, and
//! creates are time-bounded with optional cleanup.

use std::sync::Arc;

use async_trait::async_trait;
use cloudstep_models::StreamProcessorState as State;
use cloudstep_models::{RemoteStreamProcessor, StreamProcessorModel, StreamProcessorRequest};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{observe_result, required};
use crate::context::PhaseTag;
use crate::controller::{Observation, PhasePolicy, TimeoutSettings, Transition};
use crate::error::{ProvisionError, Result};
use crate::gateway::StreamProcessorGateway;
use crate::names::families;
use crate::types::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProcessorPhase {
    Creating,
    Stopping,
    Updating,
    Starting,
    Deleting,
}

impl PhaseTag for StreamProcessorPhase {
    fn as_str(&self) -> &'static str {
        match self {
            StreamProcessorPhase::Creating => "CREATING",
            StreamProcessorPhase::Stopping => "STOPPING",
            StreamProcessorPhase::Updating => "UPDATING",
            StreamProcessorPhase::Starting => "STARTING",
            StreamProcessorPhase::Deleting => "DELETING",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "CREATING" => Some(StreamProcessorPhase::Creating),
            "STOPPING" => Some(StreamProcessorPhase::Stopping),
            "UPDATING" => Some(StreamProcessorPhase::Updating),
            "STARTING" => Some(StreamProcessorPhase::Starting),
            "DELETING" => Some(StreamProcessorPhase::Deleting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StreamProcessorIds {
    pub project_id: String,
    pub workspace_name: String,
    pub processor_name: String,
    /// Start once the processor settles
    #[serde(default)]
    pub needs_starting: bool,
}

pub struct StreamProcessorPolicy {
    gateway: Arc<dyn StreamProcessorGateway>,
    operation: Operation,
    default_create_timeout: String,
}

impl StreamProcessorPolicy {
    pub fn new(
        gateway: Arc<dyn StreamProcessorGateway>,
        operation: Operation,
        default_create_timeout: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            operation,
            default_create_timeout: default_create_timeout.into(),
        }
    }

    fn ids(model: &StreamProcessorModel) -> Result<StreamProcessorIds> {
        let workspace = model
            .workspace()
            .ok_or_else(|| ProvisionError::validation("workspaceName or instanceName is required"))?;
        Ok(StreamProcessorIds {
            project_id: required(&model.project_id, "projectId")?.to_string(),
            workspace_name: workspace.to_string(),
            processor_name: required(&model.processor_name, "processorName")?.to_string(),
            needs_starting: false,
        })
    }

    fn request(model: &StreamProcessorModel) -> Result<StreamProcessorRequest> {
        let raw = required(&model.pipeline, "pipeline")?;
        let pipeline: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|e| {
            ProvisionError::validation(format!("pipeline must be a JSON array of stages: {}", e))
        })?;
        Ok(StreamProcessorRequest {
            name: required(&model.processor_name, "processorName")?.to_string(),
            pipeline,
            options: model.options.clone(),
        })
    }

    async fn start(&self, ids: StreamProcessorIds) -> Result<Transition<StreamProcessorPhase, StreamProcessorIds, StreamProcessorModel>> {
        info!(processor = %ids.processor_name, "Starting stream processor");
        self.gateway
            .start_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
            .await?;
        Ok(Transition::Continue {
            phase: StreamProcessorPhase::Starting,
            ids,
            message: "Stream processor start requested".to_string(),
        })
    }

    async fn update(
        &self,
        ids: StreamProcessorIds,
        model: &StreamProcessorModel,
    ) -> Result<Transition<StreamProcessorPhase, StreamProcessorIds, StreamProcessorModel>> {
        info!(processor = %ids.processor_name, "Updating stream processor");
        self.gateway
            .update_processor(
                &ids.project_id,
                &ids.workspace_name,
                &ids.processor_name,
                &Self::request(model)?,
            )
            .await?;
        Ok(Transition::Continue {
            phase: StreamProcessorPhase::Updating,
            ids,
            message: "Stream processor update requested".to_string(),
        })
    }
}

/// State the caller asked for; CREATED when unset.
pub fn desired_state(model: &StreamProcessorModel) -> Result<State> {
    match model.state.as_deref() {
        None | Some("") => Ok(State::Created),
        Some(raw) => raw.parse().map_err(ProvisionError::Validation),
    }
}

/// Check that the processor can move from `current` to `planned` directly.
pub fn validate_update_transition(current: &str, planned: State) -> Result<()> {
    if current == planned.as_str() {
        return Ok(());
    }
    match planned {
        State::Stopped if current != State::Started.as_str() => Err(ProvisionError::validation(
            "Stream Processor must be in STARTED state to transition to STOPPED state",
        )),
        State::Created => Err(ProvisionError::validation(format!(
            "Stream Processor cannot transition from {} to CREATED",
            current
        ))),
        State::Stopped | State::Started => Ok(()),
        other => Err(ProvisionError::validation(format!(
            "Stream Processor cannot transition to {}",
            other
        ))),
    }
}

/// Copy server-assigned fields from the remote processor onto the desired model.
pub fn merge_remote(mut model: StreamProcessorModel, remote: &RemoteStreamProcessor) -> StreamProcessorModel {
    model.id = remote.id.clone();
    model.state = Some(remote.state.clone());
    model.stats = remote.stats.as_ref().map(|stats| stats.to_string());
    if remote.options.is_some() {
        model.options = remote.options.clone();
    }
    model.normalize_workspace();
    model
}

pub fn model_from_remote(project_id: &str, workspace: &str, remote: &RemoteStreamProcessor) -> StreamProcessorModel {
    let model = StreamProcessorModel {
        project_id: Some(project_id.to_string()),
        workspace_name: Some(workspace.to_string()),
        processor_name: Some(remote.name.clone()),
        pipeline: serde_json::to_string(&remote.pipeline).ok(),
        ..Default::default()
    };
    merge_remote(model, remote)
}

pub async fn read(gateway: &dyn StreamProcessorGateway, model: &StreamProcessorModel) -> Result<StreamProcessorModel> {
    let ids = StreamProcessorPolicy::ids(model)?;
    match gateway
        .get_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
        .await
    {
        Ok(remote) => Ok(merge_remote(model.clone(), &remote)),
        Err(e) if e.is_not_found() => Err(ProvisionError::NotFound(format!(
            "stream processor {} not found",
            ids.processor_name
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn list(
    gateway: &dyn StreamProcessorGateway,
    project_id: &str,
    workspace: &str,
) -> Result<Vec<StreamProcessorModel>> {
    let processors = gateway.list_processors(project_id, workspace).await?;
    Ok(processors
        .iter()
        .map(|remote| model_from_remote(project_id, workspace, remote))
        .collect())
}

#[async_trait]
impl PhasePolicy for StreamProcessorPolicy {
    type Model = StreamProcessorModel;
    type Phase = StreamProcessorPhase;
    type Ids = StreamProcessorIds;
    type Remote = RemoteStreamProcessor;

    fn family(&self) -> &'static str {
        families::STREAM_PROCESSOR
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn resource_label(&self) -> &'static str {
        "stream processor"
    }

    fn validate(&self, model: &StreamProcessorModel) -> Result<()> {
        Self::ids(model)?;
        match self.operation {
            Operation::Create => {
                if !matches!(desired_state(model)?, State::Created | State::Started) {
                    return Err(ProvisionError::validation(
                        "When creating a stream processor, the only valid states are CREATED and STARTED",
                    ));
                }
                Self::request(model)?;
            }
            Operation::Update => {
                let planned = desired_state(model)?;
                if !matches!(planned, State::Created | State::Started | State::Stopped) {
                    return Err(ProvisionError::validation(format!(
                        "Stream Processor cannot transition to {}",
                        planned
                    )));
                }
                Self::request(model)?;
            }
            Operation::Delete => {}
        }
        Ok(())
    }

    fn timeout_settings(&self, model: &StreamProcessorModel) -> Option<TimeoutSettings> {
        if self.operation != Operation::Create {
            return None;
        }
        let budget = model
            .timeouts
            .as_ref()
            .and_then(|t| t.create.clone())
            .unwrap_or_else(|| self.default_create_timeout.clone());
        Some(TimeoutSettings {
            budget: Some(budget),
            delete_on_timeout: model.delete_on_create_timeout.unwrap_or(true),
        })
    }

    async fn inspect(&self, model: &StreamProcessorModel) -> Result<Option<Observation<RemoteStreamProcessor>>> {
        if self.operation == Operation::Create {
            return Ok(None);
        }
        let ids = Self::ids(model)?;
        let current = self
            .gateway
            .get_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
            .await;
        observe_result(current).map(Some)
    }

    fn validate_transition(&self, current: Option<&RemoteStreamProcessor>, model: &StreamProcessorModel) -> Result<()> {
        match (self.operation, current) {
            (Operation::Update, Some(current)) => validate_update_transition(&current.state, desired_state(model)?),
            _ => Ok(()),
        }
    }

    async fn begin(
        &self,
        model: &StreamProcessorModel,
        current: Option<&RemoteStreamProcessor>,
    ) -> Result<Transition<StreamProcessorPhase, StreamProcessorIds, StreamProcessorModel>> {
        let mut ids = Self::ids(model)?;
        match self.operation {
            Operation::Create => {
                ids.needs_starting = desired_state(model)? == State::Started;
                info!(
                    project_id = %ids.project_id,
                    workspace = %ids.workspace_name,
                    processor = %ids.processor_name,
                    "Creating stream processor"
                );
                self.gateway
                    .create_processor(&ids.project_id, &ids.workspace_name, &Self::request(model)?)
                    .await?;
                Ok(Transition::Continue {
                    phase: StreamProcessorPhase::Creating,
                    ids,
                    message: "Stream processor creation requested".to_string(),
                })
            }
            Operation::Update => {
                ids.needs_starting = desired_state(model)? == State::Started;
                let running = current.and_then(RemoteStreamProcessor::parsed_state) == Some(State::Started);
                if running {
                    info!(processor = %ids.processor_name, "Stopping stream processor before update");
                    self.gateway
                        .stop_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
                        .await?;
                    return Ok(Transition::Continue {
                        phase: StreamProcessorPhase::Stopping,
                        ids,
                        message: "Stream processor stop requested".to_string(),
                    });
                }
                self.update(ids, model).await
            }
            Operation::Delete => {
                info!(processor = %ids.processor_name, "Deleting stream processor");
                match self
                    .gateway
                    .delete_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
                    .await
                {
                    Err(e) if e.is_not_found() => Ok(Transition::Complete {
                        model: None,
                        message: "stream processor does not exist".to_string(),
                    }),
                    Err(e) => Err(e.into()),
                    Ok(()) => Ok(Transition::Continue {
                        phase: StreamProcessorPhase::Deleting,
                        ids,
                        message: "Stream processor deletion requested".to_string(),
                    }),
                }
            }
        }
    }

    async fn observe(
        &self,
        _phase: StreamProcessorPhase,
        ids: &StreamProcessorIds,
    ) -> Result<Observation<RemoteStreamProcessor>> {
        observe_result(
            self.gateway
                .get_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
                .await,
        )
    }

    fn awaits_absence(&self, phase: StreamProcessorPhase) -> bool {
        phase == StreamProcessorPhase::Deleting
    }

    fn is_terminal_success(&self, phase: StreamProcessorPhase, remote: &RemoteStreamProcessor) -> bool {
        let Some(state) = remote.parsed_state() else {
            return false;
        };
        match phase {
            StreamProcessorPhase::Creating => matches!(state, State::Created | State::Started),
            StreamProcessorPhase::Stopping => matches!(state, State::Stopped | State::Created),
            StreamProcessorPhase::Updating => matches!(state, State::Created | State::Stopped | State::Started),
            StreamProcessorPhase::Starting => state == State::Started,
            StreamProcessorPhase::Deleting => state == State::Dropped,
        }
    }

    fn is_terminal_failure(&self, phase: StreamProcessorPhase, remote: &RemoteStreamProcessor) -> Option<String> {
        match (phase, remote.parsed_state()) {
            (_, Some(State::Failed)) => Some("Stream processor entered FAILED state".to_string()),
            (StreamProcessorPhase::Deleting, _) => None,
            (StreamProcessorPhase::Creating, Some(State::Init | State::Creating)) => None,
            (StreamProcessorPhase::Creating, _) => Some(format!("Unexpected state during creation: {}", remote.state)),
            (_, Some(State::Dropped)) | (_, None) => Some(format!(
                "Unexpected state while waiting in {}: {}",
                phase.as_str(),
                remote.state
            )),
            _ => None,
        }
    }

    async fn advance(
        &self,
        phase: StreamProcessorPhase,
        ids: StreamProcessorIds,
        model: &StreamProcessorModel,
        remote: Option<&RemoteStreamProcessor>,
    ) -> Result<Transition<StreamProcessorPhase, StreamProcessorIds, StreamProcessorModel>> {
        let Some(remote) = remote else {
            return Ok(Transition::Complete {
                model: None,
                message: format!("Stream processor {} deleted", ids.processor_name),
            });
        };
        let started = remote.parsed_state() == Some(State::Started);

        match phase {
            StreamProcessorPhase::Stopping => self.update(ids, model).await,
            StreamProcessorPhase::Creating | StreamProcessorPhase::Updating if ids.needs_starting && !started => {
                self.start(ids).await
            }
            StreamProcessorPhase::Deleting => Ok(Transition::Complete {
                model: None,
                message: format!("Stream processor {} dropped", ids.processor_name),
            }),
            _ => Ok(Transition::Complete {
                model: Some(merge_remote(model.clone(), remote)),
                message: format!("Stream processor {} is {}", ids.processor_name, remote.state),
            }),
        }
    }

    async fn cleanup(&self, ids: &StreamProcessorIds) -> Result<()> {
        info!(processor = %ids.processor_name, "Deleting stream processor after timeout");
        match self
            .gateway
            .delete_processor(&ids.project_id, &ids.workspace_name, &ids.processor_name)
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map_err(Into::into),
        }
    }
}
