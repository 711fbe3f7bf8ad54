//! JSON routing for hosts that only speak tags and documents
//!
//! A [`Registry`] owns the gateways and configuration and builds the right
//! controller for each `(family, operation)` invocation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudstep_provisioning::config::ProvisioningConfig;
//! use cloudstep_provisioning::gateway::{ControlPlaneClient, ControlPlaneGateway, UnconfiguredNetworkGateway};
//! use cloudstep_provisioning::registry::{Gateways, Registry};
//! use cloudstep_provisioning::{Operation, RawContext};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ControlPlaneClient::new("https://cloud.example.com", "token")?;
//! let gateways = Gateways::control_plane(
//!     Arc::new(ControlPlaneGateway::new(client)),
//!     Arc::new(UnconfiguredNetworkGateway),
//! );
//! let registry = Registry::new(ProvisioningConfig::default(), gateways);
//!
//! let model = serde_json::json!({"projectId": "p1", "name": "analytics"});
//! let response = registry
//!     .step("cluster", Operation::Delete, &RawContext::new(), model)
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use cloudstep_models::{ClusterModel, ExportJobModel, PrivateEndpointModel, StreamProcessorModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{ControllerConfig, ProvisioningConfig};
use crate::controller::{Controller, PhasePolicy};
use crate::error::{ProvisionError, Result};
use crate::gateway::{
    ClusterGateway, ControlPlaneGateway, EndpointServiceGateway, ExportJobGateway, NetworkEndpointGateway,
    StreamProcessorGateway,
};
use crate::names::families;
use crate::policies::{cluster, export_job, private_endpoint, stream_processor};
use crate::policies::{ClusterPolicy, ExportJobPolicy, PrivateEndpointPolicy, StreamProcessorPolicy};
use crate::types::{Operation, Outcome, RawContext, StepResponse};

/// One gateway per concern.
#[derive(Clone)]
pub struct Gateways {
    pub clusters: Arc<dyn ClusterGateway>,
    pub stream_processors: Arc<dyn StreamProcessorGateway>,
    pub endpoint_services: Arc<dyn EndpointServiceGateway>,
    pub network_endpoints: Arc<dyn NetworkEndpointGateway>,
    pub export_jobs: Arc<dyn ExportJobGateway>,
}

impl Gateways {
    /// Serve every database-side family from one control plane client.
    pub fn control_plane(gateway: Arc<ControlPlaneGateway>, network: Arc<dyn NetworkEndpointGateway>) -> Self {
        Self {
            clusters: gateway.clone(),
            stream_processors: gateway.clone(),
            endpoint_services: gateway.clone(),
            network_endpoints: network,
            export_jobs: gateway,
        }
    }
}

pub struct Registry {
    config: ProvisioningConfig,
    gateways: Gateways,
}

impl Registry {
    pub fn new(config: ProvisioningConfig, gateways: Gateways) -> Self {
        Self { config, gateways }
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Run one invocation of `operation` on `family`.
    pub async fn step(
        &self,
        family: &str,
        operation: Operation,
        context: &RawContext,
        model: Value,
    ) -> StepResponse<Value> {
        debug!(family, operation = %operation, "Routing step");
        let delays = &self.config.delays;
        let gateways = &self.gateways;
        let outcome = match family {
            families::CLUSTER => {
                let policy = ClusterPolicy::new(
                    gateways.clusters.clone(),
                    operation,
                    self.config.reserved_label.clone(),
                );
                run(policy, self.config.controller(delays.cluster), context, model).await
            }
            families::STREAM_PROCESSOR => {
                let policy = StreamProcessorPolicy::new(
                    gateways.stream_processors.clone(),
                    operation,
                    self.config.stream_processor_create_timeout.clone(),
                );
                run(policy, self.config.controller(delays.stream_processor), context, model).await
            }
            families::PRIVATE_ENDPOINT => {
                let policy = PrivateEndpointPolicy::new(
                    gateways.endpoint_services.clone(),
                    gateways.network_endpoints.clone(),
                    operation,
                );
                run(policy, self.config.controller(delays.private_endpoint), context, model).await
            }
            families::EXPORT_JOB => {
                let policy = ExportJobPolicy::new(
                    gateways.export_jobs.clone(),
                    operation,
                    self.config.export_completion_state.clone(),
                );
                run(policy, self.config.controller(delays.export_job), context, model).await
            }
            other => Outcome::from_error(&unknown_family(other)),
        };
        outcome.into()
    }

    /// Fetch the current state of one resource.
    pub async fn read(&self, family: &str, model: Value) -> Result<Value> {
        match family {
            families::CLUSTER => {
                let model: ClusterModel = parse_model(model)?;
                let current = cluster::read(self.gateways.clusters.as_ref(), &self.config.reserved_label, &model).await?;
                to_json(&current)
            }
            families::STREAM_PROCESSOR => {
                let model: StreamProcessorModel = parse_model(model)?;
                to_json(&stream_processor::read(self.gateways.stream_processors.as_ref(), &model).await?)
            }
            families::PRIVATE_ENDPOINT => {
                let model: PrivateEndpointModel = parse_model(model)?;
                to_json(&private_endpoint::read(self.gateways.endpoint_services.as_ref(), &model).await?)
            }
            families::EXPORT_JOB => {
                let model: ExportJobModel = parse_model(model)?;
                to_json(&export_job::read(self.gateways.export_jobs.as_ref(), &model).await?)
            }
            other => Err(unknown_family(other)),
        }
    }

    /// List every resource of `family` under the parent named in `model`.
    pub async fn list(&self, family: &str, model: Value) -> Result<Vec<Value>> {
        match family {
            families::CLUSTER => {
                let model: ClusterModel = parse_model(model)?;
                let project_id = parent(&model.project_id, "projectId")?;
                let clusters = cluster::list(self.gateways.clusters.as_ref(), &self.config.reserved_label, project_id).await?;
                clusters.iter().map(to_json).collect()
            }
            families::STREAM_PROCESSOR => {
                let model: StreamProcessorModel = parse_model(model)?;
                let project_id = parent(&model.project_id, "projectId")?;
                let workspace = model
                    .workspace()
                    .ok_or_else(|| ProvisionError::validation("workspaceName or instanceName is required"))?;
                let processors =
                    stream_processor::list(self.gateways.stream_processors.as_ref(), project_id, workspace).await?;
                processors.iter().map(to_json).collect()
            }
            families::PRIVATE_ENDPOINT => {
                let model: PrivateEndpointModel = parse_model(model)?;
                let project_id = parent(&model.project_id, "projectId")?;
                let endpoints = private_endpoint::list(self.gateways.endpoint_services.as_ref(), project_id).await?;
                endpoints.iter().map(to_json).collect()
            }
            families::EXPORT_JOB => {
                let model: ExportJobModel = parse_model(model)?;
                let project_id = parent(&model.project_id, "projectId")?;
                let cluster_name = parent(&model.cluster_name, "clusterName")?;
                let jobs = export_job::list(self.gateways.export_jobs.as_ref(), project_id, cluster_name).await?;
                jobs.iter().map(to_json).collect()
            }
            other => Err(unknown_family(other)),
        }
    }
}

async fn run<P>(policy: P, config: ControllerConfig, context: &RawContext, model: Value) -> Outcome<Value>
where
    P: PhasePolicy,
    P::Model: Serialize + DeserializeOwned + std::fmt::Debug,
{
    let model: P::Model = match parse_model(model) {
        Ok(model) => model,
        Err(e) => return Outcome::from_error(&e),
    };
    let outcome = Controller::new(policy, config).step(context, &model).await;
    match outcome {
        Outcome::Success { model: Some(model), message } => match to_json(&model) {
            Ok(value) => Outcome::Success {
                model: Some(value),
                message,
            },
            Err(e) => Outcome::from_error(&e),
        },
        other => other.map_model(|_| Value::Null),
    }
}

fn parse_model<M: DeserializeOwned>(model: Value) -> Result<M> {
    serde_json::from_value(model).map_err(|e| ProvisionError::validation(format!("invalid resource model: {}", e)))
}

fn to_json<M: Serialize>(model: &M) -> Result<Value> {
    serde_json::to_value(model).map_err(|e| ProvisionError::validation(format!("unserializable resource model: {}", e)))
}

fn parent<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProvisionError::validation(format!("{} is required to list resources", field)))
}

fn unknown_family(family: &str) -> ProvisionError {
    ProvisionError::validation(format!(
        "unknown resource family `{}` (expected one of: {})",
        family,
        families::ALL.join(", ")
    ))
}
