//! Private endpoint lifecycle across two control planes
//!
//! ```text
//! create: SERVICE_PROVISIONING ─AVAILABLE─▶ CREATING_NETWORK_ENDPOINT ─visible─▶
//!         ATTACHING_INTERFACE ─AVAILABLE─▶ done
//! delete: DETACHING_INTERFACES ─none left─▶ REMOVING_NETWORK_ENDPOINTS ─all deleted─▶
//!         DELETING_SERVICE ─404─▶ done
//! ```
//!
//! The provider-side endpoint id is recorded in the context before it is
//! attached, so a failed attach can be retried from the same context.
//! Interfaces are detached one per step; `interfaceEndpointId` holds the
//! detach in flight.

use std::sync::Arc;

use async_trait::async_trait;
use cloudstep_models::{
    connection_status, service_status, EndpointService, InterfaceEndpoint, NetworkEndpoint,
    PrivateEndpointModel,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{observe_result, required};
use crate::context::{comma_list, PhaseTag};
use crate::controller::{Observation, PhasePolicy, Transition};
use crate::error::{ContextError, ProvisionError, Result};
use crate::gateway::{absent_on_404, EndpointServiceGateway, NetworkEndpointGateway};
use crate::names::families;
use crate::types::Operation;

const NETWORK_PENDING_ACCEPTANCE: &str = "pendingacceptance";
const NETWORK_AVAILABLE: &str = "available";
const NETWORK_DELETED: &str = "deleted";
const NETWORK_FAILED: &str = "failed";

/// Provider states an endpoint never leaves for one that can be attached.
const NETWORK_DEAD_STATES: &[&str] = &["failed", "rejected", "expired", "deleting", "deleted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateEndpointPhase {
    ServiceProvisioning,
    CreatingNetworkEndpoint,
    AttachingInterface,
    DetachingInterfaces,
    RemovingNetworkEndpoints,
    DeletingService,
}

impl PhaseTag for PrivateEndpointPhase {
    fn as_str(&self) -> &'static str {
        match self {
            PrivateEndpointPhase::ServiceProvisioning => "SERVICE_PROVISIONING",
            PrivateEndpointPhase::CreatingNetworkEndpoint => "CREATING_NETWORK_ENDPOINT",
            PrivateEndpointPhase::AttachingInterface => "ATTACHING_INTERFACE",
            PrivateEndpointPhase::DetachingInterfaces => "DETACHING_INTERFACES",
            PrivateEndpointPhase::RemovingNetworkEndpoints => "REMOVING_NETWORK_ENDPOINTS",
            PrivateEndpointPhase::DeletingService => "DELETING_SERVICE",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "SERVICE_PROVISIONING" => Some(PrivateEndpointPhase::ServiceProvisioning),
            "CREATING_NETWORK_ENDPOINT" => Some(PrivateEndpointPhase::CreatingNetworkEndpoint),
            "ATTACHING_INTERFACE" => Some(PrivateEndpointPhase::AttachingInterface),
            "DETACHING_INTERFACES" => Some(PrivateEndpointPhase::DetachingInterfaces),
            "REMOVING_NETWORK_ENDPOINTS" => Some(PrivateEndpointPhase::RemovingNetworkEndpoints),
            "DELETING_SERVICE" => Some(PrivateEndpointPhase::DeletingService),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivateEndpointIds {
    pub project_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// Interface returned by the attach call, or the detach in flight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_endpoint_id: Option<String>,
    #[serde(default, with = "comma_list", skip_serializing_if = "Vec::is_empty")]
    pub network_endpoint_ids: Vec<String>,
}

impl PrivateEndpointIds {
    fn service_id(&self) -> Result<&str> {
        self.service_id
            .as_deref()
            .ok_or(ProvisionError::Context(ContextError::MissingKey("serviceId")))
    }

    fn network_endpoint_id(&self) -> Result<&str> {
        self.network_endpoint_ids
            .first()
            .map(String::as_str)
            .ok_or(ProvisionError::Context(ContextError::MissingKey("networkEndpointIds")))
    }
}

/// Whatever the current phase polls.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointObservation {
    Service(EndpointService),
    /// The service while an interface detach may still be in flight
    Detaching {
        service: EndpointService,
        in_flight: Option<String>,
    },
    Interface(InterfaceEndpoint),
    NetworkEndpoints(Vec<NetworkEndpoint>),
}

type EndpointTransition = Transition<PrivateEndpointPhase, PrivateEndpointIds, PrivateEndpointModel>;

pub struct PrivateEndpointPolicy {
    services: Arc<dyn EndpointServiceGateway>,
    network: Arc<dyn NetworkEndpointGateway>,
    operation: Operation,
}

impl PrivateEndpointPolicy {
    pub fn new(
        services: Arc<dyn EndpointServiceGateway>,
        network: Arc<dyn NetworkEndpointGateway>,
        operation: Operation,
    ) -> Self {
        Self {
            services,
            network,
            operation,
        }
    }

    fn ids(model: &PrivateEndpointModel) -> Result<PrivateEndpointIds> {
        Ok(PrivateEndpointIds {
            project_id: required(&model.project_id, "projectId")?.to_string(),
            region: required(&model.region, "region")?.to_string(),
            service_id: model.id.clone(),
            interface_endpoint_id: None,
            network_endpoint_ids: Vec::new(),
        })
    }

    /// Create the provider endpoint for `service` and record its id.
    async fn create_network_endpoint(
        &self,
        mut ids: PrivateEndpointIds,
        model: &PrivateEndpointModel,
        service: &EndpointService,
    ) -> Result<EndpointTransition> {
        let service_name = service.endpoint_service_name.as_deref().ok_or_else(|| {
            ProvisionError::RemoteFailure(format!(
                "endpoint service {} is available but reports no endpointServiceName",
                service.id
            ))
        })?;
        let vpc_id = required(&model.vpc_id, "vpcId")?;
        let subnet_ids = model.subnet_ids.clone().unwrap_or_default();

        info!(service_id = %service.id, service_name, vpc_id, "Creating network endpoint");
        let endpoint = self
            .network
            .create_endpoint(&ids.region, service_name, vpc_id, &subnet_ids)
            .await?;

        ids.network_endpoint_ids = vec![endpoint.id];
        Ok(Transition::Continue {
            phase: PrivateEndpointPhase::CreatingNetworkEndpoint,
            ids,
            message: "Network endpoint requested".to_string(),
        })
    }

    async fn attach_interface(&self, mut ids: PrivateEndpointIds) -> Result<EndpointTransition> {
        let service_id = ids.service_id()?.to_string();
        let endpoint_id = ids.network_endpoint_id()?.to_string();
        info!(service_id = %service_id, endpoint_id = %endpoint_id, "Attaching interface endpoint");
        let interface = self
            .services
            .attach_interface(&ids.project_id, &service_id, &endpoint_id)
            .await?;

        ids.interface_endpoint_id = Some(interface.interface_endpoint_id);
        Ok(Transition::Continue {
            phase: PrivateEndpointPhase::AttachingInterface,
            ids,
            message: "Interface endpoint attached, waiting for connection".to_string(),
        })
    }

    /// Detach the first interface `service` still lists, or move on once none are left.
    async fn detach_next(
        &self,
        mut ids: PrivateEndpointIds,
        service: &EndpointService,
    ) -> Result<EndpointTransition> {
        for interface_id in &service.interface_endpoints {
            if !ids.network_endpoint_ids.contains(interface_id) {
                ids.network_endpoint_ids.push(interface_id.clone());
            }
        }

        let Some(interface_id) = service.interface_endpoints.first() else {
            ids.interface_endpoint_id = None;
            return if ids.network_endpoint_ids.is_empty() {
                self.delete_service(ids).await
            } else {
                self.remove_network_endpoints(ids).await
            };
        };

        info!(
            service_id = %service.id,
            interface_id = %interface_id,
            remaining = service.interface_endpoints.len(),
            "Detaching interface endpoint"
        );
        absent_on_404(
            self.services
                .detach_interface(&ids.project_id, &service.id, interface_id)
                .await,
        )?;
        ids.interface_endpoint_id = Some(interface_id.clone());
        Ok(Transition::Continue {
            phase: PrivateEndpointPhase::DetachingInterfaces,
            message: format!("Interface endpoint {} detach requested", interface_id),
            ids,
        })
    }

    async fn remove_network_endpoints(&self, ids: PrivateEndpointIds) -> Result<EndpointTransition> {
        info!(endpoints = ?ids.network_endpoint_ids, "Deleting network endpoints");
        absent_on_404(self.network.delete_endpoints(&ids.region, &ids.network_endpoint_ids).await)?;
        Ok(Transition::Continue {
            phase: PrivateEndpointPhase::RemovingNetworkEndpoints,
            ids,
            message: "Network endpoints deletion requested".to_string(),
        })
    }

    async fn delete_service(&self, ids: PrivateEndpointIds) -> Result<EndpointTransition> {
        let service_id = ids.service_id()?.to_string();
        info!(service_id = %service_id, "Deleting endpoint service");
        match absent_on_404(self.services.delete_service(&ids.project_id, &service_id).await)? {
            None => Ok(Transition::Complete {
                model: None,
                message: "endpoint service does not exist".to_string(),
            }),
            Some(()) => Ok(Transition::Continue {
                phase: PrivateEndpointPhase::DeletingService,
                ids,
                message: "Endpoint service deletion requested".to_string(),
            }),
        }
    }
}

/// Copy server-assigned fields from the endpoint service onto the model.
pub fn merge_service(mut model: PrivateEndpointModel, service: &EndpointService) -> PrivateEndpointModel {
    model.id = Some(service.id.clone());
    model.endpoint_service_name = service.endpoint_service_name.clone();
    model.status = Some(service.status.clone());
    model.error_message = service.error_message.clone();
    model.interface_endpoints = Some(service.interface_endpoints.clone());
    if service.region_name.is_some() && model.region.is_none() {
        model.region = service.region_name.clone();
    }
    model
}

pub async fn read(gateway: &dyn EndpointServiceGateway, model: &PrivateEndpointModel) -> Result<PrivateEndpointModel> {
    let project_id = required(&model.project_id, "projectId")?;
    let service_id = required(&model.id, "id")?;
    match gateway.get_service(project_id, service_id).await {
        Ok(service) => Ok(merge_service(model.clone(), &service)),
        Err(e) if e.is_not_found() => Err(ProvisionError::NotFound(format!(
            "endpoint service {} not found",
            service_id
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn list(gateway: &dyn EndpointServiceGateway, project_id: &str) -> Result<Vec<PrivateEndpointModel>> {
    let services = gateway.list_services(project_id).await?;
    Ok(services
        .iter()
        .map(|service| {
            let model = PrivateEndpointModel {
                project_id: Some(project_id.to_string()),
                ..Default::default()
            };
            merge_service(model, service)
        })
        .collect())
}

#[async_trait]
impl PhasePolicy for PrivateEndpointPolicy {
    type Model = PrivateEndpointModel;
    type Phase = PrivateEndpointPhase;
    type Ids = PrivateEndpointIds;
    type Remote = EndpointObservation;

    fn family(&self) -> &'static str {
        families::PRIVATE_ENDPOINT
    }

    fn operation(&self) -> Operation {
        self.operation
    }

    fn resource_label(&self) -> &'static str {
        "private endpoint"
    }

    fn validate(&self, model: &PrivateEndpointModel) -> Result<()> {
        Self::ids(model)?;
        match self.operation {
            Operation::Create => {
                required(&model.vpc_id, "vpcId")?;
                if model.subnet_ids.as_ref().map_or(true, Vec::is_empty) {
                    return Err(ProvisionError::validation("subnetIds must contain at least one subnet"));
                }
                Ok(())
            }
            Operation::Delete => required(&model.id, "id").map(|_| ()),
            Operation::Update => Err(ProvisionError::validation(
                "private endpoints cannot be updated, only created or deleted",
            )),
        }
    }

    async fn inspect(&self, model: &PrivateEndpointModel) -> Result<Option<Observation<EndpointObservation>>> {
        if self.operation != Operation::Delete {
            return Ok(None);
        }
        let ids = Self::ids(model)?;
        let current = self.services.get_service(&ids.project_id, ids.service_id()?).await;
        Ok(Some(match observe_result(current)? {
            Observation::Found(service) => Observation::Found(EndpointObservation::Service(service)),
            Observation::Absent => Observation::Absent,
        }))
    }

    async fn begin(
        &self,
        model: &PrivateEndpointModel,
        current: Option<&EndpointObservation>,
    ) -> Result<EndpointTransition> {
        let ids = Self::ids(model)?;
        match (self.operation, current) {
            (Operation::Create, _) => {
                info!(project_id = %ids.project_id, region = %ids.region, "Requesting endpoint service");
                let service = self.services.create_service(&ids.project_id, &ids.region).await?;
                Ok(Transition::Continue {
                    phase: PrivateEndpointPhase::ServiceProvisioning,
                    ids: PrivateEndpointIds {
                        service_id: Some(service.id),
                        ..ids
                    },
                    message: "Endpoint service requested".to_string(),
                })
            }
            (Operation::Delete, Some(EndpointObservation::Service(service))) => {
                self.detach_next(ids, service).await
            }
            (operation, _) => Err(ProvisionError::validation(format!(
                "unsupported private endpoint operation: {}",
                operation
            ))),
        }
    }

    async fn observe(
        &self,
        phase: PrivateEndpointPhase,
        ids: &PrivateEndpointIds,
    ) -> Result<Observation<EndpointObservation>> {
        match phase {
            PrivateEndpointPhase::AttachingInterface => {
                let interface_id = ids
                    .interface_endpoint_id
                    .as_deref()
                    .ok_or(ProvisionError::Context(ContextError::MissingKey("interfaceEndpointId")))?;
                let interface = self
                    .services
                    .get_interface(&ids.project_id, ids.service_id()?, interface_id)
                    .await;
                Ok(match observe_result(interface)? {
                    Observation::Found(i) => Observation::Found(EndpointObservation::Interface(i)),
                    Observation::Absent => Observation::Absent,
                })
            }
            PrivateEndpointPhase::DetachingInterfaces => {
                let service = self.services.get_service(&ids.project_id, ids.service_id()?).await;
                Ok(match observe_result(service)? {
                    Observation::Found(service) => Observation::Found(EndpointObservation::Detaching {
                        service,
                        in_flight: ids.interface_endpoint_id.clone(),
                    }),
                    Observation::Absent => Observation::Absent,
                })
            }
            PrivateEndpointPhase::CreatingNetworkEndpoint | PrivateEndpointPhase::RemovingNetworkEndpoints => {
                let endpoints = self
                    .network
                    .describe_endpoints(&ids.region, &ids.network_endpoint_ids)
                    .await?;
                Ok(Observation::Found(EndpointObservation::NetworkEndpoints(endpoints)))
            }
            _ => {
                let service = self.services.get_service(&ids.project_id, ids.service_id()?).await;
                Ok(match observe_result(service)? {
                    Observation::Found(s) => Observation::Found(EndpointObservation::Service(s)),
                    Observation::Absent => Observation::Absent,
                })
            }
        }
    }

    fn awaits_absence(&self, phase: PrivateEndpointPhase) -> bool {
        phase == PrivateEndpointPhase::DeletingService
    }

    fn is_terminal_success(&self, phase: PrivateEndpointPhase, remote: &EndpointObservation) -> bool {
        match (phase, remote) {
            (PrivateEndpointPhase::ServiceProvisioning, EndpointObservation::Service(service)) => {
                service.status == service_status::AVAILABLE
            }
            (PrivateEndpointPhase::AttachingInterface, EndpointObservation::Interface(interface)) => {
                interface.connection_status == connection_status::AVAILABLE
            }
            (PrivateEndpointPhase::CreatingNetworkEndpoint, EndpointObservation::NetworkEndpoints(endpoints)) => {
                !endpoints.is_empty()
                    && endpoints
                        .iter()
                        .all(|endpoint| endpoint.state == NETWORK_PENDING_ACCEPTANCE || endpoint.state == NETWORK_AVAILABLE)
            }
            (PrivateEndpointPhase::DetachingInterfaces, EndpointObservation::Detaching { service, in_flight }) => {
                in_flight
                    .as_ref()
                    .map_or(true, |id| !service.interface_endpoints.contains(id))
            }
            (PrivateEndpointPhase::RemovingNetworkEndpoints, EndpointObservation::NetworkEndpoints(endpoints)) => {
                endpoints.iter().all(|endpoint| endpoint.state == NETWORK_DELETED)
            }
            _ => false,
        }
    }

    fn is_terminal_failure(&self, phase: PrivateEndpointPhase, remote: &EndpointObservation) -> Option<String> {
        match (phase, remote) {
            (PrivateEndpointPhase::ServiceProvisioning, EndpointObservation::Service(service))
                if service.status != service_status::INITIATING =>
            {
                Some(format!(
                    "Endpoint service entered {} state: {}",
                    service.status,
                    service.error_message.as_deref().unwrap_or("no error message")
                ))
            }
            (PrivateEndpointPhase::CreatingNetworkEndpoint, EndpointObservation::NetworkEndpoints(endpoints)) => endpoints
                .iter()
                .find(|endpoint| NETWORK_DEAD_STATES.contains(&endpoint.state.as_str()))
                .map(|endpoint| format!("Network endpoint {} entered {} state", endpoint.id, endpoint.state)),
            (PrivateEndpointPhase::AttachingInterface, EndpointObservation::Interface(interface))
                if interface.connection_status != connection_status::PENDING
                    && interface.connection_status != connection_status::PENDING_ACCEPTANCE =>
            {
                Some(format!(
                    "Interface endpoint {} connection is {}: {}",
                    interface.interface_endpoint_id,
                    interface.connection_status,
                    interface.error_message.as_deref().unwrap_or("no error message")
                ))
            }
            (PrivateEndpointPhase::RemovingNetworkEndpoints, EndpointObservation::NetworkEndpoints(endpoints)) => endpoints
                .iter()
                .find(|endpoint| endpoint.state == NETWORK_FAILED)
                .map(|endpoint| format!("Network endpoint {} failed to delete", endpoint.id)),
            _ => None,
        }
    }

    async fn advance(
        &self,
        phase: PrivateEndpointPhase,
        ids: PrivateEndpointIds,
        model: &PrivateEndpointModel,
        remote: Option<&EndpointObservation>,
    ) -> Result<EndpointTransition> {
        match (phase, remote) {
            (PrivateEndpointPhase::ServiceProvisioning, Some(EndpointObservation::Service(service))) => {
                self.create_network_endpoint(ids, model, service).await
            }
            (PrivateEndpointPhase::CreatingNetworkEndpoint, Some(EndpointObservation::NetworkEndpoints(_))) => {
                self.attach_interface(ids).await
            }
            (PrivateEndpointPhase::AttachingInterface, Some(EndpointObservation::Interface(interface))) => {
                let service = self.services.get_service(&ids.project_id, ids.service_id()?).await?;
                let mut result = merge_service(model.clone(), &service);
                result.interface_endpoints = ids.interface_endpoint_id.clone().map(|id| vec![id]);
                Ok(Transition::Complete {
                    model: Some(result),
                    message: format!(
                        "Private endpoint {} is {}",
                        interface.interface_endpoint_id, interface.connection_status
                    ),
                })
            }
            (PrivateEndpointPhase::DetachingInterfaces, Some(EndpointObservation::Detaching { service, .. })) => {
                self.detach_next(ids, service).await
            }
            (PrivateEndpointPhase::RemovingNetworkEndpoints, _) => self.delete_service(ids).await,
            (PrivateEndpointPhase::DeletingService, _) => Ok(Transition::Complete {
                model: None,
                message: "Private endpoint deleted".to_string(),
            }),
            (phase, remote) => Err(ProvisionError::RemoteFailure(format!(
                "unexpected observation in phase {}: {:?}",
                phase.as_str(),
                remote
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
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeServices {
        service_statuses: Mutex<VecDeque<(&'static str, Vec<String>)>>,
        interface_statuses: Mutex<VecDeque<&'static str>>,
        create_conflict: bool,
        attach_failures: Mutex<u32>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeServices {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn service(status: &str, interfaces: Vec<String>) -> EndpointService {
        EndpointService {
            id: "svc-1".to_string(),
            region_name: Some("US_EAST_1".to_string()),
            endpoint_service_name: Some("com.amazonaws.vpce.us-east-1.vpce-svc-1".to_string()),
            error_message: None,
            status: status.to_string(),
            interface_endpoints: interfaces,
        }
    }

    #[async_trait]
    impl EndpointServiceGateway for FakeServices {
        async fn create_service(&self, _: &str, region: &str) -> GatewayResult<EndpointService> {
            self.record(format!("create-service {}", region));
            if self.create_conflict {
                return Err(GatewayError::api(409, "Resource already exists"));
            }
            Ok(service(service_status::INITIATING, vec![]))
        }

        async fn get_service(&self, _: &str, _: &str) -> GatewayResult<EndpointService> {
            self.record("get-service");
            match self.service_statuses.lock().unwrap().pop_front() {
                Some((status, interfaces)) => Ok(service(status, interfaces)),
                None => Err(GatewayError::not_found("no endpoint service")),
            }
        }

        async fn delete_service(&self, _: &str, _: &str) -> GatewayResult<()> {
            self.record("delete-service");
            Ok(())
        }

        async fn list_services(&self, _: &str) -> GatewayResult<Vec<EndpointService>> {
            Ok(vec![service(service_status::AVAILABLE, vec!["vpce-9".to_string()])])
        }

        async fn attach_interface(&self, _: &str, service_id: &str, endpoint_id: &str) -> GatewayResult<InterfaceEndpoint> {
            self.record(format!("attach {} {}", service_id, endpoint_id));
            let mut failures = self.attach_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(GatewayError::api(500, "boom"));
            }
            Ok(InterfaceEndpoint {
                interface_endpoint_id: endpoint_id.to_string(),
                connection_status: connection_status::PENDING_ACCEPTANCE.to_string(),
                ..Default::default()
            })
        }

        async fn get_interface(&self, _: &str, _: &str, interface_id: &str) -> GatewayResult<InterfaceEndpoint> {
            self.record("get-interface");
            let status = self.interface_statuses.lock().unwrap().pop_front().unwrap_or("REJECTED");
            Ok(InterfaceEndpoint {
                interface_endpoint_id: interface_id.to_string(),
                connection_status: status.to_string(),
                error_message: Some("rejected by provider".to_string()),
                ..Default::default()
            })
        }

        async fn detach_interface(&self, _: &str, _: &str, interface_id: &str) -> GatewayResult<()> {
            self.record(format!("detach {}", interface_id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeNetwork {
        describe_states: Mutex<VecDeque<&'static str>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NetworkEndpointGateway for FakeNetwork {
        async fn create_endpoint(&self, region: &str, service_name: &str, vpc_id: &str, subnet_ids: &[String]) -> GatewayResult<NetworkEndpoint> {
            self.calls.lock().unwrap().push(format!(
                "create {} {} {} {}",
                region,
                service_name,
                vpc_id,
                subnet_ids.join(",")
            ));
            Ok(NetworkEndpoint {
                id: "vpce-0abc".to_string(),
                state: "pendingacceptance".to_string(),
            })
        }

        async fn describe_endpoints(&self, _: &str, ids: &[String]) -> GatewayResult<Vec<NetworkEndpoint>> {
            self.calls.lock().unwrap().push("describe".to_string());
            let state = self.describe_states.lock().unwrap().pop_front();
            Ok(match state {
                Some(state) => ids
                    .iter()
                    .map(|id| NetworkEndpoint {
                        id: id.clone(),
                        state: state.to_string(),
                    })
                    .collect(),
                None => Vec::new(),
            })
        }

        async fn delete_endpoints(&self, _: &str, ids: &[String]) -> GatewayResult<()> {
            self.calls.lock().unwrap().push(format!("delete {}", ids.join(",")));
            Ok(())
        }
    }

    fn model() -> PrivateEndpointModel {
        PrivateEndpointModel {
            project_id: Some("p1".to_string()),
            region: Some("us-east-1".to_string()),
            vpc_id: Some("vpc-1".to_string()),
            subnet_ids: Some(vec!["subnet-a".to_string(), "subnet-b".to_string()]),
            ..Default::default()
        }
    }

    fn controller(
        services: Arc<FakeServices>,
        network: Arc<FakeNetwork>,
        operation: Operation,
    ) -> Controller<PrivateEndpointPolicy> {
        Controller::new(PrivateEndpointPolicy::new(services, network, operation), config())
    }

    fn visible_endpoint() -> Arc<FakeNetwork> {
        Arc::new(FakeNetwork {
            describe_states: Mutex::new(VecDeque::from([NETWORK_PENDING_ACCEPTANCE])),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_four_steps_end_with_exactly_the_attached_interface() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([
                (service_status::AVAILABLE, vec![]),
                (service_status::AVAILABLE, vec!["vpce-0abc".to_string()]),
            ])),
            interface_statuses: Mutex::new(VecDeque::from([connection_status::AVAILABLE])),
            ..Default::default()
        });
        let network = visible_endpoint();
        let controller = controller(services.clone(), network.clone(), Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        assert_eq!(phase_of(&step), "SERVICE_PROVISIONING");
        assert_eq!(context_of(&step)["serviceId"], "svc-1");

        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "CREATING_NETWORK_ENDPOINT");
        assert_eq!(context_of(&step)["networkEndpointIds"], "vpce-0abc");
        assert!(!services.calls().iter().any(|call| call.starts_with("attach")));

        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "ATTACHING_INTERFACE");
        assert_eq!(context_of(&step)["interfaceEndpointId"], "vpce-0abc");

        let done = controller.step(&context_of(&step), &model()).await;
        let result = success_model(&done).unwrap();
        assert_eq!(result.interface_endpoints, Some(vec!["vpce-0abc".to_string()]));
        assert_eq!(result.id.as_deref(), Some("svc-1"));
        assert_eq!(
            result.endpoint_service_name.as_deref(),
            Some("com.amazonaws.vpce.us-east-1.vpce-svc-1")
        );

        assert_eq!(
            network.calls(),
            vec![
                "create us-east-1 com.amazonaws.vpce.us-east-1.vpce-svc-1 vpc-1 subnet-a,subnet-b",
                "describe",
            ]
        );
        assert_eq!(
            services.calls(),
            vec![
                "create-service us-east-1",
                "get-service",
                "attach svc-1 vpce-0abc",
                "get-interface",
                "get-service",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_attach_keeps_endpoint_in_context() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([(service_status::AVAILABLE, vec![])])),
            attach_failures: Mutex::new(1),
            ..Default::default()
        });
        let network = Arc::new(FakeNetwork {
            describe_states: Mutex::new(VecDeque::from([NETWORK_PENDING_ACCEPTANCE, NETWORK_PENDING_ACCEPTANCE])),
            ..Default::default()
        });
        let controller = controller(services.clone(), network.clone(), Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        let created = controller.step(&context_of(&step), &model()).await;
        let created = context_of(&created);
        assert_eq!(created["networkEndpointIds"], "vpce-0abc");

        let outcome = controller.step(&created, &model()).await;
        let (message, category, retryable) = failure_of(&outcome);
        assert_eq!(message, "remote API returned 500: boom");
        assert_eq!(category, ErrorCategory::Remote);
        assert!(retryable);

        // Retrying from the last context attaches the same endpoint without creating another
        let step = controller.step(&created, &model()).await;
        assert_eq!(phase_of(&step), "ATTACHING_INTERFACE");
        assert_eq!(context_of(&step)["networkEndpointIds"], "vpce-0abc");
        assert_eq!(
            network.calls().iter().filter(|call| call.starts_with("create")).count(),
            1
        );
        assert_eq!(
            services.calls().iter().filter(|call| *call == "attach svc-1 vpce-0abc").count(),
            2
        );
    }

    #[tokio::test]
    async fn test_endpoint_not_yet_described_is_not_attached() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([(service_status::AVAILABLE, vec![])])),
            ..Default::default()
        });
        let controller = controller(services.clone(), Arc::new(FakeNetwork::default()), Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        let step = controller.step(&context_of(&step), &model()).await;
        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "CREATING_NETWORK_ENDPOINT");
        assert!(!services.calls().iter().any(|call| call.starts_with("attach")));
    }

    #[tokio::test]
    async fn test_rejected_network_endpoint_is_terminal() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([(service_status::AVAILABLE, vec![])])),
            ..Default::default()
        });
        let network = Arc::new(FakeNetwork {
            describe_states: Mutex::new(VecDeque::from(["rejected"])),
            ..Default::default()
        });
        let controller = controller(services, network, Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        let step = controller.step(&context_of(&step), &model()).await;
        let outcome = controller.step(&context_of(&step), &model()).await;
        let (message, category, retryable) = failure_of(&outcome);
        assert_eq!(message, "Network endpoint vpce-0abc entered rejected state");
        assert_eq!(category, ErrorCategory::Remote);
        assert!(!retryable);
    }

    #[tokio::test]
    async fn test_initiating_service_keeps_polling() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([(service_status::INITIATING, vec![])])),
            ..Default::default()
        });
        let network = Arc::new(FakeNetwork::default());
        let controller = controller(services, network.clone(), Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        let step = controller.step(&context_of(&step), &model()).await;
        assert_eq!(phase_of(&step), "SERVICE_PROVISIONING");
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_service_status_is_terminal() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([("FAILED", vec![])])),
            ..Default::default()
        });
        let controller = controller(services, Arc::new(FakeNetwork::default()), Operation::Create);

        let step = controller.step(&no_context(), &model()).await;
        let outcome = controller.step(&context_of(&step), &model()).await;
        let (message, category, retryable) = failure_of(&outcome);
        assert!(message.starts_with("Endpoint service entered FAILED state"));
        assert_eq!(category, ErrorCategory::Remote);
        assert!(!retryable);
    }

    #[tokio::test]
    async fn test_rejected_interface_is_terminal() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([(service_status::AVAILABLE, vec![])])),
            interface_statuses: Mutex::new(VecDeque::from([connection_status::PENDING])),
            ..Default::default()
        });
        let controller = controller(services, visible_endpoint(), Operation::Create);

        let mut step = controller.step(&no_context(), &model()).await;
        for _ in 0..3 {
            step = controller.step(&context_of(&step), &model()).await;
        }
        assert_eq!(phase_of(&step), "ATTACHING_INTERFACE");

        let outcome = controller.step(&context_of(&step), &model()).await;
        let (message, _, _) = failure_of(&outcome);
        assert_eq!(
            message,
            "Interface endpoint vpce-0abc connection is REJECTED: rejected by provider"
        );
    }

    #[tokio::test]
    async fn test_existing_service_is_a_conflict() {
        let services = Arc::new(FakeServices {
            create_conflict: true,
            ..Default::default()
        });
        let outcome = controller(services, Arc::new(FakeNetwork::default()), Operation::Create)
            .step(&no_context(), &model())
            .await;
        let (_, category, _) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::Conflict);
    }

    #[tokio::test]
    async fn test_delete_reverses_creation() {
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([
                (service_status::AVAILABLE, vec!["vpce-0abc".to_string()]),
                (service_status::AVAILABLE, vec![]),
            ])),
            ..Default::default()
        });
        let network = Arc::new(FakeNetwork {
            describe_states: Mutex::new(VecDeque::from(["deleting"])),
            ..Default::default()
        });
        let controller = controller(services.clone(), network.clone(), Operation::Delete);
        let desired = PrivateEndpointModel {
            id: Some("svc-1".to_string()),
            ..model()
        };

        let step = controller.step(&no_context(), &desired).await;
        assert_eq!(phase_of(&step), "DETACHING_INTERFACES");
        assert_eq!(context_of(&step)["networkEndpointIds"], "vpce-0abc");
        assert_eq!(context_of(&step)["interfaceEndpointId"], "vpce-0abc");

        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "REMOVING_NETWORK_ENDPOINTS");
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "REMOVING_NETWORK_ENDPOINTS");

        // Provider no longer lists the endpoint
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "DELETING_SERVICE");

        let done = controller.step(&context_of(&step), &desired).await;
        assert!(success_model(&done).is_none());

        assert_eq!(network.calls(), vec!["delete vpce-0abc", "describe", "describe"]);
        assert_eq!(
            services.calls(),
            vec!["get-service", "detach vpce-0abc", "get-service", "delete-service", "get-service"]
        );
    }

    #[tokio::test]
    async fn test_delete_detaches_one_interface_per_step() {
        let both = vec!["vpce-a".to_string(), "vpce-b".to_string()];
        let services = Arc::new(FakeServices {
            service_statuses: Mutex::new(VecDeque::from([
                (service_status::AVAILABLE, both.clone()),
                (service_status::AVAILABLE, both),
                (service_status::AVAILABLE, vec!["vpce-b".to_string()]),
                (service_status::AVAILABLE, vec![]),
            ])),
            ..Default::default()
        });
        let network = Arc::new(FakeNetwork::default());
        let controller = controller(services.clone(), network.clone(), Operation::Delete);
        let desired = PrivateEndpointModel {
            id: Some("svc-1".to_string()),
            ..model()
        };

        let step = controller.step(&no_context(), &desired).await;
        assert_eq!(phase_of(&step), "DETACHING_INTERFACES");
        assert_eq!(context_of(&step)["interfaceEndpointId"], "vpce-a");
        assert_eq!(context_of(&step)["networkEndpointIds"], "vpce-a,vpce-b");
        assert_eq!(services.calls(), vec!["get-service", "detach vpce-a"]);

        // vpce-a is still listed, so nothing new is requested
        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "DETACHING_INTERFACES");
        assert_eq!(context_of(&step)["interfaceEndpointId"], "vpce-a");
        assert_eq!(services.calls().len(), 3);

        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "DETACHING_INTERFACES");
        assert_eq!(context_of(&step)["interfaceEndpointId"], "vpce-b");

        let step = controller.step(&context_of(&step), &desired).await;
        assert_eq!(phase_of(&step), "REMOVING_NETWORK_ENDPOINTS");
        assert!(context_of(&step).get("interfaceEndpointId").is_none());

        assert_eq!(network.calls(), vec!["delete vpce-a,vpce-b"]);
        assert_eq!(
            services.calls(),
            vec![
                "get-service",
                "detach vpce-a",
                "get-service",
                "get-service",
                "detach vpce-b",
                "get-service",
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_of_missing_service_succeeds() {
        let services = Arc::new(FakeServices::default());
        let desired = PrivateEndpointModel {
            id: Some("svc-1".to_string()),
            ..model()
        };
        let outcome = controller(services.clone(), Arc::new(FakeNetwork::default()), Operation::Delete)
            .step(&no_context(), &desired)
            .await;
        assert!(success_model(&outcome).is_none());
        assert_eq!(services.calls(), vec!["get-service"]);
    }

    #[tokio::test]
    async fn test_create_requires_subnets() {
        let desired = PrivateEndpointModel {
            subnet_ids: Some(vec![]),
            ..model()
        };
        let services = Arc::new(FakeServices::default());
        let outcome = controller(services.clone(), Arc::new(FakeNetwork::default()), Operation::Create)
            .step(&no_context(), &desired)
            .await;
        let (_, category, _) = failure_of(&outcome);
        assert_eq!(category, ErrorCategory::Validation);
        assert!(services.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_interfaces() {
        let services = FakeServices::default();
        let endpoints = list(&services, "p1").await.unwrap();
        assert_eq!(endpoints[0].interface_endpoints, Some(vec!["vpce-9".to_string()]));
        assert_eq!(endpoints[0].status.as_deref(), Some("AVAILABLE"));
    }
}
