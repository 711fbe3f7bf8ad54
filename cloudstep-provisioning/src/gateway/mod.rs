//! External resource gateways
//!
//! One small trait per resource family. Every call either returns the remote
//! object or a [`GatewayError`] carrying an HTTP-style status, so policies can
//! tell "absent" (404) and "already exists" (409) apart from other failures.

use async_trait::async_trait;
use cloudstep_models::{
    ClusterRequest, EndpointService, ExportJobRequest, InterfaceEndpoint, NetworkEndpoint,
    ProcessArgs, RemoteCluster, RemoteExportJob, RemoteStreamProcessor, StreamProcessorRequest,
};

pub use crate::error::{GatewayError, GatewayResult};

pub mod control_plane;
pub mod http;
#[cfg(feature = "aws")]
pub mod network;

pub use control_plane::ControlPlaneGateway;
pub use http::ControlPlaneClient;
#[cfg(feature = "aws")]
pub use network::Ec2NetworkGateway;

/// Map a 404 to `Ok(None)`.
pub fn absent_on_404<T>(result: GatewayResult<T>) -> GatewayResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn create_cluster(&self, project_id: &str, request: &ClusterRequest) -> GatewayResult<RemoteCluster>;

    async fn get_cluster(&self, project_id: &str, name: &str) -> GatewayResult<RemoteCluster>;

    async fn update_cluster(
        &self,
        project_id: &str,
        name: &str,
        request: &ClusterRequest,
    ) -> GatewayResult<RemoteCluster>;

    async fn delete_cluster(&self, project_id: &str, name: &str) -> GatewayResult<()>;

    async fn list_clusters(&self, project_id: &str) -> GatewayResult<Vec<RemoteCluster>>;

    async fn update_process_args(
        &self,
        project_id: &str,
        name: &str,
        args: &ProcessArgs,
    ) -> GatewayResult<ProcessArgs>;
}

#[async_trait]
pub trait StreamProcessorGateway: Send + Sync {
    async fn create_processor(
        &self,
        project_id: &str,
        workspace: &str,
        request: &StreamProcessorRequest,
    ) -> GatewayResult<RemoteStreamProcessor>;

    async fn get_processor(
        &self,
        project_id: &str,
        workspace: &str,
        name: &str,
    ) -> GatewayResult<RemoteStreamProcessor>;

    async fn update_processor(
        &self,
        project_id: &str,
        workspace: &str,
        name: &str,
        request: &StreamProcessorRequest,
    ) -> GatewayResult<RemoteStreamProcessor>;

    async fn delete_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()>;

    async fn list_processors(&self, project_id: &str, workspace: &str) -> GatewayResult<Vec<RemoteStreamProcessor>>;

    async fn start_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()>;

    async fn stop_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()>;
}

/// Database-side half of a private endpoint.
#[async_trait]
pub trait EndpointServiceGateway: Send + Sync {
    async fn create_service(&self, project_id: &str, region: &str) -> GatewayResult<EndpointService>;

    async fn get_service(&self, project_id: &str, service_id: &str) -> GatewayResult<EndpointService>;

    async fn delete_service(&self, project_id: &str, service_id: &str) -> GatewayResult<()>;

    async fn list_services(&self, project_id: &str) -> GatewayResult<Vec<EndpointService>>;

    /// Register a provider-side endpoint id with the service.
    async fn attach_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<InterfaceEndpoint>;

    async fn get_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<InterfaceEndpoint>;

    async fn detach_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<()>;
}

/// Network-provider half of a private endpoint.
#[async_trait]
pub trait NetworkEndpointGateway: Send + Sync {
    async fn create_endpoint(
        &self,
        region: &str,
        service_name: &str,
        vpc_id: &str,
        subnet_ids: &[String],
    ) -> GatewayResult<NetworkEndpoint>;

    /// Endpoints the provider no longer knows about are omitted.
    async fn describe_endpoints(&self, region: &str, endpoint_ids: &[String]) -> GatewayResult<Vec<NetworkEndpoint>>;

    async fn delete_endpoints(&self, region: &str, endpoint_ids: &[String]) -> GatewayResult<()>;
}

#[async_trait]
pub trait ExportJobGateway: Send + Sync {
    async fn create_export(
        &self,
        project_id: &str,
        cluster_name: &str,
        request: &ExportJobRequest,
    ) -> GatewayResult<RemoteExportJob>;

    async fn get_export(&self, project_id: &str, cluster_name: &str, export_id: &str) -> GatewayResult<RemoteExportJob>;

    async fn list_exports(&self, project_id: &str, cluster_name: &str) -> GatewayResult<Vec<RemoteExportJob>>;
}

/// Network gateway for builds without a provider SDK. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredNetworkGateway;

impl UnconfiguredNetworkGateway {
    fn unsupported<T>() -> GatewayResult<T> {
        Err(GatewayError::Unsupported(
            "network provider support is not compiled in; rebuild with the `aws` feature".to_string(),
        ))
    }
}

#[async_trait]
impl NetworkEndpointGateway for UnconfiguredNetworkGateway {
    async fn create_endpoint(&self, _: &str, _: &str, _: &str, _: &[String]) -> GatewayResult<NetworkEndpoint> {
        Self::unsupported()
    }

    async fn describe_endpoints(&self, _: &str, _: &[String]) -> GatewayResult<Vec<NetworkEndpoint>> {
        Self::unsupported()
    }

    async fn delete_endpoints(&self, _: &str, _: &[String]) -> GatewayResult<()> {
        Self::unsupported()
    }
}
