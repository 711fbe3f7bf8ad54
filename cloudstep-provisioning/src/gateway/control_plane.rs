//! REST adapters for the database control plane

use async_trait::async_trait;
use cloudstep_models::{
    ClusterRequest, EndpointService, ExportJobRequest, InterfaceEndpoint, Page, ProcessArgs,
    RemoteCluster, RemoteExportJob, RemoteStreamProcessor, StreamProcessorRequest,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::http::ControlPlaneClient;
use super::{ClusterGateway, EndpointServiceGateway, ExportJobGateway, GatewayResult, StreamProcessorGateway};

const API_ROOT: &str = "/api/atlas/v2/groups";
const ITEMS_PER_PAGE: usize = 100;
const PROVIDER: &str = "AWS";

/// Some list calls answer with a bare array instead of a page envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Unpaged(Vec<T>),
    Paged(Page<T>),
}

/// Gateway for every family hosted by the database control plane.
#[derive(Clone)]
pub struct ControlPlaneGateway {
    client: ControlPlaneClient,
}

impl ControlPlaneGateway {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }

    /// Follow `pageNum` until `totalCount` results have been collected.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page_num = 1;
        loop {
            let listing: Listing<T> = self
                .client
                .get_with_query(
                    path,
                    &[
                        ("itemsPerPage", ITEMS_PER_PAGE.to_string()),
                        ("pageNum", page_num.to_string()),
                    ],
                )
                .await?;
            let page = match listing {
                Listing::Unpaged(all) => return Ok(all),
                Listing::Paged(page) => page,
            };
            let received = page.results.len();
            items.extend(page.results);
            if received == 0 || items.len() as u64 >= page.total_count {
                return Ok(items);
            }
            page_num += 1;
        }
    }
}

fn cluster_path(project_id: &str, name: &str) -> String {
    format!("{}/{}/clusters/{}", API_ROOT, project_id, name)
}

fn processor_path(project_id: &str, workspace: &str, name: &str) -> String {
    format!("{}/{}/streams/{}/processor/{}", API_ROOT, project_id, workspace, name)
}

fn service_path(project_id: &str, service_id: &str) -> String {
    format!(
        "{}/{}/privateEndpoint/{}/endpointService/{}",
        API_ROOT, project_id, PROVIDER, service_id
    )
}

fn export_path(project_id: &str, cluster_name: &str) -> String {
    format!("{}/{}/clusters/{}/backup/exports", API_ROOT, project_id, cluster_name)
}

#[async_trait]
impl ClusterGateway for ControlPlaneGateway {
    async fn create_cluster(&self, project_id: &str, request: &ClusterRequest) -> GatewayResult<RemoteCluster> {
        self.client
            .post(&format!("{}/{}/clusters", API_ROOT, project_id), request)
            .await
    }

    async fn get_cluster(&self, project_id: &str, name: &str) -> GatewayResult<RemoteCluster> {
        self.client.get(&cluster_path(project_id, name)).await
    }

    async fn update_cluster(
        &self,
        project_id: &str,
        name: &str,
        request: &ClusterRequest,
    ) -> GatewayResult<RemoteCluster> {
        self.client.patch(&cluster_path(project_id, name), request).await
    }

    async fn delete_cluster(&self, project_id: &str, name: &str) -> GatewayResult<()> {
        self.client.delete(&cluster_path(project_id, name)).await
    }

    async fn list_clusters(&self, project_id: &str) -> GatewayResult<Vec<RemoteCluster>> {
        self.list_all(&format!("{}/{}/clusters", API_ROOT, project_id)).await
    }

    async fn update_process_args(
        &self,
        project_id: &str,
        name: &str,
        args: &ProcessArgs,
    ) -> GatewayResult<ProcessArgs> {
        self.client
            .patch(&format!("{}/processArgs", cluster_path(project_id, name)), args)
            .await
    }
}

#[async_trait]
impl StreamProcessorGateway for ControlPlaneGateway {
    async fn create_processor(
        &self,
        project_id: &str,
        workspace: &str,
        request: &StreamProcessorRequest,
    ) -> GatewayResult<RemoteStreamProcessor> {
        self.client
            .post(
                &format!("{}/{}/streams/{}/processor", API_ROOT, project_id, workspace),
                request,
            )
            .await
    }

    async fn get_processor(
        &self,
        project_id: &str,
        workspace: &str,
        name: &str,
    ) -> GatewayResult<RemoteStreamProcessor> {
        self.client.get(&processor_path(project_id, workspace, name)).await
    }

    async fn update_processor(
        &self,
        project_id: &str,
        workspace: &str,
        name: &str,
        request: &StreamProcessorRequest,
    ) -> GatewayResult<RemoteStreamProcessor> {
        self.client
            .patch(&processor_path(project_id, workspace, name), request)
            .await
    }

    async fn delete_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()> {
        self.client.delete(&processor_path(project_id, workspace, name)).await
    }

    async fn list_processors(&self, project_id: &str, workspace: &str) -> GatewayResult<Vec<RemoteStreamProcessor>> {
        self.list_all(&format!("{}/{}/streams/{}/processors", API_ROOT, project_id, workspace))
            .await
    }

    async fn start_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()> {
        self.client
            .post_empty(&format!("{}:start", processor_path(project_id, workspace, name)))
            .await
    }

    async fn stop_processor(&self, project_id: &str, workspace: &str, name: &str) -> GatewayResult<()> {
        self.client
            .post_empty(&format!("{}:stop", processor_path(project_id, workspace, name)))
            .await
    }
}

#[async_trait]
impl EndpointServiceGateway for ControlPlaneGateway {
    async fn create_service(&self, project_id: &str, region: &str) -> GatewayResult<EndpointService> {
        self.client
            .post(
                &format!("{}/{}/privateEndpoint/endpointService", API_ROOT, project_id),
                &json!({ "providerName": PROVIDER, "region": region }),
            )
            .await
    }

    async fn get_service(&self, project_id: &str, service_id: &str) -> GatewayResult<EndpointService> {
        self.client.get(&service_path(project_id, service_id)).await
    }

    async fn delete_service(&self, project_id: &str, service_id: &str) -> GatewayResult<()> {
        self.client.delete(&service_path(project_id, service_id)).await
    }

    async fn list_services(&self, project_id: &str) -> GatewayResult<Vec<EndpointService>> {
        self.list_all(&format!(
            "{}/{}/privateEndpoint/{}/endpointService",
            API_ROOT, project_id, PROVIDER
        ))
        .await
    }

    async fn attach_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<InterfaceEndpoint> {
        self.client
            .post(
                &format!("{}/endpoint", service_path(project_id, service_id)),
                &json!({ "id": interface_endpoint_id }),
            )
            .await
    }

    async fn get_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<InterfaceEndpoint> {
        self.client
            .get(&format!(
                "{}/endpoint/{}",
                service_path(project_id, service_id),
                interface_endpoint_id
            ))
            .await
    }

    async fn detach_interface(
        &self,
        project_id: &str,
        service_id: &str,
        interface_endpoint_id: &str,
    ) -> GatewayResult<()> {
        self.client
            .delete(&format!(
                "{}/endpoint/{}",
                service_path(project_id, service_id),
                interface_endpoint_id
            ))
            .await
    }
}

#[async_trait]
impl ExportJobGateway for ControlPlaneGateway {
    async fn create_export(
        &self,
        project_id: &str,
        cluster_name: &str,
        request: &ExportJobRequest,
    ) -> GatewayResult<RemoteExportJob> {
        self.client.post(&export_path(project_id, cluster_name), request).await
    }

    async fn get_export(&self, project_id: &str, cluster_name: &str, export_id: &str) -> GatewayResult<RemoteExportJob> {
        self.client
            .get(&format!("{}/{}", export_path(project_id, cluster_name), export_id))
            .await
    }

    async fn list_exports(&self, project_id: &str, cluster_name: &str) -> GatewayResult<Vec<RemoteExportJob>> {
        self.list_all(&export_path(project_id, cluster_name)).await
    }
}
