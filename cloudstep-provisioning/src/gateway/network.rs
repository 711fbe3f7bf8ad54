//! EC2 interface endpoints for the network-provider side of private endpoints

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_ec2::types::VpcEndpointType;
use aws_sdk_ec2::Client;
use cloudstep_models::NetworkEndpoint;
use tokio::sync::Mutex;

use super::{GatewayError, GatewayResult, NetworkEndpointGateway};

const NOT_FOUND_CODE: &str = "InvalidVpcEndpointId.NotFound";

fn sdk_error<E>(err: E) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some(NOT_FOUND_CODE) => GatewayError::not_found(message),
        Some(code) if code.starts_with("InvalidParameter") => GatewayError::api(400, message),
        Some(_) => GatewayError::api(500, message),
        None => GatewayError::Transport(message),
    }
}

/// EC2-backed [`NetworkEndpointGateway`], one client per region.
pub struct Ec2NetworkGateway {
    clients: Mutex<HashMap<String, Client>>,
}

impl Ec2NetworkGateway {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let client = Client::new(&config);
        clients.insert(region.to_string(), client.clone());
        client
    }
}

impl Default for Ec2NetworkGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkEndpointGateway for Ec2NetworkGateway {
    async fn create_endpoint(
        &self,
        region: &str,
        service_name: &str,
        vpc_id: &str,
        subnet_ids: &[String],
    ) -> GatewayResult<NetworkEndpoint> {
        tracing::debug!(region, service_name, vpc_id, "CreateVpcEndpoint");
        let output = self
            .client(region)
            .await
            .create_vpc_endpoint()
            .vpc_endpoint_type(VpcEndpointType::Interface)
            .service_name(service_name)
            .vpc_id(vpc_id)
            .set_subnet_ids(Some(subnet_ids.to_vec()))
            .send()
            .await
            .map_err(sdk_error)?;

        let endpoint = output
            .vpc_endpoint()
            .ok_or_else(|| GatewayError::Decode("CreateVpcEndpoint returned no endpoint".to_string()))?;
        Ok(NetworkEndpoint {
            id: endpoint.vpc_endpoint_id().unwrap_or_default().to_string(),
            state: endpoint
                .state()
                .map(|state| state.as_str().to_lowercase())
                .unwrap_or_default(),
        })
    }

    async fn describe_endpoints(&self, region: &str, endpoint_ids: &[String]) -> GatewayResult<Vec<NetworkEndpoint>> {
        if endpoint_ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(region, ?endpoint_ids, "DescribeVpcEndpoints");
        let result = self
            .client(region)
            .await
            .describe_vpc_endpoints()
            .set_vpc_endpoint_ids(Some(endpoint_ids.to_vec()))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => match sdk_error(err) {
                e if e.is_not_found() => return Ok(Vec::new()),
                e => return Err(e),
            },
        };

        Ok(output
            .vpc_endpoints()
            .iter()
            .map(|endpoint| NetworkEndpoint {
                id: endpoint.vpc_endpoint_id().unwrap_or_default().to_string(),
                state: endpoint
                    .state()
                    .map(|state| state.as_str().to_lowercase())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_endpoints(&self, region: &str, endpoint_ids: &[String]) -> GatewayResult<()> {
        if endpoint_ids.is_empty() {
            return Ok(());
        }
        tracing::debug!(region, ?endpoint_ids, "DeleteVpcEndpoints");
        self.client(region)
            .await
            .delete_vpc_endpoints()
            .set_vpc_endpoint_ids(Some(endpoint_ids.to_vec()))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}
