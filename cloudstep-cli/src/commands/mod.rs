pub mod config;
pub mod resource;
pub mod run;
pub mod step;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cloudstep_provisioning::gateway::{ControlPlaneClient, ControlPlaneGateway, NetworkEndpointGateway};
use cloudstep_provisioning::registry::{Gateways, Registry};
use cloudstep_provisioning::RawContext;
use serde_json::Value;

use crate::config::Config;

pub fn build_registry(config: &Config) -> Result<Registry> {
    let client = ControlPlaneClient::new(&config.api_url, config.api_token()?)?;
    let gateways = Gateways::control_plane(Arc::new(ControlPlaneGateway::new(client)), network_gateway());
    Ok(Registry::new(config.provisioning(), gateways))
}

#[cfg(feature = "aws")]
fn network_gateway() -> Arc<dyn NetworkEndpointGateway> {
    Arc::new(cloudstep_provisioning::gateway::Ec2NetworkGateway::new())
}

#[cfg(not(feature = "aws"))]
fn network_gateway() -> Arc<dyn NetworkEndpointGateway> {
    Arc::new(cloudstep_provisioning::gateway::UnconfiguredNetworkGateway)
}

pub fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

pub fn read_context(path: &Path) -> Result<RawContext> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(RawContext::new()),
        other => anyhow::bail!(
            "{} must hold a JSON object, found {}",
            path.display(),
            other
        ),
    }
}
