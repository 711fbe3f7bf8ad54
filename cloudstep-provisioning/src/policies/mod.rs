//! Phase policies, one per resource family

pub mod cluster;
pub mod export_job;
pub mod private_endpoint;
pub mod stream_processor;

pub use cluster::{ClusterPhase, ClusterPolicy};
pub use export_job::{ExportJobPhase, ExportJobPolicy};
pub use private_endpoint::{PrivateEndpointPhase, PrivateEndpointPolicy};
pub use stream_processor::{StreamProcessorPhase, StreamProcessorPolicy};

use crate::controller::Observation;
use crate::error::{GatewayResult, ProvisionError, Result};

/// Turn a gateway read into an observation, keeping 404 as [`Observation::Absent`].
pub(crate) fn observe_result<T>(result: GatewayResult<T>) -> Result<Observation<T>> {
    match result {
        Ok(remote) => Ok(Observation::Found(remote)),
        Err(e) if e.is_not_found() => Ok(Observation::Absent),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProvisionError::validation(format!("{} is required", field)))
}
