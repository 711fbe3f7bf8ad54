use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use cloudstep_provisioning::{Operation, RawContext, StepStatus};
use tracing::info;

use super::{build_registry, read_json};
use crate::config::Config;

/// Drive an operation to a terminal outcome, sleeping between steps as requested.
pub async fn run_until_done(
    config: &Config,
    family: &str,
    operation: Operation,
    model_path: &Path,
    max_steps: usize,
) -> Result<()> {
    let registry = build_registry(config)?;
    let model = read_json(model_path)?;
    let mut context = RawContext::new();

    for step in 1..=max_steps {
        let response = registry.step(family, operation, &context, model.clone()).await;
        match response.status {
            StepStatus::InProgress => {
                let delay = Duration::from_secs(response.retry_delay_seconds.unwrap_or(0));
                info!(step, delay_secs = delay.as_secs(), "{}", response.message);
                context = response.continuation_context.unwrap_or_default();
                tokio::time::sleep(delay).await;
            }
            StepStatus::Success => {
                info!(step, "{}", response.message);
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            StepStatus::Failed => {
                println!("{}", serde_json::to_string_pretty(&response)?);
                anyhow::bail!("{} {} failed: {}", family, operation, response.message);
            }
        }
    }

    anyhow::bail!("{} {} still in progress after {} steps", family, operation, max_steps)
}
