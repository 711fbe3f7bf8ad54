use std::path::Path;

use anyhow::Result;
use cloudstep_provisioning::{Operation, RawContext};

use super::{build_registry, read_context, read_json};
use crate::config::Config;

/// One invocation. The response JSON goes to stdout so it can be fed back with `--context`.
pub async fn run_step(
    config: &Config,
    family: &str,
    operation: Operation,
    model_path: &Path,
    context_path: Option<&Path>,
) -> Result<()> {
    let registry = build_registry(config)?;
    let model = read_json(model_path)?;
    let context = match context_path {
        Some(path) => read_context(path)?,
        None => RawContext::new(),
    };

    let response = registry.step(family, operation, &context, model).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
