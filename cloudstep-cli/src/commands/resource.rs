use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use super::{build_registry, read_json};
use crate::config::Config;

pub async fn run_read(config: &Config, family: &str, model_path: &Path) -> Result<()> {
    let registry = build_registry(config)?;
    let current = registry.read(family, read_json(model_path)?).await?;
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}

pub async fn run_list(config: &Config, family: &str, model_path: &Path, output: &str) -> Result<()> {
    let registry = build_registry(config)?;
    let resources = registry.list(family, read_json(model_path)?).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&resources)?);
        return Ok(());
    }

    // Table format
    println!("{:<30} {:<28} {:<20}", "NAME", "ID", "STATE");
    println!("{}", "-".repeat(80));
    for resource in &resources {
        println!(
            "{:<30} {:<28} {:<20}",
            first_str(resource, &["name", "processorName", "endpointServiceName", "exportId"]),
            first_str(resource, &["id", "exportId"]),
            first_str(resource, &["stateName", "state", "status"]),
        );
    }
    println!();
    println!("{} resource(s) found", resources.len());

    Ok(())
}

fn first_str<'a>(resource: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| resource[*key].as_str())
        .unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_str_falls_back_across_families() {
        let processor = json!({"processorName": "sp1", "state": "STARTED"});
        assert_eq!(first_str(&processor, &["name", "processorName"]), "sp1");
        assert_eq!(first_str(&processor, &["stateName", "state"]), "STARTED");
        assert_eq!(first_str(&processor, &["id"]), "-");
    }
}
