use std::fmt::Write;

use anyhow::Result;

use crate::config::Config;

pub fn show(config: &Config) -> Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &Config) -> Result<String> {
    let provisioning = config.provisioning();
    let mut out = String::new();

    writeln!(out, "Cloudstep Configuration")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out, "API URL:            {}", config.api_url)?;
    writeln!(
        out,
        "API token:          {}",
        if config.api_token.is_some() { "set" } else { "not set" }
    )?;
    writeln!(
        out,
        "Network gateway:    {}",
        if cfg!(feature = "aws") {
            "EC2 (region from each model)"
        } else {
            "disabled (build with --features aws)"
        }
    )?;
    writeln!(
        out,
        "Log directory:      {}",
        config
            .log_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "(stderr only)".to_string())
    )?;
    writeln!(out)?;
    writeln!(out, "Poll delays")?;
    writeln!(out, "  cluster:          {}s", provisioning.delays.cluster.as_secs())?;
    writeln!(out, "  stream-processor: {}s", provisioning.delays.stream_processor.as_secs())?;
    writeln!(out, "  private-endpoint: {}s", provisioning.delays.private_endpoint.as_secs())?;
    writeln!(out, "  export-job:       {}s", provisioning.delays.export_job.as_secs())?;
    writeln!(out, "Fallback timeout:   {}s", provisioning.fallback_timeout.as_secs())?;
    writeln!(
        out,
        "Stream processor create timeout: {}",
        provisioning.stream_processor_create_timeout
    )?;

    Ok(out)
}
