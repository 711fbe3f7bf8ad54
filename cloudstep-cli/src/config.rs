use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cloudstep_provisioning::config::{PollDelays, ProvisioningConfig, DEFAULT_FALLBACK_TIMEOUT};
use cloudstep_provisioning::supervisor::parse_duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_token: Option<String>,
    /// Overrides every family's poll delay
    pub poll_delay: Option<Duration>,
    pub fallback_timeout: Duration,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let poll_delay = match std::env::var("CLOUDSTEP_POLL_DELAY_SECS") {
            Ok(raw) => Some(Duration::from_secs(
                raw.parse()
                    .context("CLOUDSTEP_POLL_DELAY_SECS must be a whole number of seconds")?,
            )),
            Err(_) => None,
        };

        let fallback_timeout = match std::env::var("CLOUDSTEP_FALLBACK_TIMEOUT") {
            Ok(raw) => parse_duration(&raw)
                .with_context(|| format!("CLOUDSTEP_FALLBACK_TIMEOUT is not a duration: {}", raw))?,
            Err(_) => DEFAULT_FALLBACK_TIMEOUT,
        };

        Ok(Self {
            api_url: std::env::var("CLOUDSTEP_API_URL")
                .unwrap_or_else(|_| "https://cloud.mongodb.com".to_string()),
            api_token: std::env::var("CLOUDSTEP_API_TOKEN").ok(),
            poll_delay,
            fallback_timeout,
            log_dir: std::env::var("CLOUDSTEP_LOG_DIR").ok().map(PathBuf::from),
        })
    }

    pub fn api_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .context("CLOUDSTEP_API_TOKEN must be set")
    }

    pub fn provisioning(&self) -> ProvisioningConfig {
        let defaults = ProvisioningConfig::default();
        ProvisioningConfig {
            delays: self.poll_delay.map(PollDelays::uniform).unwrap_or(defaults.delays),
            fallback_timeout: self.fallback_timeout,
            ..defaults
        }
    }
}
