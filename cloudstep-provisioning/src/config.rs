//! Controller configuration
//!
//! Values are passed to controllers and policies at construction; nothing is
//! read from process-wide state.

use std::time::Duration;

use cloudstep_models::Label;

/// Budget used when a context carries a timeout that cannot be parsed.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Per-controller settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Delay requested from the caller between invocations
    pub poll_delay: Duration,
    /// Timeout budget used when the encoded one is unparseable
    pub fallback_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(poll_delay: Duration) -> Self {
        Self {
            poll_delay,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    pub fn with_fallback_timeout(mut self, fallback_timeout: Duration) -> Self {
        self.fallback_timeout = fallback_timeout;
        self
    }
}

/// Poll delays per resource family.
#[derive(Debug, Clone, PartialEq)]
pub struct PollDelays {
    pub cluster: Duration,
    pub stream_processor: Duration,
    pub private_endpoint: Duration,
    pub export_job: Duration,
}

impl Default for PollDelays {
    fn default() -> Self {
        Self {
            cluster: Duration::from_secs(60),
            stream_processor: Duration::from_secs(3),
            private_endpoint: Duration::from_secs(10),
            export_job: Duration::from_secs(35),
        }
    }
}

impl PollDelays {
    /// Same delay for every family.
    pub fn uniform(delay: Duration) -> Self {
        Self {
            cluster: delay,
            stream_processor: delay,
            private_endpoint: delay,
            export_job: delay,
        }
    }
}

/// Settings shared by every family in a [`crate::registry::Registry`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisioningConfig {
    pub delays: PollDelays,
    pub fallback_timeout: Duration,
    /// Label the control plane stamps on resources it manages; callers may not set it
    pub reserved_label: Label,
    /// Default create budget for stream processors when the model sets none
    pub stream_processor_create_timeout: String,
    /// Export job state that marks completion
    pub export_completion_state: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            delays: PollDelays::default(),
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            reserved_label: Label {
                key: "Infrastructure Tool".to_string(),
                value: "cloudstep".to_string(),
            },
            stream_processor_create_timeout: "20m".to_string(),
            export_completion_state: "Successful".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn controller(&self, poll_delay: Duration) -> ControllerConfig {
        ControllerConfig::new(poll_delay).with_fallback_timeout(self.fallback_timeout)
    }
}
