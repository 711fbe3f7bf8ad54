//! Error types for provisioning steps and gateway calls

use thiserror::Error;

use crate::types::ErrorCategory;

pub type Result<T> = std::result::Result<T, ProvisionError>;
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Failure reported by a remote control plane or while talking to it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("remote API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The gateway is not available in this build.
    #[error("{0}")]
    Unsupported(String),
}

impl GatewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(404, message)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Transport failures, throttling and server errors may succeed on a later invocation.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Api { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Decode(_) | GatewayError::Unsupported(_) => false,
        }
    }
}

/// A continuation context that cannot be resumed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContextError {
    #[error("missing key `{0}`")]
    MissingKey(&'static str),

    #[error("unsupported version {0}")]
    UnsupportedVersion(String),

    #[error("context belongs to {found}, expected {expected}")]
    WrongTarget { expected: String, found: String },

    #[error("unknown phase `{0}`")]
    UnknownPhase(String),

    #[error("key `{0}` has the wrong type")]
    WrongType(&'static str),

    #[error("key `{0}` holds a non-primitive value")]
    NonPrimitive(String),

    #[error("invalid start time `{0}`")]
    InvalidStartTime(String),

    #[error("invalid identifiers: {0}")]
    InvalidIdentifiers(String),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The desired model is inconsistent or asks for an unsupported transition.
    #[error("{0}")]
    Validation(String),

    /// A resource that had to exist is gone.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The remote resource reached a failed state.
    #[error("{0}")]
    RemoteFailure(String),

    #[error("{0}")]
    Timeout(String),

    #[error("error parsing continuation context: {0}")]
    Context(#[from] ContextError),
}

impl ProvisionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProvisionError::Validation(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProvisionError::Validation(_) => ErrorCategory::Validation,
            ProvisionError::NotFound(_) => ErrorCategory::NotFound,
            ProvisionError::Gateway(e) if e.is_conflict() => ErrorCategory::Conflict,
            ProvisionError::Gateway(e) if e.is_not_found() => ErrorCategory::NotFound,
            ProvisionError::Gateway(_) | ProvisionError::RemoteFailure(_) => ErrorCategory::Remote,
            ProvisionError::Timeout(_) => ErrorCategory::Timeout,
            ProvisionError::Context(_) => ErrorCategory::MalformedContext,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::Gateway(e) => e.is_retryable(),
            _ => false,
        }
    }
}
