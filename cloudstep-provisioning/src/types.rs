//! Invocation types shared by every resource family

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::names::operations;

/// Flat key/value bag handed back to the caller between invocations.
pub type RawContext = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Operations
// ============================================================================

/// A resumable operation. Read and list are single-shot and never carry context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => operations::CREATE,
            Operation::Update => operations::UPDATE,
            Operation::Delete => operations::DELETE,
        }
    }

    /// Noun used in operator-facing messages ("waiting for cluster creation").
    pub fn noun(&self) -> &'static str {
        match self {
            Operation::Create => "creation",
            Operation::Update => "update",
            Operation::Delete => "deletion",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            operations::CREATE => Ok(Operation::Create),
            operations::UPDATE => Ok(Operation::Update),
            operations::DELETE => Ok(Operation::Delete),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Coarse failure category reported alongside every failed outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    Remote,
    Timeout,
    MalformedContext,
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<M> {
    /// Terminal success. Deletes carry no model.
    Success { model: Option<M>, message: String },
    /// Re-invoke after `delay` with `context` supplied verbatim.
    InProgress {
        context: RawContext,
        delay: Duration,
        message: String,
    },
    /// Terminal failure.
    Failed {
        message: String,
        category: ErrorCategory,
        retryable: bool,
    },
}

impl<M> Outcome<M> {
    pub fn from_error(err: &ProvisionError) -> Self {
        Outcome::Failed {
            message: err.to_string(),
            category: err.category(),
            retryable: err.is_retryable(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress { .. })
    }

    pub fn map_model<N>(self, f: impl FnOnce(M) -> N) -> Outcome<N> {
        match self {
            Outcome::Success { model, message } => Outcome::Success {
                model: model.map(f),
                message,
            },
            Outcome::InProgress {
                context,
                delay,
                message,
            } => Outcome::InProgress {
                context,
                delay,
                message,
            },
            Outcome::Failed {
                message,
                category,
                retryable,
            } => Outcome::Failed {
                message,
                category,
                retryable,
            },
        }
    }
}

// ============================================================================
// Step Response
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    InProgress,
    Failed,
}

/// Host-facing shape of an [`Outcome`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse<M> {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<M>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_context: Option<RawContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    /// False for every failure except transient gateway errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<M> From<Outcome<M>> for StepResponse<M> {
    fn from(outcome: Outcome<M>) -> Self {
        match outcome {
            Outcome::Success { model, message } => StepResponse {
                status: StepStatus::Success,
                model,
                message,
                retry_delay_seconds: None,
                continuation_context: None,
                error_category: None,
                retryable: None,
            },
            Outcome::InProgress {
                context,
                delay,
                message,
            } => StepResponse {
                status: StepStatus::InProgress,
                model: None,
                message,
                retry_delay_seconds: Some(delay.as_secs()),
                continuation_context: Some(context),
                error_category: None,
                retryable: None,
            },
            Outcome::Failed {
                message,
                category,
                retryable,
            } => StepResponse {
                status: StepStatus::Failed,
                model: None,
                message,
                retry_delay_seconds: None,
                continuation_context: None,
                error_category: Some(category),
                retryable: Some(retryable),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_response_serialization() {
        let mut context = RawContext::new();
        context.insert("phase".to_string(), "CREATING".into());
        let outcome: Outcome<()> = Outcome::InProgress {
            context,
            delay: Duration::from_secs(65),
            message: "creating".to_string(),
        };
        let json = serde_json::to_value(StepResponse::from(outcome)).unwrap();
        assert_eq!(json["status"], "InProgress");
        assert_eq!(json["retryDelaySeconds"], 65);
        assert_eq!(json["continuationContext"]["phase"], "CREATING");
        assert!(json.get("errorCategory").is_none());
    }

    #[test]
    fn test_failed_response_serialization() {
        let outcome: Outcome<()> = Outcome::Failed {
            message: "boom".to_string(),
            category: ErrorCategory::MalformedContext,
            retryable: false,
        };
        let json = serde_json::to_value(StepResponse::from(outcome)).unwrap();
        assert_eq!(json["status"], "Failed");
        assert_eq!(json["errorCategory"], "malformed_context");
        assert_eq!(json["retryable"], false);
    }

    #[test]
    fn test_operation_round_trip_through_str() {
        for op in [Operation::Create, Operation::Update, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>(), Ok(op));
        }
        assert!("read".parse::<Operation>().is_err());
    }
}
