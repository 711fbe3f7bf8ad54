//! Stream processor models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Timeouts;

/// Lifecycle states reported by the streams control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamProcessorState {
    Init,
    Creating,
    Created,
    Started,
    Stopped,
    Dropped,
    Failed,
}

impl StreamProcessorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Creating => "CREATING",
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
            Self::Dropped => "DROPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for StreamProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamProcessorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Self::Init),
            "CREATING" => Ok(Self::Creating),
            "CREATED" => Ok(Self::Created),
            "STARTED" => Ok(Self::Started),
            "STOPPED" => Ok(Self::Stopped),
            "DROPPED" => Ok(Self::Dropped),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown stream processor state: {}", other)),
        }
    }
}

/// Desired configuration for a stream processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamProcessorModel {
    pub project_id: Option<String>,
    /// Stream workspace that hosts the processor
    pub workspace_name: Option<String>,
    /// Deprecated alias of `workspace_name`
    pub instance_name: Option<String>,
    pub processor_name: Option<String>,
    /// Aggregation pipeline as a JSON array string
    pub pipeline: Option<String>,
    /// Desired end state: CREATED, STARTED or STOPPED (default CREATED)
    pub state: Option<String>,
    pub options: Option<StreamsOptions>,
    pub timeouts: Option<Timeouts>,
    /// Delete a half-created processor when the create timeout is reached (default true)
    pub delete_on_create_timeout: Option<bool>,

    // Server-assigned
    pub id: Option<String>,
    /// Processor statistics as a JSON string
    pub stats: Option<String>,
}

impl StreamProcessorModel {
    /// Resolve the workspace from either the current or the deprecated field.
    pub fn workspace(&self) -> Option<&str> {
        self.workspace_name
            .as_deref()
            .or(self.instance_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    /// Fill both workspace fields so callers using either name see a value.
    pub fn normalize_workspace(&mut self) {
        if let Some(name) = self.workspace().map(str::to_string) {
            self.workspace_name = Some(name.clone());
            self.instance_name = Some(name);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlq: Option<DeadLetterQueue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterQueue {
    pub coll: String,
    pub connection_name: String,
    pub db: String,
}

/// Request body for create and modify calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamProcessorRequest {
    pub name: String,
    pub pipeline: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<StreamsOptions>,
}

/// Stream processor as returned by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStreamProcessor {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub pipeline: Vec<serde_json::Value>,
    pub state: String,
    pub options: Option<StreamsOptions>,
    pub stats: Option<serde_json::Value>,
}

impl RemoteStreamProcessor {
    pub fn parsed_state(&self) -> Option<StreamProcessorState> {
        self.state.parse().ok()
    }
}
