//! Continuation context codec
//!
//! A continuation is encoded as a flat map of primitives:
//!
//! ```text
//! { "v": 1, "family": "cluster", "operation": "create", "phase": "CREATING",
//!   "operationId": "…", "startTime": "2024-05-01T10:00:00.000Z",
//!   "timeoutDuration": "20m", "deleteOnTimeout": true,
//!   "projectId": "…", "clusterName": "…" }
//! ```
//!
//! Reserved keys describe where the operation is; every other key belongs to
//! the family's identifier record, which must reject unknown fields.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ContextError;
use crate::types::{Operation, RawContext};

pub const CONTEXT_VERSION: u64 = 1;

/// Reserved context keys
pub mod keys {
    pub const VERSION: &str = "v";
    pub const FAMILY: &str = "family";
    pub const OPERATION: &str = "operation";
    pub const PHASE: &str = "phase";
    pub const OPERATION_ID: &str = "operationId";
    pub const START_TIME: &str = "startTime";
    pub const TIMEOUT: &str = "timeoutDuration";
    pub const DELETE_ON_TIMEOUT: &str = "deleteOnTimeout";

    pub const RESERVED: [&str; 8] = [
        VERSION,
        FAMILY,
        OPERATION,
        PHASE,
        OPERATION_ID,
        START_TIME,
        TIMEOUT,
        DELETE_ON_TIMEOUT,
    ];
}

/// A family's phase enum as it appears in the `phase` key.
pub trait PhaseTag: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;

    /// `None` for tags this family does not define.
    fn parse(tag: &str) -> Option<Self>;
}

/// Time budget of a time-bounded operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub started_at: DateTime<Utc>,
    /// Raw duration string, parsed by the supervisor on every check
    pub timeout: Option<String>,
    pub delete_on_timeout: bool,
}

/// Typed view of a continuation context.
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation<P, I> {
    pub operation_id: Uuid,
    pub phase: P,
    pub ids: I,
    pub timing: Option<Timing>,
}

impl<P: PhaseTag, I> Continuation<P, I> {
    /// Same operation, new phase and identifiers.
    pub fn advance(self, phase: P, ids: I) -> Self {
        Continuation {
            phase,
            ids,
            ..self
        }
    }
}

/// Codec bound to one family and operation, so a context minted for one
/// resource can never drive another.
#[derive(Debug, Clone, Copy)]
pub struct ContextCodec {
    family: &'static str,
    operation: Operation,
}

impl ContextCodec {
    pub fn new(family: &'static str, operation: Operation) -> Self {
        Self { family, operation }
    }

    pub fn encode<P, I>(&self, continuation: &Continuation<P, I>) -> Result<RawContext, ContextError>
    where
        P: PhaseTag,
        I: Serialize,
    {
        let mut raw = RawContext::new();
        raw.insert(keys::VERSION.to_string(), Value::from(CONTEXT_VERSION));
        raw.insert(keys::FAMILY.to_string(), Value::from(self.family));
        raw.insert(keys::OPERATION.to_string(), Value::from(self.operation.as_str()));
        raw.insert(keys::PHASE.to_string(), Value::from(continuation.phase.as_str()));
        raw.insert(
            keys::OPERATION_ID.to_string(),
            Value::from(continuation.operation_id.to_string()),
        );

        if let Some(timing) = &continuation.timing {
            raw.insert(
                keys::START_TIME.to_string(),
                Value::from(timing.started_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            if let Some(timeout) = &timing.timeout {
                raw.insert(keys::TIMEOUT.to_string(), Value::from(timeout.as_str()));
            }
            raw.insert(
                keys::DELETE_ON_TIMEOUT.to_string(),
                Value::from(timing.delete_on_timeout),
            );
        }

        let ids = serde_json::to_value(&continuation.ids)
            .map_err(|e| ContextError::InvalidIdentifiers(e.to_string()))?;
        let Value::Object(fields) = ids else {
            return Err(ContextError::InvalidIdentifiers(
                "identifiers must encode as a record".to_string(),
            ));
        };
        for (key, value) in fields {
            if value.is_null() {
                continue;
            }
            if keys::RESERVED.contains(&key.as_str()) {
                return Err(ContextError::InvalidIdentifiers(format!("`{}` is a reserved key", key)));
            }
            if !is_primitive(&value) {
                return Err(ContextError::NonPrimitive(key));
            }
            raw.insert(key, value);
        }

        Ok(raw)
    }

    /// `Ok(None)` for an empty context (first invocation).
    pub fn decode<P, I>(&self, raw: &RawContext) -> Result<Option<Continuation<P, I>>, ContextError>
    where
        P: PhaseTag,
        I: DeserializeOwned,
    {
        if raw.is_empty() {
            return Ok(None);
        }
        if let Some((key, _)) = raw.iter().find(|(_, value)| !is_primitive(value)) {
            return Err(ContextError::NonPrimitive(key.clone()));
        }

        let version = raw.get(keys::VERSION).ok_or(ContextError::MissingKey(keys::VERSION))?;
        if version.as_u64() != Some(CONTEXT_VERSION) {
            return Err(ContextError::UnsupportedVersion(version.to_string()));
        }

        let family = required_str(raw, keys::FAMILY)?;
        let operation = required_str(raw, keys::OPERATION)?;
        if family != self.family || operation != self.operation.as_str() {
            return Err(ContextError::WrongTarget {
                expected: format!("{} {}", self.family, self.operation),
                found: format!("{} {}", family, operation),
            });
        }

        let tag = required_str(raw, keys::PHASE)?;
        let phase = P::parse(tag).ok_or_else(|| ContextError::UnknownPhase(tag.to_string()))?;

        let operation_id = Uuid::parse_str(required_str(raw, keys::OPERATION_ID)?)
            .map_err(|_| ContextError::WrongType(keys::OPERATION_ID))?;

        let timing = decode_timing(raw)?;

        let ids: serde_json::Map<String, Value> = raw
            .iter()
            .filter(|(key, value)| !keys::RESERVED.contains(&key.as_str()) && !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let ids = serde_json::from_value(Value::Object(ids))
            .map_err(|e| ContextError::InvalidIdentifiers(e.to_string()))?;

        Ok(Some(Continuation {
            operation_id,
            phase,
            ids,
            timing,
        }))
    }
}

fn decode_timing(raw: &RawContext) -> Result<Option<Timing>, ContextError> {
    let Some(start) = raw.get(keys::START_TIME) else {
        if raw.contains_key(keys::TIMEOUT) || raw.contains_key(keys::DELETE_ON_TIMEOUT) {
            return Err(ContextError::MissingKey(keys::START_TIME));
        }
        return Ok(None);
    };

    let start = start
        .as_str()
        .ok_or_else(|| ContextError::InvalidStartTime(start.to_string()))?;
    let started_at = DateTime::parse_from_rfc3339(start)
        .map_err(|_| ContextError::InvalidStartTime(start.to_string()))?
        .with_timezone(&Utc);

    let timeout = match raw.get(keys::TIMEOUT) {
        Some(value) => Some(
            value
                .as_str()
                .ok_or(ContextError::WrongType(keys::TIMEOUT))?
                .to_string(),
        ),
        None => None,
    };
    let delete_on_timeout = match raw.get(keys::DELETE_ON_TIMEOUT) {
        Some(value) => value.as_bool().ok_or(ContextError::WrongType(keys::DELETE_ON_TIMEOUT))?,
        None => false,
    };

    Ok(Some(Timing {
        started_at,
        timeout,
        delete_on_timeout,
    }))
}

fn required_str<'a>(raw: &'a RawContext, key: &'static str) -> Result<&'a str, ContextError> {
    raw.get(key)
        .ok_or(ContextError::MissingKey(key))?
        .as_str()
        .ok_or(ContextError::WrongType(key))
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Serde adapter that keeps identifier lists flat as one comma-separated string.
pub mod comma_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&items.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Creating,
        Starting,
    }

    impl PhaseTag for Phase {
        fn as_str(&self) -> &'static str {
            match self {
                Phase::Creating => "CREATING",
                Phase::Starting => "STARTING",
            }
        }

        fn parse(tag: &str) -> Option<Self> {
            match tag {
                "CREATING" => Some(Phase::Creating),
                "STARTING" => Some(Phase::Starting),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Ids {
        project_id: String,
        name: String,
        #[serde(default)]
        needs_starting: bool,
        #[serde(default, with = "comma_list", skip_serializing_if = "Vec::is_empty")]
        endpoint_ids: Vec<String>,
    }

    fn codec() -> ContextCodec {
        ContextCodec::new("stream-processor", Operation::Create)
    }

    fn sample() -> Continuation<Phase, Ids> {
        Continuation {
            operation_id: Uuid::new_v4(),
            phase: Phase::Creating,
            ids: Ids {
                project_id: "p1".to_string(),
                name: "enrich".to_string(),
                needs_starting: true,
                endpoint_ids: vec!["vpce-1".to_string(), "vpce-2".to_string()],
            },
            timing: Some(Timing {
                started_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
                timeout: Some("20m".to_string()),
                delete_on_timeout: true,
            }),
        }
    }

    fn encoded() -> RawContext {
        codec().encode(&sample()).unwrap()
    }

    #[test]
    fn test_empty_context_is_first_invocation() {
        let decoded: Option<Continuation<Phase, Ids>> = codec().decode(&RawContext::new()).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_encoded_context_is_flat_and_resumable() {
        let raw = encoded();
        assert!(raw.values().all(is_primitive));
        assert_eq!(raw["phase"], "CREATING");
        assert_eq!(raw["startTime"], "2024-05-01T10:00:00.000Z");
        assert_eq!(raw["endpointIds"], "vpce-1,vpce-2");

        let decoded: Continuation<Phase, Ids> = codec().decode(&raw).unwrap().unwrap();
        assert_eq!(decoded, sample_with_id(&raw));
    }

    fn sample_with_id(raw: &RawContext) -> Continuation<Phase, Ids> {
        let mut expected = sample();
        expected.operation_id = Uuid::parse_str(raw["operationId"].as_str().unwrap()).unwrap();
        expected
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let mut raw = encoded();
        raw.insert("phase".to_string(), json!("POLLING"));
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert_eq!(err, ContextError::UnknownPhase("POLLING".to_string()));
    }

    #[test]
    fn test_missing_phase_is_rejected() {
        let mut raw = encoded();
        raw.remove("phase");
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert_eq!(err, ContextError::MissingKey("phase"));
    }

    #[test]
    fn test_nested_value_is_rejected() {
        let mut raw = encoded();
        raw.insert("name".to_string(), json!({"nested": true}));
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert_eq!(err, ContextError::NonPrimitive("name".to_string()));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut raw = encoded();
        raw.insert("stateName".to_string(), json!("IDLE"));
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert!(matches!(err, ContextError::InvalidIdentifiers(_)));
    }

    #[test]
    fn test_context_for_other_operation_is_rejected() {
        let raw = encoded();
        let other = ContextCodec::new("stream-processor", Operation::Delete);
        let err = other.decode::<Phase, Ids>(&raw).unwrap_err();
        assert!(matches!(err, ContextError::WrongTarget { .. }));
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let mut raw = encoded();
        raw.insert("v".to_string(), json!(2));
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert_eq!(err, ContextError::UnsupportedVersion("2".to_string()));
    }

    #[test]
    fn test_timeout_without_start_time_is_rejected() {
        let mut raw = encoded();
        raw.remove("startTime");
        let err = codec().decode::<Phase, Ids>(&raw).unwrap_err();
        assert_eq!(err, ContextError::MissingKey("startTime"));
    }

    #[test]
    fn test_untimed_context_omits_timing_keys() {
        let mut continuation = sample();
        continuation.timing = None;
        continuation.phase = Phase::Starting;
        let raw = codec().encode(&continuation).unwrap();
        assert!(!raw.contains_key("startTime"));
        assert!(!raw.contains_key("deleteOnTimeout"));

        let decoded: Continuation<Phase, Ids> = codec().decode(&raw).unwrap().unwrap();
        assert_eq!(decoded.phase, Phase::Starting);
        assert!(decoded.timing.is_none());
    }
}
